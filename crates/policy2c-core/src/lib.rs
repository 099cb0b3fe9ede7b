pub mod c_emit;
pub mod compile;
pub mod diagnostics;
pub mod footprint;
pub mod ingest;
pub mod intern;
pub mod policy;
pub mod symbol;
