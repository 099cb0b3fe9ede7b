use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracing::{debug, info};

use crate::c_emit::Emitter;
use crate::footprint::CLayout;
use crate::ingest::PolicyParser;

pub const POLICY2C_REPORT_SCHEMA_VERSION: &str = "policy2c.report@0.1.0";

pub const DEFAULT_READ_CHUNK_BYTES: usize = 1024;
pub const DEFAULT_MAX_POLICY_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Pointer width of the target the generated C is built for.
    pub pointer_width: usize,
    pub read_chunk_bytes: usize,
    pub max_policy_bytes: usize,
    /// Checked between chunk reads; set by the driver's SIGINT handler.
    pub interrupt: Option<&'static AtomicBool>,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            pointer_width: std::mem::size_of::<*const u8>(),
            read_chunk_bytes: DEFAULT_READ_CHUNK_BYTES,
            max_policy_bytes: DEFAULT_MAX_POLICY_BYTES,
            interrupt: None,
        }
    }
}

impl CompileOptions {
    pub fn validate(&self) -> Result<(), CompilerError> {
        if self.pointer_width != 4 && self.pointer_width != 8 {
            return Err(CompilerError::new(
                CompileErrorKind::Setup,
                format!("pointer width must be 4 or 8, got {}", self.pointer_width),
            ));
        }
        if self.read_chunk_bytes == 0 {
            return Err(CompilerError::new(
                CompileErrorKind::Setup,
                "read chunk size must be non-zero".to_string(),
            ));
        }
        if self.max_policy_bytes == 0 {
            return Err(CompilerError::new(
                CompileErrorKind::Setup,
                "max policy size must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn layout(&self) -> CLayout {
        CLayout::new(self.pointer_width)
    }

    fn interrupted(&self) -> bool {
        self.interrupt
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum CompileErrorKind {
    Setup,
    Io,
    Ingest,
    Budget,
    Interrupted,
    Alloc,
    Symbol,
    UnknownProtocol,
    Unresolved,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct CompilerError {
    pub kind: CompileErrorKind,
    pub message: String,
}

impl CompilerError {
    pub fn new(kind: CompileErrorKind, message: String) -> Self {
        Self { kind, message }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CompileStats {
    pub json_bytes: usize,
    pub stream_types: usize,
    pub metadata_records: usize,
    pub retry_tables: usize,
    pub trust_stores: usize,
    pub certificates: usize,
    pub auth_records: usize,
    pub footprint_bytes: usize,
    pub pointer_width: usize,
}

#[derive(Debug, Clone)]
pub struct CompileOutput {
    pub c_src: String,
    pub stats: CompileStats,
}

pub fn compile_policy_to_c(
    policy: &[u8],
    options: &CompileOptions,
) -> Result<String, CompilerError> {
    compile_policy_reader(policy, options).map(|out| out.c_src)
}

pub fn compile_policy_reader<R: Read>(
    reader: R,
    options: &CompileOptions,
) -> Result<CompileOutput, CompilerError> {
    options.validate()?;

    let mut parser = PolicyParser::begin(options)?;
    read_policy(reader, &mut parser, options)?;
    let parsed = parser.finish()?;
    info!(
        json_bytes = parsed.source.len(),
        stream_types = parsed.graph.policies.len(),
        "parsed policy JSON"
    );

    let mut emitter = Emitter::new(&parsed.graph, options.layout());
    emitter.emit_source_echo(&parsed.source);
    emitter.emit_graph()?;

    let stats = emitter.stats(parsed.source.len());
    info!(
        footprint_bytes = stats.footprint_bytes,
        pointer_width = stats.pointer_width,
        "emitted static policy"
    );
    Ok(CompileOutput {
        c_src: emitter.into_output(),
        stats,
    })
}

fn read_policy<R: Read>(
    mut reader: R,
    parser: &mut PolicyParser,
    options: &CompileOptions,
) -> Result<(), CompilerError> {
    let mut buf = vec![0u8; options.read_chunk_bytes];
    loop {
        if options.interrupted() {
            return Err(CompilerError::new(
                CompileErrorKind::Interrupted,
                "interrupted while reading policy input".to_string(),
            ));
        }
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(CompilerError::new(
                    CompileErrorKind::Io,
                    format!("read policy input: {e}"),
                ))
            }
        };
        debug!(bytes = n, "policy chunk");
        parser.feed(&buf[..n])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    struct FailingReader;

    impl Read for FailingReader {
        fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
        }
    }

    #[test]
    fn rejects_bad_pointer_width() {
        let options = CompileOptions {
            pointer_width: 2,
            ..CompileOptions::default()
        };
        let err = compile_policy_to_c(b"{}", &options).expect_err("must fail");
        assert_eq!(err.kind, CompileErrorKind::Setup);
    }

    #[test]
    fn rejects_zero_chunk() {
        let options = CompileOptions {
            read_chunk_bytes: 0,
            ..CompileOptions::default()
        };
        let err = compile_policy_to_c(b"{}", &options).expect_err("must fail");
        assert_eq!(err.kind, CompileErrorKind::Setup);
    }

    #[test]
    fn read_errors_are_io_failures() {
        let err = compile_policy_reader(FailingReader, &CompileOptions::default())
            .expect_err("must fail");
        assert_eq!(err.kind, CompileErrorKind::Io);
    }

    #[test]
    fn interrupt_flag_stops_ingestion() {
        static FLAG: AtomicBool = AtomicBool::new(true);
        let options = CompileOptions {
            interrupt: Some(&FLAG),
            ..CompileOptions::default()
        };
        let err = compile_policy_to_c(b"{\"s\": []}", &options).expect_err("must fail");
        assert_eq!(err.kind, CompileErrorKind::Interrupted);
    }

    #[test]
    fn small_chunks_match_one_shot() {
        let policy = br#"{"s": [{"a": {"endpoint": "example.com", "port": 443}}]}"#;
        let one = compile_policy_to_c(policy, &CompileOptions::default()).expect("compile");
        let options = CompileOptions {
            read_chunk_bytes: 3,
            ..CompileOptions::default()
        };
        let chunked = compile_policy_to_c(policy, &options).expect("compile");
        assert_eq!(one, chunked);
    }
}
