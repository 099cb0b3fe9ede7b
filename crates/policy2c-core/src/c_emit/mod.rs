//! Policy graph to C static initializers.
//!
//! Emission is two walks over the stream type list. The first emits every object a
//! stream type shares with others (metadata chains, retry tables, certificates and
//! trust stores), each before its first use; the auth list follows. The second walk
//! emits one `lws_ss_policy_t` per stream type, referring back to those symbols.
//! Lists are emitted as chains whose `next` points at the previously emitted record,
//! so the last symbol of a chain is its entry point.

mod shared;
mod streams;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::compile::{CompileErrorKind, CompileStats, CompilerError};
use crate::footprint::{CLayout, Footprint, FootprintKind};
use crate::intern::InternTable;
use crate::policy::{CertId, PolicyGraph, ProtocolKind, RetryId, StreamPolicy, TrustStoreId};
use crate::symbol::{c_escape_string, purify, SYMBOL_CAPACITY};

/// Name of the `#define` aliasing the list entry symbol.
pub const STATIC_POLICY_ENTRY: &str = "_ss_static_policy_entry";

fn sym(name: &str) -> Result<String, CompilerError> {
    purify(name, SYMBOL_CAPACITY)
}

pub fn metadata_symbol(streamtype: &str, name: &str) -> Result<String, CompilerError> {
    Ok(format!("_md_{}_{}", sym(streamtype)?, sym(name)?))
}

pub fn retry_symbol(handle: usize) -> String {
    format!("_rbo_{handle}")
}

pub fn retry_table_symbol(handle: usize) -> String {
    format!("_rbo_bo_{handle}")
}

pub fn der_symbol(vhost_name: &str) -> Result<String, CompilerError> {
    Ok(format!("_ss_der_{}", sym(vhost_name)?))
}

pub fn x509_symbol(vhost_name: &str) -> Result<String, CompilerError> {
    Ok(format!("_ss_x509_{}", sym(vhost_name)?))
}

pub fn trust_store_symbol(name: &str) -> Result<String, CompilerError> {
    Ok(format!("_ss_ts_{}", sym(name)?))
}

pub fn auth_symbol(name: &str) -> Result<String, CompilerError> {
    Ok(format!("_ssau_{}", sym(name)?))
}

pub fn policy_symbol(streamtype: &str) -> Result<String, CompilerError> {
    Ok(format!("_ssp_{}", sym(streamtype)?))
}

pub struct Emitter<'a> {
    graph: &'a PolicyGraph,
    layout: CLayout,
    out: String,
    retry_map: InternTable<RetryId>,
    trust_map: InternTable<TrustStoreId>,
    cert_map: InternTable<CertId>,
    footprint: Footprint,
    metadata_records: usize,
    auth_records: usize,
    policy_structs: usize,
}

impl<'a> Emitter<'a> {
    pub fn new(graph: &'a PolicyGraph, layout: CLayout) -> Self {
        Emitter {
            graph,
            layout,
            out: String::new(),
            retry_map: InternTable::new("retry/backoff"),
            trust_map: InternTable::new("trust store"),
            cert_map: InternTable::new("x.509 certificate"),
            footprint: Footprint::new(),
            metadata_records: 0,
            auth_records: 0,
            policy_structs: 0,
        }
    }

    /// Echoes the policy source inside an `#if 0` block.
    pub fn emit_source_echo(&mut self, source: &[u8]) {
        self.push_str("/*\n * Autogenerated from the following JSON policy\n */\n\n#if 0\n");
        self.push_str(&String::from_utf8_lossy(source));
        self.push_str(&format!("\n\n Original JSON size: {}\n", source.len()));
        self.push_str(&format!(
            " Original JSON sha256: {:x}\n#endif\n\n",
            Sha256::digest(source)
        ));
    }

    pub fn emit_graph(&mut self) -> Result<(), CompilerError> {
        let graph = self.graph;
        for policy in &graph.policies {
            self.emit_shared(policy)?;
        }
        self.emit_auths()?;
        self.emit_policies()?;

        self.push_str(&format!(
            "/* estimated footprint {} (when sizeof void * = {}) */\n",
            self.footprint.total(),
            self.layout.pointer_width()
        ));
        debug!(entities = self.footprint.entities(), "footprint total");
        for (kind, bytes) in self.footprint.by_kind() {
            debug!(?kind, bytes, "footprint");
        }
        Ok(())
    }

    /// Everything emitted so far, including after a failed [`Emitter::emit_graph`].
    pub fn output(&self) -> &str {
        &self.out
    }

    pub fn into_output(self) -> String {
        self.out
    }

    pub fn footprint(&self) -> &Footprint {
        &self.footprint
    }

    pub fn stats(&self, json_bytes: usize) -> CompileStats {
        CompileStats {
            json_bytes,
            stream_types: self.policy_structs,
            metadata_records: self.metadata_records,
            retry_tables: self.retry_map.len(),
            trust_stores: self.trust_map.len(),
            certificates: self.cert_map.len(),
            auth_records: self.auth_records,
            footprint_bytes: self.footprint.total(),
            pointer_width: self.layout.pointer_width(),
        }
    }

    fn push_str(&mut self, s: &str) {
        self.out.push_str(s);
    }

    /// `<indent>.<field> = "<value>",` when the value is present.
    fn opt_str_field(&mut self, indent: &str, field: &str, value: &Option<String>) {
        if let Some(v) = value {
            self.push_str(&format!("{indent}.{field} = \"{}\",\n", c_escape_string(v)));
        }
    }

    /// `<indent>.<field> = <value>,` when the value is non-zero.
    fn nonzero_field(&mut self, indent: &str, field: &str, value: u32) {
        if value != 0 {
            self.push_str(&format!("{indent}.{field} = {value},\n"));
        }
    }
}

fn unresolved(message: String) -> CompilerError {
    CompilerError::new(CompileErrorKind::Unresolved, message)
}

#[cfg(test)]
mod tests;
