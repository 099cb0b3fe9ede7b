use std::fmt;

use serde::Serialize;

use crate::compile::{CompileErrorKind, CompilerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum Phase {
    Setup,
    Ingest,
    Emit,
    Internal,
}

impl CompileErrorKind {
    pub fn code_str(self) -> &'static str {
        match self {
            CompileErrorKind::Setup => "P2C0001",
            CompileErrorKind::Io => "P2C0100",
            CompileErrorKind::Ingest => "P2C0101",
            CompileErrorKind::Budget => "P2C0102",
            CompileErrorKind::Interrupted => "P2C0103",
            CompileErrorKind::Alloc => "P2C0200",
            CompileErrorKind::Symbol => "P2C0201",
            CompileErrorKind::UnknownProtocol => "P2C0300",
            CompileErrorKind::Unresolved => "P2C0301",
            CompileErrorKind::Internal => "P2C0901",
        }
    }

    pub fn phase(self) -> Phase {
        match self {
            CompileErrorKind::Setup => Phase::Setup,
            CompileErrorKind::Io
            | CompileErrorKind::Ingest
            | CompileErrorKind::Budget
            | CompileErrorKind::Interrupted => Phase::Ingest,
            CompileErrorKind::Alloc
            | CompileErrorKind::Symbol
            | CompileErrorKind::UnknownProtocol
            | CompileErrorKind::Unresolved => Phase::Emit,
            CompileErrorKind::Internal => Phase::Internal,
        }
    }

    pub fn default_message(self) -> &'static str {
        match self {
            CompileErrorKind::Setup => "invalid compile options",
            CompileErrorKind::Io => "failed to read policy input",
            CompileErrorKind::Ingest => "policy parse failed",
            CompileErrorKind::Budget => "policy input too large",
            CompileErrorKind::Interrupted => "interrupted while reading policy",
            CompileErrorKind::Alloc => "allocation failure",
            CompileErrorKind::Symbol => "name too long for a C symbol fragment",
            CompileErrorKind::UnknownProtocol => "unknown stream protocol kind",
            CompileErrorKind::Unresolved => "unresolved shared object reference",
            CompileErrorKind::Internal => "internal policy2c bug",
        }
    }

    pub fn default_help(self) -> Option<&'static str> {
        match self {
            CompileErrorKind::Setup => {
                Some("Pointer width must be 4 or 8 and the read chunk size must be non-zero.")
            }
            CompileErrorKind::Ingest => Some(
                "Check the JSON syntax, and that every protocol and feature the policy uses is one policy2c knows.",
            ),
            CompileErrorKind::Budget => Some("Raise --max-policy-bytes."),
            CompileErrorKind::Symbol => {
                Some("Shorten the stream type, metadata, auth, trust store or certificate name.")
            }
            CompileErrorKind::UnknownProtocol => Some(
                "Only h1, h2, ws and mqtt stream types have a static representation.",
            ),
            CompileErrorKind::Unresolved | CompileErrorKind::Internal => Some(
                "This is a bug in policy2c. Please report it with the input policy.",
            ),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub code: &'static str,
    pub phase: Phase,
    pub message: String,
    pub help: Option<String>,
}

impl From<&CompilerError> for Diagnostic {
    fn from(err: &CompilerError) -> Self {
        Diagnostic {
            code: err.kind.code_str(),
            phase: err.kind.phase(),
            message: err.message.clone(),
            help: err.kind.default_help().map(|s| s.to_string()),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:?}: {}", self.code, self.phase, self.message)?;
        if let Some(help) = &self.help {
            write!(f, "\n  help: {help}")?;
        }
        Ok(())
    }
}

pub fn render_diagnostics_md() -> String {
    let mut rows: Vec<(&'static str, Phase, &'static str, &'static str)> = all_kinds()
        .iter()
        .map(|k| {
            (
                k.code_str(),
                k.phase(),
                k.default_message(),
                k.default_help().unwrap_or(""),
            )
        })
        .collect();
    rows.sort_by(|a, b| a.0.cmp(b.0));

    let mut out = String::new();
    out.push_str("# policy2c diagnostics catalog\n\n");
    out.push_str("This document is generated from `crates/policy2c-core/src/diagnostics.rs`.\n\n");
    out.push_str("| Code | Phase | Message | Help |\n");
    out.push_str("| ---- | ----- | ------- | ---- |\n");
    for (code, phase, msg, help) in rows {
        out.push_str(&format!("| {code} | {phase:?} | {msg} | {help} |\n"));
    }
    out
}

fn all_kinds() -> &'static [CompileErrorKind] {
    &[
        CompileErrorKind::Setup,
        CompileErrorKind::Io,
        CompileErrorKind::Ingest,
        CompileErrorKind::Budget,
        CompileErrorKind::Interrupted,
        CompileErrorKind::Alloc,
        CompileErrorKind::Symbol,
        CompileErrorKind::UnknownProtocol,
        CompileErrorKind::Unresolved,
        CompileErrorKind::Internal,
    ]
}
