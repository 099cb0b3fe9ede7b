use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use policy2c_core::compile::{
    compile_policy_reader, CompileOptions, CompileOutput, CompileStats, CompilerError,
    DEFAULT_MAX_POLICY_BYTES, DEFAULT_READ_CHUNK_BYTES, POLICY2C_REPORT_SCHEMA_VERSION,
};
use policy2c_core::diagnostics::{render_diagnostics_md, Diagnostic};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

#[derive(Parser, Debug)]
#[command(name = "policy2c")]
#[command(
    about = "Compile a JSON streamtype policy into static C initializers.",
    long_about = None
)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
    #[command(flatten)]
    compile: CompileArgs,
    /// Log filter used when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the diagnostics catalog as markdown.
    Diagnostics,
}

#[derive(Args, Debug)]
struct CompileArgs {
    /// Policy JSON (reads stdin when omitted).
    #[arg(long)]
    input: Option<PathBuf>,
    /// Generated C header (writes stdout when omitted).
    #[arg(long)]
    out: Option<PathBuf>,
    /// If set, fail if --out differs; do not write.
    #[arg(long, default_value_t = false)]
    check: bool,
    /// sizeof(void *) on the target, used for the footprint estimate.
    #[arg(long, value_parser = ["4", "8"])]
    pointer_width: Option<String>,
    #[arg(long, default_value_t = DEFAULT_READ_CHUNK_BYTES)]
    chunk_bytes: usize,
    #[arg(long, default_value_t = DEFAULT_MAX_POLICY_BYTES)]
    max_policy_bytes: usize,
    /// Write compile stats as JSON.
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct Report<'a> {
    schema_version: &'a str,
    input: Option<&'a Path>,
    stats: CompileStats,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match try_main(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:#}");
            if let Some(diag) = err.downcast_ref::<CompilerError>().map(Diagnostic::from) {
                eprintln!("  code: {}", diag.code);
                if let Some(help) = &diag.help {
                    eprintln!("  help: {help}");
                }
            }
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn try_main(cli: Cli) -> Result<()> {
    match cli.command {
        Some(Command::Diagnostics) => {
            io::stdout()
                .lock()
                .write_all(render_diagnostics_md().as_bytes())
                .context("write diagnostics catalog")?;
            Ok(())
        }
        None => {
            info!(version = env!("CARGO_PKG_VERSION"), "policy2c");
            let res = run_compile(&cli.compile);
            match &res {
                Ok(()) => info!("Completed: OK"),
                Err(_) => error!("Completed: failed"),
            }
            res
        }
    }
}

fn run_compile(args: &CompileArgs) -> Result<()> {
    if args.check && args.out.is_none() {
        anyhow::bail!("--check needs --out");
    }
    install_sigint_handler();

    let mut options = CompileOptions {
        read_chunk_bytes: args.chunk_bytes,
        max_policy_bytes: args.max_policy_bytes,
        interrupt: Some(&INTERRUPTED),
        ..CompileOptions::default()
    };
    if let Some(pw) = &args.pointer_width {
        options.pointer_width = pw
            .parse()
            .with_context(|| format!("parse --pointer-width {pw:?}"))?;
    }

    let out = match &args.input {
        Some(path) => {
            let f = File::open(path).with_context(|| format!("open policy: {}", path.display()))?;
            compile_policy_reader(f, &options)
                .with_context(|| format!("compile policy: {}", path.display()))?
        }
        None => compile_policy_reader(io::stdin().lock(), &options)
            .context("compile policy from stdin")?,
    };

    write_output(args.out.as_deref(), &out.c_src, args.check)?;
    if let Some(report) = &args.report {
        write_report(report, args.input.as_deref(), &out)?;
    }
    Ok(())
}

fn write_output(out_path: Option<&Path>, src: &str, check: bool) -> Result<()> {
    let Some(out_path) = out_path else {
        let mut stdout = io::stdout().lock();
        stdout
            .write_all(src.as_bytes())
            .and_then(|()| stdout.flush())
            .context("write output to stdout")?;
        return Ok(());
    };

    if check {
        let cur = std::fs::read_to_string(out_path)
            .with_context(|| format!("read existing output: {}", out_path.display()))?;
        if cur != src {
            anyhow::bail!("generated output differs: {}", out_path.display());
        }
        return Ok(());
    }

    if let Some(parent) = out_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir: {}", parent.display()))?;
    }
    std::fs::write(out_path, src.as_bytes())
        .with_context(|| format!("write output: {}", out_path.display()))?;
    Ok(())
}

fn write_report(path: &Path, input: Option<&Path>, out: &CompileOutput) -> Result<()> {
    let report = Report {
        schema_version: POLICY2C_REPORT_SCHEMA_VERSION,
        input,
        stats: out.stats,
    };
    let mut bytes = serde_json::to_vec_pretty(&report).context("encode report JSON")?;
    bytes.push(b'\n');
    std::fs::write(path, bytes).with_context(|| format!("write report: {}", path.display()))?;
    Ok(())
}

#[cfg(unix)]
extern "C" fn on_sigint(_sig: libc::c_int) {
    INTERRUPTED.store(true, std::sync::atomic::Ordering::SeqCst);
}

#[cfg(unix)]
fn install_sigint_handler() {
    let handler = on_sigint as extern "C" fn(libc::c_int);
    // SAFETY: the handler only stores to an atomic.
    unsafe {
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
    }
}

#[cfg(not(unix))]
fn install_sigint_handler() {}
