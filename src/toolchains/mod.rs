//! Toolchain adapters - one per supported language
//!
//! Each adapter wraps one external toolchain behind a uniform two-stage
//! contract: a compile phase producing an artifact (or a verbatim diagnostic)
//! and a run command executing it. Toolchain binaries are invoked by
//! PATH-resolved name with an argument vector, never through a shell, and
//! source text reaches compilers over stdin wherever the toolchain supports
//! that.
//!
//! The adapter layer does NOT:
//! - Parse or structure compiler diagnostics
//! - Stream process output or forward stdin (the pipeline owns the process)
//! - Validate the submission (the session owns protocol validation)

pub mod c;
pub mod cpp;
pub mod java;
pub mod python;

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::languages::Language;

/// Result of the compile phase.
#[derive(Debug, PartialEq)]
pub enum CompileOutcome {
    /// Toolchain produced a runnable artifact.
    Success,
    /// Language has no compile phase.
    Skipped,
    /// Compiler exited non-zero; verbatim diagnostic text.
    Rejected(String),
}

/// Adapter over one external compiler/interpreter.
#[async_trait]
pub trait ToolchainAdapter: Send + Sync {
    fn language(&self) -> Language;

    /// Stage `source` under `workspace` and run the compile phase.
    async fn compile(
        &self,
        source: &str,
        workspace: &Path,
        timeout: Duration,
    ) -> Result<CompileOutcome>;

    /// Command that executes the compiled artifact (or the source itself).
    /// Only valid after a non-`Rejected` compile of the same `source` in the
    /// same `workspace`.
    fn launch(&self, source: &str, workspace: &Path) -> Command;
}

/// Get the adapter for a language.
pub fn adapter_for(language: Language) -> Box<dyn ToolchainAdapter> {
    match language {
        Language::C => Box::new(c::CAdapter),
        Language::Cpp => Box::new(cpp::CppAdapter),
        Language::Python => Box::new(python::PythonAdapter),
        Language::Java => Box::new(java::JavaAdapter),
    }
}

/// Name of the compiled binary inside a session workspace.
pub(crate) const BINARY_NAME: &str = "prog";

/// Compile by piping `source` to a compiler reading from stdin
/// (`gcc`/`g++` with `-x <kind> -`). No temp source file is written.
pub(crate) async fn compile_from_stdin(
    compiler: &str,
    source_kind: &str,
    source: &str,
    workspace: &Path,
    timeout: Duration,
) -> Result<CompileOutcome> {
    let mut cmd = Command::new(compiler);
    cmd.arg("-o")
        .arg(workspace.join(BINARY_NAME))
        .arg("-x")
        .arg(source_kind)
        .arg("-")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!("Compiling with {} -x {} from stdin", compiler, source_kind);

    run_compiler(cmd, Some(source), timeout).await
}

/// Spawn a compiler command, optionally feeding `source` on stdin, and wait
/// for it to finish within `timeout`.
pub(crate) async fn run_compiler(
    mut cmd: Command,
    source: Option<&str>,
    timeout: Duration,
) -> Result<CompileOutcome> {
    let mut child = cmd.spawn().context("Failed to spawn compiler")?;

    if let Some(source) = source {
        if let Some(mut stdin) = child.stdin.take() {
            // A write error means the compiler exited early; its diagnostic
            // is collected below.
            let _ = stdin.write_all(source.as_bytes()).await;
        }
    }

    // On timeout the dropped child is killed via kill_on_drop.
    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.context("Failed to wait for compiler")?,
        Err(_) => return Ok(CompileOutcome::Rejected("Compilation timed out".to_string())),
    };

    if output.status.success() {
        return Ok(CompileOutcome::Success);
    }

    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let diagnostic = if !stderr.is_empty() {
        stderr
    } else if !stdout.is_empty() {
        stdout
    } else {
        format!(
            "Compilation failed with exit code {}",
            output.status.code().unwrap_or(-1)
        )
    };

    Ok(CompileOutcome::Rejected(diagnostic))
}
