//! Python toolchain (`python3`). No compile phase.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;

use super::{CompileOutcome, ToolchainAdapter};
use crate::languages::Language;

const SOURCE_NAME: &str = "main.py";

/// Writes the source into the workspace and runs it with `python3`.
pub struct PythonAdapter;

#[async_trait]
impl ToolchainAdapter for PythonAdapter {
    fn language(&self) -> Language {
        Language::Python
    }

    async fn compile(
        &self,
        source: &str,
        workspace: &Path,
        _timeout: Duration,
    ) -> Result<CompileOutcome> {
        tokio::fs::write(workspace.join(SOURCE_NAME), source)
            .await
            .context("Failed to write Python file")?;
        Ok(CompileOutcome::Skipped)
    }

    fn launch(&self, _source: &str, workspace: &Path) -> Command {
        let mut cmd = Command::new("python3");
        // -u: unbuffered stdout, so chunks stream while the program runs
        cmd.arg("-u").arg(workspace.join(SOURCE_NAME));
        cmd
    }
}
