//! C toolchain (`gcc`).

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::process::Command;

use super::{compile_from_stdin, CompileOutcome, ToolchainAdapter, BINARY_NAME};
use crate::languages::Language;

/// Compiles with `gcc` directly from standard input and runs the produced
/// binary.
pub struct CAdapter;

#[async_trait]
impl ToolchainAdapter for CAdapter {
    fn language(&self) -> Language {
        Language::C
    }

    async fn compile(
        &self,
        source: &str,
        workspace: &Path,
        timeout: Duration,
    ) -> Result<CompileOutcome> {
        compile_from_stdin("gcc", "c", source, workspace, timeout).await
    }

    fn launch(&self, _source: &str, workspace: &Path) -> Command {
        Command::new(workspace.join(BINARY_NAME))
    }
}
