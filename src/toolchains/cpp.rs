//! C++ toolchain (`g++`).

use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::process::Command;

use super::{compile_from_stdin, CompileOutcome, ToolchainAdapter, BINARY_NAME};
use crate::languages::Language;

/// Compiles with `g++` directly from standard input and runs the produced
/// binary.
pub struct CppAdapter;

#[async_trait]
impl ToolchainAdapter for CppAdapter {
    fn language(&self) -> Language {
        Language::Cpp
    }

    async fn compile(
        &self,
        source: &str,
        workspace: &Path,
        timeout: Duration,
    ) -> Result<CompileOutcome> {
        compile_from_stdin("g++", "c++", source, workspace, timeout).await
    }

    fn launch(&self, _source: &str, workspace: &Path) -> Command {
        Command::new(workspace.join(BINARY_NAME))
    }
}
