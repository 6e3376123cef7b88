//! Java toolchain (`javac` + `java`).
//!
//! Java requires the source file to be named after its public class, so the
//! class name is extracted from the source text and used consistently for the
//! compile and run steps.

use std::path::Path;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;

use super::{run_compiler, CompileOutcome, ToolchainAdapter};
use crate::languages::Language;

static CLASS_NAME_PATTERN: OnceLock<Regex> = OnceLock::new();

/// First `public class <Name>` occurrence in the source, `Main` when absent.
/// The match is `\w+` so the result is always safe as a file name.
fn public_class_name(source: &str) -> String {
    let pattern = CLASS_NAME_PATTERN
        .get_or_init(|| Regex::new(r"public\s+class\s+(\w+)").expect("valid class name pattern"));

    pattern
        .captures(source)
        .and_then(|caps| caps.get(1))
        .map(|name| name.as_str().to_string())
        .unwrap_or_else(|| "Main".to_string())
}

/// Writes `<Class>.java` into the workspace, compiles it with `javac` and
/// runs the class with `java -cp`.
pub struct JavaAdapter;

#[async_trait]
impl ToolchainAdapter for JavaAdapter {
    fn language(&self) -> Language {
        Language::Java
    }

    async fn compile(
        &self,
        source: &str,
        workspace: &Path,
        timeout: Duration,
    ) -> Result<CompileOutcome> {
        let class_name = public_class_name(source);
        let source_path = workspace.join(format!("{}.java", class_name));

        tokio::fs::write(&source_path, source)
            .await
            .context("Failed to write Java file")?;

        let mut cmd = Command::new("javac");
        cmd.arg("-d")
            .arg(workspace)
            .arg(&source_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        run_compiler(cmd, None, timeout).await
    }

    fn launch(&self, source: &str, workspace: &Path) -> Command {
        let mut cmd = Command::new("java");
        cmd.arg("-cp").arg(workspace).arg(public_class_name(source));
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_name_extraction() {
        let source = "public class HelloWorld {\n  public static void main(String[] a) {}\n}";
        assert_eq!(public_class_name(source), "HelloWorld");
    }

    #[test]
    fn test_class_name_extra_whitespace() {
        assert_eq!(public_class_name("public   class\n  Foo {}"), "Foo");
    }

    #[test]
    fn test_class_name_first_occurrence_wins() {
        let source = "public class First {}\npublic class Second {}";
        assert_eq!(public_class_name(source), "First");
    }

    #[test]
    fn test_class_name_defaults_to_main() {
        assert_eq!(public_class_name("class Lower {}"), "Main");
        assert_eq!(public_class_name(""), "Main");
    }
}
