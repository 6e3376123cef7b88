//! Source formatting endpoint.
//!
//! Formats submitted code with the external formatter for its language and
//! falls back to the original text whenever the formatter is unavailable or
//! fails. Formatting never errors toward the client.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::server::AppState;

const FORMAT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
pub struct FormatRequest {
    #[serde(default)]
    pub code: String,
    #[serde(default = "default_format_lang")]
    pub lang: String,
}

fn default_format_lang() -> String {
    "c++".to_string()
}

/// `GET /` - liveness probe.
pub async fn status(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "message": "Code compiler running",
        "active_sessions": state.registry.len().await,
    }))
}

/// `POST /` - format `code` for `lang`.
pub async fn format_handler(Json(request): Json<FormatRequest>) -> Json<Value> {
    let formatted = format_code(&request.code, &request.lang).await;
    Json(json!({ "code": formatted }))
}

/// `POST /log-data-for-analytics` - client-side analytics sink.
pub async fn log_analytics(Json(body): Json<Value>) -> Json<Value> {
    info!("log: {}", body);
    Json(json!({ "message": "Code compiler running" }))
}

/// Format `code`, returning the original text when no formatter applies or
/// the formatter fails.
async fn format_code(code: &str, lang: &str) -> String {
    let result = match lang.to_lowercase().as_str() {
        // clang-format covers both C and C++
        "c" | "c++" | "cpp" => clang_format(code, &["-style=file"]).await,
        "java" => format_java(code).await,
        other => {
            debug!("No formatter available for language: {}", other);
            return code.to_string();
        }
    };

    match result {
        Ok(formatted) => formatted,
        Err(e) => {
            warn!("Formatting error: {:#}", e);
            code.to_string()
        }
    }
}

/// Run `clang-format` with the source piped to its stdin.
async fn clang_format(code: &str, args: &[&str]) -> Result<String> {
    let mut child = Command::new("clang-format")
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .context("Failed to spawn clang-format")?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(code.as_bytes()).await?;
    }

    let output = tokio::time::timeout(FORMAT_TIMEOUT, child.wait_with_output())
        .await
        .context("clang-format timed out")?
        .context("Failed to wait for clang-format")?;

    if !output.status.success() {
        bail!("clang-format exited with {}", output.status);
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// Java formatting: `google-java-format` on a temp file, falling back to
/// clang-format's Google style.
async fn format_java(code: &str) -> Result<String> {
    let source = tempfile::Builder::new()
        .prefix("format_")
        .suffix(".java")
        .tempfile()
        .context("Failed to create temp file for formatting")?;
    tokio::fs::write(source.path(), code).await?;

    let run = tokio::time::timeout(
        FORMAT_TIMEOUT,
        Command::new("google-java-format")
            .arg(source.path())
            .kill_on_drop(true)
            .output(),
    )
    .await;

    match run {
        Ok(Ok(output)) if output.status.success() => {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        }
        _ => {
            debug!("google-java-format not available, trying clang-format for Java");
            clang_format(code, &["-style=Google", "-assume-filename=.java"]).await
        }
    }
}
