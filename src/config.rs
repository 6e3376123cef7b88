//! Server configuration, loaded from the environment.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::warn;

/// Runtime configuration. Every field has a default so the server starts
/// with no environment at all.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the WebSocket execution server
    pub ws_port: u16,
    /// Port for the HTTP formatting/status API
    pub http_port: u16,
    /// Directory for access and event logs
    pub logs_dir: PathBuf,
    /// Root of the per-session artifact workspaces
    pub outputs_dir: PathBuf,
    /// Language assumed when a submission omits `lang`
    pub default_language: String,
    /// Compile phase time limit in milliseconds
    pub compile_timeout_ms: u64,
    /// Run phase time limit in milliseconds
    pub run_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ws_port: 7100,
            http_port: 7000,
            logs_dir: "./logs".into(),
            outputs_dir: "./outputs".into(),
            default_language: "c".into(),
            compile_timeout_ms: 30_000,
            run_timeout_ms: 60_000,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Config::default();
        Self {
            ws_port: env_parse("WS_PORT", defaults.ws_port),
            http_port: env_parse("HTTP_PORT", defaults.http_port),
            logs_dir: std::env::var("LOGS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.logs_dir),
            outputs_dir: std::env::var("OUTPUTS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.outputs_dir),
            default_language: std::env::var("DEFAULT_LANGUAGE")
                .unwrap_or(defaults.default_language),
            compile_timeout_ms: env_parse("COMPILE_TIMEOUT_MS", defaults.compile_timeout_ms),
            run_timeout_ms: env_parse("RUN_TIMEOUT_MS", defaults.run_timeout_ms),
        }
    }

    /// Ensure the logs and per-session artifacts areas exist.
    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.logs_dir).with_context(|| {
            format!("Failed to create logs directory {}", self.logs_dir.display())
        })?;
        std::fs::create_dir_all(&self.outputs_dir).with_context(|| {
            format!(
                "Failed to create outputs directory {}",
                self.outputs_dir.display()
            )
        })?;
        Ok(())
    }

    pub fn compile_timeout(&self) -> Duration {
        Duration::from_millis(self.compile_timeout_ms)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_millis(self.run_timeout_ms)
    }
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("Invalid {}={:?}, using default {}", key, raw, default);
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.ws_port, 7100);
        assert_eq!(config.http_port, 7000);
        assert_eq!(config.default_language, "c");
        assert_eq!(config.compile_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_env_parse_valid() {
        std::env::set_var("CODERUNNER_TEST_PORT", "9000");
        assert_eq!(env_parse("CODERUNNER_TEST_PORT", 7100u16), 9000);
        std::env::remove_var("CODERUNNER_TEST_PORT");
    }

    #[test]
    fn test_env_parse_invalid_falls_back() {
        std::env::set_var("CODERUNNER_TEST_BAD_PORT", "not-a-port");
        assert_eq!(env_parse("CODERUNNER_TEST_BAD_PORT", 7100u16), 7100);
        std::env::remove_var("CODERUNNER_TEST_BAD_PORT");
    }

    #[test]
    fn test_ensure_directories() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            logs_dir: dir.path().join("logs"),
            outputs_dir: dir.path().join("outputs/nested"),
            ..Config::default()
        };
        config.ensure_directories().unwrap();
        assert!(config.logs_dir.is_dir());
        assert!(config.outputs_dir.is_dir());
    }
}
