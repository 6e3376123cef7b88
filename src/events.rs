//! Append-only event logging.
//!
//! Connection lifecycle events and HTTP access lines go to flat files under
//! the logs directory. Writes are fire-and-forget: a failure is reported via
//! `tracing` and swallowed, never propagated into a session.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use axum::http::HeaderMap;
use chrono::Utc;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::warn;

const WS_EVENTS_LOG: &str = "websocket-events.log";
const ACCESS_LOG: &str = "access.log";

#[derive(Clone)]
pub struct EventLogger {
    logs_dir: PathBuf,
}

impl EventLogger {
    pub fn new(logs_dir: impl Into<PathBuf>) -> Self {
        Self {
            logs_dir: logs_dir.into(),
        }
    }

    /// Record a WebSocket lifecycle event (connected, disconnected, message
    /// received).
    pub fn ws_event(&self, client_ip: &str, event: &str) {
        let line = format!(
            "{} - {} - WebSocket {}\n",
            Utc::now().to_rfc3339(),
            client_ip,
            event
        );
        self.append(WS_EVENTS_LOG, line);
    }

    /// Record one HTTP request in common-log style.
    pub fn http_access(&self, client_ip: &str, method: &str, uri: &str, status: u16) {
        let line = format!(
            "{} - [{}] \"{} {}\" {}\n",
            client_ip,
            Utc::now().to_rfc3339(),
            method,
            uri,
            status
        );
        self.append(ACCESS_LOG, line);
    }

    fn append(&self, file: &str, line: String) {
        let path = self.logs_dir.join(file);
        tokio::spawn(async move {
            if let Err(e) = append_line(&path, &line).await {
                warn!("Error writing to {}: {}", path.display(), e);
            }
        });
    }
}

async fn append_line(path: &Path, line: &str) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await
}

/// Client address for logging: `x-real-ip`, then the first entry of
/// `x-forwarded-for`, then the socket peer address.
pub fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    for header in ["x-real-ip", "x-forwarded-for"] {
        if let Some(value) = headers.get(header).and_then(|v| v.to_str().ok()) {
            let first = value.split(',').next().unwrap_or(value).trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    peer.ip().to_string()
}
