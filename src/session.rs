//! WebSocket sessions.
//!
//! One `Session` owns one client connection for its whole lifetime: it is
//! registered on connect, runs a single dispatch loop that routes frames to
//! either "start a new pipeline" or "forward to the active pipeline", relays
//! pipeline events back as frames, and tears down the pipeline and its
//! workspace on disconnect. Sessions share nothing but the registry.

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::ws::{Message, WebSocket};
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::Config;
use crate::events::EventLogger;
use crate::languages::Language;
use crate::pipeline::{Pipeline, PipelineEvent, PipelineLimits};
use crate::protocol::{self, ProtocolError, ServerFrame};
use crate::toolchains;

/// Unique per-connection identifier; also names the session's artifact
/// directory under the outputs area, so concurrent sessions never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        let stamp = Utc::now().format("%Y-%m-%d_%H:%M:%S");
        let uuid = Uuid::new_v4().simple().to_string();
        SessionId(format!("{}_{}", stamp, &uuid[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Registry entry kept for the lifetime of a connection.
#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub remote_addr: SocketAddr,
    pub connected_at: DateTime<Utc>,
}

/// Process-wide table of active sessions.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<Mutex<HashMap<SessionId, SessionEntry>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, id: SessionId, entry: SessionEntry) {
        self.inner.lock().await.insert(id, entry);
    }

    pub async fn remove(&self, id: &SessionId) -> Option<SessionEntry> {
        self.inner.lock().await.remove(id)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

/// Server-side state for one client connection.
pub struct Session {
    id: SessionId,
    socket: WebSocket,
    remote_addr: SocketAddr,
    client_ip: String,
    config: Arc<Config>,
    registry: SessionRegistry,
    events: EventLogger,
    active: Option<Pipeline>,
}

enum Turn {
    Client(Option<Result<Message, axum::Error>>),
    Pipeline(Option<PipelineEvent>),
}

impl Session {
    pub fn new(
        socket: WebSocket,
        remote_addr: SocketAddr,
        client_ip: String,
        config: Arc<Config>,
        registry: SessionRegistry,
        events: EventLogger,
    ) -> Self {
        Self {
            id: SessionId::generate(),
            socket,
            remote_addr,
            client_ip,
            config,
            registry,
            events,
            active: None,
        }
    }

    /// Run the connection to completion, then tear everything down.
    pub async fn run(mut self) {
        self.registry
            .insert(
                self.id.clone(),
                SessionEntry {
                    remote_addr: self.remote_addr,
                    connected_at: Utc::now(),
                },
            )
            .await;
        self.events.ws_event(&self.client_ip, "connected");
        info!("WebSocket connected: {}", self.id);

        if let Err(e) = self.dispatch_loop().await {
            debug!("[{}] Session ended: {:#}", self.id, e);
        }

        // Disconnect: kill any running subprocess, drop the artifacts, and
        // deregister. None of this may fail the server.
        if let Some(pipeline) = self.active.take() {
            pipeline.abort();
        }
        let workspace = self.config.outputs_dir.join(self.id.as_str());
        if let Err(e) = tokio::fs::remove_dir_all(&workspace).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!("[{}] Failed to remove workspace: {}", self.id, e);
            }
        }
        self.events.ws_event(&self.client_ip, "disconnected");
        if let Some(entry) = self.registry.remove(&self.id).await {
            info!(
                "WebSocket disconnected: {} ({}, {}s)",
                self.id,
                entry.remote_addr,
                (Utc::now() - entry.connected_at).num_seconds()
            );
        }
    }

    /// The single per-connection dispatch point: one registration, every
    /// frame and every pipeline event flows through here.
    async fn dispatch_loop(&mut self) -> Result<()> {
        loop {
            let turn = tokio::select! {
                message = self.socket.recv() => Turn::Client(message),
                event = next_event(&mut self.active) => Turn::Pipeline(event),
            };

            match turn {
                Turn::Client(None) | Turn::Client(Some(Ok(Message::Close(_)))) => return Ok(()),
                Turn::Client(Some(Err(e))) => return Err(e).context("WebSocket receive failed"),
                Turn::Client(Some(Ok(Message::Text(text)))) => {
                    self.on_frame(text.as_str()).await?
                }
                Turn::Client(Some(Ok(_))) => {} // ping/pong/binary: ignored
                Turn::Pipeline(event) => self.on_pipeline_event(event).await?,
            }
        }
    }

    async fn on_frame(&mut self, text: &str) -> Result<()> {
        self.events
            .ws_event(&self.client_ip, &format!("received message: {}", text));

        let frame = match protocol::decode(text) {
            Ok(frame) => frame,
            Err(e) => return self.send_error(e).await,
        };

        // `input` takes priority and is purely a stdin forward; without an
        // active pipeline it is a no-op.
        if let Some(input) = frame.input {
            if let Some(pipeline) = &self.active {
                pipeline.write_input(&input);
            }
            return Ok(());
        }

        self.on_submit(frame.code, frame.lang).await
    }

    /// Validation order: missing code, then unknown language, then busy.
    async fn on_submit(&mut self, code: Option<String>, lang: Option<String>) -> Result<()> {
        let Some(code) = code else {
            return self.send_error(ProtocolError::MissingCode).await;
        };

        let lang_name = lang.unwrap_or_else(|| self.config.default_language.clone());
        let Some(language) = Language::parse(&lang_name) else {
            return self
                .send_error(ProtocolError::UnsupportedLanguage(lang_name))
                .await;
        };

        if self.active.is_some() {
            return self.send_error(ProtocolError::PipelineBusy).await;
        }

        let adapter = toolchains::adapter_for(language);
        info!(
            "[{}] Compiling and running {} code",
            self.id,
            adapter.language()
        );
        let workspace = self.config.outputs_dir.join(self.id.as_str());
        let limits = PipelineLimits {
            compile_timeout: self.config.compile_timeout(),
            run_timeout: self.config.run_timeout(),
        };
        self.active = Some(Pipeline::spawn(adapter, code, workspace, limits));
        Ok(())
    }

    async fn on_pipeline_event(&mut self, event: Option<PipelineEvent>) -> Result<()> {
        match event {
            Some(PipelineEvent::Output(chunk)) => {
                self.send_frame(&ServerFrame::output(chunk)).await
            }
            Some(PipelineEvent::Error(text)) => self.send_frame(&ServerFrame::error(text)).await,
            Some(PipelineEvent::Finished(status)) => {
                self.active = None;
                match status {
                    Some(status) => self.send_frame(&ServerFrame::closed(status.summary())).await,
                    // No run phase (compile rejection): the diagnostic frame
                    // already went out, nothing to close.
                    None => Ok(()),
                }
            }
            None => {
                // Driver gone without a terminal event; just go idle.
                self.active = None;
                Ok(())
            }
        }
    }

    async fn send_error(&mut self, error: ProtocolError) -> Result<()> {
        self.send_frame(&ServerFrame::error(error.to_string())).await
    }

    async fn send_frame(&mut self, frame: &ServerFrame) -> Result<()> {
        let payload = serde_json::to_string(frame)?;
        self.socket
            .send(Message::Text(payload.into()))
            .await
            .context("Failed to send frame")
    }
}

/// Next event of the active pipeline; pends forever while the session is
/// idle so the dispatch loop can keep a single select shape.
async fn next_event(active: &mut Option<Pipeline>) -> Option<PipelineEvent> {
    match active {
        Some(pipeline) => pipeline.next_event().await,
        None => std::future::pending().await,
    }
}
