//! Explicitly constructed HTTP and WebSocket servers.
//!
//! Both servers are built from one injected `AppState` and carry their own
//! bind/serve lifecycle; nothing lives in process-wide globals.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::connect_info::ConnectInfo;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::events::{self, EventLogger};
use crate::format;
use crate::session::{Session, SessionRegistry};

/// Shared state injected into both servers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: SessionRegistry,
    pub events: EventLogger,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let events = EventLogger::new(&config.logs_dir);
        Self {
            config: Arc::new(config),
            registry: SessionRegistry::new(),
            events,
        }
    }
}

/// WebSocket execution server.
pub struct WsServer {
    state: AppState,
}

impl WsServer {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(ws_connect))
            .with_state(self.state.clone())
    }

    pub async fn serve(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let port = self.state.config.ws_port;
        let listener = bind(port).await?;
        info!("WebSocket server is running on port {}", port);

        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await
        .context("WebSocket server failed")
    }
}

async fn ws_connect(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let client_ip = events::client_ip(&headers, peer);
    ws.on_upgrade(move |socket| {
        Session::new(
            socket,
            peer,
            client_ip,
            state.config.clone(),
            state.registry.clone(),
            state.events.clone(),
        )
        .run()
    })
}

/// HTTP API server: formatting, status, analytics sink.
pub struct ApiServer {
    state: AppState,
}

impl ApiServer {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(format::status).post(format::format_handler))
            .route("/log-data-for-analytics", post(format::log_analytics))
            .layer(middleware::from_fn_with_state(
                self.state.clone(),
                access_log,
            ))
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    pub async fn serve(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let port = self.state.config.http_port;
        let listener = bind(port).await?;
        info!("HTTP server is running on port {}", port);

        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server failed")
    }
}

/// Append one access-log line per request, after the response is built.
async fn access_log(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let uri = request.uri().to_string();
    let client_ip = events::client_ip(request.headers(), peer);

    let response = next.run(request).await;

    state
        .events
        .http_access(&client_ip, &method, &uri, response.status().as_u16());
    response
}

async fn bind(port: u16) -> Result<TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))
}

/// Resolves on ctrl-c; both servers share this as their shutdown trigger.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
}
