mod config;
mod events;
mod format;
mod languages;
mod pipeline;
mod protocol;
mod server;
mod session;
mod toolchains;

use anyhow::Result;
use tracing::info;

use crate::config::Config;
use crate::languages::Language;
use crate::server::{shutdown_signal, ApiServer, AppState, WsServer};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("coderunner=info".parse()?),
        )
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env();
    config.ensure_directories()?;
    info!(
        "Logs in {}, session artifacts in {}",
        config.logs_dir.display(),
        config.outputs_dir.display()
    );
    info!("Supported languages: {}", Language::supported().join(", "));

    let state = AppState::new(config);
    let ws_server = WsServer::new(state.clone());
    let api_server = ApiServer::new(state);

    tokio::try_join!(
        ws_server.serve(shutdown_signal()),
        api_server.serve(shutdown_signal()),
    )?;

    info!("Shut down gracefully");
    Ok(())
}
