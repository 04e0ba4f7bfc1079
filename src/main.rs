//! switchyard server binary.
//!
//! Serves a small demo application on one port:
//! - `GET <context-path>/health` → JSON status
//! - `<context-path>/echo` → WebSocket echo endpoint
//! - anything outside the context path → 404 from the fallback stage

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::ws::Message;
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;

use switchyard::config::validation::validate_config;
use switchyard::config::{load_config, AppConfig, ConfigError};
use switchyard::http::{endpoint_fn, RouterPipeline, WsConnection};
use switchyard::lifecycle::signals::shutdown_signal;
use switchyard::observability::{logging, metrics};
use switchyard::{initialize, ContextPath, Server, WsRouter};

#[derive(Parser)]
#[command(name = "switchyard")]
#[command(about = "HTTP and WebSocket on a single port", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override listener.port (0 picks a free port).
    #[arg(short, long)]
    port: Option<u16>,

    /// Override context_path.
    #[arg(long)]
    context_path: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };
    if let Some(port) = cli.port {
        config.listener.port = port;
    }
    if let Some(context_path) = cli.context_path {
        config.context_path = context_path;
    }
    validate_config(&config).map_err(ConfigError::Validation)?;

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "switchyard starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let context_path: ContextPath = config.context_path.parse()?;
    let pipeline = RouterPipeline::new(demo_routes(&context_path));

    let ws_router = WsRouter::new();
    ws_router.add("/echo", endpoint_fn(echo));

    let bound = initialize(
        Server::from_config(&config.listener)?,
        config.listener.port,
        context_path.as_str(),
        Arc::new(pipeline),
        Arc::new(ws_router),
    )
    .await?;

    tracing::info!(port = bound.port(), "Server ready");

    shutdown_signal().await;
    bound.shutdown().await;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn demo_routes(context_path: &ContextPath) -> Router {
    let routes = Router::new().route(
        "/health",
        get(|| async {
            Json(serde_json::json!({
                "status": "ok",
                "version": env!("CARGO_PKG_VERSION"),
            }))
        }),
    );
    if context_path.is_root() {
        routes
    } else {
        Router::new().nest(context_path.as_str(), routes)
    }
}

async fn echo(mut connection: WsConnection) {
    while let Some(Ok(message)) = connection.socket.recv().await {
        match message {
            Message::Close(_) => break,
            Message::Text(_) | Message::Binary(_) => {
                if connection.socket.send(message).await.is_err() {
                    break;
                }
            }
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }
    tracing::debug!(ws_id = %connection.id, "Echo connection closed");
}
