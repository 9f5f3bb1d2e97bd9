// Framework bootstrap for the relay server runtime.

use crate::frameworks::config;
use crate::interface_adapters::net::{session_info_handler, ws_handler};
use crate::interface_adapters::state::AppState;
use crate::use_cases::{RelaySettings, SessionHub};

use axum::{Router, routing::get};
use std::net::SocketAddr;
use std::{io::Result, sync::Arc};

pub fn init_runtime() {
    let _ = dotenvy::dotenv();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    let installed = if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .with_current_span(true)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .try_init()
    };
    if installed.is_err() {
        // Embedded in a host (or tests) that already owns the subscriber.
        return;
    }

    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!(%info, ?backtrace, "panic");
    }));
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/sessions/{name}", get(session_info_handler))
        .with_state(state)
}

pub async fn run(listener: tokio::net::TcpListener) -> Result<()> {
    let address = listener.local_addr()?;
    let app = router(build_state());

    tracing::info!(%address, "listening");

    // Serve app and report errors rather than panicking
    axum::serve(listener, app).await.inspect_err(|e| {
        tracing::error!(error = %e, "server error");
    })
}

pub async fn run_with_config() -> Result<()> {
    init_runtime();

    let address = SocketAddr::from(([127, 0, 0, 1], config::http_port()));

    // Bind TCP listener with error handling
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .inspect_err(|e| {
            tracing::error!(%address, error = %e, "failed to bind");
        })?;

    run(listener).await
}

fn build_state() -> Arc<AppState> {
    let settings = RelaySettings {
        max_peers: config::max_peers(),
        command_channel_capacity: config::command_channel_capacity(),
        delivery_channel_capacity: config::delivery_channel_capacity(),
    };
    tracing::debug!(
        max_peers = settings.max_peers,
        command_capacity = settings.command_channel_capacity,
        delivery_capacity = settings.delivery_channel_capacity,
        "relay configured"
    );

    // Sessions are created lazily on first join.
    Arc::new(AppState {
        hub: Arc::new(SessionHub::new(settings)),
    })
}
