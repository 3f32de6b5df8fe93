use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use wshub::handler::{BroadcastHandler, HandlerRef};
use wshub::{HandlerMode, Hub, HubConfig, Registry, ServerConfig, routes};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let server = ServerConfig::from_env().expect("invalid server config");
    let config = HubConfig::from_env().expect("invalid hub config");
    let registry = Arc::new(Registry::new());

    let handlers: Vec<HandlerRef> = match server.handler {
        HandlerMode::Echo => Vec::new(),
        HandlerMode::Broadcast => vec![Arc::new(BroadcastHandler::new(registry.clone()))],
    };

    tracing::info!(
        subprotocols = ?config.supported.iter().map(|d| d.name()).collect::<Vec<_>>(),
        default = config.default.name(),
        max_message_bytes = ?config.max_message_bytes,
        handler = ?server.handler,
        "hub configured"
    );

    let hub = Hub::with_handlers(config, registry, handlers);
    let app = routes::app(hub.clone(), &server.ws_path);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", server.port))
        .await
        .expect("failed to bind");

    tracing::info!(port = server.port, path = %server.ws_path, "wshub listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(hub))
        .await
        .expect("server failed");
}

/// Wait for Ctrl-C, then close every live connection.
async fn shutdown_signal(hub: Hub) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    hub.shutdown();
}
