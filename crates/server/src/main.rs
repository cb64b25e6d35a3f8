//! fhir-graph-server: HTTP front end for the bundle reference resolver.

use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fhir_graph_resolver::Resolver;
use fhir_graph_server::AppState;
use fhir_graph_server::config::Config;
use fhir_graph_server::store::spawn_event_logger;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = Config::from_env();

    let resolver = Resolver::new(config.resolver.clone()).expect("Failed to build HTTP client");
    tracing::info!(
        fetch_timeout_secs = config.resolver.fetch_timeout.as_secs(),
        max_depth = config.resolver.max_depth,
        page_retries = config.resolver.page_retries,
        max_follow_pages = config.max_follow_pages,
        "Resolver configured"
    );

    let state = AppState::new(resolver, &config);
    spawn_event_logger(&state.store);

    let app = fhir_graph_server::build_app(state, &config);

    let addr: SocketAddr = config.bind_address.parse().expect("Invalid bind address");
    tracing::info!("Starting resolver server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    tracing::info!("Server shutdown complete");
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
