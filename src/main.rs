//! ReviewDesk Backend Server
//!
//! Mirrors marketplace reviews and chats for seller cabinets, drafts replies
//! through a completion API, charges tokens per reply and settles token
//! purchases from the payment gateway.

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};

use reviewdesk_server::ai::{CompletionApi, HttpCompletionClient};
use reviewdesk_server::config::Config;
use reviewdesk_server::marketplace::{HttpMarketplaceClient, MarketplaceApi};
use reviewdesk_server::reviews::{archival, Archiver};
use reviewdesk_server::state::AppState;
use reviewdesk_server::store::{PgStore, Store};
use reviewdesk_server::{build_router, db};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!(environment = config.environment.as_str(), "Starting ReviewDesk server");

    let db_pool = db::create_pool(&config).await?;
    db::run_migrations(&db_pool).await?;

    let store: Arc<dyn Store> = Arc::new(PgStore::new(db_pool.clone()));
    let marketplace: Arc<dyn MarketplaceApi> =
        Arc::new(HttpMarketplaceClient::new(&config.marketplace));

    let completion = HttpCompletionClient::from_config(&config.completion)
        .map(|client| Arc::new(client) as Arc<dyn CompletionApi>);
    if completion.is_none() {
        tracing::warn!("COMPLETION_API_KEY not set, draft generation is disabled");
    }
    if config.gateway.is_none() {
        tracing::warn!("Payment gateway credentials not set, payments are disabled");
    }

    let app_state = AppState::new(
        store.clone(),
        marketplace,
        completion,
        &config.jwt_secret,
        config.marketplace.clone(),
        config.completion.clone(),
        config.gateway.clone(),
        Some(db_pool),
    );

    // Start the archival job
    let mut scheduler = archival::start_scheduler(Archiver::new(store, config.archival.clone()))
        .await
        .context("Failed to start archival scheduler")?;

    let app = build_router(app_state, configure_cors(config.cors_allowed_origins.as_deref()));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Server listening on {}", addr);
    tracing::info!("Health check at http://{}/health", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    // Serve with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Err(e) = scheduler.shutdown().await {
        tracing::warn!(error = %e, "Archival scheduler did not shut down cleanly");
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

fn configure_cors(allowed_origins: Option<&str>) -> CorsLayer {
    let allowed_origins = allowed_origins.unwrap_or_default();

    if allowed_origins.trim().is_empty() {
        tracing::warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins (permissive)");
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers(Any)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
