pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod votes;

use axum::{middleware, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::{Config, StoreKind};
use crate::db::{Database, MemoryStore, VoteStore};
use crate::votes::VoteService;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn VoteStore>,
    pub votes: VoteService,
}

impl AppState {
    pub fn new(store: Arc<dyn VoteStore>) -> Self {
        let votes = VoteService::new(store.clone());
        Self { store, votes }
    }
}

/// Build the application router
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(api::router())
        .layer(middleware::from_fn(api::negotiate::render_html_errors))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn VoteStore>> {
    Ok(match config.store {
        StoreKind::Postgres => {
            let db = Database::connect(&config.database_url, config.max_connections).await?;
            db.migrate().await?;
            Arc::new(db)
        }
        StoreKind::Memory => {
            tracing::warn!("Using in-memory store, votes are lost on restart");
            Arc::new(MemoryStore::new())
        }
    })
}

/// Run the server with the given configuration
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let store = open_store(&config).await?;
    let app = app(AppState::new(store));

    // Start the server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        tracing::info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                tracing::info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
