//! shopstream - E-commerce Event Pipeline
//!
//! Single-process deployment of the pipeline: an in-process event bus
//! feeds the router, metrics accumulate in the configured store, and the
//! dashboard API serves the read side. A transaction simulator provides
//! traffic for demos.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shopstream::api::{self, AppState};
use shopstream::bus::{EventBus, InMemoryEventBus};
use shopstream::metrics::memory::MemoryStore;
use shopstream::metrics::postgres::PgStore;
use shopstream::metrics::Store;
use shopstream::pipeline;
use shopstream::report::{InMemoryObjectStore, ReportGenerator};
use shopstream::sim::TransactionSimulator;
use shopstream::{db, Config};

/// Initialize tracing/logging
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shopstream=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build the application router
fn build_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", axum::routing::get(health_check))
        // Dashboard API
        .merge(api::create_router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    init_tracing();

    // Load configuration
    let config = Config::from_env()?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!("Starting shopstream");

    // Select the store backend
    let store: Arc<dyn Store> = match &config.database_url {
        Some(database_url) => {
            tracing::info!("Connecting to database...");
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(database_url)
                .await?;

            db::ensure_schema(&pool).await?;
            if !db::check_schema(&pool).await? {
                tracing::error!("Database schema is not complete.");
                return Err(anyhow::anyhow!("Database schema incomplete"));
            }

            tracing::info!("Database connected successfully");
            Arc::new(PgStore::new(pool))
        }
        None => {
            tracing::info!("No DATABASE_URL set; using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    // Event transport and object store
    let bus = Arc::new(InMemoryEventBus::new());
    let mut events = bus.attach_consumer();
    let objects = Arc::new(InMemoryObjectStore::new("memory://reports"));

    // Pipeline worker: drain the bus through the router
    let router = Arc::new(
        pipeline::Router::new(store.clone(), bus.clone(), objects.clone())
            .with_event_timeout(config.event_timeout()),
    );
    let worker_router = router.clone();
    let worker = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            let report = worker_router
                .process_batch(std::slice::from_ref(&event))
                .await;
            if let Err(e) = report.into_result() {
                // The in-process transport has no redelivery; surface loudly
                tracing::error!(error = %e, event_id = %event.event_id, "Event processing failed");
            }
        }
    });

    // Transaction simulator
    let simulator = if config.simulator_enabled {
        let bus: Arc<dyn EventBus> = bus.clone();
        Some(TransactionSimulator::new(bus, config.simulator_interval()).start())
    } else {
        None
    };

    // Dashboard API
    let state = AppState::new(store.clone(), ReportGenerator::new(store, objects));
    let app = build_router(state);

    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Cleanup
    tracing::info!("Server shutting down...");
    if let Some(simulator) = simulator {
        simulator.abort();
    }
    worker.abort();
    tracing::info!("Pipeline stopped. Goodbye!");

    Ok(())
}

/// Shutdown signal handler for graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
