//! Lendwise Server - library copy allocation and reservation queue
//!
//! REST API server for borrowing, returning and reserving book copies.

use anyhow::Context;
use axum::{
    routing::{delete, get, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lendwise_server::{
    api,
    config::{AppConfig, LoggingConfig},
    repository::Repository,
    services::{reconciler::spawn_reconciler, Services},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load().context("Failed to load configuration")?;

    init_tracing(&config.logging);

    tracing::info!("Starting Lendwise Server v{}", env!("CARGO_PKG_VERSION"));

    // Create database connection pool
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;

    tracing::info!("Connected to database");

    // Run migrations
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    tracing::info!("Database migrations completed");

    // Resolve status ids once; a missing status name is fatal
    let repository = Repository::connect(pool.clone())
        .await
        .context("Failed to load status catalog")?;
    let services = Services::new(repository);

    if config.jobs.enabled {
        let interval = config.jobs.interval();
        spawn_reconciler(services.reconciler.clone(), interval);
        tracing::info!(interval_seconds = interval.as_secs(), "Reconciler started");
    }

    let addr = SocketAddr::new(
        config.server.host.parse().context("Invalid host address")?,
        config.server.port,
    );

    // Create application state
    let state = AppState {
        config: Arc::new(config),
        pool,
        services: Arc::new(services),
    };

    // Build router
    let app = create_router(state);

    tracing::info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("lendwise_server={},tower_http=debug", logging.level).into());

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Create the application router with all routes
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // API v1 routes
    let api_v1 = Router::new()
        // Health check
        .route("/health", get(api::health::health_check))
        .route("/ready", get(api::health::readiness_check))
        // Borrows
        .route("/borrows", get(api::borrows::list_borrows))
        .route("/borrows", post(api::borrows::create_borrow))
        .route("/borrows/:id", get(api::borrows::get_borrow))
        .route("/borrows/:id/return", post(api::borrows::return_borrow))
        // Reservations
        .route("/reservations", get(api::reservations::list_reservations))
        .route("/reservations", post(api::reservations::create_reservation))
        .route("/reservations/:id", get(api::reservations::get_reservation))
        .route("/reservations/:id/position", get(api::reservations::get_position))
        .route("/reservations/:id/fulfill", post(api::reservations::fulfill_reservation))
        .route("/reservations/:id/cancel", post(api::reservations::cancel_reservation))
        // Copies
        .route("/books/:id/copies", get(api::copies::list_copies))
        .route("/books/:id/copies", post(api::copies::add_copy))
        .route("/copies/:id", delete(api::copies::retire_copy))
        // Policies
        .route("/policies", get(api::policies::list_policies))
        // Jobs
        .route("/jobs/auto-return", post(api::jobs::auto_return))
        .route("/jobs/expire-notified", post(api::jobs::expire_notified))
        .with_state(state);

    // OpenAPI documentation
    let openapi = api::openapi::create_openapi_router();

    Router::new()
        .nest("/api/v1", api_v1)
        .merge(openapi)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
