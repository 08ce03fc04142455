//! Payment Intake Server - Main Application Entry Point
//!
//! REST API backend for a subscription product: submits card charges to an
//! external payment processor, reconciles the processor's asynchronous
//! notification stream against a local ledger, and provisions customer
//! access exactly once per approved payment.
//!
//! # Architecture
//!
//! - **Web Framework**: Axum (async HTTP server)
//! - **Database**: PostgreSQL with sqlx (async queries)
//! - **Collaborators**: processor client, notification dispatcher and ledger
//!   store are constructed once here and injected as trait objects
//! - **Format**: JSON requests/responses
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment variables
//! 2. Create database connection pool and run migrations
//! 3. Construct the ledger, processor client and mail dispatcher
//! 4. Build HTTP router with routes and middleware
//! 5. Start server on configured port

mod config;
mod db;
mod error;
mod handlers;
mod ledger;
mod models;
mod notify;
mod processor;
mod services;
mod state;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging with tracing subscriber. Reads RUST_LOG environment variable (defaults to "info" level)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // Load configuration
    let config = config::Config::from_env()?;
    tracing::info!("Configuration loaded");

    // Create database pool
    let pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Database pool created");

    // Run migrations
    db::run_migrations(&pool).await?;
    tracing::info!("Database migrations complete");

    // Construct collaborators once; everything downstream receives them as
    // explicit dependencies
    let state = AppState {
        pool: pool.clone(),
        ledger: Arc::new(ledger::PgLedger::new(pool)),
        processor: Arc::new(processor::HttpProcessorClient::new(&config)?),
        dispatcher: Arc::new(notify::HttpMailDispatcher::new(&config)?),
        config: Arc::new(config.clone()),
    };

    let app = Router::new()
        // Public health probe
        .route("/health", get(handlers::health::health_check))
        // Payment intake routes
        .route(
            "/payments/process",
            post(handlers::payments::process_payment),
        )
        .route(
            "/payments/status/{id}",
            get(handlers::payments::get_payment_status),
        )
        // Processor notification routes
        .route(
            "/webhooks/processor",
            post(handlers::webhooks::processor_webhook),
        )
        .route("/webhooks/status", get(handlers::webhooks::webhook_status))
        // Add distributed tracing middleware for observability
        .layer(TraceLayer::new_for_http())
        // Browser checkout posts directly from the landing page origin
        .layer(CorsLayer::permissive())
        // Share injected collaborators with all handlers via State extraction
        .with_state(state);

    // Bind to network address and start server
    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Start serving HTTP requests
    // This blocks forever, handling requests concurrently with tokio
    axum::serve(listener, app).await?;

    Ok(())
}
