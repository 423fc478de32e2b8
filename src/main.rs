use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use tx_sentinel::{
    chains::AdapterRegistry,
    config::Config,
    handlers::*,
    services::{build_store, ExpiryMonitor, Orchestrator, StatsService, VerifyQueue},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    tracing::info!("Starting tx-sentinel v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {:?}", config.environment);

    // Initialize services
    let store = build_store(config.redis_url.as_deref()).await;
    let adapters = Arc::new(AdapterRegistry::from_config(&config).await?);
    let orchestrator = Arc::new(Orchestrator::new(
        store.clone(),
        adapters.clone(),
        config.engine.clone(),
    ));
    let queue = VerifyQueue::start(orchestrator.clone(), config.engine.verify_workers);
    let stats = Arc::new(StatsService::new(store.clone()));

    // Background expiry sweep
    let monitor = Arc::new(ExpiryMonitor::new(store.clone(), config.engine.clone()));
    monitor.spawn();

    // Build application state
    let app_state = AppState {
        orchestrator,
        queue,
        stats,
        adapters,
    };

    // Build router
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(get_stats))
        .route("/ws/dashboard", get(websocket_handler))
        .route("/api/payments", post(submit_payment).get(list_payments))
        .route("/api/payments/:id", get(payment_detail))
        .route("/api/payments/:id/verify", post(trigger_verification))
        .route("/api/payments/:id/approve", post(approve_payment))
        .route("/api/payments/:id/reject", post(reject_payment))
        .with_state(app_state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("WebSocket dashboard: ws://{}/ws/dashboard", addr);
    tracing::info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to listen for ctrl+c");
    tracing::info!("Shutting down gracefully...");
}
