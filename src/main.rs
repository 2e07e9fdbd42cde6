//! Sentinel Fusion - multi-camera identity fusion and risk alerting
//!
//! Main entry point for the fusion service.

use sentinel_fusion::{
    actuation::{ActuationWorker, LoggingSink},
    alert_log_service::AlertLogService,
    camera_status_tracker::CameraStatusTracker,
    capture_orchestrator::{CaptureOrchestrator, DetectionSource, ReplaySource},
    config_store::ConfigStore,
    decision_cycle::DecisionCycle,
    identity_store::IdentityStore,
    models::CameraRole,
    state::{AppConfig, AppState},
    web_api,
};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sentinel_fusion=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Sentinel Fusion v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    tracing::info!(
        host = %config.host,
        port = config.port,
        policy_path = ?config.policy_path,
        wide_feed = ?config.wide_feed,
        close_feed = ?config.close_feed,
        cycle_interval_ms = config.cycle_interval_ms,
        "Configuration loaded"
    );

    // Initialize components
    let config_store = Arc::new(match &config.policy_path {
        Some(path) => ConfigStore::load(path).await?,
        None => ConfigStore::with_defaults(),
    });
    let identities = Arc::new(IdentityStore::new(config_store.clone()));
    let camera_status = Arc::new(CameraStatusTracker::new());
    let alert_log = Arc::new(AlertLogService::default());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (intent_tx, intent_rx) = mpsc::channel(config.intent_queue_capacity);

    // Decision cycle
    let cycle = DecisionCycle::new(
        identities.clone(),
        config_store.clone(),
        camera_status.clone(),
        alert_log.clone(),
        intent_tx,
    );
    let reports = cycle.subscribe();
    let cycle_task = tokio::spawn(cycle.run(config.cycle_interval(), shutdown_rx.clone()));

    // Actuation
    let mut worker = ActuationWorker::new();
    worker.add_sink(Box::new(LoggingSink));
    let actuation_task = tokio::spawn(worker.run(intent_rx, shutdown_rx.clone()));

    // Camera producers
    let orchestrator = CaptureOrchestrator::new(
        identities.clone(),
        camera_status.clone(),
        config.producer_settings(),
        shutdown_rx.clone(),
    );
    let mut sources: Vec<Box<dyn DetectionSource>> = Vec::new();
    for (camera, feed) in [
        (CameraRole::Wide, &config.wide_feed),
        (CameraRole::Close, &config.close_feed),
    ] {
        match feed {
            Some(path) => sources.push(Box::new(ReplaySource::new(
                camera,
                path.clone(),
                config_store.clone(),
            ))),
            None => tracing::warn!(camera = %camera, "No feed configured for camera"),
        }
    }
    orchestrator.start(sources).await;

    // Identity GC task
    let gc_store = identities.clone();
    let gc_interval = config.gc_interval();
    let mut gc_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(gc_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    gc_store.collect_stale(chrono::Utc::now()).await;
                }
                _ = gc_shutdown.changed() => break,
            }
        }
    });

    let state = AppState {
        config: config.clone(),
        config_store,
        identities,
        camera_status,
        alert_log,
        reports,
        started_at: chrono::Utc::now(),
    };

    let app = web_api::create_router(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    let mut server_shutdown = shutdown_rx.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = server_shutdown.changed().await;
    });

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            return;
        }
        tracing::info!("Shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    orchestrator.join().await;
    if let Err(e) = cycle_task.await {
        tracing::error!(error = %e, "Decision cycle task failed");
    }
    if let Err(e) = actuation_task.await {
        tracing::error!(error = %e, "Actuation task failed");
    }

    tracing::info!("Sentinel Fusion stopped");
    Ok(())
}
