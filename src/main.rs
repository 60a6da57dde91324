//! Watch-list Camserver
//!
//! Main entry point for the tracking server.

use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use watchlist_camserver::{
    camera_gateway::CameraGateway,
    detection_source::MlDetectorClient,
    realtime_hub::RealtimeHub,
    state::{AppConfig, AppState},
    web_api,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "watchlist_camserver=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Watch-list Camserver v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    tracing::info!(
        ml_api_url = %config.ml_api_url,
        ml_api_timeout_secs = config.ml_api_timeout_secs,
        auto_detection_interval_secs = config.auto_detection_interval_secs,
        tracking_interval_secs = config.tracking.default_interval_secs,
        match_iou_threshold = config.tracking.match_iou_threshold,
        missing_cycles_threshold = config.tracking.missing_cycles_threshold,
        "Configuration loaded"
    );

    // Initialize components
    let realtime = Arc::new(RealtimeHub::new());
    let camera = Arc::new(CameraGateway::new(realtime.clone()));

    let detector = Arc::new(MlDetectorClient::new(
        config.ml_api_url.clone(),
        Duration::from_secs(config.ml_api_timeout_secs),
        camera.clone(),
        config.detection_confidence_threshold,
    )?);
    tracing::info!(url = %detector.url(), "MlDetectorClient initialized");

    let state = AppState::build(config, realtime, camera, detector);
    tracing::info!("TrackingEngine, TrackingScheduler and AutoDetectionService initialized");

    let mut app = web_api::create_router(state.clone());

    if let Some(static_dir) = &state.config.static_dir {
        let serve_dir = ServeDir::new(static_dir)
            .not_found_service(ServeFile::new(static_dir.join("index.html")));
        app = app.fallback_service(serve_dir);
        tracing::info!(static_dir = %static_dir.display(), "Static file serving enabled");
    }

    let app = app
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
