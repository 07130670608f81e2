// Route table
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    analyze_image, classify_telemetry, clear_fallback, cv_status, health_check, list_defects,
    scan_telemetry,
};
use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Upper bound for one raw image upload
const MAX_IMAGE_BYTES: usize = 32 * 1024 * 1024;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/cv/status", get(cv_status))
        .route(
            "/missions/:mission_id/images/:image_id/analyze",
            post(analyze_image).layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES)),
        )
        .route("/missions/:mission_id/defects", get(list_defects))
        .route("/missions/:mission_id/fallback", delete(clear_fallback))
        .route("/telemetry/classify", post(classify_telemetry))
        .route("/telemetry/scan", post(scan_telemetry))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
