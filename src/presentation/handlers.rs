// HTTP request handlers
use crate::application::anomaly_classifier::{classify_with_prediction, scan_samples};
use crate::application::detection_services::ServiceStatus;
use crate::application::inspection_service::ImageUpload;
use crate::domain::telemetry::{AnomalyVerdict, PowerPrediction, TelemetrySample};
use crate::presentation::app_state::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct ClassifyRequest {
    pub sample: TelemetrySample,
    #[serde(default)]
    pub prediction: Option<PowerPrediction>,
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub samples: Vec<TelemetrySample>,
}

#[derive(Debug, Serialize)]
pub struct ScannedAnomaly {
    pub index: usize,
    pub panel_id: Uuid,
    pub verdict: AnomalyVerdict,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Readings must be finite before they reach the classifier
fn validate_sample(sample: &TelemetrySample) -> Result<(), String> {
    let readings = [
        ("voltage", Some(sample.voltage)),
        ("current", Some(sample.current)),
        ("temperature", Some(sample.temperature)),
        ("power", sample.power),
    ];
    for (name, value) in readings {
        if let Some(v) = value {
            if !v.is_finite() {
                return Err(format!("{} must be a finite number", name));
            }
        }
    }
    Ok(())
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// Availability of the primary CV service
pub async fn cv_status(State(state): State<Arc<AppState>>) -> Response {
    let Some(cv) = &state.cv_service else {
        return Json(ServiceStatus {
            available: false,
            model_version: None,
        })
        .into_response();
    };

    match cv.status().await {
        Ok(status) => Json(status).into_response(),
        Err(e) => {
            tracing::warn!("CV status probe failed: {}", e);
            error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
    }
}

/// Run the detection cascade on a raw image body and persist the result
pub async fn analyze_image(
    Path((mission_id, image_id)): Path<(Uuid, Uuid)>,
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Response {
    if body.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "request body must contain an image");
    }

    let upload = ImageUpload {
        mission_id,
        mission_image_id: Some(image_id),
        bytes: body,
    };
    match state.inspection_service.inspect_image(&upload).await {
        Ok(report) => Json(report).into_response(),
        Err(e) => {
            tracing::error!("Inspection of image {} failed: {}", image_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// Defects recorded for a mission, newest first
pub async fn list_defects(
    Path(mission_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> Response {
    Json(state.query_service.list_mission_defects(mission_id).await).into_response()
}

/// Discard the fallback records held for a mission
pub async fn clear_fallback(
    Path(mission_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> Response {
    Json(state.query_service.clear_fallback(mission_id)).into_response()
}

/// Classify one telemetry sample
pub async fn classify_telemetry(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ClassifyRequest>,
) -> Response {
    if let Err(message) = validate_sample(&request.sample) {
        return error_response(StatusCode::UNPROCESSABLE_ENTITY, message);
    }
    let verdict = classify_with_prediction(&request.sample, &state.ranges, request.prediction.as_ref());
    Json(verdict).into_response()
}

/// Classify a series and return only the anomalous samples
pub async fn scan_telemetry(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ScanRequest>,
) -> Response {
    for (index, sample) in request.samples.iter().enumerate() {
        if let Err(message) = validate_sample(sample) {
            return error_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("sample {}: {}", index, message),
            );
        }
    }

    let anomalies: Vec<ScannedAnomaly> = scan_samples(&request.samples, &state.ranges)
        .into_iter()
        .map(|(index, verdict)| ScannedAnomaly {
            index,
            panel_id: request.samples[index].panel_id,
            verdict,
        })
        .collect();
    Json(anomalies).into_response()
}
