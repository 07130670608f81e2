// HTTP client for the primary computer-vision service
use crate::application::detection_services::{CvAnalysis, DefectDetectionService, ServiceStatus};
use crate::domain::defect::SourceTier;
use crate::domain::detection::{RawBox, RawDetection};
use crate::domain::error::AnalysisError;
use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

const TIER: SourceTier = SourceTier::RemoteCv;
const USER_AGENT: &str = concat!("panel-inspection/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct StatusPayload {
    available: bool,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnalyzePayload {
    #[serde(default)]
    detections: Vec<DetectionPayload>,
    total_detections: usize,
    #[serde(default)]
    model_version: Option<String>,
    #[serde(default)]
    image_width: Option<f64>,
    #[serde(default)]
    image_height: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DetectionPayload {
    #[serde(default)]
    class_name: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    bbox: Option<BoxPayload>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct BoxPayload {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

impl AnalyzePayload {
    fn into_analysis(self) -> CvAnalysis {
        let size = self.image_width.zip(self.image_height);
        let detections = self
            .detections
            .into_iter()
            .map(|d| RawDetection {
                label: d.class_name,
                confidence: d.confidence,
                bbox: d.bbox.and_then(|b| raw_box(b, size)),
                notes: None,
                model_version: self.model_version.clone(),
            })
            .collect();

        CvAnalysis {
            detections,
            total_detections: self.total_detections,
            model_version: self.model_version,
        }
    }
}

/// Pixel boxes need the image size; without it only boxes already in [0, 1] survive
fn raw_box(b: BoxPayload, size: Option<(f64, f64)>) -> Option<RawBox> {
    match size {
        Some((image_width, image_height)) => Some(RawBox::Pixels {
            x: b.x,
            y: b.y,
            width: b.width,
            height: b.height,
            image_width,
            image_height,
        }),
        None => {
            let fractional = [b.x, b.y, b.x + b.width, b.y + b.height]
                .iter()
                .all(|v| (0.0..=1.0).contains(v));
            fractional.then_some(RawBox::Normalized {
                x: b.x,
                y: b.y,
                width: b.width,
                height: b.height,
            })
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpCvClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpCvClient {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build CV service HTTP client")?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn status_url(&self) -> String {
        format!("{}/api/v1/cv/status", self.base_url)
    }

    fn analyze_url(&self, mission_image_id: Uuid) -> String {
        format!("{}/api/v1/mission-images/{}/analyze", self.base_url, mission_image_id)
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, AnalysisError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AnalysisError::unavailable(TIER, format!("HTTP {}: {}", status, body)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| AnalysisError::unavailable(TIER, e.to_string()))?;
        serde_json::from_slice(&body).map_err(|e| AnalysisError::malformed(TIER, e.to_string()))
    }
}

#[async_trait]
impl DefectDetectionService for HttpCvClient {
    async fn status(&self) -> Result<ServiceStatus, AnalysisError> {
        let response = self
            .http_client
            .get(self.status_url())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| AnalysisError::unavailable(TIER, e.to_string()))?;

        let payload: StatusPayload = Self::read_json(response).await?;
        tracing::debug!("CV status: available={} model={:?}", payload.available, payload.model_version);
        Ok(ServiceStatus {
            available: payload.available,
            model_version: payload.model_version,
        })
    }

    async fn analyze(
        &self,
        mission_image_id: Uuid,
        confidence_threshold: f64,
    ) -> Result<CvAnalysis, AnalysisError> {
        let response = self
            .http_client
            .post(self.analyze_url(mission_image_id))
            .query(&[("confidence_threshold", confidence_threshold)])
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| AnalysisError::unavailable(TIER, e.to_string()))?;

        let payload: AnalyzePayload = Self::read_json(response).await?;
        tracing::debug!(
            "CV analyze for image {}: {} detection(s)",
            mission_image_id,
            payload.total_detections
        );
        Ok(payload.into_analysis())
    }
}
