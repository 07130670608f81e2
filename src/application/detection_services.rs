// Traits for the remote detection services used by the cascade
use crate::application::image_preprocessor::EncodedImage;
use crate::domain::detection::RawDetection;
use crate::domain::error::AnalysisError;
use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceStatus {
    pub available: bool,
    pub model_version: Option<String>,
}

/// Detections returned by the primary CV service for one image
#[derive(Debug, Clone, PartialEq)]
pub struct CvAnalysis {
    pub detections: Vec<RawDetection>,
    pub total_detections: usize,
    pub model_version: Option<String>,
}

/// Primary computer-vision service
#[async_trait]
pub trait DefectDetectionService: Send + Sync {
    /// Lightweight liveness probe
    async fn status(&self) -> Result<ServiceStatus, AnalysisError>;

    /// Analyse an already uploaded mission image by id
    async fn analyze(
        &self,
        mission_image_id: Uuid,
        confidence_threshold: f64,
    ) -> Result<CvAnalysis, AnalysisError>;
}

/// Generative vision service with a structured-output prompt.
///
/// Returns the model's raw text; decoding belongs to the caller.
#[async_trait]
pub trait VisionAnalysisService: Send + Sync {
    async fn describe(&self, image: &EncodedImage, prompt: &str) -> Result<String, AnalysisError>;
}
