// Detection cascade - remote CV, then remote vision AI, then the local heuristic
use crate::application::detection_services::{DefectDetectionService, VisionAnalysisService};
use crate::application::edge_detector::{detect_edge_defect_bytes, EdgeAnalysis};
use crate::application::image_preprocessor::ImagePreprocessor;
use crate::application::notifications::NotificationSink;
use crate::application::result_normalizer::normalize_at;
use crate::application::vision_report::{decode_vision_report, VISION_PROMPT};
use crate::domain::defect::{AnalysisOutcome, CascadeStatus, DefectRecord, SourceTier};
use crate::domain::detection::RawDetection;
use crate::domain::error::AnalysisError;
use crate::domain::notification::{Notification, NotificationLevel};
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Confidence attached to a clean verdict from the heuristic tier
pub const HEURISTIC_CLEAN_CONFIDENCE: f64 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CascadeSettings {
    pub confidence_threshold: f64,
    pub probe_timeout: Duration,
    pub analyze_timeout: Duration,
    pub vision_timeout: Duration,
}

impl Default for CascadeSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            probe_timeout: Duration::from_secs(3),
            analyze_timeout: Duration::from_secs(60),
            vision_timeout: Duration::from_secs(45),
        }
    }
}

/// The image being analysed and the mission it belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisTarget {
    pub mission_id: Uuid,
    pub mission_image_id: Option<Uuid>,
}

#[derive(Clone)]
pub struct DetectionCascade {
    cv: Option<Arc<dyn DefectDetectionService>>,
    vision: Option<Arc<dyn VisionAnalysisService>>,
    preprocessor: ImagePreprocessor,
    notifier: Arc<dyn NotificationSink>,
    settings: CascadeSettings,
}

impl DetectionCascade {
    pub fn new(
        cv: Option<Arc<dyn DefectDetectionService>>,
        vision: Option<Arc<dyn VisionAnalysisService>>,
        preprocessor: ImagePreprocessor,
        notifier: Arc<dyn NotificationSink>,
        settings: CascadeSettings,
    ) -> Self {
        Self {
            cv,
            vision,
            preprocessor,
            notifier,
            settings,
        }
    }

    /// Run the tiers and emit one notification for the terminal state.
    ///
    /// Never returns an error: a cascade where every tier failed hard yields an
    /// outcome carrying the last error.
    pub async fn run_cascade(&self, image: &[u8], target: &AnalysisTarget) -> AnalysisOutcome {
        let outcome = self.evaluate(image, target).await;
        self.notifier.notify(summarize(target, &outcome));
        outcome
    }

    /// Run the tiers strictly in order without notifying; the first sufficient tier wins.
    /// Callers that report the outcome themselves build the event with [`summarize`].
    pub async fn evaluate(&self, image: &[u8], target: &AnalysisTarget) -> AnalysisOutcome {
        match self.run_remote_cv(target).await {
            Ok(records) => {
                tracing::info!(
                    "REMOTE_CV produced {} record(s) for mission {}",
                    records.len(),
                    target.mission_id
                );
                return AnalysisOutcome::detected(SourceTier::RemoteCv, records);
            }
            Err(err) => tracing::warn!("Demoting from REMOTE_CV: {}", err),
        }

        match self.run_vision(image, target).await {
            Ok(records) if !records.is_empty() => {
                tracing::info!(
                    "REMOTE_VISION_AI produced {} record(s) for mission {}",
                    records.len(),
                    target.mission_id
                );
                return AnalysisOutcome::detected(SourceTier::RemoteVisionAi, records);
            }
            Ok(_) => tracing::info!("REMOTE_VISION_AI found no defects, running local heuristic"),
            Err(err) => tracing::warn!("Demoting from REMOTE_VISION_AI: {}", err),
        }

        match self.run_heuristic(image, target) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!("Every detection tier failed for mission {}: {}", target.mission_id, err);
                AnalysisOutcome::failed(err)
            }
        }
    }

    async fn run_remote_cv(&self, target: &AnalysisTarget) -> Result<Vec<DefectRecord>, AnalysisError> {
        let tier = SourceTier::RemoteCv;
        let Some(cv) = &self.cv else {
            return Err(AnalysisError::unavailable(tier, "service not configured"));
        };
        let Some(image_id) = target.mission_image_id else {
            return Err(AnalysisError::unavailable(tier, "image has no stored id to submit"));
        };

        let status = with_timeout(tier, "status probe", self.settings.probe_timeout, cv.status()).await?;
        if !status.available {
            return Err(AnalysisError::unavailable(tier, "service reports no model loaded"));
        }

        let analysis = with_timeout(
            tier,
            "analyze",
            self.settings.analyze_timeout,
            cv.analyze(image_id, self.settings.confidence_threshold),
        )
        .await?;
        let detected_at = Utc::now();

        if analysis.total_detections != analysis.detections.len() {
            return Err(AnalysisError::malformed(
                tier,
                format!(
                    "total_detections={} but {} detections returned",
                    analysis.total_detections,
                    analysis.detections.len()
                ),
            ));
        }

        let model_version = analysis.model_version.or(status.model_version);
        let raw: Vec<RawDetection> = analysis
            .detections
            .into_iter()
            .map(|mut d| {
                if d.model_version.is_none() {
                    d.model_version = model_version.clone();
                }
                d
            })
            .collect();

        Ok(normalize_at(raw, target.mission_id, target.mission_image_id, tier, detected_at))
    }

    async fn run_vision(
        &self,
        image: &[u8],
        target: &AnalysisTarget,
    ) -> Result<Vec<DefectRecord>, AnalysisError> {
        let tier = SourceTier::RemoteVisionAi;
        let Some(vision) = &self.vision else {
            return Err(AnalysisError::unavailable(tier, "service not configured"));
        };

        let encoded = self.preprocessor.preprocess(image)?;
        let answer = with_timeout(
            tier,
            "describe",
            self.settings.vision_timeout,
            vision.describe(&encoded, VISION_PROMPT),
        )
        .await?;
        let detected_at = Utc::now();

        let report = decode_vision_report(&answer)?;
        tracing::debug!(
            "Vision report: {} defect(s), condition {:?}, action {:?}",
            report.defects.len(),
            report.overall_condition,
            report.recommended_action
        );

        Ok(normalize_at(
            report.into_raw_detections(),
            target.mission_id,
            target.mission_image_id,
            tier,
            detected_at,
        ))
    }

    /// Runs on the original upload, not the resized copy sent to the vision tier
    fn run_heuristic(&self, image: &[u8], target: &AnalysisTarget) -> Result<AnalysisOutcome, AnalysisError> {
        let tier = SourceTier::LocalHeuristic;
        let analysis = detect_edge_defect_bytes(image)?;
        let detected_at = Utc::now();

        if !analysis.is_likely_defect {
            return Ok(AnalysisOutcome::clean(tier, HEURISTIC_CLEAN_CONFIDENCE));
        }

        let raw = RawDetection::new("crack", heuristic_confidence(&analysis)).with_notes(format!(
            "Edge-density heuristic flagged a likely structural defect (edgeRatio={:.4}, avgMagnitude={:.2})",
            analysis.edge_ratio, analysis.avg_magnitude
        ));
        let records = normalize_at(vec![raw], target.mission_id, target.mission_image_id, tier, detected_at);
        Ok(AnalysisOutcome::detected(tier, records))
    }
}

/// Edge ratio scaled into [0.6, 0.99]
pub fn heuristic_confidence(analysis: &EdgeAnalysis) -> f64 {
    (0.6 + 3.0 * analysis.edge_ratio as f64).clamp(0.6, 0.99)
}

async fn with_timeout<T, F>(tier: SourceTier, call: &str, limit: Duration, fut: F) -> Result<T, AnalysisError>
where
    F: Future<Output = Result<T, AnalysisError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(AnalysisError::unavailable(
            tier,
            format!("{} timed out after {}ms", call, limit.as_millis()),
        )),
    }
}

/// The event describing a terminal cascade state
pub fn summarize(target: &AnalysisTarget, outcome: &AnalysisOutcome) -> Notification {
    let (level, title, message) = match (outcome.status(), &outcome.error, outcome.source_tier) {
        (CascadeStatus::Failed, Some(err), _) => (
            NotificationLevel::Error,
            "Analysis failed",
            format!("No detection tier could analyse the image: {}", err),
        ),
        (_, _, tier) => {
            let tier = tier.map(|t| t.to_string()).unwrap_or_else(|| "unknown tier".to_string());
            let band = outcome
                .confidence_band()
                .map(|b| format!(" ({} confidence)", b))
                .unwrap_or_default();
            let message = if outcome.records.is_empty() {
                format!("No defects detected via {}{}", tier, band)
            } else {
                format!("{} defect(s) detected via {}{}", outcome.records.len(), tier, band)
            };
            (NotificationLevel::Success, "Analysis complete", message)
        }
    };

    Notification::new(level, title, message, target.mission_id, target.mission_image_id)
}
