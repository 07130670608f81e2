// Inspection service - runs the cascade on an upload and persists what it found
use crate::application::cascade_service::{summarize, AnalysisTarget, DetectionCascade};
use crate::application::persistence_service::{PersistedBatch, PersistenceReconciler};
use crate::application::notifications::NotificationSink;
use crate::domain::defect::AnalysisOutcome;
use crate::domain::error::AnalysisError;
use crate::domain::notification::NotificationLevel;
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// One uploaded image awaiting analysis
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub mission_id: Uuid,
    pub mission_image_id: Option<Uuid>,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, Serialize)]
pub struct InspectionReport {
    pub mission_id: Uuid,
    pub mission_image_id: Option<Uuid>,
    pub outcome: AnalysisOutcome,
    pub batch: PersistedBatch,
}

impl InspectionReport {
    pub fn is_degraded(&self) -> bool {
        self.batch.is_degraded()
    }
}

#[derive(Clone)]
pub struct InspectionService {
    cascade: DetectionCascade,
    reconciler: PersistenceReconciler,
    notifier: Arc<dyn NotificationSink>,
}

impl InspectionService {
    pub fn new(
        cascade: DetectionCascade,
        reconciler: PersistenceReconciler,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            cascade,
            reconciler,
            notifier,
        }
    }

    /// Analyse one image, persist its defect records and emit exactly one notification.
    ///
    /// A failed cascade is reported inside the outcome; only a fallback-cache
    /// failure is returned as an error.
    pub async fn inspect_image(&self, upload: &ImageUpload) -> Result<InspectionReport, AnalysisError> {
        let target = AnalysisTarget {
            mission_id: upload.mission_id,
            mission_image_id: upload.mission_image_id,
        };
        tracing::debug!(
            "Inspecting {} byte image for mission {}",
            upload.bytes.len(),
            upload.mission_id
        );

        let outcome = self.cascade.evaluate(&upload.bytes, &target).await;
        let summary = summarize(&target, &outcome);
        let batch = match self.reconciler.persist(outcome.records.clone()).await {
            Ok(batch) => batch,
            Err(err) => {
                self.notifier.notify(summary.escalate(
                    NotificationLevel::Error,
                    "Analysis not saved",
                    &err.to_string(),
                ));
                return Err(err);
            }
        };

        if batch.is_degraded() {
            self.notifier.notify(summary.escalate(
                NotificationLevel::Warning,
                "Saved in degraded mode",
                &format!(
                    "{} of {} defect(s) are held in the local fallback cache; the primary store rejected them",
                    batch.fallback.len(),
                    batch.len()
                ),
            ));
        } else {
            self.notifier.notify(summary);
        }

        Ok(InspectionReport {
            mission_id: upload.mission_id,
            mission_image_id: upload.mission_image_id,
            outcome,
            batch,
        })
    }

    /// Inspect uploads one after another, in upload order.
    /// Each slot holds that image's result; an error does not stop the batch.
    pub async fn inspect_batch(&self, uploads: &[ImageUpload]) -> Vec<Result<InspectionReport, AnalysisError>> {
        let mut reports = Vec::with_capacity(uploads.len());
        for upload in uploads {
            let report = self.inspect_image(upload).await;
            if let Err(err) = &report {
                tracing::error!("Inspection of mission {} image failed: {}", upload.mission_id, err);
            }
            reports.push(report);
        }
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::cascade_service::CascadeSettings;
    use crate::application::defect_repository::{DefectRepository, StoreError};
    use crate::application::detection_services::{CvAnalysis, DefectDetectionService, VisionAnalysisService};
    use crate::application::fallback_cache::FallbackCache;
    use crate::application::image_preprocessor::ImagePreprocessor;
    use crate::application::test_support::{
        checkerboard_image, encode_png, uniform_image, FakeCv, FakeVision, RecordingInvalidator,
        RecordingNotifier, RejectingRepository,
    };
    use crate::domain::defect::{CascadeStatus, SourceTier};
    use crate::domain::detection::RawDetection;
    use crate::infrastructure::memory_defect_repository::MemoryDefectRepository;

    struct Harness {
        service: InspectionService,
        notifier: Arc<RecordingNotifier>,
        cache: Arc<FallbackCache>,
    }

    fn harness(
        cv: Option<Arc<dyn DefectDetectionService>>,
        vision: Option<Arc<dyn VisionAnalysisService>>,
        repository: Arc<dyn DefectRepository>,
        cache: FallbackCache,
    ) -> Harness {
        let notifier = Arc::new(RecordingNotifier::default());
        let cache = Arc::new(cache);
        let cascade = DetectionCascade::new(
            cv,
            vision,
            ImagePreprocessor::default(),
            notifier.clone(),
            CascadeSettings::default(),
        );
        let reconciler = PersistenceReconciler::new(
            repository,
            cache.clone(),
            Arc::new(RecordingInvalidator::default()),
        );
        Harness {
            service: InspectionService::new(cascade, reconciler, notifier.clone()),
            notifier,
            cache,
        }
    }

    fn upload(bytes: Vec<u8>) -> ImageUpload {
        ImageUpload {
            mission_id: Uuid::new_v4(),
            mission_image_id: Some(Uuid::new_v4()),
            bytes: Bytes::from(bytes),
        }
    }

    fn two_cracks() -> CvAnalysis {
        CvAnalysis {
            detections: vec![RawDetection::new("crack", 0.9), RawDetection::new("Dusty", 0.6)],
            total_detections: 2,
            model_version: None,
        }
    }

    #[tokio::test]
    async fn test_detected_defects_are_persisted() {
        let cv: Arc<dyn DefectDetectionService> = Arc::new(FakeCv::available(Ok(two_cracks())));
        let repository = Arc::new(MemoryDefectRepository::new());
        let h = harness(Some(cv), None, repository.clone(), FallbackCache::new());

        let report = h
            .service
            .inspect_image(&upload(encode_png(&uniform_image(32, 32, 90))))
            .await
            .unwrap();

        assert_eq!(report.outcome.source_tier, Some(SourceTier::RemoteCv));
        assert_eq!(report.batch.persisted.len(), 2);
        assert!(!report.is_degraded());
        assert_eq!(repository.row_count(), 2);
        let events = h.notifier.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].level, NotificationLevel::Success);
    }

    #[tokio::test]
    async fn test_degraded_write_is_one_warning() {
        let cv: Arc<dyn DefectDetectionService> = Arc::new(FakeCv::available(Ok(two_cracks())));
        let repository = Arc::new(RejectingRepository::new(StoreError::Transport("refused".to_string())));
        let h = harness(Some(cv), None, repository, FallbackCache::new());

        let report = h
            .service
            .inspect_image(&upload(encode_png(&uniform_image(32, 32, 90))))
            .await
            .unwrap();

        assert!(report.is_degraded());
        assert_eq!(report.batch.fallback.len(), 2);
        assert_eq!(h.cache.fallback_len(), 2);

        let events = h.notifier.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].level, NotificationLevel::Warning);
        assert_eq!(events[0].title, "Saved in degraded mode");
        assert!(events[0].message.starts_with("2 defect(s) detected via REMOTE_CV"));
        assert!(events[0].message.contains("2 of 2 defect(s) are held in the local fallback cache"));
    }

    #[tokio::test]
    async fn test_batch_keeps_order_and_survives_bad_image() {
        let vision: Arc<dyn VisionAnalysisService> = Arc::new(FakeVision::failing(
            AnalysisError::unavailable(SourceTier::RemoteVisionAi, "HTTP 502"),
        ));
        let h = harness(None, Some(vision), Arc::new(MemoryDefectRepository::new()), FallbackCache::new());

        let uploads = vec![
            upload(encode_png(&checkerboard_image(64, 64, 4))),
            upload(b"corrupt".to_vec()),
            upload(encode_png(&uniform_image(32, 32, 128))),
        ];
        let reports = h.service.inspect_batch(&uploads).await;

        assert_eq!(reports.len(), 3);
        let reports: Vec<_> = reports.into_iter().map(|r| r.unwrap()).collect();
        for (report, upload) in reports.iter().zip(&uploads) {
            assert_eq!(report.mission_id, upload.mission_id);
        }
        assert_eq!(reports[0].outcome.records.len(), 1);
        assert_eq!(reports[1].outcome.status(), CascadeStatus::Failed);
        assert!(reports[1].batch.is_empty());
        assert_eq!(reports[2].outcome.clean_confidence, Some(0.9));
    }

    #[tokio::test]
    async fn test_exhausted_fallback_fills_error_slot() {
        let cv: Arc<dyn DefectDetectionService> = Arc::new(FakeCv::available(Ok(two_cracks())));
        let repository = Arc::new(RejectingRepository::new(StoreError::Transport("refused".to_string())));
        let h = harness(Some(cv), None, repository, FallbackCache::with_capacity_limit(0));

        let uploads = vec![upload(encode_png(&uniform_image(32, 32, 90)))];
        let reports = h.service.inspect_batch(&uploads).await;

        assert!(matches!(reports[0], Err(AnalysisError::PersistenceExhausted(_))));

        let events = h.notifier.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].level, NotificationLevel::Error);
        assert_eq!(events[0].title, "Analysis not saved");
    }
}
