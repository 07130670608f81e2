// Fakes and fixtures shared by the application tests
use crate::application::defect_repository::{
    DefectRepository, RecordId, StorageLocation, StoreError, StoredDefect,
};
use crate::application::detection_services::{
    CvAnalysis, DefectDetectionService, ServiceStatus, VisionAnalysisService,
};
use crate::application::image_preprocessor::EncodedImage;
use crate::application::notifications::{CacheInvalidator, NotificationSink};
use crate::domain::defect::{DefectRecord, DefectType, SourceTier};
use crate::domain::error::AnalysisError;
use crate::domain::notification::Notification;
use async_trait::async_trait;
use chrono::Utc;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use uuid::Uuid;

pub fn encode_png(image: &RgbImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image.clone())
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

pub fn uniform_image(width: u32, height: u32, level: u8) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb([level, level, level]))
}

pub fn gradient_image(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    })
}

pub fn checkerboard_image(width: u32, height: u32, cell: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        if (x / cell + y / cell) % 2 == 0 {
            Rgb([255, 255, 255])
        } else {
            Rgb([0, 0, 0])
        }
    })
}

pub fn sample_record(mission_id: Uuid, mission_image_id: Option<Uuid>, confidence: f64) -> DefectRecord {
    DefectRecord {
        mission_id,
        mission_image_id,
        defect_type: DefectType::Crack,
        confidence,
        bounding_box: None,
        notes: "test record".to_string(),
        source_tier: SourceTier::RemoteCv,
        model_version: None,
        created_at: Utc::now(),
    }
}

pub struct FakeCv {
    status: Result<ServiceStatus, AnalysisError>,
    status_delay: Option<Duration>,
    analysis: Result<CvAnalysis, AnalysisError>,
    status_calls: AtomicUsize,
    analyze_calls: AtomicUsize,
}

impl FakeCv {
    pub fn available(analysis: Result<CvAnalysis, AnalysisError>) -> Self {
        Self {
            status: Ok(ServiceStatus {
                available: true,
                model_version: None,
            }),
            status_delay: None,
            analysis,
            status_calls: AtomicUsize::new(0),
            analyze_calls: AtomicUsize::new(0),
        }
    }

    pub fn unavailable() -> Self {
        let mut cv = Self::available(Err(AnalysisError::unavailable(SourceTier::RemoteCv, "unused")));
        cv.status = Ok(ServiceStatus {
            available: false,
            model_version: None,
        });
        cv
    }

    pub fn failing_probe() -> Self {
        let mut cv = Self::available(Err(AnalysisError::unavailable(SourceTier::RemoteCv, "unused")));
        cv.status = Err(AnalysisError::unavailable(SourceTier::RemoteCv, "connection refused"));
        cv
    }

    pub fn with_status(mut self, status: ServiceStatus) -> Self {
        self.status = Ok(status);
        self
    }

    pub fn with_status_delay(mut self, delay: Duration) -> Self {
        self.status_delay = Some(delay);
        self
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn analyze_calls(&self) -> usize {
        self.analyze_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DefectDetectionService for FakeCv {
    async fn status(&self) -> Result<ServiceStatus, AnalysisError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.status_delay {
            tokio::time::sleep(delay).await;
        }
        self.status.clone()
    }

    async fn analyze(&self, _mission_image_id: Uuid, _threshold: f64) -> Result<CvAnalysis, AnalysisError> {
        self.analyze_calls.fetch_add(1, Ordering::SeqCst);
        self.analysis.clone()
    }
}

pub struct FakeVision {
    answer: Result<String, AnalysisError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl FakeVision {
    pub fn answering(answer: &str) -> Self {
        Self {
            answer: Ok(answer.to_string()),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: AnalysisError) -> Self {
        Self {
            answer: Err(error),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisionAnalysisService for FakeVision {
    async fn describe(&self, image: &EncodedImage, _prompt: &str) -> Result<String, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(image.mime_type, "image/jpeg");
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.answer.clone()
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<Notification> {
        self.events.lock().unwrap().clone()
    }
}

impl NotificationSink for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.events.lock().unwrap().push(notification);
    }
}

#[derive(Default)]
pub struct RecordingInvalidator {
    missions: Mutex<Vec<Uuid>>,
}

impl RecordingInvalidator {
    pub fn missions(&self) -> Vec<Uuid> {
        self.missions.lock().unwrap().clone()
    }
}

impl CacheInvalidator for RecordingInvalidator {
    fn invalidate(&self, mission_id: Uuid) {
        self.missions.lock().unwrap().push(mission_id);
    }
}

/// Primary store that fails every write with the same error and records attempts
pub struct RejectingRepository {
    error: StoreError,
    attempts: Mutex<Vec<DefectRecord>>,
}

impl RejectingRepository {
    pub fn new(error: StoreError) -> Self {
        Self {
            error,
            attempts: Mutex::new(Vec::new()),
        }
    }

    pub fn attempts(&self) -> Vec<DefectRecord> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl DefectRepository for RejectingRepository {
    async fn insert_defect(&self, record: &DefectRecord) -> Result<StoredDefect, StoreError> {
        self.attempts.lock().unwrap().push(record.clone());
        Err(self.error.clone())
    }

    async fn list_mission_defects(&self, _mission_id: Uuid) -> Result<Vec<StoredDefect>, StoreError> {
        Err(StoreError::Transport("store offline".to_string()))
    }
}

/// Builds a primary-store row for fakes that accept writes
pub fn primary_row(record: &DefectRecord) -> StoredDefect {
    StoredDefect {
        id: RecordId::Primary(Uuid::new_v4()),
        location: StorageLocation::Primary,
        stored_at: Utc::now(),
        record: record.clone(),
    }
}
