// Defect domain models
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::error::AnalysisError;

/// Records below this confidence are persisted as REVIEW instead of FAIL
pub const REVIEW_CONFIDENCE_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DefectType {
    Crack,
    Dust,
    Hotspot,
    Snow,
    HardwareDamage,
}

impl DefectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DefectType::Crack => "CRACK",
            DefectType::Dust => "DUST",
            DefectType::Hotspot => "HOTSPOT",
            DefectType::Snow => "SNOW",
            DefectType::HardwareDamage => "HARDWARE_DAMAGE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "CRACK" => Some(DefectType::Crack),
            "DUST" => Some(DefectType::Dust),
            "HOTSPOT" => Some(DefectType::Hotspot),
            "SNOW" => Some(DefectType::Snow),
            "HARDWARE_DAMAGE" => Some(DefectType::HardwareDamage),
            _ => None,
        }
    }
}

impl fmt::Display for DefectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which cascade tier produced a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceTier {
    RemoteCv,
    RemoteVisionAi,
    LocalHeuristic,
}

impl SourceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTier::RemoteCv => "REMOTE_CV",
            SourceTier::RemoteVisionAi => "REMOTE_VISION_AI",
            SourceTier::LocalHeuristic => "LOCAL_HEURISTIC",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "REMOTE_CV" => Some(SourceTier::RemoteCv),
            "REMOTE_VISION_AI" => Some(SourceTier::RemoteVisionAi),
            "LOCAL_HEURISTIC" => Some(SourceTier::LocalHeuristic),
            _ => None,
        }
    }
}

impl fmt::Display for SourceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized rectangle, every component in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    /// Clip a normalized rectangle to the unit square.
    /// Returns `None` when nothing with positive area remains.
    pub fn clipped(x: f64, y: f64, width: f64, height: f64) -> Option<Self> {
        if ![x, y, width, height].iter().all(|v| v.is_finite()) {
            return None;
        }
        if width <= 0.0 || height <= 0.0 {
            return None;
        }

        let x0 = x.clamp(0.0, 1.0);
        let y0 = y.clamp(0.0, 1.0);
        let x1 = (x + width).clamp(0.0, 1.0);
        let y1 = (y + height).clamp(0.0, 1.0);

        let bbox = Self {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        };
        bbox.is_valid().then_some(bbox)
    }

    pub fn is_valid(&self) -> bool {
        self.x >= 0.0 && self.y >= 0.0 && self.width > 0.0 && self.height > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InspectionStatus {
    Pass,
    Fail,
    Review,
}

impl InspectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InspectionStatus::Pass => "PASS",
            InspectionStatus::Fail => "FAIL",
            InspectionStatus::Review => "REVIEW",
        }
    }
}

/// One detected defect instance.
///
/// Built by the normalizer and never mutated afterwards; `created_at` is the
/// detection time, not the persistence time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefectRecord {
    pub mission_id: Uuid,
    pub mission_image_id: Option<Uuid>,
    pub defect_type: DefectType,
    pub confidence: f64,
    pub bounding_box: Option<BoundingBox>,
    pub notes: String,
    pub source_tier: SourceTier,
    pub model_version: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DefectRecord {
    pub fn inspection_status(&self) -> InspectionStatus {
        if self.confidence >= REVIEW_CONFIDENCE_THRESHOLD {
            InspectionStatus::Fail
        } else {
            InspectionStatus::Review
        }
    }

    /// Same record detached from its image
    pub fn orphaned(&self) -> Self {
        Self {
            mission_image_id: None,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceBand {
    High,
    Medium,
    Low,
}

impl ConfidenceBand {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.8 {
            ConfidenceBand::High
        } else if confidence >= 0.5 {
            ConfidenceBand::Medium
        } else {
            ConfidenceBand::Low
        }
    }
}

impl fmt::Display for ConfidenceBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConfidenceBand::High => "high",
            ConfidenceBand::Medium => "medium",
            ConfidenceBand::Low => "low",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CascadeStatus {
    Succeeded,
    Failed,
}

/// Result of running the detection cascade on one image
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutcome {
    pub records: Vec<DefectRecord>,
    pub source_tier: Option<SourceTier>,
    /// Set when a tier positively decided the image is clean
    pub clean_confidence: Option<f64>,
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<AnalysisError>,
}

impl AnalysisOutcome {
    pub fn detected(source_tier: SourceTier, records: Vec<DefectRecord>) -> Self {
        Self {
            records,
            source_tier: Some(source_tier),
            clean_confidence: None,
            error: None,
        }
    }

    pub fn clean(source_tier: SourceTier, confidence: f64) -> Self {
        Self {
            records: Vec::new(),
            source_tier: Some(source_tier),
            clean_confidence: Some(confidence),
            error: None,
        }
    }

    pub fn failed(error: AnalysisError) -> Self {
        Self {
            records: Vec::new(),
            source_tier: None,
            clean_confidence: None,
            error: Some(error),
        }
    }

    pub fn status(&self) -> CascadeStatus {
        if self.error.is_some() {
            CascadeStatus::Failed
        } else {
            CascadeStatus::Succeeded
        }
    }

    /// Highest record confidence, or the clean confidence when nothing was found
    pub fn confidence(&self) -> Option<f64> {
        self.records
            .iter()
            .map(|r| r.confidence)
            .fold(None, |acc: Option<f64>, c| Some(acc.map_or(c, |a| a.max(c))))
            .or(self.clean_confidence)
    }

    pub fn confidence_band(&self) -> Option<ConfidenceBand> {
        self.confidence().map(ConfidenceBand::from_confidence)
    }
}

fn serialize_error<S>(error: &Option<AnalysisError>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match error {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}
