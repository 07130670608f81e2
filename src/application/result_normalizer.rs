// Maps heterogeneous detector output onto canonical defect records
use crate::domain::defect::{BoundingBox, DefectRecord, DefectType, SourceTier};
use crate::domain::detection::{RawBox, RawDetection};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// How a detector label maps onto the defect vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelClass {
    Defect(DefectType),
    /// A "clean" classification, not a defect
    NotDefect,
    Unknown,
}

/// Map CV class names ("Physical-Damage", "Snow-Covered") and free-text
/// vision labels ("hot spot", "micro crack") onto `DefectType`.
pub fn classify_label(label: &str) -> LabelClass {
    let key: String = label
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '-' || c == ' ' { '_' } else { c })
        .collect();

    if key.is_empty() {
        return LabelClass::Unknown;
    }
    if let Some(exact) = DefectType::parse(&key.to_uppercase()) {
        return LabelClass::Defect(exact);
    }

    match key.as_str() {
        "clean" | "none" | "no_defect" | "normal" | "ok" => return LabelClass::NotDefect,
        _ => {}
    }

    // Order matters: "electrical_damage" must match before the generic "damage"
    if key.contains("crack") {
        LabelClass::Defect(DefectType::Crack)
    } else if key.contains("dust") || key.contains("dirt") || key.contains("soil") || key.contains("bird") {
        LabelClass::Defect(DefectType::Dust)
    } else if key.contains("electrical") || key.split('_').any(is_heat_token) {
        LabelClass::Defect(DefectType::Hotspot)
    } else if key.contains("snow") {
        LabelClass::Defect(DefectType::Snow)
    } else if key.contains("damage") || key.contains("broken") || key.contains("hardware") || key.contains("shatter") {
        LabelClass::Defect(DefectType::HardwareDamage)
    } else {
        LabelClass::Unknown
    }
}

/// Whole words only, so "photo" or "shot" never read as a hotspot
fn is_heat_token(token: &str) -> bool {
    token == "hot" || token.starts_with("hotspot") || token.starts_with("burn")
}

/// Convert a detector box into a normalized, clipped rectangle
pub fn normalize_box(raw: &RawBox) -> Option<BoundingBox> {
    match *raw {
        RawBox::Normalized { x, y, width, height } => BoundingBox::clipped(x, y, width, height),
        RawBox::Percent { x, y, width, height } => {
            BoundingBox::clipped(x / 100.0, y / 100.0, width / 100.0, height / 100.0)
        }
        RawBox::Pixels {
            x,
            y,
            width,
            height,
            image_width,
            image_height,
        } => {
            if !(image_width > 0.0 && image_height > 0.0) {
                return None;
            }
            BoundingBox::clipped(
                x / image_width,
                y / image_height,
                width / image_width,
                height / image_height,
            )
        }
    }
}

/// Normalize a batch, stamping every record with the current time
pub fn normalize(
    raw: Vec<RawDetection>,
    mission_id: Uuid,
    mission_image_id: Option<Uuid>,
    source_tier: SourceTier,
) -> Vec<DefectRecord> {
    normalize_at(raw, mission_id, mission_image_id, source_tier, Utc::now())
}

/// Normalize a batch detected at `detected_at`.
///
/// Malformed entries are dropped individually; the rest of the batch survives.
pub fn normalize_at(
    raw: Vec<RawDetection>,
    mission_id: Uuid,
    mission_image_id: Option<Uuid>,
    source_tier: SourceTier,
    detected_at: DateTime<Utc>,
) -> Vec<DefectRecord> {
    let total = raw.len();
    let records: Vec<DefectRecord> = raw
        .into_iter()
        .filter_map(|detection| {
            to_record(detection, mission_id, mission_image_id, source_tier, detected_at)
        })
        .collect();

    if records.len() != total {
        tracing::debug!(
            "Normalized {} of {} {} detections for mission {}",
            records.len(),
            total,
            source_tier,
            mission_id
        );
    }
    records
}

fn to_record(
    detection: RawDetection,
    mission_id: Uuid,
    mission_image_id: Option<Uuid>,
    source_tier: SourceTier,
    detected_at: DateTime<Utc>,
) -> Option<DefectRecord> {
    let Some(label) = detection.label.as_deref() else {
        tracing::warn!("Dropping {} detection without a defect type", source_tier);
        return None;
    };

    let defect_type = match classify_label(label) {
        LabelClass::Defect(t) => t,
        LabelClass::NotDefect => return None,
        LabelClass::Unknown => {
            tracing::warn!("Dropping {} detection with unknown type '{}'", source_tier, label);
            return None;
        }
    };

    let confidence = match detection.confidence {
        Some(c) if c.is_finite() => c.clamp(0.0, 1.0),
        _ => {
            tracing::warn!("Dropping {} {} detection without confidence", source_tier, defect_type);
            return None;
        }
    };

    let bounding_box = detection.bbox.as_ref().and_then(normalize_box);
    let notes = detection
        .notes
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| format!("{} detected by {}", label.trim(), source_tier));

    Some(DefectRecord {
        mission_id,
        mission_image_id,
        defect_type,
        confidence,
        bounding_box,
        notes,
        source_tier,
        model_version: detection.model_version,
        created_at: detected_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_model_class_names() {
        assert_eq!(classify_label("Dusty"), LabelClass::Defect(DefectType::Dust));
        assert_eq!(classify_label("Electrical-damage"), LabelClass::Defect(DefectType::Hotspot));
        assert_eq!(classify_label("Physical-Damage"), LabelClass::Defect(DefectType::HardwareDamage));
        assert_eq!(classify_label("Snow-Covered"), LabelClass::Defect(DefectType::Snow));
        assert_eq!(classify_label("Clean"), LabelClass::NotDefect);
    }

    #[test]
    fn test_classify_free_text_labels() {
        assert_eq!(classify_label("micro crack"), LabelClass::Defect(DefectType::Crack));
        assert_eq!(classify_label("hot spot"), LabelClass::Defect(DefectType::Hotspot));
        assert_eq!(classify_label("HARDWARE_DAMAGE"), LabelClass::Defect(DefectType::HardwareDamage));
        assert_eq!(classify_label("bird droppings"), LabelClass::Defect(DefectType::Dust));
        assert_eq!(classify_label("shadow"), LabelClass::Unknown);
        assert_eq!(classify_label("  "), LabelClass::Unknown);
    }

    #[test]
    fn test_hotspot_needs_a_whole_word() {
        assert_eq!(classify_label("photo artifact"), LabelClass::Unknown);
        assert_eq!(classify_label("shot"), LabelClass::Unknown);
        assert_eq!(classify_label("hotspot"), LabelClass::Defect(DefectType::Hotspot));
        assert_eq!(classify_label("Hotspots"), LabelClass::Defect(DefectType::Hotspot));
        assert_eq!(classify_label("burn mark"), LabelClass::Defect(DefectType::Hotspot));
        assert_eq!(classify_label("Electrical-damage"), LabelClass::Defect(DefectType::Hotspot));
    }

    #[test]
    fn test_box_conventions_agree() {
        let expected = BoundingBox { x: 0.1, y: 0.2, width: 0.3, height: 0.4 };
        let boxes = [
            RawBox::Normalized { x: 0.1, y: 0.2, width: 0.3, height: 0.4 },
            RawBox::Percent { x: 10.0, y: 20.0, width: 30.0, height: 40.0 },
            RawBox::Pixels {
                x: 64.0,
                y: 96.0,
                width: 192.0,
                height: 192.0,
                image_width: 640.0,
                image_height: 480.0,
            },
        ];
        for raw in boxes {
            let bbox = normalize_box(&raw).unwrap();
            assert!((bbox.x - expected.x).abs() < 1e-9, "{:?}", raw);
            assert!((bbox.y - expected.y).abs() < 1e-9, "{:?}", raw);
            assert!((bbox.width - expected.width).abs() < 1e-9, "{:?}", raw);
            assert!((bbox.height - expected.height).abs() < 1e-9, "{:?}", raw);
        }
    }

    #[test]
    fn test_pixel_box_without_image_size_is_dropped() {
        let raw = RawBox::Pixels {
            x: 10.0,
            y: 10.0,
            width: 20.0,
            height: 20.0,
            image_width: 0.0,
            image_height: 0.0,
        };
        assert!(normalize_box(&raw).is_none());
    }

    #[test]
    fn test_partial_batch_survives_malformed_entries() {
        let mission_id = Uuid::new_v4();
        let image_id = Some(Uuid::new_v4());
        let raw = vec![
            RawDetection::new("crack", 1.4),
            RawDetection { label: None, confidence: Some(0.9), ..Default::default() },
            RawDetection::new("Clean", 0.99),
            RawDetection::new("dust", f64::NAN),
            RawDetection::new("snow", -0.2)
                .with_bbox(RawBox::Normalized { x: 0.5, y: 0.5, width: 0.0, height: 0.1 })
                .with_notes("snow on lower half"),
        ];

        let records = normalize(raw, mission_id, image_id, SourceTier::RemoteVisionAi);

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].defect_type, DefectType::Crack);
        assert_eq!(records[0].confidence, 1.0);
        assert_eq!(records[0].notes, "crack detected by REMOTE_VISION_AI");
        assert_eq!(records[1].defect_type, DefectType::Snow);
        assert_eq!(records[1].confidence, 0.0);
        assert!(records[1].bounding_box.is_none());
        assert_eq!(records[1].notes, "snow on lower half");
        assert!(records.iter().all(|r| r.mission_id == mission_id && r.mission_image_id == image_id));
        assert!(records.iter().all(|r| r.source_tier == SourceTier::RemoteVisionAi));
    }

    #[test]
    fn test_created_at_is_detection_time() {
        let detected_at = DateTime::parse_from_rfc3339("2025-03-01T08:30:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let records = normalize_at(
            vec![RawDetection::new("crack", 0.7)],
            Uuid::new_v4(),
            None,
            SourceTier::RemoteCv,
            detected_at,
        );
        assert_eq!(records[0].created_at, detected_at);
        assert!(records[0].mission_image_id.is_none());
    }
}
