// Structured-output contract of the generative vision tier
use crate::domain::defect::SourceTier;
use crate::domain::detection::{RawBox, RawDetection};
use crate::domain::error::AnalysisError;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

pub const VISION_PROMPT: &str = r#"You are inspecting a photo of a solar panel for defects.
Respond with a single JSON object and nothing else, using exactly this shape:
{
  "defects": [
    {
      "type": "crack" | "dust" | "hotspot" | "snow" | "hardware_damage",
      "confidence": number between 0 and 1,
      "description": short description of what you see,
      "boundingBox": { "x": percent, "y": percent, "width": percent, "height": percent }
    }
  ],
  "overallCondition": "good" | "fair" | "poor" | "critical",
  "recommendedAction": short recommendation
}
Bounding box values are percentages (0-100) of the image width and height.
Omit "boundingBox" if the defect cannot be localised.
Return an empty "defects" array if the panel is clean."#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallCondition {
    Good,
    Fair,
    Poor,
    Critical,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisionReport {
    #[serde(deserialize_with = "lenient_entries")]
    pub defects: Vec<VisionDefect>,
    pub overall_condition: OverallCondition,
    #[serde(default)]
    pub recommended_action: Option<String>,
}

/// Untyped fields: a badly typed value drops only its own entry or box
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisionDefect {
    #[serde(default, rename = "type")]
    pub defect_type: Option<Value>,
    #[serde(default)]
    pub confidence: Option<Value>,
    #[serde(default)]
    pub description: Option<Value>,
    #[serde(default)]
    pub bounding_box: Option<Value>,
}

/// Keep the entries that are objects; skip the rest
fn lenient_entries<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<VisionDefect>, D::Error> {
    let entries = Vec::<Value>::deserialize(deserializer)?;
    Ok(entries
        .into_iter()
        .filter(Value::is_object)
        .filter_map(|entry| serde_json::from_value(entry).ok())
        .collect())
}

/// A JSON number, or a string holding one
fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn text(value: Option<Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

fn percent_box(value: &Value) -> Option<RawBox> {
    let field = |name: &str| value.get(name).and_then(number);
    Some(RawBox::Percent {
        x: field("x")?,
        y: field("y")?,
        width: field("width")?,
        height: field("height")?,
    })
}

impl VisionReport {
    pub fn into_raw_detections(self) -> Vec<RawDetection> {
        self.defects
            .into_iter()
            .map(|d| RawDetection {
                confidence: d.confidence.as_ref().and_then(number),
                bbox: d.bounding_box.as_ref().and_then(percent_box),
                label: text(d.defect_type),
                notes: text(d.description),
                model_version: None,
            })
            .collect()
    }
}

/// Remove a surrounding markdown code fence (```json ... ```), if any
pub fn strip_markdown_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop the info string ("json"), which ends at a newline, or on a one-line fence at whitespace or '{'
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => {
            let end = rest
                .find(|c: char| c.is_whitespace() || c == '{' || c == '[')
                .unwrap_or(rest.len());
            &rest[end..]
        }
    };
    body.trim_end()
        .strip_suffix("```")
        .unwrap_or(body)
        .trim()
}

/// Sanitize then decode the model's answer
pub fn decode_vision_report(text: &str) -> Result<VisionReport, AnalysisError> {
    let payload = strip_markdown_fence(text);
    serde_json::from_str(payload)
        .map_err(|e| AnalysisError::malformed(SourceTier::RemoteVisionAi, e.to_string()))
}
