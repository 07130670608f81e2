// Telemetry sample and anomaly verdict domain models
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub panel_id: Uuid,
    pub voltage: f64,
    pub current: f64,
    pub temperature: f64,
    /// Pre-computed power; derived from voltage and current when absent
    #[serde(default)]
    pub power: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl TelemetrySample {
    pub fn new(panel_id: Uuid, voltage: f64, current: f64, temperature: f64) -> Self {
        Self {
            panel_id,
            voltage,
            current,
            temperature,
            power: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_power(mut self, power: f64) -> Self {
        self.power = Some(power);
        self
    }

    pub fn effective_power(&self) -> f64 {
        self.power.unwrap_or(self.voltage * self.current)
    }
}

/// Normal-operating thresholds used to gate anomaly evaluation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalRanges {
    pub voltage_min: f64,
    pub voltage_max: f64,
    pub temp_max: f64,
    pub power_min: f64,
}

impl Default for NormalRanges {
    fn default() -> Self {
        Self {
            voltage_min: 30.0,
            voltage_max: 60.0,
            temp_max: 80.0,
            power_min: 200.0,
        }
    }
}

/// Externally predicted power for the same instant, with the residual threshold
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerPrediction {
    pub predicted_power: f64,
    pub error_threshold: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyType {
    PowerDrop,
    Overheat,
    MlFlag,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuggestedAction {
    CreateAlert,
    TriggerMission,
    Monitor,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyVerdict {
    pub has_anomaly: bool,
    /// 1 (normal) to 5 (critical)
    pub severity: u8,
    pub anomaly_type: AnomalyType,
    pub message: String,
    pub suggested_action: SuggestedAction,
    pub confidence: f64,
}

impl AnomalyVerdict {
    pub fn anomaly(
        severity: u8,
        anomaly_type: AnomalyType,
        message: String,
        suggested_action: SuggestedAction,
        confidence: f64,
    ) -> Self {
        Self {
            has_anomaly: true,
            severity,
            anomaly_type,
            message,
            suggested_action,
            confidence,
        }
    }

    pub fn normal(confidence: f64) -> Self {
        Self {
            has_anomaly: false,
            severity: 1,
            anomaly_type: AnomalyType::Other,
            message: "All readings within normal operating ranges".to_string(),
            suggested_action: SuggestedAction::None,
            confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_power_prefers_reported_value() {
        let sample = TelemetrySample::new(Uuid::new_v4(), 40.0, 5.0, 25.0);
        assert_eq!(sample.effective_power(), 200.0);

        let sample = sample.with_power(180.0);
        assert_eq!(sample.effective_power(), 180.0);
    }

    #[test]
    fn test_sample_deserializes_without_power() {
        let json = r#"{
            "panel_id": "6f1c1f52-3f7e-4c4a-9f53-1f4f8f0b7a10",
            "voltage": 45.0,
            "current": 5.0,
            "temperature": 40.0,
            "timestamp": "2025-06-01T12:00:00Z"
        }"#;
        let sample: TelemetrySample = serde_json::from_str(json).unwrap();
        assert!(sample.power.is_none());
        assert_eq!(sample.effective_power(), 225.0);
    }
}
