// Rule-table classifier for panel telemetry samples
use crate::domain::telemetry::{
    AnomalyType, AnomalyVerdict, NormalRanges, PowerPrediction, SuggestedAction, TelemetrySample,
};

const NORMAL_CONFIDENCE: f64 = 0.95;
const VOLTAGE_CONFIDENCE: f64 = 0.8;
const ML_FLAG_CONFIDENCE: f64 = 0.7;

/// Classify one sample against the normal ranges.
///
/// Categories are checked in priority order: overheat, power drop, voltage.
/// Only the first matching category is reported.
pub fn classify(sample: &TelemetrySample, ranges: &NormalRanges) -> AnomalyVerdict {
    classify_with_prediction(sample, ranges, None)
}

/// Same as [`classify`], falling back to the prediction residual when no rule fires
pub fn classify_with_prediction(
    sample: &TelemetrySample,
    ranges: &NormalRanges,
    prediction: Option<&PowerPrediction>,
) -> AnomalyVerdict {
    let power = sample.effective_power();

    if sample.temperature > ranges.temp_max {
        return overheat(sample.temperature, ranges.temp_max);
    }
    if power < ranges.power_min {
        return power_drop(power, ranges.power_min);
    }
    if sample.voltage < ranges.voltage_min || sample.voltage > ranges.voltage_max {
        return AnomalyVerdict::anomaly(
            3,
            AnomalyType::Other,
            format!(
                "Voltage {:.1}V outside normal range {:.1}-{:.1}V",
                sample.voltage, ranges.voltage_min, ranges.voltage_max
            ),
            SuggestedAction::CreateAlert,
            VOLTAGE_CONFIDENCE,
        );
    }
    if let Some(verdict) = prediction.and_then(|p| residual_flag(power, p)) {
        return verdict;
    }

    AnomalyVerdict::normal(NORMAL_CONFIDENCE)
}

fn overheat(temperature: f64, temp_max: f64) -> AnomalyVerdict {
    let excess = temperature - temp_max;
    let (severity, action) = if excess > 20.0 {
        (5, SuggestedAction::TriggerMission)
    } else if excess > 10.0 {
        (4, SuggestedAction::TriggerMission)
    } else {
        (3, SuggestedAction::CreateAlert)
    };

    AnomalyVerdict::anomaly(
        severity,
        AnomalyType::Overheat,
        format!(
            "Temperature {:.1}°C exceeds maximum {:.1}°C by {:.1}°C",
            temperature, temp_max, excess
        ),
        action,
        (0.7 + excess / 50.0).min(0.99),
    )
}

fn power_drop(power: f64, power_min: f64) -> AnomalyVerdict {
    let deficit = power_min - power;
    let fraction = if power_min > 0.0 { deficit / power_min } else { 1.0 };
    let (severity, action) = if fraction > 0.5 {
        (5, SuggestedAction::TriggerMission)
    } else if fraction > 0.3 {
        (4, SuggestedAction::TriggerMission)
    } else {
        (3, SuggestedAction::CreateAlert)
    };

    AnomalyVerdict::anomaly(
        severity,
        AnomalyType::PowerDrop,
        format!(
            "Power output {:.1}W is {:.0}% below minimum {:.1}W",
            power,
            fraction * 100.0,
            power_min
        ),
        action,
        (0.7 + fraction / 2.0).min(0.99),
    )
}

fn residual_flag(power: f64, prediction: &PowerPrediction) -> Option<AnomalyVerdict> {
    let residual = (power - prediction.predicted_power).abs();
    if residual.is_nan() || residual <= prediction.error_threshold {
        return None;
    }

    let (severity, action, label) = if residual > 2.0 * prediction.error_threshold {
        (4, SuggestedAction::CreateAlert, "high")
    } else {
        (2, SuggestedAction::Monitor, "medium")
    };
    Some(AnomalyVerdict::anomaly(
        severity,
        AnomalyType::MlFlag,
        format!(
            "Power {:.1}W deviates {:.1}W from predicted {:.1}W ({} residual)",
            power, residual, prediction.predicted_power, label
        ),
        action,
        ML_FLAG_CONFIDENCE,
    ))
}

/// Classify an ordered series, keeping only anomalous samples with their index
pub fn scan_samples(samples: &[TelemetrySample], ranges: &NormalRanges) -> Vec<(usize, AnomalyVerdict)> {
    let anomalies: Vec<(usize, AnomalyVerdict)> = samples
        .iter()
        .enumerate()
        .map(|(i, sample)| (i, classify(sample, ranges)))
        .filter(|(_, verdict)| verdict.has_anomaly)
        .collect();

    tracing::debug!("Scanned {} samples, {} anomalous", samples.len(), anomalies.len());
    anomalies
}
