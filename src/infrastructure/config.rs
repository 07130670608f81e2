use crate::application::cascade_service::CascadeSettings;
use crate::application::fallback_cache::DEFAULT_INDEX_LIMIT;
use crate::application::image_preprocessor::PreprocessSettings;
use crate::domain::telemetry::NormalRanges;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub cv: CvSettings,
    #[serde(default)]
    pub vision: VisionSettings,
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub preprocess: PreprocessConfig,
    #[serde(default)]
    pub ranges: RangesConfig,
    #[serde(default)]
    pub fallback_cache: FallbackCacheSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CvSettings {
    /// Empty disables the remote CV tier
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    #[serde(default = "default_analyze_timeout_ms")]
    pub analyze_timeout_ms: u64,
}

impl Default for CvSettings {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            confidence_threshold: default_confidence_threshold(),
            probe_timeout_ms: default_probe_timeout_ms(),
            analyze_timeout_ms: default_analyze_timeout_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct VisionSettings {
    /// Empty disables the vision AI tier
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_vision_model")]
    pub model: String,
    #[serde(default = "default_vision_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for VisionSettings {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            model: default_vision_model(),
            timeout_ms: default_vision_timeout_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreSettings {
    /// Empty selects the in-memory repository
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_table")]
    pub table: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            table: default_table(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct PreprocessConfig {
    #[serde(default = "default_max_dimension")]
    pub max_dimension: u32,
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            max_dimension: default_max_dimension(),
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct RangesConfig {
    #[serde(default = "default_voltage_min")]
    pub voltage_min: f64,
    #[serde(default = "default_voltage_max")]
    pub voltage_max: f64,
    #[serde(default = "default_temp_max")]
    pub temp_max: f64,
    #[serde(default = "default_power_min")]
    pub power_min: f64,
}

impl Default for RangesConfig {
    fn default() -> Self {
        Self {
            voltage_min: default_voltage_min(),
            voltage_max: default_voltage_max(),
            temp_max: default_temp_max(),
            power_min: default_power_min(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FallbackCacheSettings {
    #[serde(default)]
    pub max_entries: Option<usize>,
    #[serde(default = "default_index_max_entries")]
    pub index_max_entries: usize,
}

impl Default for FallbackCacheSettings {
    fn default() -> Self {
        Self {
            max_entries: None,
            index_max_entries: default_index_max_entries(),
        }
    }
}

fn default_index_max_entries() -> usize {
    DEFAULT_INDEX_LIMIT
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_confidence_threshold() -> f64 {
    0.5
}

fn default_probe_timeout_ms() -> u64 {
    3_000
}

fn default_analyze_timeout_ms() -> u64 {
    60_000
}

fn default_vision_model() -> String {
    "gpt-4o".to_string()
}

fn default_vision_timeout_ms() -> u64 {
    45_000
}

fn default_table() -> String {
    "inspection_results".to_string()
}

fn default_max_dimension() -> u32 {
    PreprocessSettings::default().max_dimension
}

fn default_jpeg_quality() -> u8 {
    PreprocessSettings::default().jpeg_quality
}

fn default_voltage_min() -> f64 {
    NormalRanges::default().voltage_min
}

fn default_voltage_max() -> f64 {
    NormalRanges::default().voltage_max
}

fn default_temp_max() -> f64 {
    NormalRanges::default().temp_max
}

fn default_power_min() -> f64 {
    NormalRanges::default().power_min
}

impl AppConfig {
    pub fn cascade_settings(&self) -> CascadeSettings {
        CascadeSettings {
            confidence_threshold: self.cv.confidence_threshold,
            probe_timeout: Duration::from_millis(self.cv.probe_timeout_ms),
            analyze_timeout: Duration::from_millis(self.cv.analyze_timeout_ms),
            vision_timeout: Duration::from_millis(self.vision.timeout_ms),
        }
    }

    pub fn preprocess_settings(&self) -> PreprocessSettings {
        PreprocessSettings {
            max_dimension: self.preprocess.max_dimension,
            jpeg_quality: self.preprocess.jpeg_quality,
        }
    }

    pub fn normal_ranges(&self) -> NormalRanges {
        NormalRanges {
            voltage_min: self.ranges.voltage_min,
            voltage_max: self.ranges.voltage_max,
            temp_max: self.ranges.temp_max,
            power_min: self.ranges.power_min,
        }
    }
}

/// Load `config/inspection` (optional) layered with `INSPECTION__SECTION__KEY` variables
pub fn load_app_config() -> anyhow::Result<AppConfig> {
    load_app_config_from("config/inspection")
}

pub fn load_app_config_from(path: &str) -> anyhow::Result<AppConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name(path).required(false))
        .add_source(
            config::Environment::with_prefix("INSPECTION")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}
