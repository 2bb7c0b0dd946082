// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Configuration module

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::context::{MetricProfile, Polarity};
use crate::error::Error;
use crate::sensors::SensorType;
use crate::streaming::StreamingConfig;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application name
    pub app_name: String,

    /// Data directory
    pub data_dir: PathBuf,

    /// Log level
    pub log_level: String,

    /// Sensor configuration
    pub sensors: SensorConfig,

    /// Simulation configuration
    pub simulation: SimulationConfig,

    /// Streaming configuration
    pub streaming: StreamingConfig,

    /// Analytics configuration
    pub analytics: AnalyticsConfig,

    /// Recommendation configuration
    pub context: ContextConfig,

    /// Database configuration
    pub database: DatabaseConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "Verdant".to_string(),
            data_dir: PathBuf::from("./data"),
            log_level: "info".to_string(),
            sensors: SensorConfig::default(),
            simulation: SimulationConfig::default(),
            streaming: StreamingConfig::default(),
            analytics: AnalyticsConfig::default(),
            context: ContextConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        config.validate()?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Reject values outside their supported ranges
    pub fn validate(&self) -> crate::Result<()> {
        self.sensors.polling.validate()?;
        self.streaming.validate()?;
        self.context.validate()
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("verdant"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}

/// Sensor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Polling and retry policy
    pub polling: PollingPolicy,

    /// Configured sensors, in polling order
    pub devices: Vec<SensorSettings>,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            polling: PollingPolicy::default(),
            devices: SensorType::ALL.into_iter().map(SensorSettings::for_type).collect(),
        }
    }
}

/// Polling rate and failure handling, swappable at runtime
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingPolicy {
    /// Ticks per second, 1 to 10
    pub polling_hz: f64,

    /// Consecutive failures before a sensor is put in error
    pub max_retries: u32,

    /// Probe errored sensors with exponential backoff
    pub auto_recover: bool,

    /// Per-read timeout
    pub read_timeout_ms: u64,

    /// First recovery delay
    pub backoff_base_ms: u64,

    /// Recovery delay cap
    pub backoff_max_ms: u64,
}

impl Default for PollingPolicy {
    fn default() -> Self {
        Self {
            polling_hz: 1.0,
            max_retries: 3,
            auto_recover: true,
            read_timeout_ms: 2_000,
            backoff_base_ms: 1_000,
            backoff_max_ms: 60_000,
        }
    }
}

impl PollingPolicy {
    pub const MIN_HZ: f64 = 1.0;
    pub const MAX_HZ: f64 = 10.0;

    /// Reject values outside their permitted ranges
    pub fn validate(&self) -> crate::Result<()> {
        if !(Self::MIN_HZ..=Self::MAX_HZ).contains(&self.polling_hz) {
            return Err(Error::ConfigOutOfRange {
                field: "polling_hz",
                value: self.polling_hz.to_string(),
                range: "1 to 10",
            });
        }
        if !(1..=100).contains(&self.max_retries) {
            return Err(Error::ConfigOutOfRange {
                field: "max_retries",
                value: self.max_retries.to_string(),
                range: "1 to 100",
            });
        }
        if !(10..=60_000).contains(&self.read_timeout_ms) {
            return Err(Error::ConfigOutOfRange {
                field: "read_timeout_ms",
                value: self.read_timeout_ms.to_string(),
                range: "10 to 60000",
            });
        }
        if self.backoff_base_ms == 0 || self.backoff_max_ms < self.backoff_base_ms {
            return Err(Error::ConfigOutOfRange {
                field: "backoff_max_ms",
                value: format!("{}..{}", self.backoff_base_ms, self.backoff_max_ms),
                range: "base > 0 and max >= base",
            });
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.polling_hz)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Delay before the given recovery attempt: base * 2^attempt, capped
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.min(32)).unwrap_or(u64::MAX);
        let ms = self.backoff_base_ms.saturating_mul(factor).min(self.backoff_max_ms);
        Duration::from_millis(ms)
    }
}

/// Settings for one configured sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSettings {
    pub id: String,
    pub sensor_type: SensorType,

    /// Explicit device file; skips auto-detection when set
    #[serde(default)]
    pub device: Option<PathBuf>,

    /// Never touch hardware
    #[serde(default)]
    pub force_mock: bool,

    /// Fall back to synthetic data when the probe fails
    #[serde(default = "default_true")]
    pub allow_mock: bool,

    /// Multiplier applied to the raw value (air quality sensors)
    #[serde(default = "default_calibration")]
    pub calibration: f64,
}

fn default_true() -> bool {
    true
}

fn default_calibration() -> f64 {
    1.0
}

impl SensorSettings {
    pub fn for_type(sensor_type: SensorType) -> Self {
        Self {
            id: format!("{}-0", sensor_type.as_str().replace('_', "-")),
            sensor_type,
            device: None,
            force_mock: false,
            allow_mock: true,
            calibration: 1.0,
        }
    }
}

/// Simulation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Scenario to enter at startup instead of polling hardware
    pub start_scenario: Option<String>,

    /// Seed for reproducible synthetic data
    pub seed: Option<u64>,

    /// Period of the dynamic scenario in seconds
    pub dynamic_period_secs: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            start_scenario: None,
            seed: None,
            dynamic_period_secs: 120.0,
        }
    }
}

/// Analytics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Relative change across the window that counts as a trend
    pub trend_threshold: f64,

    /// Z-score beyond which a point is anomalous
    pub anomaly_threshold: f64,

    /// Trailing window for rolling anomaly statistics
    pub anomaly_window: usize,

    /// Prior points required before a point can be scored
    pub min_anomaly_history: usize,

    /// Minimum buckets for a trend
    pub min_data_points: usize,

    /// Max timestamp distance when pairing two sensors
    pub correlation_tolerance_secs: i64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            trend_threshold: 0.1,
            anomaly_threshold: 2.0,
            anomaly_window: 20,
            min_anomaly_history: 5,
            min_data_points: 3,
            correlation_tolerance_secs: 60,
        }
    }
}

/// Baseline, wellness and recommendation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Trailing history used for personal baselines
    pub baseline_days: i64,

    /// Baselines older than this are relearned on the next evaluation
    pub baseline_refresh_secs: i64,

    /// Samples required before a baseline is trusted
    pub min_baseline_samples: usize,

    /// Sample count at which baseline confidence reaches 1
    pub full_confidence_samples: usize,

    /// Score lost per tolerance unit of adverse deviation
    pub penalty_per_sigma: f64,

    /// Weight of the trend component in the wellness score
    pub trend_weight: f64,

    /// Window scored for trends and averages
    pub evaluation_hours: i64,

    /// Identical recommendations are suppressed for this long
    pub cooldown_secs: i64,

    /// Per-metric weights and comfort bands
    pub metrics: Vec<MetricProfile>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            baseline_days: 30,
            baseline_refresh_secs: 3600,
            min_baseline_samples: 20,
            full_confidence_samples: 50,
            penalty_per_sigma: 25.0,
            trend_weight: 0.2,
            evaluation_hours: 24,
            cooldown_secs: 3600,
            metrics: vec![
                MetricProfile {
                    sensor_type: SensorType::Camera,
                    weight: 0.4,
                    comfort_min: 20.0,
                    comfort_max: 100.0,
                    tolerance: 10.0,
                    polarity: Polarity::HigherIsBetter,
                },
                MetricProfile {
                    sensor_type: SensorType::Microphone,
                    weight: 0.4,
                    comfort_min: 0.0,
                    comfort_max: 50.0,
                    tolerance: 10.0,
                    polarity: Polarity::LowerIsBetter,
                },
                MetricProfile {
                    sensor_type: SensorType::AirQuality,
                    weight: 0.2,
                    comfort_min: 0.0,
                    comfort_max: 100.0,
                    tolerance: 50.0,
                    polarity: Polarity::LowerIsBetter,
                },
            ],
        }
    }
}

impl ContextConfig {
    pub fn validate(&self) -> crate::Result<()> {
        for metric in &self.metrics {
            if metric.weight < 0.0 {
                return Err(Error::ConfigOutOfRange {
                    field: "context.metrics.weight",
                    value: metric.weight.to_string(),
                    range: ">= 0",
                });
            }
            if metric.tolerance <= 0.0 {
                return Err(Error::ConfigOutOfRange {
                    field: "context.metrics.tolerance",
                    value: metric.tolerance.to_string(),
                    range: "> 0",
                });
            }
            if metric.comfort_min > metric.comfort_max {
                return Err(Error::ConfigOutOfRange {
                    field: "context.metrics.comfort_min",
                    value: metric.comfort_min.to_string(),
                    range: "<= comfort_max",
                });
            }
        }
        if self.baseline_refresh_secs < 0 {
            return Err(Error::ConfigOutOfRange {
                field: "context.baseline_refresh_secs",
                value: self.baseline_refresh_secs.to_string(),
                range: ">= 0",
            });
        }
        if self.trend_weight < 0.0 {
            return Err(Error::ConfigOutOfRange {
                field: "context.trend_weight",
                value: self.trend_weight.to_string(),
                range: ">= 0",
            });
        }
        Ok(())
    }

    pub fn profile(&self, sensor_type: SensorType) -> Option<&MetricProfile> {
        self.metrics.iter().find(|m| m.sensor_type == sensor_type)
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Persist readings to SQLite; otherwise keep them in memory
    pub enabled: bool,

    /// Database path
    pub path: PathBuf,

    /// Retention period in days
    pub retention_days: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("./data/verdant.db"),
            retention_days: 90,
        }
    }
}
