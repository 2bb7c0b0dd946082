// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Sensor traits and common types

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Sensor types supported by Verdant
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorType {
    /// Camera frames reduced to a greenery percentage
    Camera,
    /// Microphone RMS reduced to a normalized noise level
    Microphone,
    /// MQ-135 style gas sensor
    AirQuality,
}

impl SensorType {
    /// Every supported type, in canonical order
    pub const ALL: [SensorType; 3] = [SensorType::Camera, SensorType::Microphone, SensorType::AirQuality];

    /// Metric used by analytics for this type
    pub fn primary_metric(&self) -> &'static str {
        match self {
            SensorType::Camera => "greenery_pct",
            SensorType::Microphone => "noise_db",
            SensorType::AirQuality => "air_ppm",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            SensorType::Camera => "%",
            SensorType::Microphone => "dB",
            SensorType::AirQuality => "PPM",
        }
    }

    /// Physically meaningful range of the primary metric
    pub fn physical_range(&self) -> (f64, f64) {
        match self {
            SensorType::Camera => (0.0, 100.0),
            SensorType::Microphone => (0.0, 100.0),
            SensorType::AirQuality => (0.0, 500.0),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SensorType::Camera => "camera",
            SensorType::Microphone => "microphone",
            SensorType::AirQuality => "air_quality",
        }
    }

    /// Human name of the quantity measured
    pub fn label(&self) -> &'static str {
        match self {
            SensorType::Camera => "greenery",
            SensorType::Microphone => "noise",
            SensorType::AirQuality => "air quality",
        }
    }

    /// Parse the snake_case name used in storage and on the wire
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

impl fmt::Display for SensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sensor operational status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorStatus {
    Uninitialized,
    /// Hardware detected but not started
    Available,
    Active,
    Error,
    /// Producing synthetic data because hardware is absent
    MockMode,
    Stopped,
}

impl SensorStatus {
    /// States in which `read()` yields data
    pub fn is_readable(&self) -> bool {
        matches!(self, SensorStatus::Active | SensorStatus::MockMode)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SensorStatus::Uninitialized => "uninitialized",
            SensorStatus::Available => "available",
            SensorStatus::Active => "active",
            SensorStatus::Error => "error",
            SensorStatus::MockMode => "mock_mode",
            SensorStatus::Stopped => "stopped",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        [
            SensorStatus::Uninitialized,
            SensorStatus::Available,
            SensorStatus::Active,
            SensorStatus::Error,
            SensorStatus::MockMode,
            SensorStatus::Stopped,
        ]
        .into_iter()
        .find(|s| s.as_str() == name)
    }
}

/// A single sensor reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub sensor_id: String,
    pub sensor_type: SensorType,
    pub values: BTreeMap<String, f64>,
    pub timestamp: DateTime<Utc>,
    pub status: SensorStatus,
    /// True when the values were synthesized rather than captured
    pub synthetic: bool,
    pub sequence: u64,
}

impl SensorReading {
    pub fn new(sensor_id: &str, sensor_type: SensorType, values: BTreeMap<String, f64>) -> Self {
        Self {
            sensor_id: sensor_id.to_string(),
            sensor_type,
            values,
            timestamp: Utc::now(),
            status: SensorStatus::Active,
            synthetic: false,
            sequence: 0,
        }
    }

    /// Reading carrying no values, used to keep snapshots complete when a sensor fails
    pub fn placeholder(sensor_id: &str, sensor_type: SensorType, status: SensorStatus) -> Self {
        Self {
            status,
            ..Self::new(sensor_id, sensor_type, BTreeMap::new())
        }
    }

    pub fn primary_value(&self) -> Option<f64> {
        self.values.get(self.sensor_type.primary_metric()).copied()
    }

    pub fn is_placeholder(&self) -> bool {
        self.values.is_empty()
    }
}

/// Failure bookkeeping the manager keeps per sensor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthRecord {
    pub consecutive_failures: u32,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub total_reads: u64,
    pub total_failures: u64,
    pub recovery_attempts: u32,
    /// When the next recovery probe is due, while in `Error`
    pub next_recovery: Option<DateTime<Utc>>,
}

impl HealthRecord {
    pub fn record_success(&mut self, at: DateTime<Utc>) {
        self.consecutive_failures = 0;
        self.recovery_attempts = 0;
        self.total_reads += 1;
        self.last_success = Some(at);
    }

    pub fn record_failure(&mut self, error: String) {
        self.consecutive_failures += 1;
        self.total_reads += 1;
        self.total_failures += 1;
        self.last_error = Some(error);
    }
}

/// Trait for all sensors
///
/// `start` probes the hardware and settles in `Active`, `MockMode` or `Error`.
/// `read` never retries; failure accounting belongs to the caller.
#[async_trait]
pub trait Sensor: Send + Sync {
    /// Get sensor unique identifier
    fn id(&self) -> &str;

    /// Get sensor type
    fn sensor_type(&self) -> SensorType;

    /// Get current status
    fn status(&self) -> SensorStatus;

    /// Check for hardware without starting; an idle sensor moves to `Available`
    async fn probe(&mut self) -> bool;

    /// Start the sensor. Calling it on a running sensor is a no-op.
    async fn start(&mut self) -> Result<SensorStatus>;

    /// Stop the sensor and release its backend
    async fn stop(&mut self) -> Result<()>;

    /// Produce one reading
    async fn read(&mut self) -> Result<SensorReading>;

    /// Force the sensor into `Error` after its failure budget is spent
    fn mark_error(&mut self, reason: &str);

    /// Re-probe a sensor in `Error`; returns true once it is `Active` again
    async fn recover(&mut self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_metric_lookup() {
        let mut values = BTreeMap::new();
        values.insert("noise_db".to_string(), 42.0);
        values.insert("rms".to_string(), 0.01);
        let reading = SensorReading::new("mic-1", SensorType::Microphone, values);

        assert_eq!(reading.primary_value(), Some(42.0));
        assert!(!reading.is_placeholder());

        let empty = SensorReading::placeholder("cam-1", SensorType::Camera, SensorStatus::Error);
        assert_eq!(empty.primary_value(), None);
        assert_eq!(empty.status, SensorStatus::Error);
    }

    #[test]
    fn test_sensor_type_names() {
        for t in SensorType::ALL {
            assert_eq!(SensorType::parse(t.as_str()), Some(t));
        }
        assert_eq!(serde_json::to_string(&SensorType::AirQuality).unwrap(), "\"air_quality\"");
        assert_eq!(serde_json::to_string(&SensorStatus::MockMode).unwrap(), "\"mock_mode\"");
    }

    #[test]
    fn test_health_record_resets_on_success() {
        let mut health = HealthRecord::default();
        health.record_failure("timeout".into());
        health.record_failure("timeout".into());
        assert_eq!(health.consecutive_failures, 2);

        health.record_success(Utc::now());
        assert_eq!(health.consecutive_failures, 0);
        assert_eq!(health.total_failures, 2);
        assert_eq!(health.total_reads, 3);
    }
}
