//! Sensor module - hardware adapters, simulation and orchestration

mod air_quality;
pub mod backend;
mod camera;
mod hardware;
mod manager;
mod microphone;
mod simulation;
mod system;
mod traits;

pub use air_quality::{AirQualityLevel, AirQualityProfile};
pub use backend::{detect_backend, HardwareProbe, ScriptedProbe};
pub use camera::CameraProfile;
pub use hardware::{HardwareSensor, SignalProfile, Situation};
pub use manager::{HealthLevel, ManagerStatus, SensorManager, SensorView, StartupReport, SystemHealth};
pub use microphone::{classify_noise, MicrophoneProfile};
pub use simulation::{
    canonical_scenario, CorrelationRule, MetricBounds, ScenarioInfo, ScenarioOverrides, ScenarioProfile,
    SimulationController, SimulationStatus, SCENARIOS,
};
pub use system::{SystemMetrics, SystemMonitor};
pub use traits::{HealthRecord, Sensor, SensorReading, SensorStatus, SensorType};

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Latest reading of every configured sensor plus host metrics, published once per tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    /// Tick counter, increasing by one per publication
    pub sequence: u64,
    pub readings: BTreeMap<SensorType, SensorReading>,
    pub system: SystemMetrics,
    /// Active scenario when the values came from the simulation controller
    pub scenario: Option<String>,
}

impl Snapshot {
    /// Snapshot published before the first tick
    pub fn empty() -> Self {
        Self {
            timestamp: Utc::now(),
            sequence: 0,
            readings: BTreeMap::new(),
            system: SystemMetrics::default(),
            scenario: None,
        }
    }

    pub fn value(&self, sensor_type: SensorType) -> Option<f64> {
        self.readings.get(&sensor_type).and_then(|r| r.primary_value())
    }
}
