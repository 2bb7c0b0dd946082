// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Scenario-driven synthetic data for every metric at once

use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::info;

use super::SensorType;
use crate::config::SimulationConfig;
use crate::error::{Error, Result};

/// Canonical scenario names
pub const SCENARIOS: [&str; 4] = ["calm", "stress", "dynamic", "custom"];

/// Inclusive value range for one metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricBounds {
    pub min: f64,
    pub max: f64,
}

impl MetricBounds {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn midpoint(&self) -> f64 {
        (self.min + self.max) / 2.0
    }

    pub fn width(&self) -> f64 {
        self.max - self.min
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Couples metrics so they move together.
///
/// Metrics in `inverse` move opposite the leader, all others with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationRule {
    pub leader: SensorType,
    pub inverse: Vec<SensorType>,
}

impl CorrelationRule {
    fn sign(&self, sensor_type: SensorType) -> f64 {
        if self.inverse.contains(&sensor_type) {
            -1.0
        } else {
            1.0
        }
    }
}

/// Parameters of one scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioProfile {
    pub name: String,
    pub bounds: BTreeMap<SensorType, MetricBounds>,
    /// Jitter as a fraction of each metric's band width
    pub noise_amplitude: f64,
    /// Oscillation period; `None` draws uniformly inside the bounds
    pub period: Option<Duration>,
    pub correlation: Option<CorrelationRule>,
}

impl ScenarioProfile {
    pub fn calm() -> Self {
        Self {
            name: "calm".into(),
            bounds: BTreeMap::from([
                (SensorType::Camera, MetricBounds::new(60.0, 90.0)),
                (SensorType::Microphone, MetricBounds::new(20.0, 40.0)),
                (SensorType::AirQuality, MetricBounds::new(20.0, 60.0)),
            ]),
            noise_amplitude: 0.05,
            period: None,
            correlation: None,
        }
    }

    pub fn stress() -> Self {
        Self {
            name: "stress".into(),
            bounds: BTreeMap::from([
                (SensorType::Camera, MetricBounds::new(5.0, 20.0)),
                (SensorType::Microphone, MetricBounds::new(70.0, 95.0)),
                (SensorType::AirQuality, MetricBounds::new(150.0, 220.0)),
            ]),
            noise_amplitude: 0.05,
            period: None,
            correlation: None,
        }
    }

    /// Swings between the stress and calm averages
    pub fn dynamic(period: Duration) -> Self {
        Self {
            name: "dynamic".into(),
            bounds: BTreeMap::from([
                (SensorType::Camera, MetricBounds::new(12.5, 75.0)),
                (SensorType::Microphone, MetricBounds::new(30.0, 82.5)),
                (SensorType::AirQuality, MetricBounds::new(40.0, 185.0)),
            ]),
            noise_amplitude: 0.08,
            period: Some(period),
            correlation: Some(CorrelationRule {
                leader: SensorType::Camera,
                inverse: vec![SensorType::Microphone, SensorType::AirQuality],
            }),
        }
    }

    /// Full physical ranges; starting point for custom overrides
    pub fn unconstrained() -> Self {
        Self {
            name: "custom".into(),
            bounds: SensorType::ALL
                .into_iter()
                .map(|t| {
                    let (min, max) = t.physical_range();
                    (t, MetricBounds::new(min, max))
                })
                .collect(),
            noise_amplitude: 0.05,
            period: None,
            correlation: None,
        }
    }

    pub fn bounds_for(&self, sensor_type: SensorType) -> Option<MetricBounds> {
        self.bounds.get(&sensor_type).copied()
    }
}

/// Caller-supplied parameters for the custom scenario
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioOverrides {
    #[serde(default)]
    pub bounds: BTreeMap<SensorType, MetricBounds>,
    pub noise_amplitude: Option<f64>,
    pub period_secs: Option<f64>,
    pub correlation: Option<CorrelationRule>,
}

/// Descriptor returned by [`SimulationController::available_scenarios`]
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioInfo {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub greenery: &'static str,
    pub noise: &'static str,
}

/// Point-in-time view of the controller
#[derive(Debug, Clone, Serialize)]
pub struct SimulationStatus {
    pub active: bool,
    pub scenario: String,
    pub started_at: Option<DateTime<Utc>>,
    pub uptime_secs: Option<f64>,
    /// "calm" or "stress" half of the dynamic cycle
    pub dynamic_phase: Option<&'static str>,
}

/// Normalize a requested name onto one of [`SCENARIOS`]
pub fn canonical_scenario(name: &str) -> Result<&'static str> {
    let normalized = name.trim().to_ascii_lowercase().replace('-', "_");
    let canonical = match normalized.as_str() {
        "calm" | "calm_flow" => "calm",
        "stress" | "high_stress" => "stress",
        "dynamic" => "dynamic",
        "custom" => "custom",
        _ => {
            return Err(Error::UnknownScenario {
                name: name.to_string(),
                valid: SCENARIOS.iter().map(|s| s.to_string()).collect(),
            })
        }
    };
    Ok(canonical)
}

/// Generates correlated values for all metrics according to the active scenario
pub struct SimulationController {
    dynamic_period: Duration,
    profile: ScenarioProfile,
    active: bool,
    started: Option<Instant>,
    started_at: Option<DateTime<Utc>>,
    last_phase: f64,
    rng: StdRng,
}

impl SimulationController {
    pub fn new(config: &SimulationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let dynamic_period = Duration::from_secs_f64(config.dynamic_period_secs.max(1.0));
        Self {
            dynamic_period,
            profile: ScenarioProfile::calm(),
            active: false,
            started: None,
            started_at: None,
            last_phase: 0.0,
            rng,
        }
    }

    /// Validate a scenario request and build its profile without changing state
    pub fn resolve(&self, name: &str, overrides: Option<&ScenarioOverrides>) -> Result<ScenarioProfile> {
        match canonical_scenario(name)? {
            "calm" => Ok(ScenarioProfile::calm()),
            "stress" => Ok(ScenarioProfile::stress()),
            "dynamic" => Ok(ScenarioProfile::dynamic(self.dynamic_period)),
            _ => custom_profile(overrides),
        }
    }

    /// Enter or switch scenario. Switching while active restarts the cycle.
    pub fn start(&mut self, profile: ScenarioProfile) {
        info!(
            "Simulation {} scenario '{}'",
            if self.active { "switched to" } else { "started with" },
            profile.name
        );
        self.profile = profile;
        self.active = true;
        self.started = Some(Instant::now());
        self.started_at = Some(Utc::now());
        self.last_phase = 0.0;
    }

    pub fn stop(&mut self) {
        if self.active {
            info!("Simulation stopped");
        }
        self.active = false;
        self.started = None;
        self.started_at = None;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn scenario(&self) -> &ScenarioProfile {
        &self.profile
    }

    /// Values for every metric at the current point of the cycle
    pub fn generate(&mut self) -> BTreeMap<SensorType, f64> {
        let elapsed = self.started.map(|s| s.elapsed()).unwrap_or_default();
        self.generate_at(elapsed)
    }

    /// Values for every metric `elapsed` into the scenario
    pub fn generate_at(&mut self, elapsed: Duration) -> BTreeMap<SensorType, f64> {
        let profile = &self.profile;
        let rng = &mut self.rng;

        let (phase, shared) = match profile.period {
            Some(period) => {
                let phase = (2.0 * PI * elapsed.as_secs_f64() / period.as_secs_f64()).sin();
                self.last_phase = phase;
                (phase, 0.0)
            }
            None => (0.0, rng.gen_range(-1.0..=1.0)),
        };

        profile
            .bounds
            .iter()
            .map(|(&sensor_type, bounds)| {
                let sign = profile
                    .correlation
                    .as_ref()
                    .map(|c| c.sign(sensor_type))
                    .unwrap_or(1.0);
                let jitter = profile.noise_amplitude * bounds.width();
                let noise = match Normal::new(0.0, jitter / 2.0) {
                    Ok(normal) if jitter > 0.0 => normal.sample(rng),
                    _ => 0.0,
                };

                let position = match (profile.period, &profile.correlation) {
                    (Some(_), _) => sign * phase,
                    (None, Some(_)) => sign * shared,
                    (None, None) => rng.gen_range(-1.0..=1.0),
                };
                let value = bounds.midpoint() + position * bounds.width() / 2.0 + noise;
                (sensor_type, bounds.clamp(value))
            })
            .collect()
    }

    pub fn available_scenarios() -> Vec<ScenarioInfo> {
        vec![
            ScenarioInfo {
                id: "calm",
                name: "Calm Flow",
                description: "High greenery, low noise, clean air. Ideal workspace conditions.",
                greenery: "60-90%",
                noise: "20-40 dB",
            },
            ScenarioInfo {
                id: "stress",
                name: "High Stress",
                description: "Low greenery, high noise, poor air. Stressful environment.",
                greenery: "5-20%",
                noise: "70-95 dB",
            },
            ScenarioInfo {
                id: "dynamic",
                name: "Dynamic",
                description: "Oscillates between calm and stress over time.",
                greenery: "Variable",
                noise: "Variable",
            },
            ScenarioInfo {
                id: "custom",
                name: "Custom",
                description: "Caller-defined bounds, noise and period.",
                greenery: "Custom",
                noise: "Custom",
            },
        ]
    }

    pub fn status(&self) -> SimulationStatus {
        let dynamic_phase = (self.active && self.profile.period.is_some())
            .then(|| if self.last_phase >= 0.0 { "calm" } else { "stress" });
        SimulationStatus {
            active: self.active,
            scenario: self.profile.name.clone(),
            started_at: self.started_at,
            uptime_secs: self.started.map(|s| s.elapsed().as_secs_f64()),
            dynamic_phase,
        }
    }
}

fn custom_profile(overrides: Option<&ScenarioOverrides>) -> Result<ScenarioProfile> {
    let mut profile = ScenarioProfile::unconstrained();
    let Some(overrides) = overrides else {
        return Ok(profile);
    };

    for (&sensor_type, bounds) in &overrides.bounds {
        let (lo, hi) = sensor_type.physical_range();
        if !(bounds.min.is_finite() && bounds.max.is_finite()) || bounds.min > bounds.max {
            return Err(Error::InvalidScenarioParameters(format!(
                "{} bounds {}..{} are not an ordered range",
                sensor_type, bounds.min, bounds.max
            )));
        }
        if bounds.min < lo || bounds.max > hi {
            return Err(Error::InvalidScenarioParameters(format!(
                "{} bounds {}..{} exceed {}..{}",
                sensor_type, bounds.min, bounds.max, lo, hi
            )));
        }
        profile.bounds.insert(sensor_type, *bounds);
    }

    if let Some(noise) = overrides.noise_amplitude {
        if !(0.0..=0.5).contains(&noise) {
            return Err(Error::InvalidScenarioParameters(format!(
                "noise amplitude {} outside 0..0.5",
                noise
            )));
        }
        profile.noise_amplitude = noise;
    }

    if let Some(secs) = overrides.period_secs {
        if !(secs.is_finite() && secs > 0.0) {
            return Err(Error::InvalidScenarioParameters(format!("period {} must be positive", secs)));
        }
        profile.period = Some(Duration::from_secs_f64(secs));
    }

    profile.correlation = overrides.correlation.clone();
    Ok(profile)
}
