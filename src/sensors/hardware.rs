// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Hardware-backed sensor with synthetic fallback

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::prelude::*;
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

use super::backend::{detect_backend, HardwareProbe};
use super::{AirQualityProfile, CameraProfile, MicrophoneProfile};
use super::{Sensor, SensorReading, SensorStatus, SensorType};
use crate::config::SensorSettings;
use crate::error::{Error, Result};

/// Converts raw captures into metrics and synthesizes plausible values
pub trait SignalProfile: Send + Sync {
    fn sensor_type(&self) -> SensorType;

    /// Metrics derived from one raw capture
    fn interpret(&self, raw: f64) -> BTreeMap<String, f64>;

    /// Synthetic metrics for mock mode
    fn synthesize(&self, rng: &mut StdRng) -> BTreeMap<String, f64>;
}

/// A real-world situation used to weight synthetic values
#[derive(Debug, Clone, Copy)]
pub struct Situation {
    pub label: &'static str,
    pub low: f64,
    pub high: f64,
    pub weight: f64,
}

impl Situation {
    pub const fn new(label: &'static str, low: f64, high: f64, weight: f64) -> Self {
        Self { label, low, high, weight }
    }
}

/// Draw a value from a weighted set of situations
pub fn sample_situation(rng: &mut StdRng, situations: &[Situation]) -> f64 {
    match situations.choose_weighted(rng, |s| s.weight) {
        Ok(s) if s.high > s.low => rng.gen_range(s.low..s.high),
        Ok(s) => s.low,
        Err(_) => 0.0,
    }
}

/// Sensor driven by a [`HardwareProbe`], interpreted by a [`SignalProfile`]
pub struct HardwareSensor {
    id: String,
    profile: Box<dyn SignalProfile>,
    backend: Arc<Mutex<Box<dyn HardwareProbe>>>,
    backend_name: String,
    status: SensorStatus,
    allow_mock: bool,
    sequence: u64,
    last_timestamp: Option<DateTime<Utc>>,
    rng: StdRng,
}

impl HardwareSensor {
    pub fn new(
        id: &str,
        profile: Box<dyn SignalProfile>,
        backend: Box<dyn HardwareProbe>,
        allow_mock: bool,
    ) -> Self {
        Self {
            id: id.to_string(),
            profile,
            backend_name: backend.name().to_string(),
            backend: Arc::new(Mutex::new(backend)),
            status: SensorStatus::Uninitialized,
            allow_mock,
            sequence: 0,
            last_timestamp: None,
            rng: StdRng::from_entropy(),
        }
    }

    /// Build a sensor from its settings, auto-detecting the backend
    pub fn from_settings(settings: &SensorSettings) -> Self {
        let profile: Box<dyn SignalProfile> = match settings.sensor_type {
            SensorType::Camera => Box::new(CameraProfile),
            SensorType::Microphone => Box::new(MicrophoneProfile::default()),
            SensorType::AirQuality => Box::new(AirQualityProfile::new(settings.calibration)),
        };
        Self::new(&settings.id, profile, detect_backend(settings), settings.allow_mock)
    }

    /// Make synthetic output reproducible
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    async fn with_backend<T, F>(&self, f: F) -> Option<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn HardwareProbe) -> T + Send + 'static,
    {
        let backend = Arc::clone(&self.backend);
        tokio::task::spawn_blocking(move || {
            let mut guard = backend.lock();
            f(&mut **guard)
        })
        .await
        .ok()
    }

    fn next_reading(&mut self, values: BTreeMap<String, f64>, synthetic: bool) -> SensorReading {
        // Wall clock may step backwards; readings must not
        let now = Utc::now();
        let timestamp = match self.last_timestamp {
            Some(prev) if prev > now => prev,
            _ => now,
        };
        self.last_timestamp = Some(timestamp);
        self.sequence += 1;

        SensorReading {
            sensor_id: self.id.clone(),
            sensor_type: self.profile.sensor_type(),
            values,
            timestamp,
            status: self.status,
            synthetic,
            sequence: self.sequence,
        }
    }
}

#[async_trait]
impl Sensor for HardwareSensor {
    fn id(&self) -> &str {
        &self.id
    }

    fn sensor_type(&self) -> SensorType {
        self.profile.sensor_type()
    }

    fn status(&self) -> SensorStatus {
        self.status
    }

    async fn probe(&mut self) -> bool {
        let found = self.with_backend(|b| b.probe()).await.unwrap_or(false);
        if found && matches!(self.status, SensorStatus::Uninitialized | SensorStatus::Stopped) {
            self.status = SensorStatus::Available;
        }
        found
    }

    async fn start(&mut self) -> Result<SensorStatus> {
        if self.status.is_readable() {
            return Ok(self.status);
        }

        if self.with_backend(|b| b.probe()).await.unwrap_or(false) {
            self.status = SensorStatus::Active;
            info!("Sensor {} active on {}", self.id, self.backend_name);
            return Ok(self.status);
        }

        if self.allow_mock {
            self.status = SensorStatus::MockMode;
            warn!(
                "Sensor {}: hardware unavailable ({}), using synthetic data",
                self.id, self.backend_name
            );
            Ok(self.status)
        } else {
            self.status = SensorStatus::Error;
            warn!("Sensor {}: hardware unavailable and synthetic fallback disabled", self.id);
            Err(Error::Hardware {
                sensor: self.id.clone(),
                message: format!("{} did not respond to probe", self.backend_name),
            })
        }
    }

    async fn stop(&mut self) -> Result<()> {
        if self.status != SensorStatus::Stopped {
            self.with_backend(|b| b.release()).await;
            self.status = SensorStatus::Stopped;
            debug!("Sensor {} stopped", self.id);
        }
        Ok(())
    }

    async fn read(&mut self) -> Result<SensorReading> {
        match self.status {
            SensorStatus::Active => {
                let raw = self
                    .with_backend(|b| b.capture())
                    .await
                    .ok_or_else(|| Error::Hardware {
                        sensor: self.id.clone(),
                        message: "capture task panicked".into(),
                    })?
                    .map_err(|e| Error::Hardware {
                        sensor: self.id.clone(),
                        message: e.to_string(),
                    })?;
                let values = self.profile.interpret(raw);
                Ok(self.next_reading(values, false))
            }
            SensorStatus::MockMode => {
                let values = self.profile.synthesize(&mut self.rng);
                Ok(self.next_reading(values, true))
            }
            status => Err(Error::SensorUnavailable {
                sensor: self.id.clone(),
                status,
            }),
        }
    }

    fn mark_error(&mut self, reason: &str) {
        if self.status != SensorStatus::Error {
            warn!("Sensor {} entering error state: {}", self.id, reason);
        }
        self.status = SensorStatus::Error;
    }

    async fn recover(&mut self) -> bool {
        if self.status != SensorStatus::Error {
            return self.status.is_readable();
        }
        if self.with_backend(|b| b.probe()).await.unwrap_or(false) {
            self.status = SensorStatus::Active;
            info!("Sensor {} recovered", self.id);
            true
        } else {
            debug!("Recovery probe failed for {}", self.id);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::backend::ScriptedProbe;

    fn camera(probe: &ScriptedProbe, allow_mock: bool) -> HardwareSensor {
        HardwareSensor::new("cam", Box::new(CameraProfile), Box::new(probe.clone()), allow_mock).with_seed(7)
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let probe = ScriptedProbe::new(true, 0.5);
        let mut sensor = camera(&probe, true);

        assert_eq!(sensor.start().await.unwrap(), SensorStatus::Active);
        assert_eq!(sensor.start().await.unwrap(), SensorStatus::Active);
        assert_eq!(sensor.status(), SensorStatus::Active);

        let reading = sensor.read().await.unwrap();
        assert_eq!(reading.primary_value(), Some(50.0));
        assert!(!reading.synthetic);
    }

    #[tokio::test]
    async fn test_probe_failure_falls_back_to_mock() {
        let probe = ScriptedProbe::new(false, 0.0);
        let mut sensor = camera(&probe, true);

        assert_eq!(sensor.start().await.unwrap(), SensorStatus::MockMode);
        let reading = sensor.read().await.unwrap();
        assert!(reading.synthetic);
        let value = reading.primary_value().unwrap();
        assert!((0.0..=100.0).contains(&value));
        assert_eq!(probe.captures(), 0);
    }

    #[tokio::test]
    async fn test_probe_failure_without_mock_is_error() {
        let probe = ScriptedProbe::new(false, 0.0);
        let mut sensor = camera(&probe, false);

        assert!(sensor.start().await.is_err());
        assert_eq!(sensor.status(), SensorStatus::Error);
        assert!(matches!(
            sensor.read().await,
            Err(Error::SensorUnavailable { status: SensorStatus::Error, .. })
        ));
    }

    #[tokio::test]
    async fn test_stop_releases_and_blocks_reads() {
        let probe = ScriptedProbe::new(true, 0.3);
        let mut sensor = camera(&probe, true);
        sensor.start().await.unwrap();
        sensor.stop().await.unwrap();
        sensor.stop().await.unwrap();

        assert_eq!(probe.releases(), 1);
        assert!(sensor.read().await.is_err());

        assert_eq!(sensor.start().await.unwrap(), SensorStatus::Active);
    }

    #[tokio::test]
    async fn test_recovery_after_error() {
        let probe = ScriptedProbe::new(true, 0.3);
        let mut sensor = camera(&probe, true);
        sensor.start().await.unwrap();

        probe.set_available(false);
        assert!(sensor.read().await.is_err());
        sensor.mark_error("budget exhausted");
        assert!(!sensor.recover().await);
        assert_eq!(sensor.status(), SensorStatus::Error);

        probe.set_available(true);
        assert!(sensor.recover().await);
        assert_eq!(sensor.status(), SensorStatus::Active);
    }

    #[tokio::test]
    async fn test_timestamps_and_sequence_increase() {
        let probe = ScriptedProbe::new(false, 0.0);
        let mut sensor = camera(&probe, true);
        sensor.start().await.unwrap();

        let mut last = sensor.read().await.unwrap();
        for _ in 0..20 {
            let next = sensor.read().await.unwrap();
            assert!(next.timestamp >= last.timestamp);
            assert_eq!(next.sequence, last.sequence + 1);
            last = next;
        }
    }
}
