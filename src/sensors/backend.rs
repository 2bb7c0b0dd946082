// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Hardware backends and auto-detection
//!
//! A backend captures one raw number per call. The pixel, audio and gas
//! chemistry work happens outside this crate; a capture daemon or kernel
//! driver exposes the reduced value as a file, which is what [`FileProbe`]
//! reads.

use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use super::SensorType;
use crate::config::SensorSettings;

/// Synchronous hardware access. Calls may block; callers run them off the async runtime.
pub trait HardwareProbe: Send {
    /// Short backend name for logs
    fn name(&self) -> &str;

    /// Open the device and check it answers
    fn probe(&mut self) -> bool;

    /// Capture one raw value
    fn capture(&mut self) -> io::Result<f64>;

    /// Release the device handle
    fn release(&mut self);
}

/// Reads a single numeric value from a device or export file
pub struct FileProbe {
    name: String,
    path: PathBuf,
    open: bool,
}

impl FileProbe {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            name: format!("file:{}", path.display()),
            path,
            open: false,
        }
    }

    fn read_value(path: &Path) -> io::Result<f64> {
        let text = std::fs::read_to_string(path)?;
        let value = text
            .trim()
            .parse::<f64>()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("{}: {}", path.display(), e)))?;
        if !value.is_finite() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{}: non-finite value {}", path.display(), value),
            ));
        }
        Ok(value)
    }
}

impl HardwareProbe for FileProbe {
    fn name(&self) -> &str {
        &self.name
    }

    fn probe(&mut self) -> bool {
        self.open = Self::read_value(&self.path).is_ok();
        self.open
    }

    fn capture(&mut self) -> io::Result<f64> {
        if !self.open {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "device not open"));
        }
        Self::read_value(&self.path)
    }

    fn release(&mut self) {
        self.open = false;
    }
}

/// Backend that never finds hardware
pub struct UnavailableProbe {
    reason: String,
}

impl UnavailableProbe {
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

impl HardwareProbe for UnavailableProbe {
    fn name(&self) -> &str {
        &self.reason
    }

    fn probe(&mut self) -> bool {
        false
    }

    fn capture(&mut self) -> io::Result<f64> {
        Err(io::Error::new(io::ErrorKind::NotFound, self.reason.clone()))
    }

    fn release(&mut self) {}
}

#[derive(Debug, Default)]
struct ScriptState {
    available: bool,
    values: VecDeque<f64>,
    fallback: f64,
    failing: bool,
    delay: Option<Duration>,
    captures: u64,
    releases: u64,
}

/// Programmable backend for demos and tests
///
/// Clones share state, so a test can keep one handle and hand the other to a sensor.
#[derive(Clone, Debug)]
pub struct ScriptedProbe {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedProbe {
    pub fn new(available: bool, fallback: f64) -> Self {
        Self {
            state: Arc::new(Mutex::new(ScriptState {
                available,
                fallback,
                ..Default::default()
            })),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.state.lock().available = available;
    }

    /// Make every capture fail until cleared
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().failing = failing;
    }

    /// Block each capture for `delay`
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.state.lock().delay = delay;
    }

    pub fn push_values(&self, values: impl IntoIterator<Item = f64>) {
        self.state.lock().values.extend(values);
    }

    pub fn captures(&self) -> u64 {
        self.state.lock().captures
    }

    pub fn releases(&self) -> u64 {
        self.state.lock().releases
    }
}

impl HardwareProbe for ScriptedProbe {
    fn name(&self) -> &str {
        "scripted"
    }

    fn probe(&mut self) -> bool {
        self.state.lock().available
    }

    fn capture(&mut self) -> io::Result<f64> {
        let delay = self.state.lock().delay;
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }

        let mut state = self.state.lock();
        state.captures += 1;
        if state.failing || !state.available {
            return Err(io::Error::new(io::ErrorKind::Other, "scripted failure"));
        }
        let fallback = state.fallback;
        Ok(state.values.pop_front().unwrap_or(fallback))
    }

    fn release(&mut self) {
        self.state.lock().releases += 1;
    }
}

/// Device files checked, in order, when no explicit device is configured
pub fn candidate_paths(sensor_type: SensorType) -> &'static [&'static str] {
    match sensor_type {
        SensorType::Camera => &[
            "/run/verdant/camera/greenery",
            "/var/lib/verdant/camera/greenery",
        ],
        SensorType::Microphone => &[
            "/run/verdant/microphone/rms",
            "/var/lib/verdant/microphone/rms",
        ],
        SensorType::AirQuality => &[
            "/sys/bus/iio/devices/iio:device0/in_voltage0_raw",
            "/run/verdant/air_quality/raw",
        ],
    }
}

/// Pick a backend for a sensor.
///
/// Order: `force_mock`, then the explicit `device`, then the first existing
/// candidate path for the type, then an unavailable backend.
pub fn detect_backend(settings: &SensorSettings) -> Box<dyn HardwareProbe> {
    if settings.force_mock {
        return Box::new(UnavailableProbe::new("forced synthetic mode"));
    }

    if let Some(device) = &settings.device {
        return Box::new(FileProbe::new(device.clone()));
    }

    if let Some(path) = candidate_paths(settings.sensor_type)
        .iter()
        .map(Path::new)
        .find(|p| p.exists())
    {
        debug!("Auto-detected {} for {}", path.display(), settings.id);
        return Box::new(FileProbe::new(path));
    }

    Box::new(UnavailableProbe::new("no hardware detected"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_probe_reads_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw");
        std::fs::write(&path, "512\n").unwrap();

        let mut probe = FileProbe::new(&path);
        assert!(probe.capture().is_err());
        assert!(probe.probe());
        assert_eq!(probe.capture().unwrap(), 512.0);

        std::fs::write(&path, "garbage").unwrap();
        assert!(probe.capture().is_err());

        probe.release();
        assert!(probe.capture().is_err());
    }

    #[test]
    fn test_file_probe_rejects_non_finite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw");
        std::fs::write(&path, "NaN").unwrap();

        let mut probe = FileProbe::new(&path);
        assert!(!probe.probe());

        std::fs::write(&path, "12.5").unwrap();
        assert!(probe.probe());
        for text in ["nan", "inf", "-infinity"] {
            std::fs::write(&path, text).unwrap();
            let err = probe.capture().unwrap_err();
            assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        }
    }

    #[test]
    fn test_detection_order() {
        let mut settings = SensorSettings::for_type(SensorType::Camera);
        settings.force_mock = true;
        settings.device = Some(PathBuf::from("/dev/null"));
        assert!(!detect_backend(&settings).probe());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("greenery");
        std::fs::write(&path, "0.42").unwrap();
        settings.force_mock = false;
        settings.device = Some(path);
        let mut backend = detect_backend(&settings);
        assert!(backend.probe());
        assert_eq!(backend.capture().unwrap(), 0.42);
    }

    #[test]
    fn test_scripted_probe_shares_state() {
        let handle = ScriptedProbe::new(true, 7.0);
        let mut probe = handle.clone();
        handle.push_values([1.0, 2.0]);

        assert_eq!(probe.capture().unwrap(), 1.0);
        assert_eq!(probe.capture().unwrap(), 2.0);
        assert_eq!(probe.capture().unwrap(), 7.0);

        handle.set_failing(true);
        assert!(probe.capture().is_err());
        assert_eq!(handle.captures(), 4);
    }
}
