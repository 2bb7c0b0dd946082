// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Microphone noise level signal

use std::collections::BTreeMap;

use rand::rngs::StdRng;

use super::hardware::{sample_situation, Situation, SignalProfile};
use super::SensorType;

const ENVIRONMENTS: [Situation; 6] = [
    Situation::new("silent_room", 0.0, 20.0, 0.10),
    Situation::new("quiet_office", 20.0, 35.0, 0.25),
    Situation::new("conversation", 35.0, 50.0, 0.35),
    Situation::new("busy_office", 50.0, 65.0, 0.20),
    Situation::new("noisy_street", 65.0, 80.0, 0.08),
    Situation::new("construction", 80.0, 95.0, 0.02),
];

/// Noise class for a normalized level
pub fn classify_noise(noise_db: f64) -> &'static str {
    match noise_db {
        v if v < 30.0 => "Quiet",
        v if v < 50.0 => "Normal",
        v if v < 70.0 => "Moderate",
        v if v < 85.0 => "Noisy",
        _ => "Very Noisy",
    }
}

/// RMS amplitude to a 0..100 noise level relative to a dBFS reference
#[derive(Debug, Clone, Copy)]
pub struct MicrophoneProfile {
    /// Level in dBFS that maps to 0
    pub reference_db: f64,
}

impl Default for MicrophoneProfile {
    fn default() -> Self {
        Self { reference_db: -60.0 }
    }
}

impl MicrophoneProfile {
    fn values(&self, rms: f64, raw_db: f64, noise_db: f64) -> BTreeMap<String, f64> {
        BTreeMap::from([
            ("noise_db".to_string(), noise_db),
            ("raw_db".to_string(), raw_db),
            ("rms".to_string(), rms),
        ])
    }
}

impl SignalProfile for MicrophoneProfile {
    fn sensor_type(&self) -> SensorType {
        SensorType::Microphone
    }

    fn interpret(&self, raw: f64) -> BTreeMap<String, f64> {
        let rms = raw.abs();
        let raw_db = 20.0 * rms.max(1e-10).log10();
        let span = self.reference_db.abs();
        let noise_db = ((raw_db - self.reference_db) * 100.0 / span).clamp(0.0, 100.0);
        self.values(rms, raw_db, noise_db)
    }

    fn synthesize(&self, rng: &mut StdRng) -> BTreeMap<String, f64> {
        let noise_db = sample_situation(rng, &ENVIRONMENTS);
        let raw_db = self.reference_db + noise_db / 100.0 * self.reference_db.abs();
        let rms = 10f64.powf(raw_db / 20.0);
        self.values(rms, raw_db, noise_db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_rms_to_level() {
        let profile = MicrophoneProfile::default();
        // full scale
        assert!((profile.interpret(1.0)["noise_db"] - 100.0).abs() < 1e-6);
        // -30 dBFS is half way
        let half = profile.interpret(10f64.powf(-30.0 / 20.0));
        assert!((half["noise_db"] - 50.0).abs() < 1e-6);
        assert_eq!(profile.interpret(0.0)["noise_db"], 0.0);
        // Near the reference the level must not drift
        let quiet = profile.interpret(10f64.powf(-59.4 / 20.0));
        assert!((quiet["noise_db"] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_synthetic_values_are_consistent() {
        let profile = MicrophoneProfile::default();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..200 {
            let values = profile.synthesize(&mut rng);
            let level = values["noise_db"];
            assert!((0.0..=95.0).contains(&level));
            let again = profile.interpret(values["rms"]);
            assert!((again["noise_db"] - level).abs() < 1e-6);
        }
    }

    #[test]
    fn test_classification() {
        assert_eq!(classify_noise(10.0), "Quiet");
        assert_eq!(classify_noise(60.0), "Moderate");
        assert_eq!(classify_noise(99.0), "Very Noisy");
    }
}
