// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Camera greenery signal

use std::collections::BTreeMap;

use rand::rngs::StdRng;

use super::hardware::{sample_situation, Situation, SignalProfile};
use super::SensorType;

/// Typical views, weighted toward indoor workspaces
const VIEWS: [Situation; 6] = [
    Situation::new("indoor_no_plants", 0.0, 5.0, 0.25),
    Situation::new("indoor_few_plants", 5.0, 15.0, 0.35),
    Situation::new("indoor_many_plants", 15.0, 30.0, 0.20),
    Situation::new("near_window", 30.0, 50.0, 0.10),
    Situation::new("outdoor_partial", 50.0, 80.0, 0.07),
    Situation::new("outdoor_full", 80.0, 100.0, 0.03),
];

/// Greenery percentage from a frame analysis daemon.
///
/// The daemon reports either a fraction (0..1) or a percentage (0..100).
#[derive(Debug, Clone, Copy, Default)]
pub struct CameraProfile;

impl SignalProfile for CameraProfile {
    fn sensor_type(&self) -> SensorType {
        SensorType::Camera
    }

    fn interpret(&self, raw: f64) -> BTreeMap<String, f64> {
        let pct = if raw <= 1.0 { raw * 100.0 } else { raw };
        BTreeMap::from([("greenery_pct".to_string(), pct.clamp(0.0, 100.0))])
    }

    fn synthesize(&self, rng: &mut StdRng) -> BTreeMap<String, f64> {
        self.interpret(sample_situation(rng, &VIEWS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_fraction_and_percent_inputs() {
        let profile = CameraProfile;
        assert_eq!(profile.interpret(0.25)["greenery_pct"], 25.0);
        assert_eq!(profile.interpret(42.0)["greenery_pct"], 42.0);
        assert_eq!(profile.interpret(250.0)["greenery_pct"], 100.0);
        assert_eq!(profile.interpret(-3.0)["greenery_pct"], 0.0);
    }

    #[test]
    fn test_synthetic_values_favor_indoor_views() {
        let mut rng = StdRng::seed_from_u64(11);
        let values: Vec<f64> = (0..2000)
            .map(|_| CameraProfile.synthesize(&mut rng)["greenery_pct"])
            .collect();

        assert!(values.iter().all(|v| (0.0..=100.0).contains(v)));
        let indoor = values.iter().filter(|v| **v < 30.0).count() as f64 / values.len() as f64;
        assert!(indoor > 0.7, "indoor share {}", indoor);
    }
}
