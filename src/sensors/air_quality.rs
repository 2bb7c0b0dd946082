// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! MQ-135 air quality signal

use std::collections::BTreeMap;
use std::fmt;

use rand::prelude::*;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use super::hardware::SignalProfile;
use super::SensorType;

/// Full-scale reading of the 10-bit ADC
const ADC_MAX: f64 = 1023.0;

/// PPM at full scale
const MAX_PPM: f64 = 300.0;

/// (center, spread) of typical conditions, drawn uniformly
const CONDITIONS: [(f64, f64); 5] = [
    (30.0, 20.0),
    (75.0, 15.0),
    (125.0, 15.0),
    (175.0, 15.0),
    (250.0, 30.0),
];

/// Air quality classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AirQualityLevel {
    Excellent,
    Good,
    Moderate,
    Poor,
    Hazardous,
}

impl AirQualityLevel {
    pub fn classify(ppm: f64) -> Self {
        match ppm {
            p if p <= 50.0 => AirQualityLevel::Excellent,
            p if p <= 100.0 => AirQualityLevel::Good,
            p if p <= 150.0 => AirQualityLevel::Moderate,
            p if p <= 200.0 => AirQualityLevel::Poor,
            _ => AirQualityLevel::Hazardous,
        }
    }
}

impl fmt::Display for AirQualityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// ADC counts to PPM with a per-device calibration factor
#[derive(Debug, Clone, Copy)]
pub struct AirQualityProfile {
    pub calibration: f64,
}

impl AirQualityProfile {
    pub fn new(calibration: f64) -> Self {
        Self { calibration }
    }
}

impl SignalProfile for AirQualityProfile {
    fn sensor_type(&self) -> SensorType {
        SensorType::AirQuality
    }

    fn interpret(&self, raw: f64) -> BTreeMap<String, f64> {
        let raw = raw.clamp(0.0, ADC_MAX);
        let ppm = (self.calibration * raw / ADC_MAX * MAX_PPM).max(0.0);
        BTreeMap::from([
            ("air_ppm".to_string(), ppm),
            ("raw".to_string(), raw),
        ])
    }

    fn synthesize(&self, rng: &mut StdRng) -> BTreeMap<String, f64> {
        let (center, spread) = CONDITIONS.choose(rng).copied().unwrap_or(CONDITIONS[0]);
        let ppm = (center + rng.gen_range(-spread..spread)).max(0.0);
        BTreeMap::from([
            ("air_ppm".to_string(), ppm),
            ("raw".to_string(), ppm / MAX_PPM * ADC_MAX),
        ])
    }
}
