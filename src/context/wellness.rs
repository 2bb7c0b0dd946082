// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Wellness scoring

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Baseline, MetricProfile, Polarity};
use crate::analysis::TrendDirection;
use crate::sensors::SensorType;

/// Score reported when no metric has data
pub const NEUTRAL_SCORE: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WellnessRating {
    Excellent,
    Good,
    Fair,
    Poor,
    Unknown,
}

impl WellnessRating {
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s >= 90.0 => WellnessRating::Excellent,
            s if s >= 70.0 => WellnessRating::Good,
            s if s >= 50.0 => WellnessRating::Fair,
            _ => WellnessRating::Poor,
        }
    }
}

/// Contribution of one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricScore {
    pub sensor_type: SensorType,
    pub value: f64,
    /// Baseline mean kept inside the comfort band, or the comfort edge
    pub reference: f64,
    /// Deviation in the adverse direction, in tolerance units
    pub adverse_deviation: f64,
    pub score: f64,
    pub weight: f64,
    pub personalized: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WellnessReport {
    pub score: f64,
    pub rating: WellnessRating,
    pub components: Vec<MetricScore>,
    pub trend_score: Option<f64>,
    pub message: String,
    pub computed_at: DateTime<Utc>,
}

impl MetricProfile {
    /// Where scoring measures from: the personal baseline when one exists
    /// (clamped into the comfort band), otherwise the comfort edge on the good side.
    pub fn reference(&self, baseline: Option<&Baseline>) -> f64 {
        match baseline {
            Some(b) => b.mean.clamp(self.comfort_min, self.comfort_max),
            None => match self.polarity {
                Polarity::HigherIsBetter => self.comfort_min,
                Polarity::LowerIsBetter => self.comfort_max,
            },
        }
    }

    /// Deviation from `reference` in the adverse direction, in tolerance units
    pub fn adverse_deviation(&self, value: f64, reference: f64) -> f64 {
        let raw = match self.polarity {
            Polarity::HigherIsBetter => reference - value,
            Polarity::LowerIsBetter => value - reference,
        };
        raw.max(0.0) / self.tolerance.max(f64::EPSILON)
    }

    /// Whether a trend moves this metric toward its good side
    pub fn trend_effect(&self, direction: TrendDirection) -> f64 {
        match (self.polarity, direction) {
            (_, TrendDirection::Stable) => 0.0,
            (Polarity::HigherIsBetter, TrendDirection::Increasing)
            | (Polarity::LowerIsBetter, TrendDirection::Decreasing) => 1.0,
            _ => -1.0,
        }
    }
}

pub fn score_metric(
    profile: &MetricProfile,
    value: f64,
    baseline: Option<&Baseline>,
    penalty_per_sigma: f64,
) -> MetricScore {
    let reference = profile.reference(baseline);
    let adverse_deviation = profile.adverse_deviation(value, reference);
    MetricScore {
        sensor_type: profile.sensor_type,
        value,
        reference,
        adverse_deviation,
        score: (100.0 - penalty_per_sigma * adverse_deviation).clamp(0.0, 100.0),
        weight: profile.weight,
        personalized: baseline.is_some(),
    }
}

/// 50 when flat, moving toward 100 (or 0) as metrics improve (or worsen)
pub fn trend_score(effects: &[f64]) -> Option<f64> {
    if effects.is_empty() {
        return None;
    }
    let net = effects.iter().sum::<f64>() / effects.len() as f64;
    Some((NEUTRAL_SCORE + 50.0 * net).clamp(0.0, 100.0))
}

pub fn combine(
    components: Vec<MetricScore>,
    trend: Option<f64>,
    trend_weight: f64,
    now: DateTime<Utc>,
) -> WellnessReport {
    let weighted: f64 = components.iter().map(|c| c.weight * c.score).sum();
    let total_weight: f64 = components.iter().map(|c| c.weight).sum();

    if components.is_empty() || total_weight <= 0.0 {
        return WellnessReport {
            score: NEUTRAL_SCORE,
            rating: WellnessRating::Unknown,
            components,
            trend_score: trend,
            message: "Not enough data yet. Keep the sensors running to build a picture.".into(),
            computed_at: now,
        };
    }

    let (weighted, total_weight) = match trend {
        Some(t) if trend_weight > 0.0 => (weighted + trend_weight * t, total_weight + trend_weight),
        _ => (weighted, total_weight),
    };
    let score = (weighted / total_weight).clamp(0.0, 100.0);
    let rating = WellnessRating::from_score(score);
    let message = message_for(rating, &components);

    WellnessReport {
        score,
        rating,
        components,
        trend_score: trend,
        message,
        computed_at: now,
    }
}

fn message_for(rating: WellnessRating, components: &[MetricScore]) -> String {
    let weak: Vec<&str> = components
        .iter()
        .filter(|c| c.score < 70.0)
        .map(|c| c.sensor_type.label())
        .collect();

    match rating {
        WellnessRating::Excellent => "Your environment is excellent. Keep it up.".into(),
        WellnessRating::Good if weak.is_empty() => "Your environment is good overall.".into(),
        WellnessRating::Good => format!("Your environment is good. Consider improving {}.", weak.join(" and ")),
        WellnessRating::Fair => format!("Your environment is fair. Focus on: {}.", weak.join(", ")),
        WellnessRating::Poor => "Your environment needs attention. Several factors need improvement.".into(),
        WellnessRating::Unknown => "Not enough data yet.".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ContextConfig;

    fn profile(sensor_type: SensorType) -> MetricProfile {
        ContextConfig::default().profile(sensor_type).cloned().unwrap()
    }

    #[test]
    fn test_comfortable_values_score_full() {
        let camera = score_metric(&profile(SensorType::Camera), 45.0, None, 25.0);
        let noise = score_metric(&profile(SensorType::Microphone), 35.0, None, 25.0);
        assert_eq!(camera.score, 100.0);
        assert_eq!(noise.score, 100.0);

        let report = combine(vec![camera, noise], None, 0.2, Utc::now());
        assert_eq!(report.score, 100.0);
        assert_eq!(report.rating, WellnessRating::Excellent);
    }

    #[test]
    fn test_adverse_deviation_penalized() {
        // 20 dB above the comfort edge with tolerance 10 is two units
        let noise = score_metric(&profile(SensorType::Microphone), 70.0, None, 25.0);
        assert_eq!(noise.adverse_deviation, 2.0);
        assert_eq!(noise.score, 50.0);

        // Quieter than the edge is never penalized
        let quiet = score_metric(&profile(SensorType::Microphone), 5.0, None, 25.0);
        assert_eq!(quiet.score, 100.0);
    }

    #[test]
    fn test_baseline_personalizes_reference() {
        let now = Utc::now();
        let baseline = Baseline::learn(&[60.0; 30], 20, 50, now).unwrap();
        let camera = score_metric(&profile(SensorType::Camera), 40.0, Some(&baseline), 25.0);
        assert_eq!(camera.reference, 60.0);
        assert_eq!(camera.score, 50.0);
        assert!(camera.personalized);
    }

    #[test]
    fn test_trend_and_empty_inputs() {
        assert_eq!(trend_score(&[]), None);
        assert_eq!(trend_score(&[0.0, 0.0]), Some(50.0));
        assert_eq!(trend_score(&[1.0, 1.0]), Some(100.0));
        assert_eq!(trend_score(&[1.0, -1.0, -1.0, -1.0]), Some(25.0));

        let report = combine(Vec::new(), Some(100.0), 0.2, Utc::now());
        assert_eq!(report.score, 50.0);
        assert_eq!(report.rating, WellnessRating::Unknown);
    }

    #[test]
    fn test_trend_weight_blends() {
        let camera = score_metric(&profile(SensorType::Camera), 45.0, None, 25.0);
        // (0.4 * 100 + 0.2 * 50) / 0.6
        let report = combine(vec![camera], Some(50.0), 0.2, Utc::now());
        assert!((report.score - 250.0 / 3.0).abs() < 1e-9);
        assert_eq!(report.rating, WellnessRating::Good);
    }
}
