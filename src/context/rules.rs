// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Recommendation rules
//!
//! Each rule looks at a shared read-only [`RuleContext`] and produces at most
//! one recommendation. Rules are evaluated in registration order.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Baseline, MetricProfile};
use crate::analysis::{mean, TrendResult};
use crate::sensors::{SensorType, Snapshot};

/// Fewer samples than this in the evaluation window counts as sparse monitoring
pub const MIN_MONITORING_SAMPLES: usize = 5;

/// Baseline used by the greenery rule until a personal one is learned
pub const DEFAULT_GREENERY_BASELINE: f64 = 15.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "high" => Some(Priority::High),
            "medium" => Some(Priority::Medium),
            "low" => Some(Priority::Low),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: Uuid,
    /// Name of the rule that produced it
    pub rule: String,
    pub title: String,
    pub message: String,
    pub priority: Priority,
    /// Metrics that triggered the rule
    pub metrics: Vec<SensorType>,
    pub actions: Vec<String>,
    pub confidence: f64,
    pub generated_at: DateTime<Utc>,
}

impl Recommendation {
    /// Identity used for cooldown suppression
    pub fn key(&self) -> String {
        format!("{}:{}", self.rule, self.priority)
    }
}

/// Everything a rule may look at
pub struct RuleContext<'a> {
    pub now: DateTime<Utc>,
    pub snapshot: &'a Snapshot,
    /// Primary-metric history over the evaluation window
    pub recent: &'a BTreeMap<SensorType, Vec<(DateTime<Utc>, f64)>>,
    pub baselines: &'a BTreeMap<SensorType, Baseline>,
    pub trends: &'a BTreeMap<SensorType, TrendResult>,
    pub profiles: &'a [MetricProfile],
}

impl<'a> RuleContext<'a> {
    /// Live value, or the recent average when the snapshot lacks the sensor
    pub fn level(&self, sensor_type: SensorType) -> Option<f64> {
        self.snapshot.value(sensor_type).or_else(|| {
            let values: Vec<f64> = self.recent.get(&sensor_type)?.iter().map(|&(_, v)| v).collect();
            (!values.is_empty()).then(|| mean(&values))
        })
    }

    pub fn baseline(&self, sensor_type: SensorType) -> Option<&Baseline> {
        self.baselines.get(&sensor_type)
    }

    pub fn trend(&self, sensor_type: SensorType) -> Option<&TrendResult> {
        self.trends.get(&sensor_type)
    }

    pub fn samples(&self, sensor_type: SensorType) -> usize {
        self.recent.get(&sensor_type).map_or(0, Vec::len)
    }

    pub fn profile(&self, sensor_type: SensorType) -> Option<&MetricProfile> {
        self.profiles.iter().find(|p| p.sensor_type == sensor_type)
    }

    #[allow(clippy::too_many_arguments)]
    fn recommend(
        &self,
        rule: &str,
        priority: Priority,
        title: &str,
        message: String,
        metrics: Vec<SensorType>,
        actions: &[&str],
        confidence: f64,
    ) -> Recommendation {
        Recommendation {
            id: Uuid::new_v4(),
            rule: rule.to_string(),
            title: title.to_string(),
            message,
            priority,
            metrics,
            actions: actions.iter().map(|a| a.to_string()).collect(),
            confidence,
            generated_at: self.now,
        }
    }
}

pub trait RecommendationRule: Send + Sync {
    fn name(&self) -> &'static str;

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<Recommendation>;
}

/// Rules in evaluation order
pub fn default_rules() -> Vec<Box<dyn RecommendationRule>> {
    vec![
        Box::new(GreeneryRule),
        Box::new(NoiseRule),
        Box::new(AirQualityRule),
        Box::new(WorseningTrendRule),
        Box::new(MonitoringConsistencyRule),
        Box::new(GeneralWellnessRule),
    ]
}

pub struct GreeneryRule;

impl RecommendationRule for GreeneryRule {
    fn name(&self) -> &'static str {
        "greenery"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<Recommendation> {
        let level = ctx.level(SensorType::Camera)?;
        if level < 10.0 {
            return Some(ctx.recommend(
                self.name(),
                Priority::High,
                "Very low greenery detected",
                format!("Your workspace greenery is at {:.1}%, well below healthy levels", level),
                vec![SensorType::Camera],
                &[
                    "Add at least one desk plant (pothos or snake plant are low-maintenance)",
                    "Position desk near a window if possible",
                    "Consider a green wallpaper or nature poster",
                ],
                0.9,
            ));
        }

        let usual = ctx
            .baseline(SensorType::Camera)
            .map_or(DEFAULT_GREENERY_BASELINE, |b| b.mean);
        if level < 15.0 && level < usual * 0.7 {
            return Some(ctx.recommend(
                self.name(),
                Priority::Medium,
                "Greenery below your baseline",
                format!("Current greenery ({:.1}%) is below your usual level ({:.1}%)", level, usual),
                vec![SensorType::Camera],
                &[
                    "Check if plants need watering or repositioning",
                    "Add seasonal plants or flowers",
                    "Ensure natural light reaches your workspace",
                ],
                0.75,
            ));
        }
        None
    }
}

pub struct NoiseRule;

impl RecommendationRule for NoiseRule {
    fn name(&self) -> &'static str {
        "noise"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<Recommendation> {
        let level = ctx.level(SensorType::Microphone)?;
        if level > 70.0 {
            Some(ctx.recommend(
                self.name(),
                Priority::High,
                "High noise levels detected",
                format!("Noise level is {:.1} dB, which may impact concentration", level),
                vec![SensorType::Microphone],
                &[
                    "Use noise-cancelling headphones during focus work",
                    "Add soft furnishings to absorb sound",
                    "Consider white noise or ambient sounds",
                    "Identify and reduce noise sources if possible",
                ],
                0.85,
            ))
        } else if level > 60.0 {
            Some(ctx.recommend(
                self.name(),
                Priority::Medium,
                "Moderate noise levels",
                format!("Noise at {:.1} dB may occasionally distract", level),
                vec![SensorType::Microphone],
                &[
                    "Use background music or white noise",
                    "Schedule focus time during quieter hours",
                    "Consider soft earplugs for deep work",
                ],
                0.7,
            ))
        } else {
            None
        }
    }
}

pub struct AirQualityRule;

impl RecommendationRule for AirQualityRule {
    fn name(&self) -> &'static str {
        "air_quality"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<Recommendation> {
        let level = ctx.level(SensorType::AirQuality)?;
        if level > 200.0 {
            Some(ctx.recommend(
                self.name(),
                Priority::High,
                "Poor air quality",
                format!("Air quality reads {:.0} PPM, well above comfortable levels", level),
                vec![SensorType::AirQuality],
                &[
                    "Open a window or increase ventilation now",
                    "Look for sources such as cooking, solvents or cleaning products",
                    "Consider an air purifier for this room",
                ],
                0.85,
            ))
        } else if level > 100.0 {
            Some(ctx.recommend(
                self.name(),
                Priority::Medium,
                "Stale air",
                format!("Air quality at {:.0} PPM suggests the room needs fresh air", level),
                vec![SensorType::AirQuality],
                &["Ventilate for a few minutes every hour", "Add air-purifying plants"],
                0.7,
            ))
        } else {
            None
        }
    }
}

/// Fires when any metric trends toward its adverse side
pub struct WorseningTrendRule;

impl RecommendationRule for WorseningTrendRule {
    fn name(&self) -> &'static str {
        "worsening_trend"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<Recommendation> {
        let worsening: Vec<(SensorType, f64)> = ctx
            .profiles
            .iter()
            .filter_map(|p| {
                let trend = ctx.trend(p.sensor_type)?;
                (p.trend_effect(trend.direction) < 0.0).then_some((p.sensor_type, trend.confidence))
            })
            .collect();
        if worsening.is_empty() {
            return None;
        }

        let names: Vec<&str> = worsening.iter().map(|(t, _)| t.label()).collect();
        let confidence = worsening.iter().map(|&(_, c)| c).sum::<f64>() / worsening.len() as f64;
        Some(ctx.recommend(
            self.name(),
            Priority::Medium,
            "Conditions are getting worse",
            format!("Your {} has been trending in the wrong direction", names.join(" and ")),
            worsening.iter().map(|&(t, _)| t).collect(),
            &[
                "Compare today's setup with a day that felt better",
                "Check whether something changed in the room recently",
            ],
            confidence.clamp(0.0, 1.0),
        ))
    }
}

pub struct MonitoringConsistencyRule;

impl RecommendationRule for MonitoringConsistencyRule {
    fn name(&self) -> &'static str {
        "monitoring_consistency"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<Recommendation> {
        let sparse = ctx
            .profiles
            .iter()
            .all(|p| ctx.samples(p.sensor_type) < MIN_MONITORING_SAMPLES);
        if !sparse {
            return None;
        }

        Some(ctx.recommend(
            self.name(),
            Priority::Low,
            "Increase monitoring consistency",
            "More frequent monitoring helps detect patterns and trends".to_string(),
            ctx.profiles.iter().map(|p| p.sensor_type).collect(),
            &[
                "Enable automatic sensor polling",
                "Check wellness dashboard daily",
                "Review weekly reports",
            ],
            0.8,
        ))
    }
}

pub struct GeneralWellnessRule;

impl RecommendationRule for GeneralWellnessRule {
    fn name(&self) -> &'static str {
        "general_wellness"
    }

    fn evaluate(&self, ctx: &RuleContext<'_>) -> Option<Recommendation> {
        Some(ctx.recommend(
            self.name(),
            Priority::Low,
            "Maintain workspace wellness",
            "Regular breaks and environmental awareness support overall wellbeing".to_string(),
            Vec::new(),
            &[
                "Take 5-minute breaks every hour",
                "Practice the 20-20-20 rule for eye health",
                "Adjust lighting to reduce glare",
                "Stay hydrated throughout the day",
            ],
            0.9,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::TrendDirection;
    use crate::config::ContextConfig;
    use crate::sensors::SensorReading;

    struct Fixture {
        snapshot: Snapshot,
        recent: BTreeMap<SensorType, Vec<(DateTime<Utc>, f64)>>,
        baselines: BTreeMap<SensorType, Baseline>,
        trends: BTreeMap<SensorType, TrendResult>,
        profiles: Vec<MetricProfile>,
    }

    impl Fixture {
        fn new(values: &[(SensorType, f64)]) -> Self {
            let mut snapshot = Snapshot::empty();
            for &(sensor_type, value) in values {
                snapshot.readings.insert(
                    sensor_type,
                    SensorReading::new(
                        "test",
                        sensor_type,
                        BTreeMap::from([(sensor_type.primary_metric().to_string(), value)]),
                    ),
                );
            }
            Self {
                snapshot,
                recent: BTreeMap::new(),
                baselines: BTreeMap::new(),
                trends: BTreeMap::new(),
                profiles: ContextConfig::default().metrics,
            }
        }

        fn ctx(&self) -> RuleContext<'_> {
            RuleContext {
                now: Utc::now(),
                snapshot: &self.snapshot,
                recent: &self.recent,
                baselines: &self.baselines,
                trends: &self.trends,
                profiles: &self.profiles,
            }
        }
    }

    #[test]
    fn test_greenery_tiers() {
        let low = Fixture::new(&[(SensorType::Camera, 8.0)]);
        assert_eq!(GreeneryRule.evaluate(&low.ctx()).unwrap().priority, Priority::High);

        // 10.2 < 0.7 * 15
        let below = Fixture::new(&[(SensorType::Camera, 10.2)]);
        assert_eq!(GreeneryRule.evaluate(&below.ctx()).unwrap().priority, Priority::Medium);

        let mut personal = Fixture::new(&[(SensorType::Camera, 12.0)]);
        assert!(GreeneryRule.evaluate(&personal.ctx()).is_none());
        personal
            .baselines
            .insert(SensorType::Camera, Baseline::learn(&[40.0; 30], 20, 50, Utc::now()).unwrap());
        assert_eq!(GreeneryRule.evaluate(&personal.ctx()).unwrap().priority, Priority::Medium);

        assert!(GreeneryRule.evaluate(&Fixture::new(&[]).ctx()).is_none());
    }

    #[test]
    fn test_noise_and_air_thresholds() {
        let loud = Fixture::new(&[(SensorType::Microphone, 75.0), (SensorType::AirQuality, 150.0)]);
        let noise = NoiseRule.evaluate(&loud.ctx()).unwrap();
        assert_eq!(noise.priority, Priority::High);
        assert_eq!(noise.metrics, vec![SensorType::Microphone]);
        assert_eq!(noise.key(), "noise:high");
        assert_eq!(AirQualityRule.evaluate(&loud.ctx()).unwrap().priority, Priority::Medium);

        let calm = Fixture::new(&[(SensorType::Microphone, 45.0), (SensorType::AirQuality, 60.0)]);
        assert!(NoiseRule.evaluate(&calm.ctx()).is_none());
        assert!(AirQualityRule.evaluate(&calm.ctx()).is_none());
    }

    #[test]
    fn test_level_falls_back_to_recent_mean() {
        let mut fixture = Fixture::new(&[]);
        let now = Utc::now();
        fixture
            .recent
            .insert(SensorType::Microphone, vec![(now, 60.0), (now, 70.0), (now, 80.0)]);
        assert_eq!(fixture.ctx().level(SensorType::Microphone), Some(70.0));
        assert_eq!(NoiseRule.evaluate(&fixture.ctx()).unwrap().priority, Priority::Medium);
    }

    #[test]
    fn test_worsening_trend_respects_polarity() {
        let trend = |direction| TrendResult {
            direction,
            slope: 1.0,
            confidence: 0.8,
            relative_change: 0.5,
            points: 6,
        };

        let mut fixture = Fixture::new(&[]);
        // Rising greenery is good, rising noise is bad
        fixture.trends.insert(SensorType::Camera, trend(TrendDirection::Increasing));
        fixture.trends.insert(SensorType::Microphone, trend(TrendDirection::Increasing));
        let rec = WorseningTrendRule.evaluate(&fixture.ctx()).unwrap();
        assert_eq!(rec.metrics, vec![SensorType::Microphone]);
        assert_eq!(rec.confidence, 0.8);

        fixture.trends.insert(SensorType::Microphone, trend(TrendDirection::Stable));
        assert!(WorseningTrendRule.evaluate(&fixture.ctx()).is_none());
    }

    #[test]
    fn test_consistency_and_general_rules() {
        let mut fixture = Fixture::new(&[]);
        assert!(MonitoringConsistencyRule.evaluate(&fixture.ctx()).is_some());
        assert_eq!(GeneralWellnessRule.evaluate(&fixture.ctx()).unwrap().priority, Priority::Low);

        let now = Utc::now();
        fixture.recent.insert(SensorType::Camera, vec![(now, 30.0); 10]);
        assert!(MonitoringConsistencyRule.evaluate(&fixture.ctx()).is_none());
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::High < Priority::Medium && Priority::Medium < Priority::Low);
        assert_eq!(Priority::parse("MEDIUM"), Some(Priority::Medium));
        assert_eq!(Priority::parse("urgent"), None);
    }
}
