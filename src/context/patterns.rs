// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Pattern detection - recurring out-of-band readings by hour, weekday and overall,
//! plus sustained drift in the wrong direction

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

use super::{MetricProfile, Polarity};
use crate::analysis::{mean, AggregateBucket};
use crate::sensors::SensorType;

/// A slot must have been seen at least this many times
pub const MIN_SLOT_OCCURRENCES: usize = 3;

/// Share of a slot's buckets that must be out of band
pub const SLOT_RATE: f64 = 0.6;

/// Share of raw readings that must be out of band for a recurring issue
pub const RECURRING_ISSUE_RATE: f64 = 0.3;

/// Readings needed before comparing the two halves of a window
pub const MIN_TREND_SAMPLES: usize = 10;

/// Relative shift between the halves that counts as a trend
pub const TREND_SHIFT: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    TimeOfDay,
    DayOfWeek,
    RecurringIssue,
    /// Second half of the window worse than the first
    Trend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub kind: PatternKind,
    pub sensor_type: SensorType,
    /// Hour of day (0-23) or weekday from Monday (0-6); absent otherwise
    pub slot: Option<u32>,
    pub occurrences: usize,
    pub out_of_band: usize,
    pub rate: f64,
    pub description: String,
}

/// Hourly buckets grouped by hour of day
pub fn time_of_day(profile: &MetricProfile, hourly: &[AggregateBucket]) -> Vec<Pattern> {
    slot_patterns(profile, hourly, PatternKind::TimeOfDay, |ts| ts.hour())
}

/// Daily buckets grouped by weekday
pub fn day_of_week(profile: &MetricProfile, daily: &[AggregateBucket]) -> Vec<Pattern> {
    slot_patterns(profile, daily, PatternKind::DayOfWeek, |ts| ts.weekday().num_days_from_monday())
}

fn slot_patterns(
    profile: &MetricProfile,
    buckets: &[AggregateBucket],
    kind: PatternKind,
    slot_of: impl Fn(DateTime<Utc>) -> u32,
) -> Vec<Pattern> {
    let mut slots: BTreeMap<u32, (usize, usize)> = BTreeMap::new();
    for bucket in buckets {
        let entry = slots.entry(slot_of(bucket.period_start)).or_default();
        entry.0 += 1;
        if profile.out_of_band(bucket.mean) {
            entry.1 += 1;
        }
    }

    slots
        .into_iter()
        .filter_map(|(slot, (occurrences, out_of_band))| {
            let rate = out_of_band as f64 / occurrences as f64;
            if occurrences < MIN_SLOT_OCCURRENCES || rate < SLOT_RATE {
                return None;
            }
            Some(Pattern {
                kind,
                sensor_type: profile.sensor_type,
                slot: Some(slot),
                occurrences,
                out_of_band,
                rate,
                description: format!(
                    "Your {} is usually outside its comfort range {} ({} of {} times)",
                    profile.sensor_type.label(),
                    slot_label(kind, slot),
                    out_of_band,
                    occurrences
                ),
            })
        })
        .collect()
}

const WEEKDAYS: [&str; 7] = ["Mondays", "Tuesdays", "Wednesdays", "Thursdays", "Fridays", "Saturdays", "Sundays"];

fn slot_label(kind: PatternKind, slot: u32) -> String {
    match kind {
        PatternKind::TimeOfDay => format!("around {:02}:00", slot),
        PatternKind::DayOfWeek => match WEEKDAYS.get(slot as usize) {
            Some(day) => format!("on {}", day),
            None => format!("on day {}", slot),
        },
        PatternKind::RecurringIssue | PatternKind::Trend => String::new(),
    }
}

/// Reported when more than `RECURRING_ISSUE_RATE` of the readings fall out of band
pub fn recurring_issue(profile: &MetricProfile, points: &[(DateTime<Utc>, f64)]) -> Option<Pattern> {
    if points.is_empty() {
        return None;
    }
    let out_of_band = points.iter().filter(|&&(_, v)| profile.out_of_band(v)).count();
    let rate = out_of_band as f64 / points.len() as f64;
    if rate <= RECURRING_ISSUE_RATE {
        return None;
    }

    Some(Pattern {
        kind: PatternKind::RecurringIssue,
        sensor_type: profile.sensor_type,
        slot: None,
        occurrences: points.len(),
        out_of_band,
        rate,
        description: format!(
            "Your {} was outside its comfort range in {:.0}% of readings",
            profile.sensor_type.label(),
            rate * 100.0
        ),
    })
}

/// Compares the mean of the older half of `points` with the newer half and
/// reports a shift of more than `TREND_SHIFT` in the metric's adverse direction
pub fn trend_pattern(profile: &MetricProfile, points: &[(DateTime<Utc>, f64)]) -> Option<Pattern> {
    if points.len() < MIN_TREND_SAMPLES {
        return None;
    }
    let values: Vec<f64> = points.iter().map(|&(_, v)| v).collect();
    let (older, newer) = values.split_at(values.len() / 2);
    let before = mean(older);
    let after = mean(newer);
    if before.abs() < f64::EPSILON {
        return None;
    }

    let change = (after - before) / before.abs();
    let (worsening, verb) = match profile.polarity {
        Polarity::HigherIsBetter => (change < -TREND_SHIFT, "declining"),
        Polarity::LowerIsBetter => (change > TREND_SHIFT, "rising"),
    };
    if !worsening {
        return None;
    }

    Some(Pattern {
        kind: PatternKind::Trend,
        sensor_type: profile.sensor_type,
        slot: None,
        occurrences: points.len(),
        out_of_band: newer.iter().filter(|&&v| profile.out_of_band(v)).count(),
        rate: change.abs(),
        description: format!(
            "Your {} is {} over time ({:.1} {unit} to {:.1} {unit})",
            profile.sensor_type.label(),
            verb,
            before,
            after,
            unit = profile.sensor_type.unit()
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{aggregate, Granularity};
    use crate::config::ContextConfig;
    use chrono::{Duration, TimeZone};

    fn noise() -> MetricProfile {
        ContextConfig::default().profile(SensorType::Microphone).cloned().unwrap()
    }

    #[test]
    fn test_loud_afternoons_reported() {
        // Monday 2026-01-05, five days of hourly readings
        let start = Utc.with_ymd_and_hms(2026, 1, 5, 0, 0, 0).unwrap();
        let points: Vec<_> = (0..24 * 5)
            .map(|h| {
                let ts = start + Duration::hours(h);
                let value = if ts.hour() == 14 { 72.0 } else { 35.0 };
                (ts, value)
            })
            .collect();

        let hourly = aggregate(&points, Granularity::Hour);
        let patterns = time_of_day(&noise(), &hourly);
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].slot, Some(14));
        assert_eq!(patterns[0].occurrences, 5);
        assert_eq!(patterns[0].rate, 1.0);

        // 5 of 120 readings is nowhere near a recurring issue
        assert!(recurring_issue(&noise(), &points).is_none());
    }

    #[test]
    fn test_weekday_needs_three_occurrences() {
        let monday = Utc.with_ymd_and_hms(2026, 1, 5, 12, 0, 0).unwrap();
        let loud_mondays = |days: i64| -> Vec<(DateTime<Utc>, f64)> {
            (0..days)
                .map(|d| (monday + Duration::days(d), if d % 7 == 0 { 80.0 } else { 30.0 }))
                .collect()
        };

        let daily = aggregate(&loud_mondays(14), Granularity::Day);
        assert!(day_of_week(&noise(), &daily).is_empty());

        let daily = aggregate(&loud_mondays(21), Granularity::Day);
        let patterns = day_of_week(&noise(), &daily);
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].slot, Some(0));
        assert!(patterns[0].description.contains("Mon"));
    }

    #[test]
    fn test_recurring_issue_threshold() {
        let now = Utc::now();
        let points: Vec<_> = (0..10)
            .map(|i| (now - Duration::minutes(10 - i), if i < 4 { 75.0 } else { 40.0 }))
            .collect();
        let pattern = recurring_issue(&noise(), &points).unwrap();
        assert_eq!(pattern.kind, PatternKind::RecurringIssue);
        assert_eq!(pattern.out_of_band, 4);

        let points: Vec<_> = (0..10)
            .map(|i| (now - Duration::minutes(10 - i), if i < 3 { 75.0 } else { 40.0 }))
            .collect();
        assert!(recurring_issue(&noise(), &points).is_none());
        assert!(recurring_issue(&noise(), &[]).is_none());
    }

    #[test]
    fn test_trend_follows_polarity() {
        let now = Utc::now();
        let series = |first: f64, second: f64| -> Vec<(DateTime<Utc>, f64)> {
            (0..20)
                .map(|i| (now - Duration::hours(20 - i), if i < 10 { first } else { second }))
                .collect()
        };
        let greenery = ContextConfig::default().profile(SensorType::Camera).cloned().unwrap();

        let pattern = trend_pattern(&greenery, &series(50.0, 30.0)).unwrap();
        assert_eq!(pattern.kind, PatternKind::Trend);
        assert!((pattern.rate - 0.4).abs() < 1e-9);
        assert!(pattern.description.contains("declining"));
        // More greenery is an improvement, not a pattern
        assert!(trend_pattern(&greenery, &series(30.0, 50.0)).is_none());
        assert!(trend_pattern(&greenery, &series(50.0, 45.0)).is_none());

        let pattern = trend_pattern(&noise(), &series(30.0, 60.0)).unwrap();
        assert!(pattern.description.contains("rising"));
        assert_eq!(pattern.out_of_band, 10);
        assert!(trend_pattern(&noise(), &series(60.0, 30.0)).is_none());

        assert!(trend_pattern(&noise(), &series(30.0, 60.0)[..9]).is_none());
    }
}
