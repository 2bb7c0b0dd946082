// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Rolling z-score anomaly detection

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::statistics::{mean, sample_std_dev};
use super::AnalysisOutcome;

/// Anomaly severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Severity of a flagged |z| relative to the detection threshold
    pub fn from_z(z: f64, threshold: f64) -> Self {
        let z = z.abs();
        if z > 3.0 * threshold {
            Severity::Critical
        } else if z > 2.0 * threshold {
            Severity::High
        } else if z > 1.5 * threshold {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyResult {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub z_score: f64,
    pub severity: Severity,
    pub rolling_mean: f64,
    pub rolling_std: f64,
}

/// Detector parameters
#[derive(Debug, Clone, Copy)]
pub struct AnomalyDetector {
    pub threshold: f64,
    /// Trailing points used for the rolling statistics
    pub window: usize,
    /// Prior points required before a point is scored
    pub min_history: usize,
}

impl AnomalyDetector {
    pub fn new(threshold: f64, window: usize, min_history: usize) -> Self {
        Self {
            threshold,
            window: window.max(2),
            min_history: min_history.clamp(2, window.max(2)),
        }
    }

    /// Score every point against the points before it.
    ///
    /// Windows with zero spread are skipped; a z-score is undefined there.
    pub fn detect(&self, points: &[(DateTime<Utc>, f64)]) -> AnalysisOutcome<Vec<AnomalyResult>> {
        if points.len() <= self.min_history {
            return AnalysisOutcome::InsufficientData {
                required: self.min_history + 1,
                available: points.len(),
            };
        }

        let values: Vec<f64> = points.iter().map(|&(_, v)| v).collect();
        let mut anomalies = Vec::new();

        for i in self.min_history..points.len() {
            let history = &values[i.saturating_sub(self.window)..i];
            let rolling_mean = mean(history);
            let rolling_std = sample_std_dev(history);
            if rolling_std <= 1e-12 {
                continue;
            }

            let (timestamp, value) = points[i];
            let z_score = (value - rolling_mean) / rolling_std;
            if z_score.abs() > self.threshold {
                anomalies.push(AnomalyResult {
                    timestamp,
                    value,
                    z_score,
                    severity: Severity::from_z(z_score, self.threshold),
                    rolling_mean,
                    rolling_std,
                });
            }
        }

        AnalysisOutcome::Ready(anomalies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn series(values: &[f64]) -> Vec<(DateTime<Utc>, f64)> {
        let start = Utc::now() - Duration::hours(2);
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| (start + Duration::seconds(i as i64 * 30), v))
            .collect()
    }

    #[test]
    fn test_single_spike_is_the_only_anomaly() {
        let mut values: Vec<f64> = (0..100).map(|i| if i % 2 == 0 { 49.0 } else { 51.0 }).collect();
        // stddev of the alternating series is ~1
        values[60] = 50.0 + 10.0 * 1.03;

        let detector = AnomalyDetector::new(2.0, 20, 5);
        let anomalies = detector.detect(&series(&values)).ready().unwrap();

        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].value, values[60]);
        assert!(anomalies[0].z_score > 9.0);
        assert_eq!(anomalies[0].severity, Severity::Critical);
    }

    #[test]
    fn test_severity_bands() {
        assert_eq!(Severity::from_z(2.5, 2.0), Severity::Low);
        assert_eq!(Severity::from_z(-3.5, 2.0), Severity::Medium);
        assert_eq!(Severity::from_z(4.5, 2.0), Severity::High);
        assert_eq!(Severity::from_z(6.5, 2.0), Severity::Critical);
    }

    #[test]
    fn test_short_series_is_insufficient() {
        let detector = AnomalyDetector::new(2.0, 20, 5);
        assert_eq!(
            detector.detect(&series(&[1.0, 2.0, 3.0])),
            AnalysisOutcome::InsufficientData {
                required: 6,
                available: 3
            }
        );
    }

    #[test]
    fn test_flat_history_is_not_scored() {
        let mut values = vec![10.0; 30];
        values[20] = 11.0;
        let detector = AnomalyDetector::new(2.0, 20, 5);
        let anomalies = detector.detect(&series(&values)).ready().unwrap();
        assert!(anomalies.is_empty());
    }
}
