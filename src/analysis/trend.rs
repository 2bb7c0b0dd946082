// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Least-squares trend over bucket means

use serde::{Deserialize, Serialize};

use super::statistics::mean;
use super::AnalysisOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

/// Fitted line `y = slope * x + intercept` with x the point index
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Regression {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
}

impl Regression {
    pub fn fit(values: &[f64]) -> Option<Self> {
        let n = values.len();
        if n < 2 {
            return None;
        }

        let x_mean = (n - 1) as f64 / 2.0;
        let y_mean = mean(values);

        let mut sxy = 0.0;
        let mut sxx = 0.0;
        for (i, &y) in values.iter().enumerate() {
            let dx = i as f64 - x_mean;
            sxy += dx * (y - y_mean);
            sxx += dx * dx;
        }

        let slope = sxy / sxx;
        let intercept = y_mean - slope * x_mean;

        let ss_tot: f64 = values.iter().map(|&y| (y - y_mean).powi(2)).sum();
        let ss_res: f64 = values
            .iter()
            .enumerate()
            .map(|(i, &y)| (y - (slope * i as f64 + intercept)).powi(2))
            .sum();
        // A flat series is fitted exactly
        let r_squared = if ss_tot <= f64::EPSILON {
            1.0
        } else {
            (1.0 - ss_res / ss_tot).clamp(0.0, 1.0)
        };

        Some(Self {
            slope,
            intercept,
            r_squared,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendResult {
    pub direction: TrendDirection,
    /// Change per bucket
    pub slope: f64,
    /// R² of the fit
    pub confidence: f64,
    /// Fitted change across the window relative to the mean level
    pub relative_change: f64,
    pub points: usize,
}

/// Classify a fitted regression. `values` must be the series the fit came from.
pub fn classify(regression: &Regression, values: &[f64], threshold: f64) -> TrendResult {
    let span = values.len().saturating_sub(1) as f64;
    let scale = mean(values).abs().max(1e-9);
    let relative_change = regression.slope.abs() * span / scale;

    let direction = if relative_change < threshold {
        TrendDirection::Stable
    } else if regression.slope > 0.0 {
        TrendDirection::Increasing
    } else {
        TrendDirection::Decreasing
    };

    TrendResult {
        direction,
        slope: regression.slope,
        confidence: regression.r_squared,
        relative_change,
        points: values.len(),
    }
}

pub fn detect_trend(values: &[f64], threshold: f64, min_points: usize) -> AnalysisOutcome<TrendResult> {
    let required = min_points.max(2);
    match Regression::fit(values) {
        Some(regression) if values.len() >= required => {
            AnalysisOutcome::Ready(classify(&regression, values, threshold))
        }
        _ => AnalysisOutcome::InsufficientData {
            required,
            available: values.len(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increasing_series() {
        let values: Vec<f64> = (0..10).map(|i| 10.0 + 2.0 * i as f64).collect();
        let trend = detect_trend(&values, 0.1, 3).ready().unwrap();

        assert_eq!(trend.direction, TrendDirection::Increasing);
        assert!((trend.slope - 2.0).abs() < 1e-9);
        assert!((trend.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_constant_series_is_stable() {
        let trend = detect_trend(&[42.0; 8], 0.1, 3).ready().unwrap();
        assert_eq!(trend.direction, TrendDirection::Stable);
        assert!(trend.slope.abs() < 1e-12);
    }

    #[test]
    fn test_decreasing_and_small_drift() {
        let falling: Vec<f64> = (0..6).map(|i| 100.0 - 10.0 * i as f64).collect();
        assert_eq!(
            detect_trend(&falling, 0.1, 3).ready().unwrap().direction,
            TrendDirection::Decreasing
        );

        // 1% drift across the window stays under a 10% threshold
        let drift: Vec<f64> = (0..5).map(|i| 100.0 + 0.25 * i as f64).collect();
        assert_eq!(
            detect_trend(&drift, 0.1, 3).ready().unwrap().direction,
            TrendDirection::Stable
        );
    }

    #[test]
    fn test_insufficient_points() {
        assert_eq!(
            detect_trend(&[1.0, 2.0], 0.1, 3),
            AnalysisOutcome::InsufficientData {
                required: 3,
                available: 2
            }
        );
    }
}
