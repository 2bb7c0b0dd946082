// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Pearson correlation and timestamp alignment

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::statistics::mean;
use super::AnalysisOutcome;
use crate::error::{Error, Result};

/// Pairs needed before a coefficient means anything
pub const MIN_CORRELATION_SAMPLES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationStrength {
    Weak,
    Moderate,
    Strong,
}

impl CorrelationStrength {
    pub fn from_coefficient(r: f64) -> Self {
        match r.abs() {
            a if a < 0.3 => CorrelationStrength::Weak,
            a if a < 0.7 => CorrelationStrength::Moderate,
            _ => CorrelationStrength::Strong,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationDirection {
    Positive,
    Negative,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationResult {
    pub coefficient: f64,
    pub strength: CorrelationStrength,
    pub direction: CorrelationDirection,
    pub samples: usize,
}

/// Pearson coefficient of two equal-length series.
///
/// A series with no variance has no linear relationship; the coefficient is 0.
pub fn pearson(xs: &[f64], ys: &[f64]) -> Result<f64> {
    if xs.len() != ys.len() {
        return Err(Error::SeriesLengthMismatch {
            left: xs.len(),
            right: ys.len(),
        });
    }

    let mx = mean(xs);
    let my = mean(ys);
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (&x, &y) in xs.iter().zip(ys) {
        sxy += (x - mx) * (y - my);
        sxx += (x - mx).powi(2);
        syy += (y - my).powi(2);
    }

    let denom = (sxx * syy).sqrt();
    if denom <= f64::EPSILON {
        return Ok(0.0);
    }
    Ok((sxy / denom).clamp(-1.0, 1.0))
}

pub fn correlate(xs: &[f64], ys: &[f64]) -> Result<AnalysisOutcome<CorrelationResult>> {
    let coefficient = pearson(xs, ys)?;
    if xs.len() < MIN_CORRELATION_SAMPLES {
        return Ok(AnalysisOutcome::InsufficientData {
            required: MIN_CORRELATION_SAMPLES,
            available: xs.len(),
        });
    }

    let direction = if coefficient > 0.0 {
        CorrelationDirection::Positive
    } else if coefficient < 0.0 {
        CorrelationDirection::Negative
    } else {
        CorrelationDirection::None
    };

    Ok(AnalysisOutcome::Ready(CorrelationResult {
        coefficient,
        strength: CorrelationStrength::from_coefficient(coefficient),
        direction,
        samples: xs.len(),
    }))
}

/// Pair each point of `a` with the nearest point of `b` within `tolerance`.
/// Both inputs must be sorted by timestamp.
pub fn align(
    a: &[(DateTime<Utc>, f64)],
    b: &[(DateTime<Utc>, f64)],
    tolerance: Duration,
) -> (Vec<f64>, Vec<f64>) {
    let mut xs = Vec::new();
    let mut ys = Vec::new();
    if b.is_empty() {
        return (xs, ys);
    }

    for &(ts, x) in a {
        let idx = b.partition_point(|&(t, _)| t < ts);
        let nearest = [idx.checked_sub(1), (idx < b.len()).then_some(idx)]
            .into_iter()
            .flatten()
            .min_by_key(|&j| (b[j].0 - ts).num_milliseconds().abs());

        if let Some(j) = nearest {
            if (b[j].0 - ts).num_milliseconds().abs() <= tolerance.num_milliseconds() {
                xs.push(x);
                ys.push(b[j].1);
            }
        }
    }

    (xs, ys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_linear_relation() {
        let xs: Vec<f64> = (0..50).map(|i| i as f64).collect();
        let ys: Vec<f64> = xs.iter().map(|x| 2.0 * x).collect();
        let result = correlate(&xs, &ys).unwrap().ready().unwrap();

        assert!((result.coefficient - 1.0).abs() < 0.01);
        assert_eq!(result.strength, CorrelationStrength::Strong);
        assert_eq!(result.direction, CorrelationDirection::Positive);

        let inverse: Vec<f64> = xs.iter().map(|x| 100.0 - x).collect();
        assert!((pearson(&xs, &inverse).unwrap() + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_independent_series_are_weak() {
        let mut rng = StdRng::seed_from_u64(2026);
        let mut weak = 0;
        for _ in 0..20 {
            let xs: Vec<f64> = (0..200).map(|_| rng.gen::<f64>()).collect();
            let ys: Vec<f64> = (0..200).map(|_| rng.gen::<f64>()).collect();
            if CorrelationStrength::from_coefficient(pearson(&xs, &ys).unwrap()) == CorrelationStrength::Weak {
                weak += 1;
            }
        }
        assert!(weak >= 19);
    }

    #[test]
    fn test_length_mismatch_and_short_series() {
        assert!(matches!(
            pearson(&[1.0, 2.0], &[1.0]),
            Err(Error::SeriesLengthMismatch { left: 2, right: 1 })
        ));
        assert!(!correlate(&[1.0, 2.0], &[2.0, 4.0]).unwrap().is_ready());
        assert_eq!(pearson(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]).unwrap(), 0.0);
    }

    #[test]
    fn test_alignment_within_tolerance() {
        let t0 = Utc::now();
        let a = vec![
            (t0, 1.0),
            (t0 + Duration::seconds(60), 2.0),
            (t0 + Duration::seconds(600), 3.0),
        ];
        let b = vec![
            (t0 + Duration::seconds(5), 10.0),
            (t0 + Duration::seconds(50), 20.0),
            (t0 + Duration::seconds(300), 30.0),
        ];

        let (xs, ys) = align(&a, &b, Duration::seconds(30));
        assert_eq!(xs, vec![1.0, 2.0]);
        assert_eq!(ys, vec![10.0, 20.0]);
    }
}
