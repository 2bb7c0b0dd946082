//! Descriptive statistics shared by the analytics

use serde::{Deserialize, Serialize};

/// Statistical summary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatisticalSummary {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub mode: Option<f64>,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    pub range: f64,
    pub q1: f64,
    pub q3: f64,
}

pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Sample standard deviation (n - 1); zero below two points
pub fn sample_std_dev(data: &[f64]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let m = mean(data);
    let variance = data.iter().map(|&x| (x - m).powi(2)).sum::<f64>() / (data.len() - 1) as f64;
    variance.sqrt()
}

pub fn sorted(data: &[f64]) -> Vec<f64> {
    let mut sorted = data.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted
}

/// Median of already sorted data
pub fn median_sorted(sorted: &[f64]) -> f64 {
    let count = sorted.len();
    if count == 0 {
        return 0.0;
    }
    if count % 2 == 0 {
        (sorted[count / 2 - 1] + sorted[count / 2]) / 2.0
    } else {
        sorted[count / 2]
    }
}

/// Linear-interpolated percentile of already sorted data
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let k = p / 100.0 * (sorted.len() - 1) as f64;
    let f = k.floor() as usize;
    let c = k.ceil() as usize;

    if f == c || c >= sorted.len() {
        sorted[f.min(sorted.len() - 1)]
    } else {
        sorted[f] + (sorted[c] - sorted[f]) * (k - f as f64)
    }
}

/// Center of the most populated histogram bin, with sqrt(n) bins
fn mode(sorted: &[f64]) -> Option<f64> {
    let n_bins = (sorted.len() as f64).sqrt() as usize;
    if n_bins < 3 {
        return None;
    }

    let min = sorted[0];
    let max = sorted[sorted.len() - 1];
    let bin_width = (max - min) / n_bins as f64;
    if bin_width < 1e-10 {
        return Some(min);
    }

    let mut bins = vec![0usize; n_bins];
    for &x in sorted {
        let bin = (((x - min) / bin_width) as usize).min(n_bins - 1);
        bins[bin] += 1;
    }

    let (max_bin, _) = bins.iter().enumerate().max_by_key(|(_, &c)| c)?;
    Some(min + (max_bin as f64 + 0.5) * bin_width)
}

pub fn summarize(data: &[f64]) -> StatisticalSummary {
    if data.is_empty() {
        return StatisticalSummary::default();
    }

    let sorted = sorted(data);
    let min = sorted[0];
    let max = sorted[sorted.len() - 1];

    StatisticalSummary {
        count: data.len(),
        mean: mean(data),
        median: median_sorted(&sorted),
        mode: mode(&sorted),
        std_dev: sample_std_dev(data),
        min,
        max,
        range: max - min,
        q1: percentile(&sorted, 25.0),
        q3: percentile(&sorted, 75.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary() {
        let data = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let summary = summarize(&data);

        assert_eq!(summary.count, 8);
        assert!((summary.mean - 5.0).abs() < 1e-12);
        assert_eq!(summary.median, 4.5);
        assert_eq!(summary.range, 7.0);
        // Sample variance 32/7
        assert!((summary.std_dev - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_edge_cases() {
        assert_eq!(summarize(&[]), StatisticalSummary::default());
        assert_eq!(sample_std_dev(&[3.0]), 0.0);
        assert_eq!(median_sorted(&[1.0, 2.0, 10.0]), 2.0);
        assert_eq!(percentile(&[1.0, 2.0, 3.0, 4.0, 5.0], 50.0), 3.0);
        assert_eq!(mode(&[1.0; 9]), Some(1.0));
    }
}
