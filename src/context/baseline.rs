// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Personal baselines learned from history

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::{mean, sample_std_dev};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub mean: f64,
    pub stddev: f64,
    pub sample_size: usize,
    /// 0 to 1, reaching 1 at the configured sample count
    pub confidence: f64,
    pub updated_at: DateTime<Utc>,
}

impl Baseline {
    /// Learn a baseline, or `None` while fewer than `min_samples` values exist
    pub fn learn(values: &[f64], min_samples: usize, full_confidence: usize, now: DateTime<Utc>) -> Option<Self> {
        if values.is_empty() || values.len() < min_samples {
            return None;
        }
        Some(Self {
            mean: mean(values),
            stddev: sample_std_dev(values),
            sample_size: values.len(),
            confidence: (values.len() as f64 / full_confidence.max(1) as f64).min(1.0),
            updated_at: now,
        })
    }
}
