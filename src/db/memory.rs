// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! In-memory storage

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

use super::Storage;
use crate::context::Feedback;
use crate::error::Result;
use crate::sensors::{SensorReading, SensorType};

type Series = VecDeque<SensorReading>;

/// Readings kept per type, ordered by timestamp
#[derive(Default)]
pub struct MemoryStorage {
    readings: RwLock<HashMap<SensorType, Series>>,
    feedback: RwLock<Vec<Feedback>>,
    /// Readings older than the newest one of their type by more than this are dropped
    retention: Option<Duration>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that keeps `retention_days` of history per sensor type
    pub fn with_retention(retention_days: u32) -> Self {
        Self {
            retention: Some(Duration::days(i64::from(retention_days))),
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.readings.read().values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn feedback(&self) -> Vec<Feedback> {
        self.feedback.read().clone()
    }

    /// Drop readings older than `cutoff`
    pub fn retain_since(&self, cutoff: DateTime<Utc>) -> usize {
        let mut readings = self.readings.write();
        readings.values_mut().map(|series| drop_before(series, cutoff)).sum()
    }

    fn insert(series: &mut Series, reading: &SensorReading) {
        // Stable for equal timestamps: insert after existing ones
        let at = series.partition_point(|r| r.timestamp <= reading.timestamp);
        series.insert(at, reading.clone());
    }

    fn prune(&self, series: &mut Series) {
        let (Some(retention), Some(newest)) = (self.retention, series.back().map(|r| r.timestamp)) else {
            return;
        };
        drop_before(series, newest - retention);
    }
}

fn drop_before(series: &mut Series, cutoff: DateTime<Utc>) -> usize {
    let mut removed = 0;
    while series.front().is_some_and(|r| r.timestamp < cutoff) {
        series.pop_front();
        removed += 1;
    }
    removed
}

impl Storage for MemoryStorage {
    fn persist(&self, reading: &SensorReading) -> Result<()> {
        let mut readings = self.readings.write();
        let series = readings.entry(reading.sensor_type).or_default();
        Self::insert(series, reading);
        self.prune(series);
        Ok(())
    }

    fn persist_batch(&self, batch: &[SensorReading]) -> Result<usize> {
        let mut readings = self.readings.write();
        for reading in batch {
            Self::insert(readings.entry(reading.sensor_type).or_default(), reading);
        }
        for series in readings.values_mut() {
            self.prune(series);
        }
        Ok(batch.len())
    }

    fn query(&self, sensor_type: SensorType, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<SensorReading>> {
        let readings = self.readings.read();
        let Some(series) = readings.get(&sensor_type) else {
            return Ok(Vec::new());
        };
        let from = series.partition_point(|r| r.timestamp < start);
        let to = series.partition_point(|r| r.timestamp <= end);
        Ok(series.range(from..to.max(from)).cloned().collect())
    }

    fn record_feedback(&self, feedback: &Feedback) -> Result<()> {
        self.feedback.write().push(feedback.clone());
        Ok(())
    }
}
