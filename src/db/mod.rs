// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Persistent storage for readings and recommendation feedback

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::MemoryStorage;
#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteStorage, StorageStats};

use chrono::{DateTime, Utc};

use crate::context::Feedback;
use crate::error::Result;
use crate::sensors::{SensorReading, SensorType};

/// Backing store used by the manager (writes) and analytics (reads)
pub trait Storage: Send + Sync {
    /// Append one reading
    fn persist(&self, reading: &SensorReading) -> Result<()>;

    /// Append several readings, returning how many were written
    fn persist_batch(&self, readings: &[SensorReading]) -> Result<usize> {
        for reading in readings {
            self.persist(reading)?;
        }
        Ok(readings.len())
    }

    /// Readings of one type with `start <= timestamp <= end`, oldest first
    fn query(&self, sensor_type: SensorType, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<SensorReading>>;

    /// Record feedback on a recommendation. Stores without a feedback table ignore it.
    fn record_feedback(&self, _feedback: &Feedback) -> Result<()> {
        Ok(())
    }
}
