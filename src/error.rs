// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Crate-wide error type

use thiserror::Error;

use crate::sensors::SensorStatus;

/// Result alias used across the library
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by sensors, the manager, the broadcaster and analytics
#[derive(Debug, Error)]
pub enum Error {
    /// The sensor is in a state that cannot produce readings
    #[error("sensor {sensor} unavailable (status {status:?})")]
    SensorUnavailable {
        /// Sensor id
        sensor: String,
        /// Status at the time of the read
        status: SensorStatus,
    },

    /// The hardware backend failed while capturing
    #[error("hardware error on {sensor}: {message}")]
    Hardware {
        /// Sensor id
        sensor: String,
        /// Backend message
        message: String,
    },

    /// A read did not complete within the configured timeout
    #[error("read from {sensor} timed out after {timeout_ms} ms")]
    ReadTimeout {
        /// Sensor id
        sensor: String,
        /// Timeout that elapsed
        timeout_ms: u64,
    },

    /// Scenario name not recognised
    #[error("unknown scenario '{name}', expected one of: {}", valid.join(", "))]
    UnknownScenario {
        /// Requested name
        name: String,
        /// Accepted names
        valid: Vec<String>,
    },

    /// Custom scenario parameters failed validation
    #[error("invalid scenario parameters: {0}")]
    InvalidScenarioParameters(String),

    /// A configuration value falls outside its permitted range
    #[error("{field} = {value} is out of range ({range})")]
    ConfigOutOfRange {
        /// Field name
        field: &'static str,
        /// Rejected value
        value: String,
        /// Human readable permitted range
        range: &'static str,
    },

    /// Two sensors registered under the same id
    #[error("sensor {0} is already registered")]
    DuplicateSensor(String),

    /// `start_all` could not bring up a single sensor
    #[error("no sensors could be started ({total} configured)")]
    NoSensorsStarted {
        /// Number of configured sensors
        total: usize,
    },

    /// Paired series passed to correlation differ in length
    #[error("series length mismatch: {left} vs {right}")]
    SeriesLengthMismatch {
        /// Length of the first series
        left: usize,
        /// Length of the second series
        right: usize,
    },

    /// Unknown consumer id
    #[error("consumer {0} not connected")]
    UnknownConsumer(String),

    /// Storage backend failure
    #[error("storage error: {0}")]
    Storage(String),

    /// IO failure
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Serialization failure
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Storage(e.to_string())
    }
}
