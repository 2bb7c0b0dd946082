//! Streaming module - snapshot fan-out and WebSocket push

mod broadcaster;
#[cfg(feature = "websocket")]
mod websocket;

pub use broadcaster::{BroadcastReport, Consumer, ConsumerId, StreamBroadcaster};
#[cfg(feature = "websocket")]
pub use websocket::WebSocketServer;

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::sensors::{SensorStatus, Snapshot, SystemMetrics};

/// Streaming configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Maximum snapshot messages per second, 1 to 10
    pub rate_hz: f64,
    /// Per-consumer buffer size
    pub channel_capacity: usize,
    /// Consumer is removed after this many drops in a row
    pub max_consecutive_drops: u32,
    pub ping_interval_secs: u64,
    pub pong_timeout_secs: u64,

    /// Enable WebSocket server
    pub websocket_enabled: bool,
    pub websocket_port: u16,
    pub websocket_max_clients: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            rate_hz: 2.0,
            channel_capacity: 16,
            max_consecutive_drops: 10,
            ping_interval_secs: 30,
            pong_timeout_secs: 10,

            websocket_enabled: false,
            websocket_port: 8765,
            websocket_max_clients: 10,
        }
    }
}

impl StreamingConfig {
    pub const MIN_RATE_HZ: f64 = 1.0;
    pub const MAX_RATE_HZ: f64 = 10.0;

    pub fn validate(&self) -> Result<()> {
        validate_rate(self.rate_hz)?;
        if self.channel_capacity == 0 {
            return Err(Error::ConfigOutOfRange {
                field: "channel_capacity",
                value: self.channel_capacity.to_string(),
                range: ">= 1",
            });
        }
        if self.max_consecutive_drops == 0 {
            return Err(Error::ConfigOutOfRange {
                field: "max_consecutive_drops",
                value: self.max_consecutive_drops.to_string(),
                range: ">= 1",
            });
        }
        Ok(())
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn pong_timeout(&self) -> Duration {
        Duration::from_secs(self.pong_timeout_secs)
    }
}

pub(crate) fn validate_rate(rate_hz: f64) -> Result<()> {
    if !(StreamingConfig::MIN_RATE_HZ..=StreamingConfig::MAX_RATE_HZ).contains(&rate_hz) {
        return Err(Error::ConfigOutOfRange {
            field: "rate_hz",
            value: rate_hz.to_string(),
            range: "1..=10",
        });
    }
    Ok(())
}

/// One sensor inside a `sensor_data` message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorPayload {
    pub sensor_id: String,
    pub status: SensorStatus,
    pub synthetic: bool,
    pub timestamp: DateTime<Utc>,
    pub values: BTreeMap<String, f64>,
}

/// Messages pushed to consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    SensorData {
        timestamp: DateTime<Utc>,
        sequence: u64,
        sensors: BTreeMap<String, SensorPayload>,
        system: SystemMetrics,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        scenario: Option<String>,
    },
    Status {
        timestamp: DateTime<Utc>,
        consumer_id: Option<String>,
        consumers: usize,
        rate_hz: f64,
        version: String,
    },
    Ping {
        timestamp: DateTime<Utc>,
    },
    Error {
        error: String,
        code: String,
    },
}

impl StreamMessage {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let sensors = snapshot
            .readings
            .iter()
            .map(|(sensor_type, reading)| {
                (
                    sensor_type.as_str().to_string(),
                    SensorPayload {
                        sensor_id: reading.sensor_id.clone(),
                        status: reading.status,
                        synthetic: reading.synthetic,
                        timestamp: reading.timestamp,
                        values: reading.values.clone(),
                    },
                )
            })
            .collect();

        StreamMessage::SensorData {
            timestamp: snapshot.timestamp,
            sequence: snapshot.sequence,
            sensors,
            system: snapshot.system,
            scenario: snapshot.scenario.clone(),
        }
    }

    pub fn error(error: impl Into<String>, code: &str) -> Self {
        StreamMessage::Error {
            error: error.into(),
            code: code.to_string(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            StreamMessage::SensorData { .. } => "sensor_data",
            StreamMessage::Status { .. } => "status",
            StreamMessage::Ping { .. } => "ping",
            StreamMessage::Error { .. } => "error",
        }
    }
}
