//! Core engine module - wires sensors, streaming, analytics and context together

mod engine;

pub use engine::{open_storage, Engine};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// System-wide state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemState {
    pub running: bool,
    /// Active scenario name while simulating
    pub simulation: Option<String>,
    pub sensors_active: usize,
    pub sensors_total: usize,
    pub ticks: u64,
    pub consumers: usize,
    pub uptime_seconds: u64,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub last_tick: Option<DateTime<Utc>>,
}
