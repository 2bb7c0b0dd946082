// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Verdant - environmental sensing and wellness insight for a workspace
//!
//! - Camera greenery, microphone noise and MQ-135 air quality sensors with
//!   automatic fallback to synthetic data when hardware is missing
//! - Scenario simulation (calm, stress, dynamic, custom)
//! - Rate-limited fan-out of live snapshots, in process or over WebSocket
//! - Aggregation, trends, anomalies and correlations over stored history
//! - Personal baselines, wellness scoring and prioritized recommendations
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Verdant Engine                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────┐   Snapshot   ┌─────────────┐   ┌────────────┐   │
//! │  │ Sensors │ ───────────→ │ Broadcaster │ → │ WebSocket  │   │
//! │  │ Manager │              └─────────────┘   └────────────┘   │
//! │  └─────────┘                                                 │
//! │       ↓ persist                                              │
//! │  ┌─────────┐    query     ┌───────────┐    ┌─────────────┐   │
//! │  │ Storage │ ───────────→ │ Analytics │ →  │   Context   │   │
//! │  └─────────┘              └───────────┘    └─────────────┘   │
//! └──────────────────────────────────────────────────────────────┘
//! ```

#![allow(dead_code)]

pub mod analysis;
pub mod config;
pub mod context;
pub mod core;
pub mod db;
pub mod error;
pub mod sensors;
pub mod streaming;

// Re-exports for convenience
pub use analysis::{AnalysisOutcome, AnalyticsEngine, TimeWindow};
pub use config::Config;
pub use context::{ContextEngine, Recommendation, WellnessReport};
pub use core::Engine;
pub use db::{MemoryStorage, Storage};
pub use error::{Error, Result};
pub use sensors::{SensorManager, SensorReading, SensorStatus, SensorType, Snapshot};
pub use streaming::{StreamBroadcaster, StreamMessage};

/// Verdant version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Verdant name
pub const NAME: &str = "Verdant";
