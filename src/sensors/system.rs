// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Host metrics included with every snapshot

use serde::{Deserialize, Serialize};
use sysinfo::System;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub cpu_percent: f64,
    pub memory_used_bytes: u64,
    pub memory_total_bytes: u64,
    pub memory_percent: f64,
}

/// Samples CPU and memory usage
pub struct SystemMonitor {
    sys: System,
}

impl SystemMonitor {
    pub fn new() -> Self {
        let mut sys = System::new();
        // CPU usage is a delta, so prime it once
        sys.refresh_cpu();
        sys.refresh_memory();
        Self { sys }
    }

    pub fn sample(&mut self) -> SystemMetrics {
        self.sys.refresh_cpu();
        self.sys.refresh_memory();

        let total = self.sys.total_memory();
        let used = self.sys.used_memory();
        SystemMetrics {
            cpu_percent: self.sys.global_cpu_info().cpu_usage() as f64,
            memory_used_bytes: used,
            memory_total_bytes: total,
            memory_percent: if total > 0 { used as f64 / total as f64 * 100.0 } else { 0.0 },
        }
    }
}

impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new()
    }
}
