// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Sensor manager - owns the sensors, runs the polling loop and publishes snapshots
//!
//! Every public operation takes the state lock exactly once and delegates to
//! `*_locked` helpers, so operations that compose others (starting a
//! simulation stops live sensors first) never re-acquire it. The polling task
//! watches a stop signal at each await point, which lets `stop_all` wait for
//! it while holding the lock.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn};

use super::{
    HardwareSensor, HealthRecord, ScenarioOverrides, Sensor, SensorReading, SensorStatus, SensorType,
    SimulationController, SimulationStatus, Snapshot, SystemMonitor,
};
use crate::config::{Config, PollingPolicy, SimulationConfig};
use crate::db::Storage;
use crate::error::{Error, Result};

/// Outcome of `start_all`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StartupReport {
    /// Sensors now producing data, live or synthetic
    pub started: usize,
    pub total: usize,
    pub statuses: BTreeMap<String, SensorStatus>,
}

/// Status of one sensor as of the last tick or operation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorView {
    pub id: String,
    pub sensor_type: SensorType,
    pub status: SensorStatus,
    pub health: HealthRecord,
}

/// Non-blocking view of the manager
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStatus {
    pub running: bool,
    pub policy: PollingPolicy,
    pub simulation: SimulationStatus,
    pub sensors: Vec<SensorView>,
    pub ticks: u64,
    pub last_tick: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthLevel {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Aggregate health score, 0 to 100
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemHealth {
    pub score: u32,
    pub level: HealthLevel,
    pub issues: Vec<String>,
}

struct SensorSlot {
    sensor: Box<dyn Sensor>,
    health: HealthRecord,
    next_recovery: Option<Instant>,
    sim_sequence: u64,
}

impl SensorSlot {
    fn schedule_recovery(&mut self, delay: std::time::Duration) {
        self.next_recovery = Some(Instant::now() + delay);
        self.health.next_recovery = chrono::Duration::from_std(delay).ok().map(|d| Utc::now() + d);
    }

    fn clear_recovery(&mut self) {
        self.next_recovery = None;
        self.health.next_recovery = None;
    }

    fn view(&self) -> SensorView {
        SensorView {
            id: self.sensor.id().to_string(),
            sensor_type: self.sensor.sensor_type(),
            status: self.sensor.status(),
            health: self.health.clone(),
        }
    }
}

struct ManagerState {
    slots: Vec<SensorSlot>,
    policy: PollingPolicy,
    simulation: SimulationController,
    monitor: SystemMonitor,
    task: Option<JoinHandle<()>>,
    running: bool,
    ticks: u64,
    last_tick: Option<DateTime<Utc>>,
}

impl ManagerState {
    fn report(&self) -> StartupReport {
        let statuses: BTreeMap<String, SensorStatus> = self
            .slots
            .iter()
            .map(|s| (s.sensor.id().to_string(), s.sensor.status()))
            .collect();
        StartupReport {
            started: statuses.values().filter(|s| s.is_readable()).count(),
            total: self.slots.len(),
            statuses,
        }
    }
}

struct Inner {
    state: Mutex<ManagerState>,
    view: RwLock<ManagerStatus>,
    snapshot_tx: watch::Sender<Arc<Snapshot>>,
    stop_tx: watch::Sender<bool>,
    storage: Arc<dyn Storage>,
}

/// Coordinates all sensors. Cheap to clone; clones share one manager.
#[derive(Clone)]
pub struct SensorManager {
    inner: Arc<Inner>,
}

impl SensorManager {
    /// Build sensors for every configured device
    pub fn new(config: &Config, storage: Arc<dyn Storage>) -> Result<Self> {
        let sensors = config
            .sensors
            .devices
            .iter()
            .map(|settings| {
                let sensor = HardwareSensor::from_settings(settings);
                let sensor = match config.simulation.seed {
                    Some(seed) => sensor.with_seed(seed),
                    None => sensor,
                };
                Box::new(sensor) as Box<dyn Sensor>
            })
            .collect();
        Self::with_sensors(config.sensors.polling.clone(), &config.simulation, sensors, storage)
    }

    /// Build a manager around caller-supplied sensors
    pub fn with_sensors(
        policy: PollingPolicy,
        simulation: &SimulationConfig,
        sensors: Vec<Box<dyn Sensor>>,
        storage: Arc<dyn Storage>,
    ) -> Result<Self> {
        policy.validate()?;

        let mut slots: Vec<SensorSlot> = Vec::with_capacity(sensors.len());
        for sensor in sensors {
            check_unique(&slots, sensor.as_ref())?;
            slots.push(new_slot(sensor));
        }

        let state = ManagerState {
            slots,
            policy,
            simulation: SimulationController::new(simulation),
            monitor: SystemMonitor::new(),
            task: None,
            running: false,
            ticks: 0,
            last_tick: None,
        };
        let view = build_view(&state);
        let (snapshot_tx, _) = watch::channel(Arc::new(Snapshot::empty()));
        let (stop_tx, _) = watch::channel(false);

        Ok(Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                view: RwLock::new(view),
                snapshot_tx,
                stop_tx,
                storage,
            }),
        })
    }

    /// Register another sensor; it is started by the next `start_all`
    pub async fn add_sensor(&self, sensor: Box<dyn Sensor>) -> Result<()> {
        let mut state = self.inner.state.lock().await;
        check_unique(&state.slots, sensor.as_ref())?;
        info!("Added sensor: {} ({})", sensor.id(), sensor.sensor_type());
        state.slots.push(new_slot(sensor));
        self.inner.publish_view(&state);
        Ok(())
    }

    /// Start every sensor and the polling loop. A second call is a no-op.
    pub async fn start_all(&self) -> Result<StartupReport> {
        let mut state = self.inner.state.lock().await;
        if state.running {
            return Ok(state.report());
        }
        self.inner.start_all_locked(&mut state).await
    }

    /// Stop the polling loop and every sensor
    pub async fn stop_all(&self) -> Result<()> {
        // Signal first so an in-flight tick gives up the lock
        self.inner.stop_tx.send_replace(true);
        let mut state = self.inner.state.lock().await;
        self.inner.stop_all_locked(&mut state).await;
        Ok(())
    }

    /// Current status without waiting for an in-flight tick
    pub fn get_status(&self) -> ManagerStatus {
        self.inner.view.read().clone()
    }

    /// Current sensor statuses in startup-report form
    pub fn startup_report(&self) -> StartupReport {
        let view = self.inner.view.read();
        let statuses: BTreeMap<String, SensorStatus> = view.sensors.iter().map(|s| (s.id.clone(), s.status)).collect();
        StartupReport {
            started: statuses.values().filter(|s| s.is_readable()).count(),
            total: statuses.len(),
            statuses,
        }
    }

    /// Aggregate health score
    pub fn health(&self) -> SystemHealth {
        let status = self.get_status();
        let mut score: i64 = 100;
        let mut issues = Vec::new();

        if !status.running {
            score -= 50;
            issues.push("polling loop not running".to_string());
        }
        for sensor in &status.sensors {
            if !status.simulation.active && !sensor.status.is_readable() {
                score -= 20;
                issues.push(format!("{} is {}", sensor.id, sensor.status.as_str()));
            }
            if sensor.health.consecutive_failures > 0 {
                score -= (10 * sensor.health.consecutive_failures as i64).min(30);
                issues.push(format!(
                    "{} has {} consecutive failures",
                    sensor.id, sensor.health.consecutive_failures
                ));
            }
        }

        let score = score.clamp(0, 100) as u32;
        let level = match score {
            80..=100 => HealthLevel::Healthy,
            50..=79 => HealthLevel::Degraded,
            _ => HealthLevel::Unhealthy,
        };
        SystemHealth { score, level, issues }
    }

    /// Swap the polling policy; takes effect on the next tick
    pub async fn update_config(&self, policy: PollingPolicy) -> Result<()> {
        policy.validate()?;
        let mut state = self.inner.state.lock().await;
        info!(
            "Polling policy updated: {} Hz, {} retries",
            policy.polling_hz, policy.max_retries
        );
        state.policy = policy;
        self.inner.publish_view(&state);
        Ok(())
    }

    /// Route readings through the simulation controller.
    ///
    /// The scenario is validated before anything changes. Live sensors are
    /// stopped on entry; switching scenario while simulating is immediate.
    pub async fn start_simulation(
        &self,
        scenario: &str,
        overrides: Option<ScenarioOverrides>,
    ) -> Result<SimulationStatus> {
        let mut state = self.inner.state.lock().await;
        let profile = state.simulation.resolve(scenario, overrides.as_ref())?;

        if state.simulation.is_active() {
            state.simulation.start(profile);
        } else {
            self.inner.stop_all_locked(&mut state).await;
            state.simulation.start(profile);
            self.inner.start_loop_locked(&mut state);
        }

        self.inner.publish_view(&state);
        Ok(state.simulation.status())
    }

    /// Leave simulation mode and re-probe hardware
    pub async fn stop_simulation(&self) -> Result<StartupReport> {
        let mut state = self.inner.state.lock().await;
        if !state.simulation.is_active() {
            return Ok(state.report());
        }
        self.inner.stop_all_locked(&mut state).await;
        self.inner.start_all_locked(&mut state).await
    }

    /// Probe every sensor's hardware without changing what is running
    pub async fn detect_hardware(&self) -> BTreeMap<String, bool> {
        let mut state = self.inner.state.lock().await;
        let mut found = BTreeMap::new();
        for slot in state.slots.iter_mut() {
            let available = slot.sensor.probe().await;
            found.insert(slot.sensor.id().to_string(), available);
        }
        self.inner.publish_view(&state);
        found
    }

    /// Run one tick immediately and return its snapshot
    pub async fn poll_once(&self) -> Result<Arc<Snapshot>> {
        let mut stop_rx = self.inner.stop_tx.subscribe();
        let mut state = self.inner.state.lock().await;
        self.inner
            .tick_locked(&mut state, &mut stop_rx)
            .await
            .ok_or_else(|| Error::Storage("tick interrupted by shutdown".into()))
    }

    /// Receiver that always holds the latest snapshot
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.inner.snapshot_tx.subscribe()
    }

    pub fn latest_snapshot(&self) -> Arc<Snapshot> {
        self.inner.snapshot_tx.borrow().clone()
    }

    pub fn storage(&self) -> Arc<dyn Storage> {
        Arc::clone(&self.inner.storage)
    }
}

fn new_slot(sensor: Box<dyn Sensor>) -> SensorSlot {
    SensorSlot {
        sensor,
        health: HealthRecord::default(),
        next_recovery: None,
        sim_sequence: 0,
    }
}

fn check_unique(slots: &[SensorSlot], sensor: &dyn Sensor) -> Result<()> {
    // Snapshots are keyed by type, so types must be unique as well as ids
    let clash = slots
        .iter()
        .any(|s| s.sensor.id() == sensor.id() || s.sensor.sensor_type() == sensor.sensor_type());
    if clash {
        return Err(Error::DuplicateSensor(format!("{} ({})", sensor.id(), sensor.sensor_type())));
    }
    Ok(())
}

fn build_view(state: &ManagerState) -> ManagerStatus {
    ManagerStatus {
        running: state.running,
        policy: state.policy.clone(),
        simulation: state.simulation.status(),
        sensors: state.slots.iter().map(SensorSlot::view).collect(),
        ticks: state.ticks,
        last_tick: state.last_tick,
    }
}

/// Resolves once a stop is requested or the manager is gone
async fn wait_for_stop(stop_rx: &mut watch::Receiver<bool>) {
    while !*stop_rx.borrow_and_update() {
        if stop_rx.changed().await.is_err() {
            return;
        }
    }
}

impl Inner {
    fn publish_view(&self, state: &ManagerState) {
        *self.view.write() = build_view(state);
    }

    async fn start_all_locked(self: &Arc<Self>, state: &mut ManagerState) -> Result<StartupReport> {
        info!("Starting {} sensors...", state.slots.len());

        for slot in state.slots.iter_mut() {
            slot.health = HealthRecord::default();
            slot.clear_recovery();
            match slot.sensor.start().await {
                Ok(status) => debug!("Sensor {} started in {:?}", slot.sensor.id(), status),
                Err(e) => warn!("Failed to start sensor {}: {}", slot.sensor.id(), e),
            }
        }

        let report = state.report();
        if report.started == 0 {
            self.publish_view(state);
            return Err(Error::NoSensorsStarted { total: report.total });
        }

        self.start_loop_locked(state);
        info!("{}/{} sensors started", report.started, report.total);
        self.publish_view(state);
        Ok(report)
    }

    fn start_loop_locked(self: &Arc<Self>, state: &mut ManagerState) {
        let stop_rx = self.stop_tx.subscribe();
        state.task = Some(tokio::spawn(poll_loop(Arc::downgrade(self), stop_rx)));
        state.running = true;
    }

    async fn stop_all_locked(&self, state: &mut ManagerState) {
        self.stop_tx.send_replace(true);
        if let Some(task) = state.task.take() {
            if let Err(e) = task.await {
                warn!("Polling task ended abnormally: {}", e);
            }
        }

        for slot in state.slots.iter_mut() {
            if let Err(e) = slot.sensor.stop().await {
                warn!("Error stopping {}: {}", slot.sensor.id(), e);
            }
        }
        state.simulation.stop();

        let was_running = state.running;
        state.running = false;
        self.stop_tx.send_replace(false);
        self.publish_view(state);
        if was_running {
            info!("Sensor manager stopped");
        }
    }

    /// Read every sensor once, persist the readings and publish a snapshot.
    ///
    /// Returns `None` when a stop was requested mid-tick.
    async fn tick_locked(
        &self,
        state: &mut ManagerState,
        stop_rx: &mut watch::Receiver<bool>,
    ) -> Option<Arc<Snapshot>> {
        let policy = state.policy.clone();
        let mut readings = BTreeMap::new();
        let mut to_persist = Vec::with_capacity(state.slots.len());

        if state.simulation.is_active() {
            let values = state.simulation.generate();
            let now = Utc::now();
            for slot in state.slots.iter_mut() {
                let sensor_type = slot.sensor.sensor_type();
                let Some(&value) = values.get(&sensor_type) else {
                    continue;
                };
                slot.sim_sequence += 1;
                let mut reading = SensorReading::new(
                    slot.sensor.id(),
                    sensor_type,
                    BTreeMap::from([(sensor_type.primary_metric().to_string(), value)]),
                );
                reading.timestamp = now;
                reading.status = SensorStatus::MockMode;
                reading.synthetic = true;
                reading.sequence = slot.sim_sequence;
                slot.health.record_success(now);
                to_persist.push(reading.clone());
                readings.insert(sensor_type, reading);
            }
        } else {
            for slot in state.slots.iter_mut() {
                let id = slot.sensor.id().to_string();
                let sensor_type = slot.sensor.sensor_type();

                if slot.sensor.status() == SensorStatus::Error && policy.auto_recover {
                    let due = slot.next_recovery.map_or(true, |at| Instant::now() >= at);
                    if due {
                        slot.health.recovery_attempts += 1;
                        let recovered = tokio::select! {
                            biased;
                            _ = wait_for_stop(stop_rx) => return None,
                            r = timeout(policy.read_timeout(), slot.sensor.recover()) => r.unwrap_or(false),
                        };
                        if recovered {
                            slot.health.consecutive_failures = 0;
                            slot.clear_recovery();
                        } else {
                            let delay = policy.backoff(slot.health.recovery_attempts);
                            debug!("Next recovery probe for {} in {:?}", id, delay);
                            slot.schedule_recovery(delay);
                        }
                    }
                }

                if !slot.sensor.status().is_readable() {
                    readings.insert(
                        sensor_type,
                        SensorReading::placeholder(&id, sensor_type, slot.sensor.status()),
                    );
                    continue;
                }

                let outcome = tokio::select! {
                    biased;
                    _ = wait_for_stop(stop_rx) => return None,
                    r = timeout(policy.read_timeout(), slot.sensor.read()) => r,
                };

                match outcome {
                    Ok(Ok(reading)) => {
                        slot.health.record_success(reading.timestamp);
                        to_persist.push(reading.clone());
                        readings.insert(sensor_type, reading);
                    }
                    failure => {
                        let message = match failure {
                            Ok(Err(e)) => e.to_string(),
                            _ => Error::ReadTimeout {
                                sensor: id.clone(),
                                timeout_ms: policy.read_timeout_ms,
                            }
                            .to_string(),
                        };
                        debug!("Read error for {}: {}", id, message);
                        slot.health.record_failure(message);

                        if slot.health.consecutive_failures >= policy.max_retries {
                            slot.sensor.mark_error(&format!(
                                "{} consecutive failures",
                                slot.health.consecutive_failures
                            ));
                            slot.schedule_recovery(policy.backoff(0));
                        }
                        readings.insert(
                            sensor_type,
                            SensorReading::placeholder(&id, sensor_type, slot.sensor.status()),
                        );
                    }
                }
            }
        }

        if !to_persist.is_empty() {
            let storage = Arc::clone(&self.storage);
            match tokio::task::spawn_blocking(move || storage.persist_batch(&to_persist)).await {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!("Failed to persist readings: {}", e),
                Err(e) => warn!("Persist task failed: {}", e),
            }
        }

        state.ticks += 1;
        let now = Utc::now();
        state.last_tick = Some(now);
        let snapshot = Arc::new(Snapshot {
            timestamp: now,
            sequence: state.ticks,
            readings,
            system: state.monitor.sample(),
            scenario: state
                .simulation
                .is_active()
                .then(|| state.simulation.scenario().name.clone()),
        });

        self.snapshot_tx.send_replace(Arc::clone(&snapshot));
        self.publish_view(state);
        Some(snapshot)
    }
}

async fn poll_loop(inner: Weak<Inner>, mut stop_rx: watch::Receiver<bool>) {
    debug!("Polling loop started");
    loop {
        let Some(strong) = inner.upgrade() else {
            break;
        };

        let tick_started = Instant::now();
        let interval = {
            let mut state = tokio::select! {
                biased;
                _ = wait_for_stop(&mut stop_rx) => break,
                guard = strong.state.lock() => guard,
            };
            if strong.tick_locked(&mut state, &mut stop_rx).await.is_none() {
                break;
            }
            state.policy.interval()
        };
        drop(strong);

        let remaining = interval.saturating_sub(tick_started.elapsed());
        tokio::select! {
            biased;
            _ = wait_for_stop(&mut stop_rx) => break,
            _ = tokio::time::sleep(remaining) => {}
        }
    }
    debug!("Polling loop exited");
}
