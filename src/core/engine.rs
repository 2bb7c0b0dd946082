//! Runtime engine - assembles and drives every component

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::SystemState;
use crate::analysis::AnalyticsEngine;
use crate::config::{Config, DatabaseConfig};
use crate::context::ContextEngine;
use crate::db::{MemoryStorage, Storage};
use crate::sensors::{SensorManager, StartupReport};
use crate::streaming::StreamBroadcaster;

/// Open the configured store, falling back to memory when persistence is off
pub fn open_storage(config: &DatabaseConfig) -> Result<Arc<dyn Storage>> {
    if !config.enabled {
        info!(
            "Persistence disabled, keeping {} days of readings in memory",
            config.retention_days
        );
        return Ok(Arc::new(MemoryStorage::with_retention(config.retention_days)));
    }

    #[cfg(feature = "sqlite")]
    {
        let storage = crate::db::SqliteStorage::open(config)
            .with_context(|| format!("opening database {}", config.path.display()))?;
        storage.cleanup(config.retention_days)?;
        Ok(Arc::new(storage))
    }

    #[cfg(not(feature = "sqlite"))]
    {
        warn!("Built without the sqlite feature, keeping readings in memory");
        Ok(Arc::new(MemoryStorage::with_retention(config.retention_days)))
    }
}

/// Main Verdant engine
pub struct Engine {
    pub config: Arc<Config>,
    storage: Arc<dyn Storage>,
    manager: SensorManager,
    broadcaster: Arc<StreamBroadcaster>,
    analytics: Arc<AnalyticsEngine>,
    context: Arc<ContextEngine>,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
    websocket_addr: Option<SocketAddr>,
    start_time: Option<Instant>,
}

impl Engine {
    pub fn new(config: Config) -> Result<Self> {
        let storage = open_storage(&config.database)?;
        Self::with_storage(config, storage)
    }

    pub fn with_storage(config: Config, storage: Arc<dyn Storage>) -> Result<Self> {
        config.validate().context("invalid configuration")?;
        let manager = SensorManager::new(&config, storage.clone()).context("building sensor manager")?;
        let broadcaster = StreamBroadcaster::new(config.streaming.clone()).context("building broadcaster")?;
        let analytics = Arc::new(AnalyticsEngine::new(config.analytics.clone(), storage.clone()));
        let context = Arc::new(ContextEngine::new(
            config.context.clone(),
            analytics.clone(),
            storage.clone(),
        ));
        let (shutdown_tx, _) = broadcast::channel(4);

        Ok(Self {
            config: Arc::new(config),
            storage,
            manager,
            broadcaster,
            analytics,
            context,
            shutdown_tx,
            tasks: Vec::new(),
            websocket_addr: None,
            start_time: None,
        })
    }

    /// Start sensors, then streaming, then learn baselines from what is stored
    pub async fn start(&mut self) -> Result<StartupReport> {
        info!("Starting Verdant engine...");

        let mut report = self.manager.start_all().await.context("starting sensors")?;
        if let Some(scenario) = self.config.simulation.start_scenario.clone() {
            let status = self
                .manager
                .start_simulation(&scenario, None)
                .await
                .with_context(|| format!("starting scenario {}", scenario))?;
            info!("Simulation '{}' active", status.scenario);
            report = self.manager.startup_report();
        }

        let broadcaster = self.broadcaster.clone();
        let snapshots = self.manager.subscribe();
        let shutdown = self.shutdown_tx.subscribe();
        self.tasks.push(tokio::spawn(broadcaster.run(snapshots, shutdown)));

        #[cfg(feature = "websocket")]
        if self.config.streaming.websocket_enabled {
            let server = crate::streaming::WebSocketServer::new(
                self.config.streaming.websocket_port,
                self.config.streaming.websocket_max_clients,
                self.broadcaster.clone(),
            );
            let addr = server
                .start(self.shutdown_tx.subscribe())
                .await
                .context("starting WebSocket server")?;
            self.websocket_addr = Some(addr);
        }

        match self.context.update_baselines(Utc::now()) {
            Ok(learned) => info!("Learned {} baselines from history", learned),
            Err(e) => warn!("Baseline update failed: {}", e),
        }

        self.start_time = Some(Instant::now());
        info!("Verdant engine started ({}/{} sensors)", report.started, report.total);
        Ok(report)
    }

    /// Stop streaming tasks, then the sensors
    pub async fn stop(&mut self) -> Result<()> {
        info!("Stopping Verdant engine...");

        // No receivers just means nothing is running
        let _ = self.shutdown_tx.send(());
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!("Engine task ended abnormally: {}", e);
            }
        }
        self.websocket_addr = None;

        self.manager.stop_all().await.context("stopping sensors")?;
        self.start_time = None;

        info!("Verdant engine stopped");
        Ok(())
    }

    pub fn state(&self) -> SystemState {
        let status = self.manager.get_status();
        let snapshot = self.manager.latest_snapshot();
        SystemState {
            running: status.running,
            simulation: status.simulation.active.then(|| status.simulation.scenario.clone()),
            sensors_active: status.sensors.iter().filter(|s| s.status.is_readable()).count(),
            sensors_total: status.sensors.len(),
            ticks: status.ticks,
            consumers: self.broadcaster.consumer_count(),
            uptime_seconds: self.uptime(),
            cpu_usage: snapshot.system.cpu_percent,
            memory_usage: snapshot.system.memory_percent,
            last_tick: status.last_tick,
        }
    }

    pub fn uptime(&self) -> u64 {
        self.start_time.map(|t| t.elapsed().as_secs()).unwrap_or(0)
    }

    pub fn manager(&self) -> &SensorManager {
        &self.manager
    }

    pub fn broadcaster(&self) -> &Arc<StreamBroadcaster> {
        &self.broadcaster
    }

    pub fn analytics(&self) -> &Arc<AnalyticsEngine> {
        &self.analytics
    }

    pub fn context(&self) -> &Arc<ContextEngine> {
        &self.context
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Bound WebSocket address while the server runs
    pub fn websocket_addr(&self) -> Option<SocketAddr> {
        self.websocket_addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::{SensorReading, SensorStatus, SensorType};
    use chrono::{Duration, TimeZone};
    use std::collections::BTreeMap;

    fn test_config() -> Config {
        let mut config = Config::default();
        config.database.enabled = false;
        config.simulation.seed = Some(7);
        config.sensors.polling.polling_hz = 10.0;
        for device in &mut config.sensors.devices {
            device.force_mock = true;
        }
        config
    }

    #[tokio::test]
    async fn test_start_stream_stop() {
        let mut engine = Engine::new(test_config()).unwrap();
        let report = engine.start().await.unwrap();
        assert_eq!(report.started, report.total);
        assert!(report.statuses.values().all(|s| *s == SensorStatus::MockMode));

        let mut consumer = engine.broadcaster().connect();
        let message = tokio::time::timeout(std::time::Duration::from_secs(2), consumer.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message.kind(), "sensor_data");

        let state = engine.state();
        assert!(state.running);
        assert_eq!(state.consumers, 1);

        engine.stop().await.unwrap();
        assert!(!engine.state().running);
    }

    #[test]
    fn test_memory_fallback_honors_retention() {
        let config = DatabaseConfig {
            enabled: false,
            retention_days: 2,
            ..Default::default()
        };
        let storage = open_storage(&config).unwrap();
        let t0 = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();
        for day in 0..6 {
            let mut reading = SensorReading::new(
                "mic",
                SensorType::Microphone,
                BTreeMap::from([("noise_db".to_string(), 40.0)]),
            );
            reading.timestamp = t0 + Duration::days(day);
            storage.persist(&reading).unwrap();
        }

        let kept = storage
            .query(SensorType::Microphone, t0, t0 + Duration::days(6))
            .unwrap();
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].timestamp, t0 + Duration::days(3));
    }

    #[tokio::test]
    async fn test_start_scenario_from_config() {
        let mut config = test_config();
        config.simulation.start_scenario = Some("stress".into());
        let mut engine = Engine::new(config).unwrap();
        engine.start().await.unwrap();
        assert_eq!(engine.state().simulation.as_deref(), Some("stress"));
        engine.stop().await.unwrap();

        let mut config = test_config();
        config.simulation.start_scenario = Some("party".into());
        let mut engine = Engine::new(config).unwrap();
        assert!(engine.start().await.is_err());
        engine.stop().await.unwrap();
    }
}
