// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Snapshot fan-out to any number of consumers
//!
//! Each consumer owns a bounded channel. A consumer that cannot keep up
//! loses messages and is eventually removed; it never slows the others.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{validate_rate, StreamMessage, StreamingConfig};
use crate::error::{Error, Result};
use crate::sensors::Snapshot;

pub type ConsumerId = Uuid;

/// How often idle consumers are checked for liveness
const LIVENESS_CHECK: Duration = Duration::from_secs(1);

struct ConsumerSlot {
    tx: mpsc::Sender<Arc<StreamMessage>>,
    consecutive_drops: u32,
    last_activity: Instant,
    ping_sent: Option<Instant>,
}

/// Receiving end handed to a connected consumer
pub struct Consumer {
    id: ConsumerId,
    rx: mpsc::Receiver<Arc<StreamMessage>>,
    broadcaster: Weak<StreamBroadcaster>,
}

impl Consumer {
    pub fn id(&self) -> ConsumerId {
        self.id
    }

    /// Next message; `None` once the broadcaster removed this consumer.
    /// Receiving a ping answers it.
    pub async fn recv(&mut self) -> Option<Arc<StreamMessage>> {
        let message = self.rx.recv().await?;
        if matches!(*message, StreamMessage::Ping { .. }) {
            if let Some(broadcaster) = self.broadcaster.upgrade() {
                broadcaster.record_activity(self.id);
            }
        }
        Some(message)
    }

    /// Raw channel for transports that answer pings themselves
    pub fn into_parts(self) -> (ConsumerId, mpsc::Receiver<Arc<StreamMessage>>) {
        (self.id, self.rx)
    }
}

/// Result of one fan-out
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: usize,
    pub removed: Vec<ConsumerId>,
}

pub struct StreamBroadcaster {
    config: StreamingConfig,
    rate_hz: RwLock<f64>,
    consumers: RwLock<HashMap<ConsumerId, ConsumerSlot>>,
    messages_sent: AtomicU64,
    messages_dropped: AtomicU64,
}

impl StreamBroadcaster {
    pub fn new(config: StreamingConfig) -> Result<Arc<Self>> {
        config.validate()?;
        Ok(Arc::new(Self {
            rate_hz: RwLock::new(config.rate_hz),
            config,
            consumers: RwLock::new(HashMap::new()),
            messages_sent: AtomicU64::new(0),
            messages_dropped: AtomicU64::new(0),
        }))
    }

    /// Register a consumer
    pub fn connect(self: &Arc<Self>) -> Consumer {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let id = Uuid::new_v4();
        self.consumers.write().insert(
            id,
            ConsumerSlot {
                tx,
                consecutive_drops: 0,
                last_activity: Instant::now(),
                ping_sent: None,
            },
        );
        debug!("Consumer {} connected", id);
        Consumer {
            id,
            rx,
            broadcaster: Arc::downgrade(self),
        }
    }

    pub fn disconnect(&self, id: ConsumerId) -> Result<()> {
        match self.consumers.write().remove(&id) {
            Some(_) => {
                debug!("Consumer {} disconnected", id);
                Ok(())
            }
            None => Err(Error::UnknownConsumer(id.to_string())),
        }
    }

    pub fn consumer_count(&self) -> usize {
        self.consumers.read().len()
    }

    pub fn is_connected(&self, id: ConsumerId) -> bool {
        self.consumers.read().contains_key(&id)
    }

    pub fn rate_hz(&self) -> f64 {
        *self.rate_hz.read()
    }

    /// Change the throttle; takes effect on the next message
    pub fn set_rate(&self, rate_hz: f64) -> Result<()> {
        validate_rate(rate_hz)?;
        *self.rate_hz.write() = rate_hz;
        info!("Stream rate set to {} Hz", rate_hz);
        Ok(())
    }

    /// Note inbound traffic from a consumer, which answers any pending ping
    pub fn record_activity(&self, id: ConsumerId) {
        if let Some(slot) = self.consumers.write().get_mut(&id) {
            slot.last_activity = Instant::now();
            slot.ping_sent = None;
        }
    }

    /// (sent, dropped) message totals
    pub fn totals(&self) -> (u64, u64) {
        (
            self.messages_sent.load(Ordering::Relaxed),
            self.messages_dropped.load(Ordering::Relaxed),
        )
    }

    pub fn status_message(&self, consumer_id: Option<ConsumerId>) -> StreamMessage {
        StreamMessage::Status {
            timestamp: Utc::now(),
            consumer_id: consumer_id.map(|id| id.to_string()),
            consumers: self.consumer_count(),
            rate_hz: self.rate_hz(),
            version: crate::VERSION.to_string(),
        }
    }

    /// Send a message to one consumer without touching its drop count
    pub fn send_to(&self, id: ConsumerId, message: StreamMessage) -> Result<()> {
        let consumers = self.consumers.read();
        let slot = consumers
            .get(&id)
            .ok_or_else(|| Error::UnknownConsumer(id.to_string()))?;
        if slot.tx.try_send(Arc::new(message)).is_err() {
            self.messages_dropped.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Offer a message to every consumer
    pub fn broadcast(&self, message: StreamMessage) -> BroadcastReport {
        let message = Arc::new(message);
        let mut report = BroadcastReport::default();
        let max_drops = self.config.max_consecutive_drops;

        let mut consumers = self.consumers.write();
        consumers.retain(|id, slot| match slot.tx.try_send(Arc::clone(&message)) {
            Ok(()) => {
                slot.consecutive_drops = 0;
                report.delivered += 1;
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                slot.consecutive_drops += 1;
                report.dropped += 1;
                if slot.consecutive_drops >= max_drops {
                    warn!("Consumer {} removed after {} dropped messages", id, slot.consecutive_drops);
                    report.removed.push(*id);
                    false
                } else {
                    true
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Consumer {} closed", id);
                report.removed.push(*id);
                false
            }
        });
        drop(consumers);

        self.messages_sent.fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.messages_dropped.fetch_add(report.dropped as u64, Ordering::Relaxed);
        report
    }

    pub fn broadcast_snapshot(&self, snapshot: &Snapshot) -> BroadcastReport {
        self.broadcast(StreamMessage::from_snapshot(snapshot))
    }

    /// Ping idle consumers and drop those that ignored their last ping.
    /// Returns the removed ids.
    pub fn check_liveness(&self, now: Instant) -> Vec<ConsumerId> {
        let ping_interval = self.config.ping_interval();
        let pong_timeout = self.config.pong_timeout();
        let mut removed = Vec::new();

        self.consumers.write().retain(|id, slot| {
            if let Some(sent) = slot.ping_sent {
                if now.saturating_duration_since(sent) >= pong_timeout {
                    info!("Consumer {} did not answer ping, disconnecting", id);
                    removed.push(*id);
                    return false;
                }
                return true;
            }

            if now.saturating_duration_since(slot.last_activity) >= ping_interval {
                let ping = Arc::new(StreamMessage::Ping { timestamp: Utc::now() });
                match slot.tx.try_send(ping) {
                    Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => slot.ping_sent = Some(now),
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        removed.push(*id);
                        return false;
                    }
                }
            }
            true
        });

        removed
    }

    /// Forward the latest snapshot to consumers at the configured rate until shutdown.
    ///
    /// Snapshots published faster than the rate are coalesced; only the newest is sent.
    pub async fn run(
        self: Arc<Self>,
        mut snapshots: watch::Receiver<Arc<Snapshot>>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        info!("Stream broadcaster running at {} Hz", self.rate_hz());
        let mut last_sent: Option<Instant> = None;
        let mut liveness = tokio::time::interval(LIVENESS_CHECK);
        liveness.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if let Some(last) = last_sent {
                        let min_gap = Duration::from_secs_f64(1.0 / self.rate_hz());
                        let wait = min_gap.saturating_sub(last.elapsed());
                        if !wait.is_zero() {
                            tokio::select! {
                                _ = shutdown.recv() => break,
                                _ = tokio::time::sleep(wait) => {}
                            }
                        }
                    }
                    let snapshot = snapshots.borrow_and_update().clone();
                    self.broadcast_snapshot(&snapshot);
                    last_sent = Some(Instant::now());
                }
                _ = liveness.tick() => {
                    self.check_liveness(Instant::now());
                }
            }
        }

        let (sent, dropped) = self.totals();
        info!("Stream broadcaster stopped ({} sent, {} dropped)", sent, dropped);
    }
}
