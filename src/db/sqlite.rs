// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! SQLite storage

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use tracing::info;

use super::Storage;
use crate::config::DatabaseConfig;
use crate::context::Feedback;
use crate::error::{Error, Result};
use crate::sensors::{SensorReading, SensorStatus, SensorType};

/// Fixed-width UTC timestamps so text order equals time order
fn encode_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_ts(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Storage(format!("bad timestamp {}: {}", text, e)))
}

/// SQLite-backed [`Storage`]
#[derive(Clone)]
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    /// Open or create the database described by `config`
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let storage = Self::open_path(&config.path)?;
        info!("Database opened at {:?}", config.path);
        Ok(storage)
    }

    pub fn open_path(path: &Path) -> Result<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            "#,
        )?;

        let storage = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        storage.create_tables()?;
        Ok(storage)
    }

    fn create_tables(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS readings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                sensor_id TEXT NOT NULL,
                sensor_type TEXT NOT NULL,
                status TEXT NOT NULL,
                synthetic INTEGER NOT NULL,
                sequence INTEGER NOT NULL,
                metrics TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_readings_type_ts ON readings(sensor_type, timestamp);

            CREATE TABLE IF NOT EXISTS feedback (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                recommendation_id TEXT NOT NULL,
                helpful INTEGER NOT NULL,
                implemented INTEGER NOT NULL,
                comment TEXT,
                submitted_at TEXT NOT NULL
            );
            "#,
        )?;

        Ok(())
    }

    /// Delete readings older than the retention period
    pub fn cleanup(&self, retention_days: u32) -> Result<usize> {
        let conn = self.conn.lock();
        let cutoff = Utc::now() - chrono::Duration::days(retention_days as i64);

        let deleted = conn.execute(
            "DELETE FROM readings WHERE timestamp < ?1",
            params![encode_ts(cutoff)],
        )?;
        conn.execute("VACUUM", [])?;

        info!("Cleaned up {} readings older than {} days", deleted, retention_days);
        Ok(deleted)
    }

    pub fn stats(&self) -> Result<StorageStats> {
        let conn = self.conn.lock();
        let reading_count: i64 = conn.query_row("SELECT COUNT(*) FROM readings", [], |row| row.get(0))?;
        let feedback_count: i64 = conn.query_row("SELECT COUNT(*) FROM feedback", [], |row| row.get(0))?;
        Ok(StorageStats {
            reading_count: reading_count as usize,
            feedback_count: feedback_count as usize,
        })
    }

    fn insert(conn: &Connection, reading: &SensorReading) -> Result<()> {
        let metrics = serde_json::to_string(&reading.values)?;
        conn.execute(
            "INSERT INTO readings (timestamp, sensor_id, sensor_type, status, synthetic, sequence, metrics)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                encode_ts(reading.timestamp),
                reading.sensor_id,
                reading.sensor_type.as_str(),
                reading.status.as_str(),
                reading.synthetic,
                reading.sequence as i64,
                metrics
            ],
        )?;
        Ok(())
    }
}

impl Storage for SqliteStorage {
    fn persist(&self, reading: &SensorReading) -> Result<()> {
        let conn = self.conn.lock();
        Self::insert(&conn, reading)
    }

    fn persist_batch(&self, readings: &[SensorReading]) -> Result<usize> {
        let conn = self.conn.lock();
        let tx = conn.unchecked_transaction()?;
        for reading in readings {
            Self::insert(&tx, reading)?;
        }
        tx.commit()?;
        Ok(readings.len())
    }

    fn query(&self, sensor_type: SensorType, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Vec<SensorReading>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT timestamp, sensor_id, status, synthetic, sequence, metrics FROM readings
             WHERE sensor_type = ?1 AND timestamp >= ?2 AND timestamp <= ?3
             ORDER BY timestamp ASC, id ASC",
        )?;

        let rows = stmt.query_map(
            params![sensor_type.as_str(), encode_ts(start), encode_ts(end)],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, bool>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, String>(5)?,
                ))
            },
        )?;

        let mut results = Vec::new();
        for row in rows {
            let (timestamp, sensor_id, status, synthetic, sequence, metrics) = row?;
            let values: BTreeMap<String, f64> = serde_json::from_str(&metrics)?;
            results.push(SensorReading {
                sensor_id,
                sensor_type,
                values,
                timestamp: decode_ts(&timestamp)?,
                status: SensorStatus::parse(&status).unwrap_or(SensorStatus::Active),
                synthetic,
                sequence: sequence as u64,
            });
        }
        Ok(results)
    }

    fn record_feedback(&self, feedback: &Feedback) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO feedback (recommendation_id, helpful, implemented, comment, submitted_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                feedback.recommendation_id.to_string(),
                feedback.helpful,
                feedback.implemented,
                feedback.comment,
                encode_ts(feedback.submitted_at)
            ],
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageStats {
    pub reading_count: usize,
    pub feedback_count: usize,
}
