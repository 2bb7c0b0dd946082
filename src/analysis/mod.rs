//! Analysis module - aggregation, trend, anomaly and correlation over stored history

mod aggregation;
mod anomaly;
mod correlation;
mod statistics;
mod trend;

pub use aggregation::*;
pub use anomaly::*;
pub use correlation::*;
pub use statistics::*;
pub use trend::*;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AnalyticsConfig;
use crate::db::Storage;
use crate::error::Result;
use crate::sensors::SensorType;

/// Result of an analysis that may lack enough data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "result", rename_all = "snake_case")]
pub enum AnalysisOutcome<T> {
    Ready(T),
    InsufficientData { required: usize, available: usize },
}

impl<T> AnalysisOutcome<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, AnalysisOutcome::Ready(_))
    }

    pub fn ready(self) -> Option<T> {
        match self {
            AnalysisOutcome::Ready(value) => Some(value),
            AnalysisOutcome::InsufficientData { .. } => None,
        }
    }

    pub fn as_ready(&self) -> Option<&T> {
        match self {
            AnalysisOutcome::Ready(value) => Some(value),
            AnalysisOutcome::InsufficientData { .. } => None,
        }
    }
}

/// Closed time range `[start, end]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Window of `span` ending at `end`
    pub fn ending_at(end: DateTime<Utc>, span: Duration) -> Self {
        Self { start: end - span, end }
    }

    pub fn last_hours(hours: i64) -> Self {
        Self::ending_at(Utc::now(), Duration::hours(hours))
    }

    pub fn last_days(days: i64) -> Self {
        Self::ending_at(Utc::now(), Duration::days(days))
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.start && ts <= self.end
    }
}

/// Identifies one regression input exactly
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RegressionKey {
    sensor_type: SensorType,
    granularity: Granularity,
    window: TimeWindow,
    points: usize,
    last_timestamp: Option<DateTime<Utc>>,
}

const REGRESSION_CACHE_LIMIT: usize = 64;

/// Read-only analytics over the storage collaborator
pub struct AnalyticsEngine {
    config: AnalyticsConfig,
    storage: Arc<dyn Storage>,
    regressions: Mutex<HashMap<RegressionKey, Regression>>,
    cache_counts: Mutex<(u64, u64)>,
}

impl AnalyticsEngine {
    pub fn new(config: AnalyticsConfig, storage: Arc<dyn Storage>) -> Self {
        Self {
            config,
            storage,
            regressions: Mutex::new(HashMap::new()),
            cache_counts: Mutex::new((0, 0)),
        }
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    /// Primary-metric values in the window, ascending, skipping readings without one
    pub fn history(&self, sensor_type: SensorType, window: TimeWindow) -> Result<Vec<(DateTime<Utc>, f64)>> {
        let readings = self.storage.query(sensor_type, window.start, window.end)?;
        Ok(readings
            .iter()
            .filter_map(|r| r.primary_value().map(|v| (r.timestamp, v)))
            .collect())
    }

    pub fn aggregate(
        &self,
        sensor_type: SensorType,
        window: TimeWindow,
        granularity: Granularity,
    ) -> Result<Vec<AggregateBucket>> {
        Ok(aggregate(&self.history(sensor_type, window)?, granularity))
    }

    /// Trend of bucket means across the window
    pub fn trend(
        &self,
        sensor_type: SensorType,
        window: TimeWindow,
        granularity: Granularity,
    ) -> Result<AnalysisOutcome<TrendResult>> {
        let points = self.history(sensor_type, window)?;
        let means: Vec<f64> = aggregate(&points, granularity).iter().map(|b| b.mean).collect();

        let required = self.config.min_data_points.max(2);
        if means.len() < required {
            return Ok(AnalysisOutcome::InsufficientData {
                required,
                available: means.len(),
            });
        }

        let key = RegressionKey {
            sensor_type,
            granularity,
            window,
            points: points.len(),
            last_timestamp: points.last().map(|&(ts, _)| ts),
        };
        let Some(regression) = self.cached_regression(key, &means) else {
            return Ok(AnalysisOutcome::InsufficientData {
                required,
                available: means.len(),
            });
        };

        Ok(AnalysisOutcome::Ready(classify(&regression, &means, self.config.trend_threshold)))
    }

    fn cached_regression(&self, key: RegressionKey, means: &[f64]) -> Option<Regression> {
        if let Some(hit) = self.regressions.lock().get(&key).copied() {
            self.cache_counts.lock().0 += 1;
            return Some(hit);
        }

        self.cache_counts.lock().1 += 1;
        let regression = Regression::fit(means)?;
        let mut cache = self.regressions.lock();
        if cache.len() >= REGRESSION_CACHE_LIMIT {
            debug!("Regression cache full, clearing {} entries", cache.len());
            cache.clear();
        }
        cache.insert(key, regression);
        Some(regression)
    }

    /// (hits, misses) of the regression cache
    pub fn cache_stats(&self) -> (u64, u64) {
        *self.cache_counts.lock()
    }

    pub fn anomalies(
        &self,
        sensor_type: SensorType,
        window: TimeWindow,
    ) -> Result<AnalysisOutcome<Vec<AnomalyResult>>> {
        let detector = AnomalyDetector::new(
            self.config.anomaly_threshold,
            self.config.anomaly_window,
            self.config.min_anomaly_history,
        );
        Ok(detector.detect(&self.history(sensor_type, window)?))
    }

    /// Correlation between two sensors, pairing readings by nearest timestamp
    pub fn correlation(
        &self,
        a: SensorType,
        b: SensorType,
        window: TimeWindow,
    ) -> Result<AnalysisOutcome<CorrelationResult>> {
        let left = self.history(a, window)?;
        let right = self.history(b, window)?;
        let tolerance = Duration::seconds(self.config.correlation_tolerance_secs);
        let (xs, ys) = align(&left, &right, tolerance);
        correlate(&xs, &ys)
    }

    pub fn statistics(
        &self,
        sensor_type: SensorType,
        window: TimeWindow,
    ) -> Result<AnalysisOutcome<StatisticalSummary>> {
        let values: Vec<f64> = self.history(sensor_type, window)?.into_iter().map(|(_, v)| v).collect();
        if values.is_empty() {
            return Ok(AnalysisOutcome::InsufficientData {
                required: 1,
                available: 0,
            });
        }
        Ok(AnalysisOutcome::Ready(summarize(&values)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStorage;
    use crate::sensors::SensorReading;
    use std::collections::BTreeMap;

    fn reading(sensor_type: SensorType, ts: DateTime<Utc>, value: f64) -> SensorReading {
        let mut reading = SensorReading::new(
            "test",
            sensor_type,
            BTreeMap::from([(sensor_type.primary_metric().to_string(), value)]),
        );
        reading.timestamp = ts;
        reading
    }

    fn engine_with(readings: &[SensorReading]) -> (AnalyticsEngine, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        storage.persist_batch(readings).unwrap();
        (AnalyticsEngine::new(AnalyticsConfig::default(), storage.clone()), storage)
    }

    #[test]
    fn test_trend_over_hourly_buckets() {
        let end = Utc::now();
        let readings: Vec<_> = (0..6)
            .flat_map(|h| {
                let ts = end - Duration::hours(6 - h);
                [
                    reading(SensorType::Microphone, ts, 30.0 + 5.0 * h as f64),
                    reading(SensorType::Microphone, ts + Duration::minutes(1), 30.0 + 5.0 * h as f64),
                ]
            })
            .collect();
        let (engine, _) = engine_with(&readings);
        let window = TimeWindow::ending_at(end, Duration::hours(8));

        let trend = engine
            .trend(SensorType::Microphone, window, Granularity::Hour)
            .unwrap()
            .ready()
            .unwrap();
        assert_eq!(trend.direction, TrendDirection::Increasing);
        assert!(trend.slope > 0.0);

        assert!(!engine
            .trend(SensorType::Camera, window, Granularity::Hour)
            .unwrap()
            .is_ready());
    }

    #[test]
    fn test_regression_cache_invalidated_by_new_data() {
        let end = Utc::now();
        let readings: Vec<_> = (0..4)
            .map(|h| reading(SensorType::Camera, end - Duration::hours(4 - h), 50.0))
            .collect();
        let (engine, storage) = engine_with(&readings);
        let window = TimeWindow::ending_at(end, Duration::hours(5));

        engine.trend(SensorType::Camera, window, Granularity::Hour).unwrap();
        engine.trend(SensorType::Camera, window, Granularity::Hour).unwrap();
        assert_eq!(engine.cache_stats(), (1, 1));

        storage
            .persist(&reading(SensorType::Camera, end - Duration::minutes(1), 90.0))
            .unwrap();
        let trend = engine
            .trend(SensorType::Camera, window, Granularity::Hour)
            .unwrap()
            .ready()
            .unwrap();
        assert_eq!(engine.cache_stats(), (1, 2));
        assert_eq!(trend.direction, TrendDirection::Increasing);

        let other = TimeWindow::ending_at(end, Duration::hours(6));
        engine.trend(SensorType::Camera, other, Granularity::Hour).unwrap();
        assert_eq!(engine.cache_stats(), (1, 3));
    }

    #[test]
    fn test_storage_backed_correlation() {
        let end = Utc::now();
        let mut readings = Vec::new();
        for i in 0..30 {
            let ts = end - Duration::minutes(30 - i);
            let greenery = 20.0 + (i % 7) as f64 * 5.0;
            readings.push(reading(SensorType::Camera, ts, greenery));
            readings.push(reading(SensorType::Microphone, ts + Duration::seconds(10), 100.0 - greenery));
        }
        let (engine, _) = engine_with(&readings);

        let result = engine
            .correlation(SensorType::Camera, SensorType::Microphone, TimeWindow::ending_at(end, Duration::hours(1)))
            .unwrap()
            .ready()
            .unwrap();
        assert!(result.coefficient < -0.99);
        assert_eq!(result.samples, 30);
        assert_eq!(result.direction, CorrelationDirection::Negative);
    }

    #[test]
    fn test_statistics_and_empty_window() {
        let end = Utc::now();
        let readings: Vec<_> = [10.0, 20.0, 30.0]
            .iter()
            .enumerate()
            .map(|(i, &v)| reading(SensorType::AirQuality, end - Duration::minutes(i as i64 + 1), v))
            .collect();
        let (engine, _) = engine_with(&readings);
        let window = TimeWindow::ending_at(end, Duration::hours(1));

        let summary = engine.statistics(SensorType::AirQuality, window).unwrap().ready().unwrap();
        assert_eq!(summary.count, 3);
        assert_eq!(summary.mean, 20.0);

        assert_eq!(
            engine.statistics(SensorType::Camera, window).unwrap(),
            AnalysisOutcome::InsufficientData {
                required: 1,
                available: 0
            }
        );
        assert!(!engine.anomalies(SensorType::AirQuality, window).unwrap().is_ready());
    }
}
