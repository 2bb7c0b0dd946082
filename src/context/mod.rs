//! Context module - baselines, wellness scoring, recommendations and patterns

mod baseline;
mod patterns;
mod rules;
mod wellness;

pub use baseline::Baseline;
pub use patterns::*;
pub use rules::*;
pub use wellness::*;

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::analysis::{aggregate, mean, AnalyticsEngine, Granularity, TimeWindow, TrendResult};
use crate::config::ContextConfig;
use crate::db::Storage;
use crate::error::Result;
use crate::sensors::{SensorType, Snapshot};

/// Which side of a metric is desirable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    HigherIsBetter,
    LowerIsBetter,
}

/// Scoring parameters of one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricProfile {
    pub sensor_type: SensorType,
    /// Relative weight in the wellness score
    pub weight: f64,
    pub comfort_min: f64,
    pub comfort_max: f64,
    /// Deviation worth one penalty step
    pub tolerance: f64,
    pub polarity: Polarity,
}

impl MetricProfile {
    pub fn in_comfort(&self, value: f64) -> bool {
        value >= self.comfort_min && value <= self.comfort_max
    }

    pub fn out_of_band(&self, value: f64) -> bool {
        !self.in_comfort(value)
    }
}

/// User feedback on a recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub recommendation_id: Uuid,
    pub helpful: bool,
    pub implemented: bool,
    pub comment: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

impl Feedback {
    pub fn new(recommendation_id: Uuid, helpful: bool, implemented: bool, comment: Option<String>) -> Self {
        Self {
            recommendation_id,
            helpful,
            implemented,
            comment,
            submitted_at: Utc::now(),
        }
    }
}

/// Feedback entries kept in memory; storage holds the full record
pub const RECENT_FEEDBACK: usize = 100;

/// One scoring pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub wellness: WellnessReport,
    pub recommendations: Vec<Recommendation>,
}

/// History and trends gathered once per call
struct Observations {
    recent: BTreeMap<SensorType, Vec<(DateTime<Utc>, f64)>>,
    trends: BTreeMap<SensorType, TrendResult>,
}

/// Turns live readings and stored history into scores and advice
pub struct ContextEngine {
    config: ContextConfig,
    analytics: Arc<AnalyticsEngine>,
    storage: Arc<dyn Storage>,
    rules: Vec<Box<dyn RecommendationRule>>,
    baselines: RwLock<BTreeMap<SensorType, Baseline>>,
    /// When every baseline was last relearned
    last_baseline_update: Mutex<Option<DateTime<Utc>>>,
    /// Last time each recommendation key was handed out
    cooldowns: Mutex<HashMap<String, DateTime<Utc>>>,
    feedback: Mutex<VecDeque<Feedback>>,
}

impl ContextEngine {
    pub fn new(config: ContextConfig, analytics: Arc<AnalyticsEngine>, storage: Arc<dyn Storage>) -> Self {
        Self::with_rules(config, analytics, storage, default_rules())
    }

    pub fn with_rules(
        config: ContextConfig,
        analytics: Arc<AnalyticsEngine>,
        storage: Arc<dyn Storage>,
        rules: Vec<Box<dyn RecommendationRule>>,
    ) -> Self {
        Self {
            config,
            analytics,
            storage,
            rules,
            baselines: RwLock::new(BTreeMap::new()),
            last_baseline_update: Mutex::new(None),
            cooldowns: Mutex::new(HashMap::new()),
            feedback: Mutex::new(VecDeque::new()),
        }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Relearn baselines from the trailing history. Metrics without enough
    /// samples keep their previous baseline. Returns how many were learned.
    pub fn update_baselines(&self, now: DateTime<Utc>) -> Result<usize> {
        let learned = self.learn_baselines(now, false)?;
        *self.last_baseline_update.lock() = Some(now);
        Ok(learned)
    }

    /// Relearn everything once the refresh interval has passed. Until then,
    /// only metrics still lacking a baseline are retried; those have fewer
    /// samples than the establishment threshold, so the lookup stays small.
    fn refresh_baselines(&self, now: DateTime<Utc>) -> Result<()> {
        let last = *self.last_baseline_update.lock();
        let stale = last.map_or(true, |at| now - at >= Duration::seconds(self.config.baseline_refresh_secs));
        if stale {
            self.update_baselines(now)?;
        } else {
            let learned = self.learn_baselines(now, true)?;
            if learned > 0 {
                info!("Established {} new baselines", learned);
            }
        }
        Ok(())
    }

    fn learn_baselines(&self, now: DateTime<Utc>, missing_only: bool) -> Result<usize> {
        let window = TimeWindow::ending_at(now, Duration::days(self.config.baseline_days));
        let mut learned = 0;

        for profile in &self.config.metrics {
            if missing_only && self.baselines.read().contains_key(&profile.sensor_type) {
                continue;
            }
            let values: Vec<f64> = self
                .analytics
                .history(profile.sensor_type, window)?
                .into_iter()
                .map(|(_, v)| v)
                .collect();

            match Baseline::learn(
                &values,
                self.config.min_baseline_samples,
                self.config.full_confidence_samples,
                now,
            ) {
                Some(baseline) => {
                    debug!(
                        "Baseline for {}: mean {:.2}, {} samples",
                        profile.sensor_type, baseline.mean, baseline.sample_size
                    );
                    self.baselines.write().insert(profile.sensor_type, baseline);
                    learned += 1;
                }
                None => debug!(
                    "Baseline for {} needs {} samples, have {}",
                    profile.sensor_type,
                    self.config.min_baseline_samples,
                    values.len()
                ),
            }
        }

        Ok(learned)
    }

    /// Baselines as of the last refresh
    pub fn baselines(&self) -> BTreeMap<SensorType, Baseline> {
        self.baselines.read().clone()
    }

    fn observe(&self, now: DateTime<Utc>) -> Result<Observations> {
        self.refresh_baselines(now)?;
        let window = TimeWindow::ending_at(now, Duration::hours(self.config.evaluation_hours));
        let mut recent = BTreeMap::new();
        let mut trends = BTreeMap::new();

        for profile in &self.config.metrics {
            recent.insert(profile.sensor_type, self.analytics.history(profile.sensor_type, window)?);
            if let Some(trend) = self
                .analytics
                .trend(profile.sensor_type, window, Granularity::Hour)?
                .ready()
            {
                trends.insert(profile.sensor_type, trend);
            }
        }

        Ok(Observations { recent, trends })
    }

    fn score(&self, snapshot: &Snapshot, observations: &Observations, now: DateTime<Utc>) -> WellnessReport {
        let baselines = self.baselines.read();
        let mut components = Vec::new();
        let mut effects = Vec::new();

        for profile in &self.config.metrics {
            let value = snapshot.value(profile.sensor_type).or_else(|| {
                let points = observations.recent.get(&profile.sensor_type)?;
                let values: Vec<f64> = points.iter().map(|&(_, v)| v).collect();
                (!values.is_empty()).then(|| mean(&values))
            });
            if let Some(value) = value {
                components.push(score_metric(
                    profile,
                    value,
                    baselines.get(&profile.sensor_type),
                    self.config.penalty_per_sigma,
                ));
            }
            if let Some(trend) = observations.trends.get(&profile.sensor_type) {
                effects.push(profile.trend_effect(trend.direction));
            }
        }

        combine(components, trend_score(&effects), self.config.trend_weight, now)
    }

    /// Wellness of the current snapshot against baselines and recent trends
    pub fn wellness(&self, snapshot: &Snapshot, now: DateTime<Utc>) -> Result<WellnessReport> {
        let observations = self.observe(now)?;
        Ok(self.score(snapshot, &observations, now))
    }

    fn recommend(
        &self,
        snapshot: &Snapshot,
        observations: &Observations,
        now: DateTime<Utc>,
        priority: Option<Priority>,
        limit: Option<usize>,
    ) -> Vec<Recommendation> {
        let baselines = self.baselines.read();
        let ctx = RuleContext {
            now,
            snapshot,
            recent: &observations.recent,
            baselines: &baselines,
            trends: &observations.trends,
            profiles: &self.config.metrics,
        };

        let mut candidates: Vec<Recommendation> = self
            .rules
            .iter()
            .filter_map(|rule| rule.evaluate(&ctx))
            .filter(|rec| priority.map_or(true, |p| rec.priority == p))
            .collect();
        // Stable, so rule order breaks ties
        candidates.sort_by_key(|rec| rec.priority);

        let cooldown = Duration::seconds(self.config.cooldown_secs);
        let mut cooldowns = self.cooldowns.lock();
        let mut out = Vec::new();
        for rec in candidates {
            if limit.is_some_and(|l| out.len() >= l) {
                break;
            }
            let key = rec.key();
            if let Some(&last) = cooldowns.get(&key) {
                if now - last < cooldown {
                    debug!("Suppressing {} (cooling down)", key);
                    continue;
                }
            }
            cooldowns.insert(key, now);
            out.push(rec);
        }
        out
    }

    /// Recommendations ordered by priority then rule order, skipping any
    /// handed out within the cooldown
    pub fn recommendations(
        &self,
        snapshot: &Snapshot,
        now: DateTime<Utc>,
        priority: Option<Priority>,
        limit: Option<usize>,
    ) -> Result<Vec<Recommendation>> {
        let observations = self.observe(now)?;
        Ok(self.recommend(snapshot, &observations, now, priority, limit))
    }

    /// Wellness and recommendations from a single pass over history
    pub fn evaluate(&self, snapshot: &Snapshot, now: DateTime<Utc>) -> Result<Evaluation> {
        let observations = self.observe(now)?;
        let wellness = self.score(snapshot, &observations, now);
        let recommendations = self.recommend(snapshot, &observations, now, None, None);
        info!(
            "Wellness {:.0} ({:?}), {} recommendations",
            wellness.score,
            wellness.rating,
            recommendations.len()
        );
        Ok(Evaluation {
            wellness,
            recommendations,
        })
    }

    /// Time-of-day, day-of-week, recurring out-of-band and trend patterns over the last `days`
    pub fn patterns(&self, now: DateTime<Utc>, days: i64) -> Result<Vec<Pattern>> {
        let window = TimeWindow::ending_at(now, Duration::days(days));
        let mut found = Vec::new();

        for profile in &self.config.metrics {
            let points = self.analytics.history(profile.sensor_type, window)?;
            if points.is_empty() {
                continue;
            }
            found.extend(time_of_day(profile, &aggregate(&points, Granularity::Hour)));
            found.extend(day_of_week(profile, &aggregate(&points, Granularity::Day)));
            found.extend(recurring_issue(profile, &points));
            found.extend(trend_pattern(profile, &points));
        }

        Ok(found)
    }

    /// Hand feedback to storage and keep the most recent entries in memory
    pub fn submit_feedback(&self, feedback: Feedback) -> Result<()> {
        self.storage.record_feedback(&feedback)?;
        info!(
            "Feedback on {}: helpful={}, implemented={}",
            feedback.recommendation_id, feedback.helpful, feedback.implemented
        );
        let mut recent = self.feedback.lock();
        if recent.len() == RECENT_FEEDBACK {
            recent.pop_front();
        }
        recent.push_back(feedback);
        Ok(())
    }

    /// Most recent feedback, oldest first
    pub fn feedback(&self) -> Vec<Feedback> {
        self.feedback.lock().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnalyticsConfig;
    use crate::db::MemoryStorage;
    use crate::sensors::SensorReading;

    fn reading(sensor_type: SensorType, ts: DateTime<Utc>, value: f64) -> SensorReading {
        let mut reading = SensorReading::new(
            "test",
            sensor_type,
            BTreeMap::from([(sensor_type.primary_metric().to_string(), value)]),
        );
        reading.timestamp = ts;
        reading
    }

    fn engine(readings: &[SensorReading]) -> (ContextEngine, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        storage.persist_batch(readings).unwrap();
        let analytics = Arc::new(AnalyticsEngine::new(AnalyticsConfig::default(), storage.clone()));
        (ContextEngine::new(ContextConfig::default(), analytics, storage.clone()), storage)
    }

    fn snapshot(values: &[(SensorType, f64)]) -> Snapshot {
        let mut snapshot = Snapshot::empty();
        for &(sensor_type, value) in values {
            snapshot
                .readings
                .insert(sensor_type, reading(sensor_type, Utc::now(), value));
        }
        snapshot
    }

    #[test]
    fn test_no_data_is_neutral() {
        let (engine, _) = engine(&[]);
        let report = engine.wellness(&Snapshot::empty(), Utc::now()).unwrap();
        assert_eq!(report.score, 50.0);
        assert_eq!(report.rating, WellnessRating::Unknown);
    }

    #[test]
    fn test_wellness_bounded_and_ordered() {
        let (engine, _) = engine(&[]);
        let now = Utc::now();
        let good = engine
            .wellness(&snapshot(&[(SensorType::Camera, 45.0), (SensorType::Microphone, 35.0)]), now)
            .unwrap();
        let bad = engine
            .wellness(&snapshot(&[(SensorType::Camera, 2.0), (SensorType::Microphone, 95.0)]), now)
            .unwrap();

        assert_eq!(good.rating, WellnessRating::Excellent);
        assert!(bad.score < good.score);
        assert!((0.0..=100.0).contains(&bad.score));
        assert_eq!(bad.rating, WellnessRating::Poor);
    }

    #[test]
    fn test_baselines_learned_from_history() {
        let now = Utc::now();
        let readings: Vec<_> = (0..30)
            .map(|i| reading(SensorType::Camera, now - Duration::hours(i), 40.0))
            .collect();
        let (engine, _) = engine(&readings);

        assert_eq!(engine.update_baselines(now).unwrap(), 1);
        let baselines = engine.baselines();
        assert_eq!(baselines[&SensorType::Camera].mean, 40.0);
        assert!(!baselines.contains_key(&SensorType::Microphone));
    }

    #[test]
    fn test_evaluate_picks_up_history_recorded_after_start() {
        let (engine, storage) = engine(&[]);
        let start = Utc::now();
        assert_eq!(engine.update_baselines(start).unwrap(), 0);

        let readings: Vec<_> = (0..60)
            .map(|i| reading(SensorType::Camera, start - Duration::minutes(i), 40.0))
            .collect();
        storage.persist_batch(&readings).unwrap();

        // Within the refresh interval, missing baselines are still retried
        let evaluation = engine
            .evaluate(&snapshot(&[(SensorType::Camera, 40.0)]), start)
            .unwrap();
        let camera = evaluation
            .wellness
            .components
            .iter()
            .find(|c| c.sensor_type == SensorType::Camera)
            .unwrap();
        assert!(camera.personalized);
        assert_eq!(engine.baselines()[&SensorType::Camera].sample_size, 60);
    }

    #[test]
    fn test_established_baselines_refresh_after_interval() {
        let start = Utc::now();
        let early: Vec<_> = (0..30)
            .map(|i| reading(SensorType::Camera, start - Duration::minutes(i), 40.0))
            .collect();
        let (engine, storage) = engine(&early);
        assert_eq!(engine.update_baselines(start).unwrap(), 1);

        let later: Vec<_> = (1..=30)
            .map(|i| reading(SensorType::Camera, start + Duration::minutes(i), 60.0))
            .collect();
        storage.persist_batch(&later).unwrap();

        let soon = start + Duration::minutes(31);
        engine.wellness(&Snapshot::empty(), soon).unwrap();
        assert_eq!(engine.baselines()[&SensorType::Camera].mean, 40.0);

        let after = start + Duration::seconds(engine.config().baseline_refresh_secs);
        engine.wellness(&Snapshot::empty(), after).unwrap();
        assert_eq!(engine.baselines()[&SensorType::Camera].mean, 50.0);
    }

    #[test]
    fn test_recommendations_sorted_filtered_and_cooled_down() {
        let (engine, _) = engine(&[]);
        let now = Utc::now();
        let live = snapshot(&[
            (SensorType::Camera, 5.0),
            (SensorType::Microphone, 65.0),
            (SensorType::AirQuality, 250.0),
        ]);

        let recs = engine.recommendations(&live, now, None, None).unwrap();
        let rules: Vec<&str> = recs.iter().map(|r| r.rule.as_str()).collect();
        assert_eq!(
            rules,
            vec!["greenery", "air_quality", "noise", "monitoring_consistency", "general_wellness"]
        );
        assert!(recs.windows(2).all(|w| w[0].priority <= w[1].priority));

        // Everything above was just handed out
        assert!(engine.recommendations(&live, now + Duration::minutes(5), None, None).unwrap().is_empty());

        let later = now + Duration::seconds(engine.config().cooldown_secs + 1);
        let high = engine
            .recommendations(&live, later, Some(Priority::High), Some(1))
            .unwrap();
        assert_eq!(high.len(), 1);
        assert_eq!(high[0].rule, "greenery");

        // Limit does not consume the cooldown of recommendations it cut
        let rest = engine.recommendations(&live, later, Some(Priority::High), None).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].rule, "air_quality");
    }

    #[test]
    fn test_patterns_from_history() {
        let now = Utc::now();
        let readings: Vec<_> = (0..40)
            .map(|i| reading(SensorType::Microphone, now - Duration::hours(i), 80.0))
            .collect();
        let (engine, _) = engine(&readings);

        let patterns = engine.patterns(now, 14).unwrap();
        assert!(patterns
            .iter()
            .any(|p| p.kind == PatternKind::RecurringIssue && p.sensor_type == SensorType::Microphone));
        assert!(patterns.iter().all(|p| p.sensor_type == SensorType::Microphone));
    }

    #[test]
    fn test_declining_greenery_reported_as_trend() {
        let now = Utc::now();
        let readings: Vec<_> = (0..20)
            .map(|i| reading(SensorType::Camera, now - Duration::hours(20 - i), if i < 10 { 60.0 } else { 35.0 }))
            .collect();
        let (engine, _) = engine(&readings);

        let patterns = engine.patterns(now, 7).unwrap();
        let trend = patterns.iter().find(|p| p.kind == PatternKind::Trend).unwrap();
        assert_eq!(trend.sensor_type, SensorType::Camera);
        assert!(trend.description.contains("declining"));
    }

    #[test]
    fn test_feedback_recorded_in_memory_and_storage() {
        let (engine, storage) = engine(&[]);
        let feedback = Feedback::new(Uuid::new_v4(), true, false, Some("moved the desk".into()));
        engine.submit_feedback(feedback.clone()).unwrap();

        assert_eq!(engine.feedback(), vec![feedback.clone()]);
        assert_eq!(storage.feedback(), vec![feedback]);
    }

    #[test]
    fn test_feedback_memory_is_bounded() {
        let (engine, storage) = engine(&[]);
        let ids: Vec<Uuid> = (0..RECENT_FEEDBACK + 5).map(|_| Uuid::new_v4()).collect();
        for &id in &ids {
            engine.submit_feedback(Feedback::new(id, true, true, None)).unwrap();
        }

        let recent = engine.feedback();
        assert_eq!(recent.len(), RECENT_FEEDBACK);
        assert_eq!(recent[0].recommendation_id, ids[5]);
        assert_eq!(storage.feedback().len(), RECENT_FEEDBACK + 5);
    }

    #[test]
    fn test_evaluate_combines_both() {
        let (engine, _) = engine(&[]);
        let evaluation = engine
            .evaluate(&snapshot(&[(SensorType::Microphone, 75.0)]), Utc::now())
            .unwrap();
        assert_eq!(evaluation.recommendations[0].rule, "noise");
        assert!(evaluation.wellness.score < 100.0);
    }
}
