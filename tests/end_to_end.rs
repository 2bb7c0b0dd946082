// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use verdant::analysis::Granularity;
use verdant::config::{PollingPolicy, SimulationConfig};
use verdant::sensors::{AirQualityProfile, HardwareSensor, ScriptedProbe, Sensor};
use verdant::{
    AnalysisOutcome, Config, Engine, MemoryStorage, SensorManager, SensorStatus, SensorType, StreamMessage,
    TimeWindow,
};

fn fast_policy() -> PollingPolicy {
    PollingPolicy {
        polling_hz: 10.0,
        read_timeout_ms: 200,
        backoff_base_ms: 20,
        backoff_max_ms: 200,
        ..Default::default()
    }
}

#[tokio::test]
async fn forced_probe_failure_runs_in_mock_mode() {
    let probe = ScriptedProbe::new(false, 0.0);
    let sensor = HardwareSensor::new("air-1", Box::new(AirQualityProfile::new(1.0)), Box::new(probe.clone()), true)
        .with_seed(3);

    let storage = Arc::new(MemoryStorage::new());
    let manager = SensorManager::with_sensors(
        fast_policy(),
        &SimulationConfig::default(),
        vec![Box::new(sensor) as Box<dyn Sensor>],
        storage.clone(),
    )
    .unwrap();

    let report = manager.start_all().await.unwrap();
    assert_eq!(report.started, 1);
    assert_eq!(report.total, 1);
    assert_eq!(report.statuses["air-1"], SensorStatus::MockMode);

    for _ in 0..5 {
        let snapshot = manager.poll_once().await.unwrap();
        let reading = &snapshot.readings[&SensorType::AirQuality];
        assert!(reading.synthetic);
        assert_eq!(reading.status, SensorStatus::MockMode);
        assert!(reading.primary_value().is_some());
    }
    assert_eq!(probe.captures(), 0);

    manager.stop_all().await.unwrap();
    assert!(!storage.is_empty());
}

#[tokio::test]
async fn standalone_mock_sensor_reads_synthetic() {
    let mut sensor = HardwareSensor::new(
        "air-2",
        Box::new(AirQualityProfile::new(1.0)),
        Box::new(ScriptedProbe::new(false, 0.0)),
        true,
    );
    assert_eq!(sensor.start().await.unwrap(), SensorStatus::MockMode);
    for _ in 0..3 {
        assert!(sensor.read().await.unwrap().synthetic);
    }
    sensor.stop().await.unwrap();
}

#[tokio::test]
async fn engine_streams_stores_and_scores() {
    let mut config = Config::default();
    config.database.enabled = false;
    config.sensors.polling = fast_policy();
    config.simulation.seed = Some(11);
    config.simulation.start_scenario = Some("stress".into());

    let storage = Arc::new(MemoryStorage::new());
    let mut engine = Engine::with_storage(config, storage.clone()).unwrap();
    let report = engine.start().await.unwrap();
    assert_eq!(report.started, report.total);

    let mut consumers: Vec<_> = (0..3).map(|_| engine.broadcaster().connect()).collect();
    for consumer in consumers.iter_mut() {
        let message = tokio::time::timeout(Duration::from_secs(2), consumer.recv())
            .await
            .unwrap()
            .unwrap();
        match message.as_ref() {
            StreamMessage::SensorData { scenario, sensors, .. } => {
                assert_eq!(scenario.as_deref(), Some("stress"));
                assert_eq!(sensors.len(), 3);
            }
            other => panic!("unexpected message {:?}", other.kind()),
        }
    }

    tokio::time::sleep(Duration::from_millis(500)).await;

    let window = TimeWindow::last_hours(1);
    let stats = engine
        .analytics()
        .statistics(SensorType::Microphone, window)
        .unwrap()
        .ready()
        .unwrap();
    assert!(stats.count >= 2);
    assert!(engine
        .analytics()
        .aggregate(SensorType::Camera, window, Granularity::Hour)
        .unwrap()
        .iter()
        .all(|b| b.count > 0));
    assert!(matches!(
        engine.analytics().trend(SensorType::Camera, window, Granularity::Hour).unwrap(),
        AnalysisOutcome::InsufficientData { .. }
    ));

    let snapshot = engine.manager().latest_snapshot();
    // Stress keeps noise loud
    assert!(snapshot.value(SensorType::Microphone).unwrap() >= 70.0);
    let evaluation = engine.context().evaluate(&snapshot, Utc::now()).unwrap();
    assert!(evaluation.wellness.score <= 75.0);
    assert!(evaluation.recommendations.iter().any(|r| r.rule == "noise"));

    engine.stop().await.unwrap();
    assert!(!engine.state().running);
    assert!(!storage.is_empty());
}
