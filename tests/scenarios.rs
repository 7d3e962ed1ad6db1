//! End-to-end scenario tests against the public API surface, one per concrete behavior
//! this crate is responsible for: ingestion ordering, attention boost decay, battery
//! capping, load-driven store scaling, sensor-wide pinning, and priority-attribute
//! broadcast policy.

use pulsemesh::pubsub::{data_attention_topic, data_topic};
use pulsemesh::store::AttributeStore;
use pulsemesh::types::{AttentionLevel, AttributeType, BatteryMetadata, BatteryState, LoadLevel, Measurement, Value};
use pulsemesh::{AttentionTracker, Bus};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

async fn settle() {
    tokio::time::sleep(Duration::from_millis(30)).await;
}

/// S1: a ranged read returns the requested window in ascending timestamp order,
/// matching `get_attribute("s1", "hr", 1000, None, 10) -> [{1000, 72}, {2000, 74}]`.
#[tokio::test]
async fn s1_ranged_get_attribute_reads_ascending() {
    let store = AttributeStore::new(1000, 60_000);
    store.put_attribute(Measurement::new("s1", "hr", 1000, Value::Number(72.0)), LoadLevel::Normal);
    store.put_attribute(Measurement::new("s1", "hr", 2000, Value::Number(74.0)), LoadLevel::Normal);

    let read = store.get_attribute("s1", "hr", Some(1000), None, 10);
    assert_eq!(read.len(), 2);
    assert_eq!(read[0].timestamp_ms, 1000);
    assert_eq!(read[0].payload, Value::Number(72.0));
    assert_eq!(read[1].timestamp_ms, 2000);
    assert_eq!(read[1].payload, Value::Number(74.0));
}

/// S2: hovering raises an attribute to High; releasing hover holds it at High for the
/// hover boost window, then it decays back down once the boost expires.
#[tokio::test]
async fn s2_hover_boost_holds_then_decays() {
    let bus = Arc::new(Bus::new());
    let tracker = AttentionTracker::new(bus, &pulsemesh::Config::default());
    let sensor = "s1".to_string();
    let attr = "hr".to_string();
    let user = "u1".to_string();

    tracker.register_hover(&sensor, &attr, &user).await;
    settle().await;
    assert_eq!(tracker.get_attention_level(&sensor, &attr), AttentionLevel::High);

    tracker.unregister_hover(&sensor, &attr, &user).await;
    settle().await;
    // Still boosted immediately after release: no viewers left, but the boost floors it.
    assert_eq!(tracker.get_attention_level(&sensor, &attr), AttentionLevel::High);

    // Hover boost is 2s; past it with nothing else holding the attribute, it decays to None.
    tokio::time::sleep(Duration::from_millis(2_200)).await;
    assert_eq!(tracker.get_attention_level(&sensor, &attr), AttentionLevel::None);
}

/// S3: a critical-battery user's own contribution is capped to the configured ceiling
/// (default `low`) even though focusing would otherwise drive the attribute to `high`.
#[tokio::test]
async fn s3_critical_battery_caps_to_low() {
    let bus = Arc::new(Bus::new());
    let tracker = AttentionTracker::new(bus, &pulsemesh::Config::default());
    let sensor = "s1".to_string();
    let attr = "hr".to_string();
    let user = "u1".to_string();

    tracker.report_battery_state(&user, BatteryState::Critical, BatteryMetadata::default()).await;
    tracker.register_focus(&sensor, &attr, &user).await;
    settle().await;

    assert_eq!(tracker.get_attention_level(&sensor, &attr), AttentionLevel::Low);
}

/// S4: under `high` load a numeric attribute's hot-tier limit scales from the configured
/// base (1000) down to 400 (the `0.4` hot multiplier at `high` load), and reads reflect exactly
/// that many of the newest writes once the tier has been exercised past it.
#[tokio::test]
async fn s4_high_load_scales_hot_limit_to_400() {
    let store = AttributeStore::new(1000, 60_000);

    let limits = store.current_limits(AttributeType::Numeric, LoadLevel::High);
    assert_eq!(limits.hot_limit, 400);

    for ts in 0..2_001i64 {
        store.put_attribute(Measurement::new("s1", "hr", ts, Value::Number(ts as f64)), LoadLevel::High);
    }

    let newest_400 = store.get_attributes("s1", "hr", 400);
    assert_eq!(newest_400.len(), 400);
    assert_eq!(newest_400.first().unwrap().timestamp_ms, 2_000);
    assert_eq!(newest_400.last().unwrap().timestamp_ms, 1_601);
}

/// S5: pinning a sensor forces its sensor-wide (and per-attribute) level to `high`
/// regardless of viewer activity; unpinning releases the override.
#[tokio::test]
async fn s5_pin_forces_high_unpin_releases_it() {
    let bus = Arc::new(Bus::new());
    let tracker = AttentionTracker::new(bus, &pulsemesh::Config::default());
    let sensor = "s1".to_string();
    let user = "u1".to_string();

    assert_eq!(tracker.get_sensor_attention_level(&sensor), AttentionLevel::None);
    assert_eq!(tracker.get_attention_level(&sensor, &"hr".to_string()), AttentionLevel::None);

    tracker.pin_sensor(&sensor, &user).await;
    settle().await;
    assert_eq!(tracker.get_sensor_attention_level(&sensor), AttentionLevel::High);
    assert_eq!(tracker.get_attention_level(&sensor, &"hr".to_string()), AttentionLevel::High);

    tracker.unpin_sensor(&sensor, &user).await;
    settle().await;
    assert_eq!(tracker.get_sensor_attention_level(&sensor), AttentionLevel::None);
}

/// S6: a configured priority attribute (`button`) force-broadcasts on
/// `data:attention:high` even while nobody is viewing it and its computed level is
/// `none` — and, unlike a non-priority attribute at `none`, no message appears on
/// `data:attention:none` for it.
#[tokio::test]
async fn s6_priority_attribute_broadcasts_on_high_not_none() {
    let bus = Arc::new(Bus::new());
    let config = Arc::new(pulsemesh::Config::default());
    let store = Arc::new(AttributeStore::new(config.attribute_store_hot_limit, config.attribute_store_warm_limit));
    let tracker = Arc::new(AttentionTracker::new(bus.clone(), &config));

    let mut high_sub = bus.subscribe(data_attention_topic(AttentionLevel::High));
    let mut none_sub = bus.subscribe(data_attention_topic(AttentionLevel::None));
    let mut data_sub = bus.subscribe(data_topic("s1"));

    let sensor_running = Arc::new(AtomicBool::new(true));
    let handle = pulsemesh::worker::attribute::spawn(
        "s1".into(),
        "button".into(),
        store,
        bus.clone(),
        tracker,
        pulsemesh::biomimetic::FactorProviders::default(),
        config,
        sensor_running,
    );

    handle.tx.send(Measurement::new("s1", "button", 0, Value::Bool(true))).await.unwrap();

    let on_data = tokio::time::timeout(Duration::from_secs(2), data_sub.recv()).await.expect("timed out on data topic");
    assert!(on_data.is_some());

    let on_high = tokio::time::timeout(Duration::from_secs(2), high_sub.recv()).await.expect("timed out on high topic");
    assert!(on_high.is_some());

    // Nothing should ever land on the `none` topic for a priority attribute.
    assert!(none_sub.rx.try_recv().is_err());

    handle.stop();
}
