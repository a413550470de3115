//! End-to-end aggregation tests: fixtures go in through the store,
//! statistics come out of the engine, and both numeric rollup paths are
//! checked against each other on the same data.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use cellscope::engine::window::Window;
use cellscope::engine::Engine;
use cellscope::model::NewMeasurement;
use cellscope::store::memory::MemoryStore;
use cellscope::store::NumericCapability;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
}

fn sample(
    user: &str,
    operator: &str,
    network: &str,
    brand: &str,
    signal: &str,
    snr: &str,
) -> NewMeasurement {
    NewMeasurement {
        user_id: user.to_string(),
        client_timestamp: "2024-03-01T10:00:00+02:00".to_string(),
        operator: Some(operator.to_string()),
        signal_power: Some(signal.to_string()),
        snr: Some(snr.to_string()),
        network_type: Some(network.to_string()),
        frequency_band: Some("B3 (1800 MHz)".to_string()),
        cell_id: Some("12345".to_string()),
        device_brand: Some(brand.to_string()),
        ip_address: Some("192.168.1.10".to_string()),
        mac_address: Some(format!("aa:bb:cc:dd:ee:0{}", &user[1..])),
    }
}

/// Mixed fleet: two LTE users on Alfa, one 5G user on Touch, with the usual
/// mix of clean and garbage numeric fields.
async fn populate(store: &MemoryStore) {
    let rows = [
        ("u1", "Alfa", "LTE", "Samsung", "-90 dBm", "10 dB", 5),
        ("u1", "Alfa", "LTE", "Samsung", "-80 dBm", "12 dB (SS-SINR)", 40),
        ("u2", "Alfa", "LTE", "Xiaomi", "-100 dBm", "N/A", 15),
        ("u3", "Touch", "5G", "Pixel", "err", "8 dB", 30),
    ];
    for (user, operator, network, brand, signal, snr, minute) in rows {
        store
            .insert_at(
                sample(user, operator, network, brand, signal, snr),
                t0() + Duration::minutes(minute),
            )
            .await
            .unwrap();
    }
}

fn hour_window() -> Window {
    Window {
        start: t0(),
        end: t0() + Duration::hours(1),
    }
}

#[tokio::test]
async fn full_period_statistics_over_mixed_fleet() {
    let store = MemoryStore::new();
    populate(&store).await;
    let engine = Engine::new(Arc::new(store));

    let stats = engine.period_statistics(hour_window()).await.unwrap();

    assert_eq!(stats.active_user_count, 3);
    assert_eq!(stats.total_unique_users, 3);

    // Latest-state: u1's second sample wins; output is newest-first.
    assert_eq!(stats.latest_data.len(), 3);
    assert_eq!(stats.latest_data[0].identity, "u1");
    assert_eq!(stats.latest_data[0].signal, Some(-80.0));
    assert_eq!(stats.latest_data[1].identity, "u3");
    assert_eq!(stats.latest_data[2].identity, "u2");

    // Distributions come from the 3 latest-state rows and sum to ~100.
    assert_eq!(stats.network_distribution["LTE"], 66.7);
    assert_eq!(stats.network_distribution["5G"], 33.3);
    let sum: f64 = stats.operator_distribution.values().sum();
    assert!((sum - 100.0).abs() <= 0.2);

    // Connectivity counts all 4 records.
    assert_eq!(stats.network_connectivity["LTE"], 75.0);
    assert_eq!(stats.network_connectivity["5G"], 25.0);
    assert_eq!(stats.operator_connectivity["Alfa"], 75.0);
    assert_eq!(stats.operator_connectivity["Touch"], 25.0);

    // Signal rollups: u3's "err" drops out, so 5G has no signal entry.
    assert_eq!(stats.avg_signal_by_network["LTE"], -90.0);
    assert!(!stats.avg_signal_by_network.contains_key("5G"));
    assert_eq!(stats.avg_signal_per_device["u1"], -85.0);
    assert_eq!(stats.avg_signal_per_device["u2"], -100.0);
    assert!(!stats.avg_signal_per_device.contains_key("u3"));

    // SNR rollups: u2's "N/A" drops out; u3's clean value stays.
    assert_eq!(stats.avg_snr_by_network["LTE"], 11.0);
    assert_eq!(stats.avg_snr_by_network["5G"], 8.0);

    // Device directory: three distinct MACs, newest sighting first.
    assert_eq!(stats.all_devices.len(), 3);
    assert!(stats
        .all_devices
        .windows(2)
        .all(|w| w[0].last_seen >= w[1].last_seen));
}

#[tokio::test]
async fn rollup_paths_agree_on_identical_fixtures() {
    let pushdown_store = MemoryStore::with_capability(NumericCapability::Pushdown);
    let text_store = MemoryStore::with_capability(NumericCapability::TextFetch);
    populate(&pushdown_store).await;
    populate(&text_store).await;

    let pushed = Engine::new(Arc::new(pushdown_store))
        .period_statistics(hour_window())
        .await
        .unwrap();
    let local = Engine::new(Arc::new(text_store))
        .period_statistics(hour_window())
        .await
        .unwrap();

    for (maps_a, maps_b) in [
        (&pushed.avg_signal_by_network, &local.avg_signal_by_network),
        (&pushed.avg_snr_by_network, &local.avg_snr_by_network),
        (&pushed.avg_signal_per_device, &local.avg_signal_per_device),
    ] {
        assert_eq!(maps_a.len(), maps_b.len());
        for (key, a) in maps_a {
            let b = maps_b[key];
            let rel = if b == 0.0 {
                (a - b).abs()
            } else {
                ((a - b) / b.abs()).abs()
            };
            assert!(rel <= 1e-6, "group {key}: {a} vs {b}");
        }
    }
}

#[tokio::test]
async fn explicit_same_day_window_covers_full_day() {
    let store = MemoryStore::new();
    // 23:59 on the requested day must be inside the window.
    store
        .insert_at(
            sample("u1", "Alfa", "LTE", "Pixel", "-70", "5"),
            Utc.with_ymd_and_hms(2024, 3, 1, 23, 59, 0).unwrap(),
        )
        .await
        .unwrap();
    let engine = Engine::new(Arc::new(store));

    let window = Window::explicit("2024-03-01", "2024-03-01").unwrap();
    let stats = engine.period_statistics(window).await.unwrap();

    assert_eq!(stats.active_user_count, 1);
}

#[tokio::test]
async fn user_series_round_trip_with_downsampling() {
    let store = MemoryStore::new();
    // 120 samples over two hours; every third has an unparseable signal.
    for i in 0..120i64 {
        let signal = if i % 3 == 0 { "n/a".to_string() } else { format!("-{} dBm", 60 + i % 40) };
        store
            .insert_at(
                NewMeasurement {
                    user_id: "u1".to_string(),
                    client_timestamp: "t".to_string(),
                    operator: Some("Alfa".to_string()),
                    signal_power: Some(signal),
                    snr: Some("7 dB".to_string()),
                    network_type: Some(if i < 60 { "LTE" } else { "5G" }.to_string()),
                    frequency_band: None,
                    cell_id: None,
                    device_brand: None,
                    ip_address: None,
                    mac_address: None,
                },
                t0() + Duration::minutes(i),
            )
            .await
            .unwrap();
    }
    let engine = Engine::new(Arc::new(store));

    let window = Window {
        start: t0(),
        end: t0() + Duration::hours(2),
    };
    let series = engine.user_series("u1", window, 40).await.unwrap();

    assert_eq!(series.summary.record_count, 120);
    // stride 3 keeps the cap exactly here.
    assert_eq!(series.points.len(), 40);
    assert!(series
        .points
        .windows(2)
        .all(|w| w[0].timestamp < w[1].timestamp));

    // The summary is computed before downsampling.
    assert_eq!(series.summary.network_distribution["LTE"], 50.0);
    assert_eq!(series.summary.network_distribution["5G"], 50.0);
    assert_eq!(series.summary.avg_snr, Some(7.0));
    // 80 parseable points feed the mean.
    assert!(series.summary.avg_signal.unwrap() < -60.0);

    // Unparseable points survive as explicit nulls in the series.
    assert!(series.points.iter().any(|p| p.signal.is_none()));
}
