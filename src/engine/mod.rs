//! Telemetry aggregation engine.
//!
//! Pure computation over measurement sets fetched from a
//! [`MeasurementStore`]. The engine holds no mutable state between calls;
//! every result is recomputed from the store on each request and discarded
//! after the response is produced, so concurrent invocations need no
//! coordination.

pub mod distribution;
pub mod downsample;
pub mod extract;
pub mod latest;
pub mod rollup;
pub mod window;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::EngineError;
use crate::model::{DeviceInfo, Measurement};
use crate::store::{MeasurementStore, NumericCapability, RollupGroup};

use self::distribution::{connectivity, distribution};
use self::downsample::downsample;
use self::latest::latest_per_identity;
use self::rollup::{mean_by_group, mean_of, NumericField};
use self::window::Window;

/// Period-wide statistics. Ephemeral: recomputed on every request.
#[derive(Debug, Serialize)]
pub struct PeriodStatistics {
    /// Identities with at least one record in the window.
    pub active_user_count: usize,
    /// Most recent record per identity, newest first.
    pub latest_data: Vec<Measurement>,
    /// Share of active identities per network type (latest-state based).
    pub network_distribution: HashMap<String, f64>,
    pub operator_distribution: HashMap<String, f64>,
    pub device_brand_distribution: HashMap<String, f64>,
    /// Mean extracted signal per network type.
    pub avg_signal_by_network: HashMap<String, f64>,
    pub avg_snr_by_network: HashMap<String, f64>,
    pub avg_signal_per_device: HashMap<String, f64>,
    /// Share of all records per operator (traffic based, unfiltered).
    pub operator_connectivity: HashMap<String, f64>,
    pub network_connectivity: HashMap<String, f64>,
    /// Distinct identities ever seen, regardless of window.
    pub total_unique_users: u64,
    /// Known devices with last IP and last-seen time, newest first.
    pub all_devices: Vec<DeviceInfo>,
    /// The resolved query window.
    pub window: Window,
    pub stats_time_utc: DateTime<Utc>,
    /// Set when the backend could not compute numeric rollups; the
    /// non-numeric statistics above are still complete.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capability_warning: Option<String>,
}

/// One chartable point of a user's series.
#[derive(Debug, Clone, Serialize)]
pub struct SeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub signal: Option<f64>,
    pub snr: Option<f64>,
    pub network_type: Option<String>,
}

/// Aggregate summary accompanying a user series.
#[derive(Debug, Serialize)]
pub struct UserSeriesSummary {
    /// Records found in the window, before downsampling.
    pub record_count: usize,
    pub network_distribution: HashMap<String, f64>,
    pub avg_signal: Option<f64>,
    pub avg_snr: Option<f64>,
}

/// Downsampled per-user series plus its summary. An empty `points` with
/// `record_count == 0` means "no data in the window", which is a normal
/// result, not a failure.
#[derive(Debug, Serialize)]
pub struct UserSeries {
    pub identity: String,
    pub window: Window,
    pub points: Vec<SeriesPoint>,
    pub summary: UserSeriesSummary,
}

/// The aggregation orchestrator. Stateless besides the store handle.
#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn MeasurementStore>,
}

impl Engine {
    pub fn new(store: Arc<dyn MeasurementStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn MeasurementStore> {
        &self.store
    }

    /// Computes the full statistics payload for `window`.
    pub async fn period_statistics(
        &self,
        window: Window,
    ) -> Result<PeriodStatistics, EngineError> {
        let records = self.store.fetch(None, &window).await?;
        tracing::debug!(
            records = records.len(),
            start = %window.start,
            end = %window.end,
            "computing period statistics"
        );

        let operator_connectivity = connectivity(records.iter().map(|m| m.operator_category()));
        let network_connectivity = connectivity(records.iter().map(|m| m.network_category()));

        let rollups = self.numeric_rollups(&window, &records).await?;

        let latest_data = latest_per_identity(records);

        let network_distribution =
            distribution(latest_data.iter().map(|m| m.network_category()));
        let operator_distribution =
            distribution(latest_data.iter().map(|m| m.operator_category()));
        let device_brand_distribution =
            distribution(latest_data.iter().map(|m| m.brand_category()));

        let total_unique_users = self.store.distinct_identity_count().await?;
        let all_devices = self.store.device_directory().await?;

        Ok(PeriodStatistics {
            active_user_count: latest_data.len(),
            latest_data,
            network_distribution,
            operator_distribution,
            device_brand_distribution,
            avg_signal_by_network: rollups.signal_by_network,
            avg_snr_by_network: rollups.snr_by_network,
            avg_signal_per_device: rollups.signal_per_identity,
            operator_connectivity,
            network_connectivity,
            total_unique_users,
            all_devices,
            window,
            stats_time_utc: Utc::now(),
            capability_warning: rollups.warning,
        })
    }

    /// Computes the downsampled series and summary for one identity.
    pub async fn user_series(
        &self,
        identity: &str,
        window: Window,
        max_points: usize,
    ) -> Result<UserSeries, EngineError> {
        let resolved = self
            .store
            .resolve_identity(identity)
            .await?
            .ok_or_else(|| EngineError::UnknownIdentity {
                identity: identity.to_string(),
            })?;

        let mut records = self.store.fetch(Some(&resolved), &window).await?;
        records.sort_by(|a, b| (a.captured_at, a.id).cmp(&(b.captured_at, b.id)));

        let summary = UserSeriesSummary {
            record_count: records.len(),
            network_distribution: connectivity(
                records.iter().map(|m| m.network_category()),
            ),
            avg_signal: mean_of(&records, NumericField::Signal),
            avg_snr: mean_of(&records, NumericField::Snr),
        };

        let points: Vec<SeriesPoint> = records
            .into_iter()
            .map(|m| SeriesPoint {
                timestamp: m.captured_at,
                signal: m.signal,
                snr: m.snr,
                network_type: m.network_type,
            })
            .collect();

        Ok(UserSeries {
            identity: resolved,
            window,
            points: downsample(points, max_points),
            summary,
        })
    }

    /// Runs the numeric rollups along the path the backend supports.
    ///
    /// The capability is consulted once; a backend with neither pushdown nor
    /// usable text degrades the response (empty maps + warning) instead of
    /// failing it, so every non-numeric statistic still reaches the caller.
    async fn numeric_rollups(
        &self,
        window: &Window,
        records: &[Measurement],
    ) -> Result<RollupSet, EngineError> {
        match self.store.numeric_capability() {
            NumericCapability::Pushdown => Ok(RollupSet {
                signal_by_network: self
                    .store
                    .pushdown_mean(NumericField::Signal, RollupGroup::NetworkType, window)
                    .await?,
                snr_by_network: self
                    .store
                    .pushdown_mean(NumericField::Snr, RollupGroup::NetworkType, window)
                    .await?,
                signal_per_identity: self
                    .store
                    .pushdown_mean(NumericField::Signal, RollupGroup::Identity, window)
                    .await?,
                warning: None,
            }),
            NumericCapability::TextFetch => Ok(RollupSet {
                signal_by_network: mean_by_group(records, NumericField::Signal, |m| {
                    m.network_category()
                }),
                snr_by_network: mean_by_group(records, NumericField::Snr, |m| {
                    m.network_category()
                }),
                signal_per_identity: mean_by_group(records, NumericField::Signal, |m| {
                    m.identity.as_str()
                }),
                warning: None,
            }),
            capability @ NumericCapability::Unsupported => {
                let err = EngineError::UnsupportedBackend { capability };
                tracing::warn!(store = self.store.name(), "{err}");
                Ok(RollupSet {
                    signal_by_network: HashMap::new(),
                    snr_by_network: HashMap::new(),
                    signal_per_identity: HashMap::new(),
                    warning: Some(err.to_string()),
                })
            }
        }
    }
}

struct RollupSet {
    signal_by_network: HashMap<String, f64>,
    snr_by_network: HashMap<String, f64>,
    signal_per_identity: HashMap<String, f64>,
    warning: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    use crate::model::NewMeasurement;
    use crate::store::memory::MemoryStore;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
    }

    fn window_1h() -> Window {
        Window {
            start: t0(),
            end: t0() + chrono::Duration::hours(1),
        }
    }

    fn sample(user: &str, network: &str, signal: Option<&str>) -> NewMeasurement {
        NewMeasurement {
            user_id: user.to_string(),
            client_timestamp: "2024-03-01T10:00:00Z".to_string(),
            operator: Some("Alfa".to_string()),
            signal_power: signal.map(str::to_string),
            snr: None,
            network_type: Some(network.to_string()),
            frequency_band: None,
            cell_id: None,
            device_brand: Some("Pixel".to_string()),
            ip_address: None,
            mac_address: None,
        }
    }

    async fn engine_with_scenario(capability: NumericCapability) -> Engine {
        let store = MemoryStore::with_capability(capability);
        store
            .insert_at(sample("u1", "LTE", Some("-90")), t0() + chrono::Duration::minutes(10))
            .await
            .unwrap();
        store
            .insert_at(sample("u1", "LTE", Some("-80")), t0() + chrono::Duration::minutes(40))
            .await
            .unwrap();
        store
            .insert_at(sample("u2", "5G", Some("bad")), t0() + chrono::Duration::minutes(5))
            .await
            .unwrap();
        Engine::new(Arc::new(store))
    }

    #[tokio::test]
    async fn test_period_statistics_scenario() {
        let engine = engine_with_scenario(NumericCapability::TextFetch).await;
        let stats = engine.period_statistics(window_1h()).await.unwrap();

        assert_eq!(stats.active_user_count, 2);
        assert_eq!(stats.latest_data.len(), 2);
        assert_eq!(stats.latest_data[0].identity, "u1");
        assert_eq!(
            stats.latest_data[0].captured_at,
            t0() + chrono::Duration::minutes(40)
        );
        assert_eq!(stats.latest_data[1].identity, "u2");

        // u2's "bad" signal is excluded: no entry, not a zero.
        assert_eq!(stats.avg_signal_per_device.len(), 1);
        assert_eq!(stats.avg_signal_per_device["u1"], -85.0);

        // Connectivity counts all 3 records; distribution counts the 2
        // latest-state rows.
        assert_eq!(stats.network_connectivity["LTE"], 66.7);
        assert_eq!(stats.network_connectivity["5G"], 33.3);
        assert_eq!(stats.network_distribution["LTE"], 50.0);
        assert_eq!(stats.network_distribution["5G"], 50.0);

        assert_eq!(stats.total_unique_users, 2);
        assert!(stats.capability_warning.is_none());
    }

    #[tokio::test]
    async fn test_empty_window_is_not_an_error() {
        let engine = engine_with_scenario(NumericCapability::TextFetch).await;
        let empty = Window {
            start: t0() - chrono::Duration::hours(2),
            end: t0() - chrono::Duration::hours(1),
        };
        let stats = engine.period_statistics(empty).await.unwrap();

        assert_eq!(stats.active_user_count, 0);
        assert!(stats.latest_data.is_empty());
        assert!(stats.network_distribution.is_empty());
        assert!(stats.network_connectivity.is_empty());
        assert!(stats.avg_signal_by_network.is_empty());
    }

    #[tokio::test]
    async fn test_pushdown_and_in_process_paths_agree() {
        let pushdown = engine_with_scenario(NumericCapability::Pushdown).await;
        let in_process = engine_with_scenario(NumericCapability::TextFetch).await;

        let a = pushdown.period_statistics(window_1h()).await.unwrap();
        let b = in_process.period_statistics(window_1h()).await.unwrap();

        for (key, pushed) in &a.avg_signal_per_device {
            let local = b.avg_signal_per_device[key];
            let rel = ((pushed - local) / local.abs()).abs();
            assert!(rel <= 1e-6, "identity {key}: {pushed} vs {local}");
        }
        assert_eq!(
            a.avg_signal_by_network.len(),
            b.avg_signal_by_network.len()
        );
    }

    #[tokio::test]
    async fn test_unsupported_backend_degrades_with_warning() {
        let engine = engine_with_scenario(NumericCapability::Unsupported).await;
        let stats = engine.period_statistics(window_1h()).await.unwrap();

        assert!(stats.avg_signal_by_network.is_empty());
        assert!(stats.avg_signal_per_device.is_empty());
        assert!(stats.capability_warning.is_some());
        // Non-numeric statistics are still complete.
        assert_eq!(stats.active_user_count, 2);
        assert!(!stats.network_connectivity.is_empty());
    }

    #[tokio::test]
    async fn test_user_series_unknown_identity() {
        let engine = engine_with_scenario(NumericCapability::TextFetch).await;
        let err = engine
            .user_series("ghost", window_1h(), 100)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownIdentity { .. }));
    }

    #[tokio::test]
    async fn test_user_series_empty_window_is_empty_result() {
        let engine = engine_with_scenario(NumericCapability::TextFetch).await;
        let empty = Window {
            start: t0() - chrono::Duration::hours(2),
            end: t0() - chrono::Duration::hours(1),
        };
        let series = engine.user_series("u1", empty, 100).await.unwrap();

        assert_eq!(series.summary.record_count, 0);
        assert!(series.points.is_empty());
        assert!(series.summary.avg_signal.is_none());
    }

    #[tokio::test]
    async fn test_user_series_points_and_summary() {
        let engine = engine_with_scenario(NumericCapability::TextFetch).await;
        let series = engine.user_series("u1", window_1h(), 100).await.unwrap();

        assert_eq!(series.summary.record_count, 2);
        assert_eq!(series.points.len(), 2);
        assert!(series.points[0].timestamp < series.points[1].timestamp);
        assert_eq!(series.summary.avg_signal, Some(-85.0));
        assert_eq!(series.summary.avg_snr, None);
        assert_eq!(series.summary.network_distribution["LTE"], 100.0);
    }

    #[tokio::test]
    async fn test_user_series_downsamples_to_cap() {
        let store = MemoryStore::new();
        for i in 0..300i64 {
            store
                .insert_at(
                    sample("u1", "LTE", Some("-80")),
                    t0() + chrono::Duration::seconds(i * 10),
                )
                .await
                .unwrap();
        }
        let engine = Engine::new(Arc::new(store));
        let series = engine.user_series("u1", window_1h(), 50).await.unwrap();

        assert_eq!(series.summary.record_count, 300);
        // stride 6 over 300 points.
        assert_eq!(series.points.len(), 50);
        assert!(series
            .points
            .windows(2)
            .all(|w| w[0].timestamp < w[1].timestamp));
    }
}
