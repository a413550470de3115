//! In-memory measurement store.
//!
//! Default backend when no database URL is configured, and the fixture
//! backend for engine tests. Extraction happens in-process (TextFetch), but
//! the store can be switched into a simulated pushdown mode so both rollup
//! paths can be exercised against identical data.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::engine::latest::max_per_group;
use crate::engine::rollup::{mean_by_group, NumericField};
use crate::engine::window::Window;
use crate::model::{DeviceInfo, Measurement, NewMeasurement};
use crate::store::{MeasurementStore, NumericCapability, RollupGroup, StoreError};

pub struct MemoryStore {
    records: RwLock<Vec<Measurement>>,
    next_id: AtomicI64,
    capability: NumericCapability,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_capability(NumericCapability::TextFetch)
    }

    /// Builds a store advertising the given capability. Tests use this to
    /// run the same fixtures through the pushdown and in-process paths.
    pub fn with_capability(capability: NumericCapability) -> Self {
        Self {
            records: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
            capability,
        }
    }

    /// Appends a sample with an explicit capture time. Test fixtures need
    /// deterministic timestamps; the trait's `insert` stamps "now".
    pub async fn insert_at(
        &self,
        sample: NewMeasurement,
        captured_at: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let record = Measurement {
            id,
            identity: sample.user_id,
            captured_at,
            operator: sample.operator,
            network_type: sample.network_type,
            device_brand: sample.device_brand,
            signal_text: sample.signal_power,
            snr_text: sample.snr,
            frequency_band: sample.frequency_band,
            cell_id: sample.cell_id,
            client_timestamp: Some(sample.client_timestamp),
            ip_address: sample.ip_address,
            mac_address: sample.mac_address,
            signal: None,
            snr: None,
        }
        .with_extracted_numerics();

        self.records.write().await.push(record);
        Ok(id)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MeasurementStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn numeric_capability(&self) -> NumericCapability {
        self.capability
    }

    async fn insert(&self, sample: NewMeasurement) -> Result<i64, StoreError> {
        self.insert_at(sample, Utc::now()).await
    }

    async fn fetch(
        &self,
        identity: Option<&str>,
        window: &Window,
    ) -> Result<Vec<Measurement>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .filter(|m| window.contains(m.captured_at))
            .filter(|m| identity.map_or(true, |id| m.identity == id))
            .cloned()
            .collect())
    }

    async fn resolve_identity(&self, identity: &str) -> Result<Option<String>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .any(|m| m.identity == identity)
            .then(|| identity.to_string()))
    }

    async fn distinct_identity_count(&self) -> Result<u64, StoreError> {
        let records = self.records.read().await;
        let mut seen: Vec<&str> = records.iter().map(|m| m.identity.as_str()).collect();
        seen.sort_unstable();
        seen.dedup();
        Ok(seen.len() as u64)
    }

    async fn device_directory(&self) -> Result<Vec<DeviceInfo>, StoreError> {
        let records = self.records.read().await;
        let with_mac: Vec<&Measurement> = records
            .iter()
            .filter(|m| m.mac_address.is_some())
            .collect();

        let mut latest = max_per_group(
            with_mac,
            |m| m.mac_address.clone().unwrap_or_default(),
            |m| (m.captured_at, m.id),
        );
        latest.sort_by(|a, b| (b.captured_at, b.id).cmp(&(a.captured_at, a.id)));

        Ok(latest
            .into_iter()
            .map(|m| DeviceInfo {
                mac: m.mac_address.clone().unwrap_or_default(),
                ip: m.ip_address.clone(),
                last_seen: m.captured_at,
            })
            .collect())
    }

    async fn pushdown_mean(
        &self,
        field: NumericField,
        group: RollupGroup,
        window: &Window,
    ) -> Result<HashMap<String, f64>, StoreError> {
        if self.capability != NumericCapability::Pushdown {
            return Err(StoreError::PushdownUnsupported);
        }

        // Simulated pushdown: same grouping semantics a SQL backend
        // implements with regexp extraction and AVG.
        let records = self.fetch(None, window).await?;
        Ok(match group {
            RollupGroup::NetworkType => {
                mean_by_group(&records, field, |m| m.network_category())
            }
            RollupGroup::Identity => mean_by_group(&records, field, |m| m.identity.as_str()),
        })
    }
}
