//! Storage backends for measurement records.
//!
//! The engine talks to a store through [`MeasurementStore`]: an append-only
//! record log queryable by identity and time range, a directory of known
//! identities and devices, and a capability flag describing how numeric
//! rollups may be computed against it.

pub mod memory;
pub mod sql;

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::engine::rollup::NumericField;
use crate::engine::window::Window;
use crate::model::{DeviceInfo, Measurement, NewMeasurement};

/// Errors produced by a storage backend.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backend is unreachable or refused the connection.
    #[error("store unavailable: {detail}")]
    Unavailable { detail: String },

    /// A query failed after the connection was established.
    #[error("store query failed: {detail}")]
    Query { detail: String },

    /// A pushdown rollup was requested from a backend that cannot run it.
    /// Callers must consult [`MeasurementStore::numeric_capability`] first.
    #[error("store does not support pushdown numeric extraction")]
    PushdownUnsupported,
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::Unavailable {
                    detail: err.to_string(),
                }
            }
            other => Self::Query {
                detail: other.to_string(),
            },
        }
    }
}

/// How a backend can participate in numeric rollups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericCapability {
    /// The store extracts and averages numeric values at the query level.
    Pushdown,
    /// The store returns raw text; extraction and averaging happen
    /// in-process.
    TextFetch,
    /// Neither path is available; numeric rollups are skipped.
    Unsupported,
}

/// Grouping key for a pushdown rollup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollupGroup {
    NetworkType,
    Identity,
}

/// Append-only measurement storage plus the identity/device directory.
#[async_trait]
pub trait MeasurementStore: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// How numeric rollups should be computed against this backend.
    /// Consulted once per aggregation.
    fn numeric_capability(&self) -> NumericCapability;

    /// Appends one sample, assigning the id and server capture time.
    /// Returns the new record id.
    async fn insert(&self, sample: NewMeasurement) -> Result<i64, StoreError>;

    /// Fetches records within `window`, optionally filtered to one
    /// identity. Order is unspecified; the engine sorts where it matters.
    async fn fetch(
        &self,
        identity: Option<&str>,
        window: &Window,
    ) -> Result<Vec<Measurement>, StoreError>;

    /// Resolves an identity string to its canonical id, or `None` when the
    /// directory has never seen it.
    async fn resolve_identity(&self, identity: &str) -> Result<Option<String>, StoreError>;

    /// Count of distinct identities across the whole store (unwindowed).
    async fn distinct_identity_count(&self) -> Result<u64, StoreError>;

    /// All known devices (by MAC) with last reported IP and last-seen time,
    /// most recent first.
    async fn device_directory(&self) -> Result<Vec<DeviceInfo>, StoreError>;

    /// Query-level mean of `field` grouped by `group` within `window`.
    ///
    /// Only called when [`numeric_capability`](Self::numeric_capability)
    /// returns [`NumericCapability::Pushdown`]; other backends return
    /// [`StoreError::PushdownUnsupported`]. Results must match the
    /// in-process path within floating rounding tolerance.
    async fn pushdown_mean(
        &self,
        field: NumericField,
        group: RollupGroup,
        window: &Window,
    ) -> Result<HashMap<String, f64>, StoreError>;
}
