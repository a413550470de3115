//! cellscope: device telemetry aggregation service.
//!
//! Ingests periodic cell-signal samples and serves windowed statistics:
//! per-window categorical distributions and connectivity percentages,
//! latest-state snapshots per identity, and downsampled per-user series.

pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod server;
pub mod store;
