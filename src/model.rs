//! Core data types shared by the store, the engine, and the HTTP layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::extract::extract_numeric;

/// Category used when a categorical field is absent or empty.
pub const UNKNOWN_CATEGORY: &str = "Unknown";

/// Normalizes an optional categorical field to a non-empty category name.
pub fn category_or_unknown(value: Option<&str>) -> &str {
    match value {
        Some(v) if !v.trim().is_empty() => v,
        _ => UNKNOWN_CATEGORY,
    }
}

/// A stored telemetry sample. Write-once: the engine never mutates or
/// deletes a measurement.
#[derive(Debug, Clone, Serialize)]
pub struct Measurement {
    /// Store-assigned id; also the stable tie-break key for latest-state
    /// selection when two samples share a timestamp.
    pub id: i64,
    /// Reporting user or device.
    pub identity: String,
    /// Server-assigned capture time. Sole ordering/grouping key.
    pub captured_at: DateTime<Utc>,
    pub operator: Option<String>,
    pub network_type: Option<String>,
    pub device_brand: Option<String>,
    /// Raw signal strength text, e.g. "-95 dBm".
    pub signal_text: Option<String>,
    /// Raw SNR text, e.g. "12 dB (SS-SINR)".
    pub snr_text: Option<String>,
    pub frequency_band: Option<String>,
    pub cell_id: Option<String>,
    /// Client-reported timestamp, kept verbatim.
    pub client_timestamp: Option<String>,
    pub ip_address: Option<String>,
    pub mac_address: Option<String>,
    /// Signal value extracted from `signal_text` at the store boundary.
    pub signal: Option<f64>,
    /// SNR value extracted from `snr_text` at the store boundary.
    pub snr: Option<f64>,
}

impl Measurement {
    /// Re-derives the extracted numeric fields from the raw text fields.
    /// Called once when a row is loaded or inserted.
    pub fn with_extracted_numerics(mut self) -> Self {
        self.signal = extract_numeric(self.signal_text.as_deref());
        self.snr = extract_numeric(self.snr_text.as_deref());
        self
    }

    pub fn operator_category(&self) -> &str {
        category_or_unknown(self.operator.as_deref())
    }

    pub fn network_category(&self) -> &str {
        category_or_unknown(self.network_type.as_deref())
    }

    pub fn brand_category(&self) -> &str {
        category_or_unknown(self.device_brand.as_deref())
    }
}

/// An incoming sample, as accepted by the upload endpoint. The store assigns
/// `id` and `captured_at`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMeasurement {
    pub user_id: String,
    pub client_timestamp: String,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub signal_power: Option<String>,
    #[serde(default)]
    pub snr: Option<String>,
    #[serde(default)]
    pub network_type: Option<String>,
    #[serde(default)]
    pub frequency_band: Option<String>,
    #[serde(default)]
    pub cell_id: Option<String>,
    #[serde(default)]
    pub device_brand: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub mac_address: Option<String>,
}

/// One entry of the known-device directory: a MAC address with the last IP
/// it reported from and the last time it was seen.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    pub mac: String,
    pub ip: Option<String>,
    pub last_seen: DateTime<Utc>,
}
