//! SQL measurement store over sqlx's Any driver.
//!
//! One store type serves both production backends: Postgres, which can push
//! the numeric extraction down into the query (`substring` + `AVG`), and
//! SQLite, which lacks regex support and therefore only offers raw text to
//! the in-process path. The capability flag is derived from the connection
//! URL once, at connect time.
//!
//! `upload_time` is stored as unix microseconds so the same DDL and row
//! decoding work on both backends.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Row};

use crate::engine::latest::max_per_group;
use crate::engine::rollup::NumericField;
use crate::engine::window::Window;
use crate::model::{DeviceInfo, Measurement, NewMeasurement};
use crate::store::{MeasurementStore, NumericCapability, RollupGroup, StoreError};

/// SQL dialect behind the Any pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SqlBackend {
    Postgres,
    Sqlite,
}

impl SqlBackend {
    fn from_url(url: &str) -> Result<Self, StoreError> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Ok(Self::Postgres)
        } else if url.starts_with("sqlite:") {
            Ok(Self::Sqlite)
        } else {
            Err(StoreError::Unavailable {
                detail: format!("unsupported database url scheme: {url}"),
            })
        }
    }

    /// Bind placeholder for 1-based parameter `n`.
    fn placeholder(self, n: usize) -> String {
        match self {
            Self::Postgres => format!("${n}"),
            Self::Sqlite => "?".to_string(),
        }
    }
}

pub struct SqlStore {
    pool: AnyPool,
    backend: SqlBackend,
}

const MEASUREMENT_COLUMNS: &str = "id, user_id, operator, signal_power, snr, network_type, \
     frequency_band, cell_id, client_timestamp, user_ip, user_mac, device_brand, upload_time";

impl SqlStore {
    /// Connects, verifies connectivity, and ensures the schema exists.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        sqlx::any::install_default_drivers();

        let backend = SqlBackend::from_url(url)?;
        let pool = AnyPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| StoreError::Unavailable {
                detail: e.to_string(),
            })?;

        let store = Self { pool, backend };
        store.ensure_schema().await?;

        tracing::info!(backend = ?store.backend, "sql store connected");
        Ok(store)
    }

    /// Creates the measurement table and indexes if missing.
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        let id_column = match self.backend {
            SqlBackend::Postgres => "id BIGSERIAL PRIMARY KEY",
            SqlBackend::Sqlite => "id INTEGER PRIMARY KEY AUTOINCREMENT",
        };

        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS cell_data (
                {id_column},
                user_id TEXT NOT NULL,
                operator TEXT,
                signal_power TEXT,
                snr TEXT,
                network_type TEXT,
                frequency_band TEXT,
                cell_id TEXT,
                client_timestamp TEXT,
                user_ip TEXT,
                user_mac TEXT,
                device_brand TEXT,
                upload_time BIGINT NOT NULL
            )"
        );
        sqlx::query(&ddl).execute(&self.pool).await?;

        for index in [
            "CREATE INDEX IF NOT EXISTS idx_cell_data_user_id ON cell_data (user_id)",
            "CREATE INDEX IF NOT EXISTS idx_cell_data_upload_time ON cell_data (upload_time)",
            "CREATE INDEX IF NOT EXISTS idx_cell_data_user_mac ON cell_data (user_mac)",
        ] {
            sqlx::query(index).execute(&self.pool).await?;
        }

        Ok(())
    }

    fn decode_row(&self, row: &AnyRow) -> Result<Measurement, StoreError> {
        let upload_micros: i64 = row.try_get("upload_time")?;
        let captured_at =
            DateTime::<Utc>::from_timestamp_micros(upload_micros).ok_or(StoreError::Query {
                detail: format!("upload_time out of range: {upload_micros}"),
            })?;

        Ok(Measurement {
            id: row.try_get("id")?,
            identity: row.try_get("user_id")?,
            captured_at,
            operator: row.try_get("operator")?,
            network_type: row.try_get("network_type")?,
            device_brand: row.try_get("device_brand")?,
            signal_text: row.try_get("signal_power")?,
            snr_text: row.try_get("snr")?,
            frequency_band: row.try_get("frequency_band")?,
            cell_id: row.try_get("cell_id")?,
            client_timestamp: row.try_get("client_timestamp")?,
            ip_address: row.try_get("user_ip")?,
            mac_address: row.try_get("user_mac")?,
            signal: None,
            snr: None,
        }
        .with_extracted_numerics())
    }
}

#[async_trait]
impl MeasurementStore for SqlStore {
    fn name(&self) -> &str {
        match self.backend {
            SqlBackend::Postgres => "postgres",
            SqlBackend::Sqlite => "sqlite",
        }
    }

    fn numeric_capability(&self) -> NumericCapability {
        match self.backend {
            SqlBackend::Postgres => NumericCapability::Pushdown,
            SqlBackend::Sqlite => NumericCapability::TextFetch,
        }
    }

    async fn insert(&self, sample: NewMeasurement) -> Result<i64, StoreError> {
        let placeholders: Vec<String> =
            (1..=12).map(|n| self.backend.placeholder(n)).collect();
        let sql = format!(
            "INSERT INTO cell_data (user_id, operator, signal_power, snr, network_type, \
             frequency_band, cell_id, client_timestamp, user_ip, user_mac, device_brand, \
             upload_time) VALUES ({}) RETURNING id",
            placeholders.join(", ")
        );

        let row = sqlx::query(&sql)
            .bind(&sample.user_id)
            .bind(&sample.operator)
            .bind(&sample.signal_power)
            .bind(&sample.snr)
            .bind(&sample.network_type)
            .bind(&sample.frequency_band)
            .bind(&sample.cell_id)
            .bind(&sample.client_timestamp)
            .bind(&sample.ip_address)
            .bind(&sample.mac_address)
            .bind(&sample.device_brand)
            .bind(Utc::now().timestamp_micros())
            .fetch_one(&self.pool)
            .await?;

        Ok(row.try_get("id")?)
    }

    async fn fetch(
        &self,
        identity: Option<&str>,
        window: &Window,
    ) -> Result<Vec<Measurement>, StoreError> {
        let p1 = self.backend.placeholder(1);
        let p2 = self.backend.placeholder(2);
        let p3 = self.backend.placeholder(3);

        let rows = if let Some(identity) = identity {
            let sql = format!(
                "SELECT {MEASUREMENT_COLUMNS} FROM cell_data \
                 WHERE upload_time >= {p1} AND upload_time < {p2} AND user_id = {p3} \
                 ORDER BY upload_time ASC, id ASC"
            );
            sqlx::query(&sql)
                .bind(window.start.timestamp_micros())
                .bind(window.end.timestamp_micros())
                .bind(identity)
                .fetch_all(&self.pool)
                .await?
        } else {
            let sql = format!(
                "SELECT {MEASUREMENT_COLUMNS} FROM cell_data \
                 WHERE upload_time >= {p1} AND upload_time < {p2} \
                 ORDER BY upload_time ASC, id ASC"
            );
            sqlx::query(&sql)
                .bind(window.start.timestamp_micros())
                .bind(window.end.timestamp_micros())
                .fetch_all(&self.pool)
                .await?
        };

        rows.iter().map(|row| self.decode_row(row)).collect()
    }

    async fn resolve_identity(&self, identity: &str) -> Result<Option<String>, StoreError> {
        let p1 = self.backend.placeholder(1);
        let sql = format!("SELECT user_id FROM cell_data WHERE user_id = {p1} LIMIT 1");
        let row = sqlx::query(&sql)
            .bind(identity)
            .fetch_optional(&self.pool)
            .await?;

        Ok(match row {
            Some(row) => Some(row.try_get("user_id")?),
            None => None,
        })
    }

    async fn distinct_identity_count(&self) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT COUNT(DISTINCT user_id) AS n FROM cell_data")
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.try_get("n")?;
        Ok(n.max(0) as u64)
    }

    async fn device_directory(&self) -> Result<Vec<DeviceInfo>, StoreError> {
        let sql = "SELECT m.user_mac, m.user_ip, m.upload_time, m.id FROM cell_data m \
                   JOIN (SELECT user_mac, MAX(upload_time) AS last_seen FROM cell_data \
                         WHERE user_mac IS NOT NULL GROUP BY user_mac) l \
                   ON m.user_mac = l.user_mac AND m.upload_time = l.last_seen";
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;

        struct Sighting {
            mac: String,
            ip: Option<String>,
            at_micros: i64,
            id: i64,
        }

        let mut sightings = Vec::with_capacity(rows.len());
        for row in &rows {
            sightings.push(Sighting {
                mac: row.try_get("user_mac")?,
                ip: row.try_get("user_ip")?,
                at_micros: row.try_get("upload_time")?,
                id: row.try_get("id")?,
            });
        }

        // The join can return several rows per MAC on timestamp ties;
        // reduce to one with the same tie-break as the engine.
        let mut latest = max_per_group(sightings, |s| s.mac.clone(), |s| (s.at_micros, s.id));
        latest.sort_by(|a, b| (b.at_micros, b.id).cmp(&(a.at_micros, a.id)));

        latest
            .into_iter()
            .map(|s| {
                let last_seen = DateTime::<Utc>::from_timestamp_micros(s.at_micros).ok_or(
                    StoreError::Query {
                        detail: format!("upload_time out of range: {}", s.at_micros),
                    },
                )?;
                Ok(DeviceInfo {
                    mac: s.mac,
                    ip: s.ip,
                    last_seen,
                })
            })
            .collect()
    }

    async fn pushdown_mean(
        &self,
        field: NumericField,
        group: RollupGroup,
        window: &Window,
    ) -> Result<HashMap<String, f64>, StoreError> {
        if self.backend != SqlBackend::Postgres {
            return Err(StoreError::PushdownUnsupported);
        }

        let column = match field {
            NumericField::Signal => "signal_power",
            NumericField::Snr => "snr",
        };
        let group_expr = match group {
            RollupGroup::NetworkType => {
                "CASE WHEN network_type IS NULL OR trim(network_type) = '' \
                 THEN 'Unknown' ELSE network_type END"
            }
            RollupGroup::Identity => "user_id",
        };

        // First signed decimal in the text, the same pattern the in-process
        // extractor applies. substring() yields NULL on no match and AVG
        // skips NULLs, so unparseable rows drop out of the denominator.
        let sql = format!(
            "SELECT {group_expr} AS grp, \
                    AVG(CAST(substring({column} FROM '-?[0-9]+\\.?[0-9]*') AS DOUBLE PRECISION)) AS mean \
             FROM cell_data \
             WHERE upload_time >= $1 AND upload_time < $2 AND {column} IS NOT NULL \
             GROUP BY grp"
        );

        let rows = sqlx::query(&sql)
            .bind(window.start.timestamp_micros())
            .bind(window.end.timestamp_micros())
            .fetch_all(&self.pool)
            .await?;

        let mut means = HashMap::new();
        for row in &rows {
            let mean: Option<f64> = row.try_get("mean")?;
            if let Some(mean) = mean {
                let grp: String = row.try_get("grp")?;
                means.insert(grp, mean);
            }
        }
        Ok(means)
    }
}
