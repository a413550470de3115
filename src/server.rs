//! HTTP surface: sample ingestion and the stats/series endpoints.
//!
//! Routes are split by caller class: `/api/stats` serves the dashboard a
//! relative window with the full
//! payload, `/api/app-stats` serves the mobile app an explicit date range
//! with a reduced payload, and `/api/user-series` serves per-user charts.
//! Every failure is a structured JSON error object; store internals are
//! logged, never echoed to clients.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::engine::window::Window;
use crate::engine::{Engine, PeriodStatistics, UserSeries};
use crate::error::EngineError;
use crate::model::NewMeasurement;

/// Shared request-handling state.
#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
    /// Period token used when `/api/stats` names none.
    pub default_period: String,
    /// Hard cap on user-series point counts.
    pub max_series_points: usize,
    /// Budget for one aggregation; elapsing it is a fetch failure.
    pub fetch_timeout: Duration,
}

/// Binds `addr` and serves until `cancel` fires.
pub async fn serve(state: AppState, addr: &str, cancel: CancellationToken) -> Result<()> {
    // ":port" shorthand binds all interfaces.
    let bind_addr = if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    };

    let app = router(state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("listening on {bind_addr}"))?;
    let local_addr = listener.local_addr().context("getting local address")?;

    tracing::info!(addr = %local_addr, "http server started");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        cancel.cancelled().await;
    })
    .await
    .context("serving http")?;

    tracing::info!("http server stopped");
    Ok(())
}

/// Builds the route table. Separate from [`serve`] so tests can drive the
/// router without a socket.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/upload", post(upload_handler))
        .route("/api/stats", get(stats_handler))
        .route("/api/app-stats", get(app_stats_handler))
        .route("/api/user-series", get(user_series_handler))
        .route("/healthz", get(healthz_handler))
        .with_state(Arc::new(state))
}

// --- Error mapping ---

/// A client-facing failure: HTTP status plus a structured JSON body.
#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let status = match &err {
            EngineError::InvalidWindow { .. } => StatusCode::BAD_REQUEST,
            EngineError::UnknownIdentity { .. } => StatusCode::NOT_FOUND,
            EngineError::UnsupportedBackend { .. } => StatusCode::NOT_IMPLEMENTED,
            EngineError::Fetch { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = match &err {
            // Store error details stay in the logs.
            EngineError::Fetch { source } => {
                tracing::error!(error = %source, "measurement fetch failed");
                "measurement store unavailable".to_string()
            }
            other => other.to_string(),
        };

        Self { status, message }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "status": "error",
            "message": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

// --- Handlers ---

#[derive(Debug, Deserialize)]
struct StatsQuery {
    period: Option<String>,
}

/// A period stats payload with the dashboard-only fields present.
#[derive(Serialize)]
struct DashboardStatsResponse {
    #[serde(flatten)]
    stats: PeriodStatistics,
    data_window: String,
}

async fn stats_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<DashboardStatsResponse>, ApiError> {
    let period = query.period.unwrap_or_else(|| state.default_period.clone());
    let window = Window::relative(&period, Utc::now());

    let stats = with_fetch_timeout(state.fetch_timeout, state.engine.period_statistics(window))
        .await?;

    Ok(Json(DashboardStatsResponse {
        stats,
        data_window: period,
    }))
}

#[derive(Debug, Deserialize)]
struct DateRangeQuery {
    start_date: Option<String>,
    end_date: Option<String>,
}

impl DateRangeQuery {
    fn require(&self) -> Result<(&str, &str), ApiError> {
        match (self.start_date.as_deref(), self.end_date.as_deref()) {
            (Some(start), Some(end)) => Ok((start, end)),
            _ => Err(ApiError::bad_request(
                "missing 'start_date' or 'end_date' query parameters",
            )),
        }
    }
}

/// Reduced payload for the app caller class: no latest-per-identity
/// snapshot, no device-brand distribution, no device directory.
#[derive(Serialize)]
struct AppStatsResponse {
    active_user_count: usize,
    network_distribution: HashMap<String, f64>,
    operator_distribution: HashMap<String, f64>,
    avg_signal_by_network: HashMap<String, f64>,
    avg_snr_by_network: HashMap<String, f64>,
    avg_signal_per_device: HashMap<String, f64>,
    operator_connectivity: HashMap<String, f64>,
    network_connectivity: HashMap<String, f64>,
    requested_start_date: String,
    requested_end_date: String,
    stats_time_utc: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    capability_warning: Option<String>,
}

async fn app_stats_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DateRangeQuery>,
) -> Result<Json<AppStatsResponse>, ApiError> {
    let (start, end) = query.require()?;
    let window = Window::explicit(start, end)?;

    let stats = with_fetch_timeout(state.fetch_timeout, state.engine.period_statistics(window))
        .await?;

    Ok(Json(AppStatsResponse {
        active_user_count: stats.active_user_count,
        network_distribution: stats.network_distribution,
        operator_distribution: stats.operator_distribution,
        avg_signal_by_network: stats.avg_signal_by_network,
        avg_snr_by_network: stats.avg_snr_by_network,
        avg_signal_per_device: stats.avg_signal_per_device,
        operator_connectivity: stats.operator_connectivity,
        network_connectivity: stats.network_connectivity,
        requested_start_date: start.to_string(),
        requested_end_date: end.to_string(),
        stats_time_utc: stats.stats_time_utc,
        capability_warning: stats.capability_warning,
    }))
}

#[derive(Debug, Deserialize)]
struct UserSeriesQuery {
    identity: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
    max_points: Option<usize>,
}

async fn user_series_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserSeriesQuery>,
) -> Result<Json<UserSeries>, ApiError> {
    let identity = query
        .identity
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::bad_request("missing 'identity' query parameter"))?;

    let range = DateRangeQuery {
        start_date: query.start_date.clone(),
        end_date: query.end_date.clone(),
    };
    let (start, end) = range.require()?;
    let window = Window::explicit(start, end)?;

    let max_points = query
        .max_points
        .filter(|n| *n > 0)
        .unwrap_or(state.max_series_points)
        .min(state.max_series_points);

    let series = with_fetch_timeout(
        state.fetch_timeout,
        state.engine.user_series(identity, window, max_points),
    )
    .await?;

    Ok(Json(series))
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    status: &'static str,
    message: &'static str,
    db_id: i64,
}

async fn upload_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<serde_json::Value>,
) -> Result<(StatusCode, Json<UploadResponse>), ApiError> {
    let missing: Vec<&str> = ["userId", "clientTimestamp"]
        .into_iter()
        .filter(|field| {
            payload
                .get(field)
                .and_then(|v| v.as_str())
                .map_or(true, |v| v.trim().is_empty())
        })
        .collect();
    if !missing.is_empty() {
        return Err(ApiError::bad_request(format!(
            "missing or empty required fields: {}",
            missing.join(", ")
        )));
    }

    let sample: NewMeasurement = serde_json::from_value(payload)
        .map_err(|e| ApiError::bad_request(format!("malformed upload payload: {e}")))?;

    let id = state
        .engine
        .store()
        .insert(sample)
        .await
        .map_err(EngineError::from)?;

    tracing::debug!(db_id = id, "sample stored");

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            status: "success",
            message: "data received and stored",
            db_id: id,
        }),
    ))
}

async fn healthz_handler() -> &'static str {
    "ok"
}

/// Applies the configured fetch budget; elapsing it is equivalent to a
/// fetch failure, never a partial aggregate.
async fn with_fetch_timeout<T>(
    budget: Duration,
    fut: impl std::future::Future<Output = Result<T, EngineError>>,
) -> Result<T, ApiError> {
    match tokio::time::timeout(budget, fut).await {
        Ok(result) => result.map_err(ApiError::from),
        Err(_) => {
            tracing::error!(budget = ?budget, "aggregation timed out");
            Err(ApiError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "measurement store unavailable".to_string(),
            })
        }
    }
}
