use std::net::SocketAddr;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use telemetry_client::{Metric, SeriesPoint};

use crate::{
    forecast::ForecastError,
    query::{
        parse_bound, DailySummary, ForecastRequest, ForecastResponse, QueryError, SharedQueryService,
        ValidationError,
    },
};

/// Error body returned for every failed request: `{"error": "..."}`.
pub struct ApiError(QueryError);

impl<E> From<E> for ApiError
where
    E: Into<QueryError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            QueryError::Validation(_) | QueryError::Forecast(ForecastError::InvalidHorizon(_)) => {
                StatusCode::BAD_REQUEST
            }
            QueryError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
            QueryError::Forecast(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(error = %self.0, status = status.as_u16(), "query failed");
        }
        metrics::counter!("api_errors_total", "status" => status.as_u16().to_string()).increment(1);
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct SeriesResponse {
    pub metric: Metric,
    pub unit: &'static str,
    pub points: Vec<SeriesPoint>,
}

impl SeriesResponse {
    fn new(metric: Metric, points: Vec<SeriesPoint>) -> Self {
        Self {
            metric,
            unit: metric.spec().unit_label,
            points,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub start: Option<String>,
    pub end: Option<String>,
}

/// Raw query string values; parsed here so bad input maps to a 400 body.
#[derive(Debug, Default, Deserialize)]
pub struct ForecastParams {
    pub horizon_hours: Option<String>,
    pub freq: Option<String>,
    pub lookback_days: Option<String>,
    pub mode: Option<String>,
}

fn parse_count(name: &str, raw: Option<&str>, default: u32) -> Result<u32, ValidationError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(default),
        Some(s) => s
            .parse()
            .map_err(|_| ValidationError::Range(format!("{name} must be a positive integer, got '{s}'"))),
    }
}

impl ForecastParams {
    pub fn into_request(self, metric: Metric) -> Result<ForecastRequest, ValidationError> {
        let defaults = ForecastRequest::new(metric);
        Ok(ForecastRequest {
            metric,
            horizon_hours: parse_count("horizon_hours", self.horizon_hours.as_deref(), defaults.horizon_hours)?,
            interval: match self.freq.as_deref() {
                Some(f) => f.parse()?,
                None => defaults.interval,
            },
            lookback_days: parse_count("lookback_days", self.lookback_days.as_deref(), defaults.lookback_days)?,
            mode: match self.mode.as_deref() {
                Some(m) => m.parse()?,
                None => defaults.mode,
            },
        })
    }
}

fn parse_metric(raw: &str) -> Result<Metric, ValidationError> {
    Ok(raw.parse::<Metric>()?)
}

pub fn router(service: SharedQueryService) -> Router {
    Router::new()
        .route("/api/latest/:metric", get(latest))
        .route("/api/history/:metric", get(history))
        .route("/api/forecast/:metric", get(forecast))
        .route("/api/summary/:metric", get(summary))
        .with_state(service)
}

pub async fn serve(bind_addr: &str, service: SharedQueryService) -> anyhow::Result<()> {
    let addr: SocketAddr = bind_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid api.bind_addr '{bind_addr}': {e}"))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "query API listening");
    axum::serve(listener, router(service).into_make_service())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}

async fn latest(
    State(service): State<SharedQueryService>,
    Path(metric): Path<String>,
) -> Result<Json<SeriesResponse>, ApiError> {
    let metric = parse_metric(&metric)?;
    let points = service.latest(metric).await?;
    Ok(Json(SeriesResponse::new(metric, points)))
}

async fn history(
    State(service): State<SharedQueryService>,
    Path(metric): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<SeriesResponse>, ApiError> {
    let metric = parse_metric(&metric)?;
    let local = service.local_offset();
    let start = parse_bound(params.start.as_deref(), local)?;
    let end = parse_bound(params.end.as_deref(), local)?;
    let points = service.history(metric, start, end, service.now()).await?;
    Ok(Json(SeriesResponse::new(metric, points)))
}

async fn forecast(
    State(service): State<SharedQueryService>,
    Path(metric): Path<String>,
    Query(params): Query<ForecastParams>,
) -> Result<Json<ForecastResponse>, ApiError> {
    let req = params.into_request(parse_metric(&metric)?)?;
    Ok(Json(service.forecast(req, service.now()).await?))
}

async fn summary(
    State(service): State<SharedQueryService>,
    Path(metric): Path<String>,
) -> Result<Json<DailySummary>, ApiError> {
    let metric = parse_metric(&metric)?;
    Ok(Json(service.daily_summary(metric, service.now()).await?))
}
