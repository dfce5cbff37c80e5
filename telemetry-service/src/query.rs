//! Request/response contracts behind the HTTP surface.

use std::{str::FromStr, sync::Arc};

use serde::Serialize;
use telemetry_client::{domain::UnknownMetric, Metric, SeriesPoint, StoreError, TelemetryStore};
use time::{Duration, OffsetDateTime, UtcOffset};

use crate::{
    forecast::{self, ForecastError, ForecastPoint, Forecaster, UsageEstimate},
    series::{bucket_start, resample_window, resolve_window, Interval, SeriesLoader, UnknownInterval},
    summary::{self, DailyTotal},
    timefmt::{self, TimestampError},
};

const SUMMARY_DAYS: i64 = 30;
const MAX_HORIZON_HOURS: u32 = 24 * 31;
const MAX_LOOKBACK_DAYS: u32 = 366;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error(transparent)]
    Metric(#[from] UnknownMetric),
    #[error(transparent)]
    Interval(#[from] UnknownInterval),
    #[error("unsupported mode '{0}', expected series or total")]
    Mode(String),
    #[error("invalid datetime: {0}")]
    Datetime(#[from] TimestampError),
    #[error("{0}")]
    Range(String),
}

#[derive(thiserror::Error, Debug)]
pub enum QueryError {
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Forecast(#[from] ForecastError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ForecastMode {
    Series,
    Total,
}

impl FromStr for ForecastMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "series" => Ok(ForecastMode::Series),
            "total" => Ok(ForecastMode::Total),
            other => Err(ValidationError::Mode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForecastRequest {
    pub metric: Metric,
    pub horizon_hours: u32,
    pub interval: Interval,
    pub lookback_days: u32,
    pub mode: ForecastMode,
}

impl ForecastRequest {
    pub fn new(metric: Metric) -> Self {
        Self {
            metric,
            horizon_hours: 24,
            interval: Interval::Hourly,
            lookback_days: 30,
            mode: ForecastMode::Series,
        }
    }

    pub fn validate(self) -> Result<Self, ValidationError> {
        if self.horizon_hours == 0 || self.horizon_hours > MAX_HORIZON_HOURS {
            return Err(ValidationError::Range(format!(
                "horizon_hours must be within 1..={MAX_HORIZON_HOURS}"
            )));
        }
        if self.lookback_days == 0 || self.lookback_days > MAX_LOOKBACK_DAYS {
            return Err(ValidationError::Range(format!(
                "lookback_days must be within 1..={MAX_LOOKBACK_DAYS}"
            )));
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastResponse {
    pub metric: Metric,
    pub interval: Interval,
    pub horizon_hours: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points: Option<Vec<ForecastPoint>>,
    pub predicted_usage: UsageEstimate,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySummary {
    pub metric: Metric,
    pub unit: &'static str,
    pub history: Vec<DailyTotal>,
}

#[derive(Debug, Clone)]
pub struct QuerySettings {
    pub local: UtcOffset,
    pub latest_limit: usize,
    pub min_samples: usize,
    pub max_sample_gap: Duration,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            local: UtcOffset::UTC,
            latest_limit: 20,
            min_samples: forecast::MIN_RAW_SAMPLES,
            max_sample_gap: Duration::minutes(10),
        }
    }
}

/// Parse an optional client-supplied datetime.
pub fn parse_bound(raw: Option<&str>, local: UtcOffset) -> Result<Option<OffsetDateTime>, ValidationError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => Ok(Some(timefmt::parse_datetime(s, local)?)),
    }
}

pub struct QueryService<S> {
    loader: SeriesLoader<S>,
    forecaster: Forecaster,
    settings: QuerySettings,
}

pub type SharedQueryService = Arc<QueryService<Arc<dyn TelemetryStore>>>;

impl<S> QueryService<S>
where
    S: TelemetryStore,
{
    pub fn new(store: S, forecaster: Forecaster, settings: QuerySettings) -> Self {
        Self {
            loader: SeriesLoader::new(store),
            forecaster,
            settings,
        }
    }

    pub fn local_offset(&self) -> UtcOffset {
        self.settings.local
    }

    pub fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc().to_offset(self.settings.local)
    }

    fn localize(&self, mut points: Vec<SeriesPoint>) -> Vec<SeriesPoint> {
        for p in &mut points {
            p.timestamp = p.timestamp.to_offset(self.settings.local);
        }
        points
    }

    /// Most recent samples in chronological order.
    pub async fn latest(&self, metric: Metric) -> Result<Vec<SeriesPoint>, QueryError> {
        let points = self.loader.latest(metric, self.settings.latest_limit).await?;
        Ok(self.localize(points))
    }

    pub async fn history(
        &self,
        metric: Metric,
        start: Option<OffsetDateTime>,
        end: Option<OffsetDateTime>,
        now: OffsetDateTime,
    ) -> Result<Vec<SeriesPoint>, QueryError> {
        let (start, end) = resolve_window(start, end, now);
        let points = self.loader.load(metric, start, end).await?;
        Ok(self.localize(points))
    }

    pub async fn daily_summary(&self, metric: Metric, now: OffsetDateTime) -> Result<DailySummary, QueryError> {
        let readings = self
            .loader
            .readings(metric, now - Duration::days(SUMMARY_DAYS), now)
            .await?;
        Ok(DailySummary {
            metric,
            unit: metric.spec().total_unit,
            history: summary::daily_totals(
                &readings,
                metric,
                self.settings.local,
                self.settings.max_sample_gap,
            ),
        })
    }

    pub async fn forecast(&self, req: ForecastRequest, now: OffsetDateTime) -> Result<ForecastResponse, QueryError> {
        let req = req.validate()?;
        let lookback_start = now - Duration::days(i64::from(req.lookback_days));

        let raw = self.loader.load_lookback(req.metric, req.lookback_days, now).await?;
        if raw.len() < self.settings.min_samples {
            tracing::info!(
                metric = %req.metric,
                samples = raw.len(),
                min_samples = self.settings.min_samples,
                "too few samples, skipping forecast"
            );
            return Ok(self.insufficient(req, raw.len()));
        }

        // The bucket containing `now` is still filling; fit on complete buckets only.
        let step = req.interval.duration();
        let current = bucket_start(now, step);
        let complete: Vec<SeriesPoint> = raw.into_iter().filter(|p| p.timestamp < current).collect();
        let series = resample_window(&complete, step, lookback_start, current - step);
        let steps = req.interval.steps_for_hours(req.horizon_hours);
        let forecaster = self.forecaster.clone();
        let interval = req.interval;
        let fitted = tokio::task::spawn_blocking(move || forecaster.fit_and_predict(&series, steps, interval))
            .await
            .map_err(|e| ForecastError::Model(format!("forecast task failed: {e}")))?;

        let mut points = match fitted {
            Ok(points) => points,
            Err(ForecastError::InsufficientData { got, .. }) => return Ok(self.insufficient(req, got)),
            Err(e) => {
                tracing::error!(metric = %req.metric, error = %e, "forecast failed");
                return Err(e.into());
            }
        };
        for p in &mut points {
            p.timestamp = p.timestamp.to_offset(self.settings.local);
        }

        let usage = forecast::integrate(&points, req.metric, req.interval);
        let (points, message) = match req.mode {
            ForecastMode::Series => (Some(points), None),
            ForecastMode::Total => (None, Some(format!("predicted total over the next {} h", req.horizon_hours))),
        };

        Ok(ForecastResponse {
            metric: req.metric,
            interval: req.interval,
            horizon_hours: req.horizon_hours,
            points,
            predicted_usage: usage,
            message,
        })
    }

    fn insufficient(&self, req: ForecastRequest, samples: usize) -> ForecastResponse {
        ForecastResponse {
            metric: req.metric,
            interval: req.interval,
            horizon_hours: req.horizon_hours,
            points: Some(Vec::new()),
            predicted_usage: UsageEstimate::zero(req.metric),
            message: Some(format!(
                "insufficient data to forecast: {samples} samples, need at least {}",
                self.settings.min_samples
            )),
        }
    }
}
