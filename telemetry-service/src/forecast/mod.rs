//! Forecasting of resampled rate series.
//!
//! The curve fit itself is an injected [`CurveFitter`]; this module owns the
//! contract around it: timestamps, horizon length and non-negative output.

use std::sync::Arc;

use serde::Serialize;
use telemetry_client::SeriesPoint;
use time::{Duration, OffsetDateTime};

use crate::series::Interval;

pub mod mstl;
pub mod naive;
pub mod usage;

pub use mstl::MstlFitter;
pub use naive::SeasonalNaive;
pub use usage::{integrate, UsageEstimate};

/// Raw samples required before a forecast is attempted at all.
pub const MIN_RAW_SAMPLES: usize = 20;

/// Resampled points the fitter needs at minimum.
const MIN_FIT_POINTS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ForecastPoint {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub predicted: f64,
    pub lower: f64,
    pub upper: f64,
}

impl ForecastPoint {
    /// Clamp to `>= 0` and restore `lower <= predicted <= upper`.
    fn clamped(timestamp: OffsetDateTime, predicted: f64, lower: f64, upper: f64) -> Self {
        let predicted = non_negative(predicted);
        Self {
            timestamp,
            predicted,
            lower: non_negative(lower).min(predicted),
            upper: non_negative(upper).max(predicted),
        }
    }
}

fn non_negative(v: f64) -> f64 {
    if v.is_finite() {
        v.max(0.0)
    } else {
        0.0
    }
}

/// Seasonal periods expressed in steps of the series interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seasonality {
    pub daily: usize,
    pub weekly: usize,
}

impl Seasonality {
    pub fn for_interval(interval: Interval) -> Self {
        let daily = interval.steps_per_day();
        Self {
            daily,
            weekly: daily * 7,
        }
    }
}

/// Central estimate and band for each future step.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedCurve {
    pub point: Vec<f64>,
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ForecastError {
    #[error("insufficient data: need at least {needed} points, got {got}")]
    InsufficientData { needed: usize, got: usize },
    #[error("invalid forecast horizon: {0}")]
    InvalidHorizon(String),
    #[error("forecast model error: {0}")]
    Model(String),
}

/// Fit a trend + seasonality curve to equally spaced `values` and predict
/// `horizon` further steps.
pub trait CurveFitter: Send + Sync {
    fn fit(
        &self,
        values: &[f64],
        horizon: usize,
        seasonality: Seasonality,
    ) -> Result<FittedCurve, ForecastError>;
}

#[derive(Clone)]
pub struct Forecaster {
    fitter: Arc<dyn CurveFitter>,
}

impl Forecaster {
    pub fn new(fitter: Arc<dyn CurveFitter>) -> Self {
        Self { fitter }
    }

    /// `series` must be resampled at `interval`: ascending, unique timestamps.
    /// Gaps the resampler left open are bridged before fitting.
    pub fn fit_and_predict(
        &self,
        series: &[SeriesPoint],
        horizon_steps: usize,
        interval: Interval,
    ) -> Result<Vec<ForecastPoint>, ForecastError> {
        if horizon_steps == 0 {
            return Err(ForecastError::InvalidHorizon("horizon must be > 0".to_string()));
        }
        let Some(last) = series.last() else {
            return Err(ForecastError::InsufficientData {
                needed: MIN_FIT_POINTS,
                got: 0,
            });
        };
        if series.len() < MIN_FIT_POINTS {
            return Err(ForecastError::InsufficientData {
                needed: MIN_FIT_POINTS,
                got: series.len(),
            });
        }

        let step = interval.duration();
        let values = contiguous_values(series, step);
        let curve = self
            .fitter
            .fit(&values, horizon_steps, Seasonality::for_interval(interval))?;

        if curve.point.len() != horizon_steps
            || curve.lower.len() != horizon_steps
            || curve.upper.len() != horizon_steps
        {
            return Err(ForecastError::Model(format!(
                "fitter returned {} points for a horizon of {horizon_steps}",
                curve.point.len()
            )));
        }

        let points = (0..horizon_steps)
            .map(|i| {
                ForecastPoint::clamped(
                    last.timestamp + step * (i as i32 + 1),
                    curve.point[i],
                    curve.lower[i],
                    curve.upper[i],
                )
            })
            .collect();
        Ok(points)
    }
}

/// Lay `series` on an unbroken grid of `step` from its first to its last
/// point. Missing slots are linearly interpolated, so every value sits at its
/// true offset and seasonal periods keep their phase across a gap.
fn contiguous_values(series: &[SeriesPoint], step: Duration) -> Vec<f64> {
    let step_nanos = step.whole_nanoseconds();
    let mut values = Vec::with_capacity(series.len());
    for pair in series.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        values.push(a.value);
        if step_nanos <= 0 {
            continue;
        }
        let slots = ((b.timestamp - a.timestamp).whole_nanoseconds() + step_nanos / 2) / step_nanos;
        for k in 1..slots {
            values.push(a.value + (b.value - a.value) * k as f64 / slots as f64);
        }
    }
    if let Some(last) = series.last() {
        values.push(last.value);
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use time::macros::datetime;

    /// Extends the straight line through the first and last value.
    #[derive(Default)]
    struct LinearTrend {
        calls: AtomicUsize,
    }

    impl CurveFitter for LinearTrend {
        fn fit(&self, values: &[f64], horizon: usize, _: Seasonality) -> Result<FittedCurve, ForecastError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let n = values.len();
            let slope = (values[n - 1] - values[0]) / (n - 1) as f64;
            let point: Vec<f64> = (1..=horizon).map(|h| values[n - 1] + slope * h as f64).collect();
            Ok(FittedCurve {
                lower: point.iter().map(|v| v - 5.0).collect(),
                upper: point.iter().map(|v| v + 5.0).collect(),
                point,
            })
        }
    }

    fn hourly(values: &[f64]) -> Vec<SeriesPoint> {
        let t0 = datetime!(2024-06-01 00:00:00 +8);
        values
            .iter()
            .enumerate()
            .map(|(i, v)| SeriesPoint::new(t0 + Duration::hours(i as i64), *v))
            .collect()
    }

    #[test]
    fn negative_trend_is_clamped_non_negative() {
        let forecaster = Forecaster::new(Arc::new(LinearTrend::default()));
        let series = hourly(&[50.0, 40.0, 30.0, 20.0, 10.0]);

        let out = forecaster.fit_and_predict(&series, 6, Interval::Hourly).unwrap();

        assert_eq!(out.len(), 6);
        for p in &out {
            assert!(p.predicted >= 0.0 && p.lower >= 0.0 && p.upper >= 0.0, "{p:?}");
            assert!(p.lower <= p.predicted && p.predicted <= p.upper, "{p:?}");
        }
        assert_eq!(out[0].predicted, 0.0);
        assert_eq!(out[0].upper, 5.0);
    }

    #[test]
    fn timestamps_continue_at_the_interval() {
        let forecaster = Forecaster::new(Arc::new(LinearTrend::default()));
        let series = hourly(&[1.0, 2.0, 3.0]);

        let out = forecaster.fit_and_predict(&series, 8, Interval::QuarterHourly).unwrap();

        let last = series[2].timestamp;
        assert_eq!(out[0].timestamp, last + Duration::minutes(15));
        assert_eq!(out[7].timestamp, last + Duration::hours(2));
    }

    #[test]
    fn degenerate_input_is_rejected_before_fitting() {
        let fitter = Arc::new(LinearTrend::default());
        let forecaster = Forecaster::new(fitter.clone());

        assert!(matches!(
            forecaster.fit_and_predict(&hourly(&[1.0]), 4, Interval::Hourly),
            Err(ForecastError::InsufficientData { got: 1, .. })
        ));
        assert!(matches!(
            forecaster.fit_and_predict(&hourly(&[1.0, 2.0]), 0, Interval::Hourly),
            Err(ForecastError::InvalidHorizon(_))
        ));
        assert_eq!(fitter.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn seasonality_is_counted_in_steps() {
        assert_eq!(
            Seasonality::for_interval(Interval::QuarterHourly),
            Seasonality { daily: 96, weekly: 672 }
        );
    }

    #[test]
    fn long_gap_keeps_daily_phase() {
        // Value = local hour of day for three days, hours 60..=64 missing.
        let series: Vec<SeriesPoint> = hourly(&(0..72).map(|i| (i % 24) as f64).collect::<Vec<_>>())
            .into_iter()
            .enumerate()
            .filter(|(i, _)| !(60..=64).contains(i))
            .map(|(_, p)| p)
            .collect();
        let forecaster = Forecaster::new(Arc::new(SeasonalNaive::default()));

        let out = forecaster.fit_and_predict(&series, 24, Interval::Hourly).unwrap();

        for p in &out {
            assert_eq!(p.predicted, f64::from(p.timestamp.hour()), "{p:?}");
        }
    }

    #[test]
    fn gap_slots_are_interpolated_in_place() {
        let mut series = hourly(&[0.0, 0.0, 0.0, 0.0, 8.0]);
        series.drain(1..4);

        assert_eq!(contiguous_values(&series, Duration::HOUR), vec![0.0, 2.0, 4.0, 6.0, 8.0]);
        assert_eq!(contiguous_values(&hourly(&[1.0, 2.0]), Duration::HOUR), vec![1.0, 2.0]);
    }
}
