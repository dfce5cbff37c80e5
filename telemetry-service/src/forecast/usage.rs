use serde::Serialize;
use telemetry_client::Metric;

use super::ForecastPoint;
use crate::series::Interval;

/// Forecast consumption over a horizon, in the metric's total unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageEstimate {
    pub unit: &'static str,
    #[serde(rename = "value")]
    pub total: f64,
    pub lower: f64,
    pub upper: f64,
}

impl UsageEstimate {
    pub fn zero(metric: Metric) -> Self {
        Self {
            unit: metric.spec().total_unit,
            total: 0.0,
            lower: 0.0,
            upper: 0.0,
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Riemann sum of a forecast rate series.
///
/// Each step is the average rate over one interval, so it contributes
/// `rate * interval_hours * rate_to_hourly_factor`. Bounds are summed
/// independently of the central estimate.
pub fn integrate(forecast: &[ForecastPoint], metric: Metric, interval: Interval) -> UsageEstimate {
    let spec = metric.spec();
    integrate_with_factor(
        forecast,
        spec.total_unit,
        interval.hours() * spec.rate_to_hourly_factor,
    )
}

fn integrate_with_factor(forecast: &[ForecastPoint], unit: &'static str, per_step: f64) -> UsageEstimate {
    let (total, lower, upper) = forecast.iter().fold((0.0, 0.0, 0.0), |(t, l, u), p| {
        (t + p.predicted * per_step, l + p.lower * per_step, u + p.upper * per_step)
    });
    UsageEstimate {
        unit,
        total: round2(total),
        lower: round2(lower),
        upper: round2(upper),
    }
}
