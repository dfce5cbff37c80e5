//! Production curve fitter backed by `augurs`.
//!
//! MSTL decomposes the series into daily and weekly seasonal components plus
//! a trend, which AutoETS extrapolates; components are additive. A seasonal
//! period is only used once the series holds two full cycles of it. With no
//! usable period the fitter falls back to non-seasonal AutoETS.

use augurs::{ets::AutoETS, forecaster::Forecaster, mstl::MSTLModel};

use super::{CurveFitter, FittedCurve, ForecastError, Seasonality};

/// Default width of the prediction interval.
pub const DEFAULT_CONFIDENCE: f64 = 0.8;

#[derive(Debug, Clone, Copy)]
pub struct MstlFitter {
    confidence: f64,
}

impl Default for MstlFitter {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIDENCE)
    }
}

impl MstlFitter {
    pub fn new(confidence: f64) -> Self {
        Self { confidence }
    }

    fn usable_periods(n: usize, seasonality: Seasonality) -> Vec<usize> {
        [seasonality.daily, seasonality.weekly]
            .into_iter()
            .filter(|p| *p > 1 && n >= 2 * p)
            .collect()
    }
}

impl CurveFitter for MstlFitter {
    fn fit(
        &self,
        values: &[f64],
        horizon: usize,
        seasonality: Seasonality,
    ) -> Result<FittedCurve, ForecastError> {
        let periods = Self::usable_periods(values.len(), seasonality);
        tracing::debug!(samples = values.len(), horizon, ?periods, "fitting curve");

        let forecast = if periods.is_empty() {
            let mut forecaster = Forecaster::new(AutoETS::non_seasonal());
            forecaster
                .fit(values)
                .map_err(|e| ForecastError::Model(format!("ETS fit error: {e}")))?;
            forecaster
                .predict(horizon, self.confidence)
                .map_err(|e| ForecastError::Model(format!("ETS predict error: {e}")))?
        } else {
            let trend = AutoETS::non_seasonal().into_trend_model();
            let mut forecaster = Forecaster::new(MSTLModel::new(periods, trend));
            forecaster
                .fit(values)
                .map_err(|e| ForecastError::Model(format!("MSTL fit error: {e}")))?;
            forecaster
                .predict(horizon, self.confidence)
                .map_err(|e| ForecastError::Model(format!("MSTL predict error: {e}")))?
        };

        let point = forecast.point;
        let (lower, upper) = match forecast.intervals {
            Some(intervals) => (intervals.lower, intervals.upper),
            None => (point.clone(), point.clone()),
        };
        Ok(FittedCurve { point, lower, upper })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{forecast::Forecaster as SeriesForecaster, series::Interval};
    use std::sync::Arc;
    use telemetry_client::SeriesPoint;
    use time::{macros::datetime, Duration};

    #[test]
    fn periods_need_two_full_cycles() {
        let s = Seasonality { daily: 24, weekly: 168 };
        assert!(MstlFitter::usable_periods(47, s).is_empty());
        assert_eq!(MstlFitter::usable_periods(48, s), vec![24]);
        assert_eq!(MstlFitter::usable_periods(400, s), vec![24, 168]);
    }

    #[test]
    fn daily_pattern_forecast_is_non_negative() {
        let t0 = datetime!(2024-06-01 00:00:00 +8);
        let series: Vec<SeriesPoint> = (0..72)
            .map(|i| {
                let hour = (i % 24) as f64;
                let daily = 4.0 * (hour / 24.0 * std::f64::consts::TAU).sin();
                let jitter = ((i * 7) % 5) as f64 * 0.1;
                SeriesPoint::new(t0 + Duration::hours(i), 6.0 + daily + jitter - 0.05 * i as f64)
            })
            .collect();
        let forecaster = SeriesForecaster::new(Arc::new(MstlFitter::default()));

        let out = forecaster.fit_and_predict(&series, 24, Interval::Hourly).unwrap();

        assert_eq!(out.len(), 24);
        for p in &out {
            assert!(p.predicted >= 0.0 && p.lower >= 0.0);
            assert!(p.lower <= p.predicted && p.predicted <= p.upper);
        }
    }
}
