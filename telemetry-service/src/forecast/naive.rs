use super::{CurveFitter, FittedCurve, ForecastError, Seasonality};

/// z-score of an 80% two-sided normal interval.
const Z_80: f64 = 1.2816;

/// Seasonal-naive model: each future step repeats the value one day earlier,
/// with a band sized from the spread of day-over-day differences. Falls back
/// to repeating the last value when less than a day of data is available.
#[derive(Debug, Clone, Copy)]
pub struct SeasonalNaive {
    z: f64,
}

impl Default for SeasonalNaive {
    fn default() -> Self {
        Self { z: Z_80 }
    }
}

impl SeasonalNaive {
    pub fn with_z(z: f64) -> Self {
        Self { z }
    }
}

impl CurveFitter for SeasonalNaive {
    fn fit(
        &self,
        values: &[f64],
        horizon: usize,
        seasonality: Seasonality,
    ) -> Result<FittedCurve, ForecastError> {
        if values.is_empty() {
            return Err(ForecastError::InsufficientData { needed: 1, got: 0 });
        }
        let n = values.len();
        let period = if n > seasonality.daily { seasonality.daily.max(1) } else { 1 };

        let diffs: Vec<f64> = values.windows(period + 1).map(|w| w[period] - w[0]).collect();
        let sigma = if diffs.is_empty() {
            0.0
        } else {
            (diffs.iter().map(|d| d * d).sum::<f64>() / diffs.len() as f64).sqrt()
        };

        let mut point = Vec::with_capacity(horizon);
        let mut lower = Vec::with_capacity(horizon);
        let mut upper = Vec::with_capacity(horizon);
        for h in 0..horizon {
            let v = values[n - period + h % period];
            // Uncertainty grows with the number of seasons ahead.
            let width = self.z * sigma * ((h / period + 1) as f64).sqrt();
            point.push(v);
            lower.push(v - width);
            upper.push(v + width);
        }
        Ok(FittedCurve { point, lower, upper })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOURLY: Seasonality = Seasonality { daily: 24, weekly: 168 };

    #[test]
    fn repeats_the_previous_day() {
        let values: Vec<f64> = (0..48).map(|i| (i % 24) as f64).collect();
        let curve = SeasonalNaive::default().fit(&values, 30, HOURLY).unwrap();

        assert_eq!(curve.point[0], 0.0);
        assert_eq!(curve.point[23], 23.0);
        assert_eq!(curve.point[24], 0.0);
        // A perfectly periodic series has no spread.
        assert_eq!(curve.lower, curve.point);
    }

    #[test]
    fn short_series_repeats_last_value_with_band() {
        let curve = SeasonalNaive::default().fit(&[2.0, 4.0, 3.0], 3, HOURLY).unwrap();

        assert_eq!(curve.point, vec![3.0, 3.0, 3.0]);
        assert!(curve.upper[0] > 3.0);
        assert!(curve.upper[2] > curve.upper[0]);
    }
}
