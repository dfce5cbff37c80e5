pub mod loader;
pub mod resample;

use std::str::FromStr;

use serde::Serialize;

pub use loader::{resolve_window, SeriesLoader};
pub use resample::{bucket_start, bucketize, fill_gaps, resample, resample_window, Bucket, MAX_FILL_RUN};

/// Step size of resampled and forecast series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Interval {
    #[serde(rename = "H")]
    Hourly,
    #[serde(rename = "15min")]
    QuarterHourly,
}

impl Interval {
    pub fn duration(self) -> time::Duration {
        match self {
            Interval::Hourly => time::Duration::HOUR,
            Interval::QuarterHourly => time::Duration::minutes(15),
        }
    }

    pub fn hours(self) -> f64 {
        match self {
            Interval::Hourly => 1.0,
            Interval::QuarterHourly => 0.25,
        }
    }

    /// Steps needed to cover `hours`.
    pub fn steps_for_hours(self, hours: u32) -> usize {
        match self {
            Interval::Hourly => hours as usize,
            Interval::QuarterHourly => hours as usize * 4,
        }
    }

    pub fn steps_per_day(self) -> usize {
        self.steps_for_hours(24)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unsupported interval '{0}', expected H or 15min")]
pub struct UnknownInterval(pub String);

impl FromStr for Interval {
    type Err = UnknownInterval;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "h" | "1h" | "hourly" => Ok(Interval::Hourly),
            "15min" | "15t" | "15m" => Ok(Interval::QuarterHourly),
            _ => Err(UnknownInterval(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_frequency_strings() {
        assert_eq!("H".parse::<Interval>(), Ok(Interval::Hourly));
        assert_eq!("15min".parse::<Interval>(), Ok(Interval::QuarterHourly));
        assert!("30min".parse::<Interval>().is_err());
    }

    #[test]
    fn steps_cover_the_horizon() {
        assert_eq!(Interval::Hourly.steps_for_hours(24), 24);
        assert_eq!(Interval::QuarterHourly.steps_for_hours(24), 96);
        assert_eq!(Interval::QuarterHourly.duration() * 4, Interval::Hourly.duration());
    }
}
