//! Daily consumption totals from raw rate samples.
//!
//! Spacing is measured per device. Each sample is credited for the time until
//! that device's next sample, capped at `max_gap` so an outage is not billed
//! at the last seen rate. A device's newest sample is credited with its median
//! spacing. Daily totals are the sum over all devices.

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};
use telemetry_client::{Metric, TelemetryRecord};
use time::{Date, Duration, OffsetDateTime, UtcOffset};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyTotal {
    #[serde(serialize_with = "display_date")]
    pub date: Date,
    pub total: f64,
}

fn display_date<S: Serializer>(date: &Date, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(date)
}

fn hours(d: Duration) -> f64 {
    d.as_seconds_f64() / 3600.0
}

fn median(mut spans: Vec<Duration>) -> Duration {
    if spans.is_empty() {
        return Duration::ZERO;
    }
    spans.sort();
    spans[spans.len() / 2]
}

/// Credit one device's ascending samples into `days`.
fn credit_device(
    samples: &[(OffsetDateTime, f64)],
    factor: f64,
    local: UtcOffset,
    max_gap: Duration,
    days: &mut BTreeMap<Date, f64>,
) {
    let spans: Vec<Duration> = samples
        .windows(2)
        .map(|w| (w[1].0 - w[0].0).clamp(Duration::ZERO, max_gap))
        .collect();
    let tail = median(spans.iter().copied().filter(|d| d.is_positive()).collect());

    for (i, (ts, rate)) in samples.iter().enumerate() {
        let span = spans.get(i).copied().unwrap_or(tail);
        *days.entry(ts.to_offset(local).date()).or_default() += rate * factor * hours(span);
    }
}

/// Dates are calendar days in `local`. A non-positive `max_gap` credits nothing.
pub fn daily_totals(
    readings: &[TelemetryRecord],
    metric: Metric,
    local: UtcOffset,
    max_gap: Duration,
) -> Vec<DailyTotal> {
    let max_gap = max_gap.max(Duration::ZERO);
    let factor = metric.spec().rate_to_hourly_factor;

    let mut by_device: BTreeMap<&str, Vec<(OffsetDateTime, f64)>> = BTreeMap::new();
    for r in readings {
        by_device
            .entry(r.device_id.as_str())
            .or_default()
            .push((r.timestamp, r.rate_value));
    }

    let mut days: BTreeMap<Date, f64> = BTreeMap::new();
    for samples in by_device.values_mut() {
        samples.sort_by_key(|(ts, _)| *ts);
        credit_device(samples, factor, local, max_gap, &mut days);
    }

    days.into_iter()
        .map(|(date, total)| DailyTotal {
            date,
            total: (total * 100.0).round() / 100.0,
        })
        .collect()
}
