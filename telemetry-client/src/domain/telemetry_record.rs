use time::OffsetDateTime;

use super::Metric;

/// A normalized reading from one device.
///
/// `rate_value` is the instantaneous reading (kW, L/min, m³/h).
/// `cumulative_value` is the device's own running total and is stored as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    pub device_id: String,
    pub metric: Metric,
    pub timestamp: OffsetDateTime,
    pub rate_value: f64,
    pub cumulative_value: f64,
}
