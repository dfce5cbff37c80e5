use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// The three monitored utilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Electric,
    Water,
    Gas,
}

/// Storage and unit metadata for a metric.
///
/// `rate_to_hourly_factor` turns one unit of the rate column into the amount
/// consumed over one hour at that rate, expressed in `total_unit`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricSpec {
    pub store_table: &'static str,
    pub rate_column: &'static str,
    pub cumulative_column: &'static str,
    pub unit_label: &'static str,
    pub total_unit: &'static str,
    pub rate_to_hourly_factor: f64,
    pub payload_rate_field: &'static str,
    pub payload_cumulative_field: &'static str,
}

const ELECTRIC: MetricSpec = MetricSpec {
    store_table: "electric_data",
    rate_column: "power_kw",
    cumulative_column: "total_kwh",
    unit_label: "kW",
    total_unit: "kWh",
    rate_to_hourly_factor: 1.0,
    payload_rate_field: "power_kw",
    payload_cumulative_field: "total_kwh",
};

// L/min * 60 = L/h
const WATER: MetricSpec = MetricSpec {
    store_table: "water_data",
    rate_column: "flow_lpm",
    cumulative_column: "total_l",
    unit_label: "L/min",
    total_unit: "L",
    rate_to_hourly_factor: 60.0,
    payload_rate_field: "flow_lpm",
    payload_cumulative_field: "total_l",
};

const GAS: MetricSpec = MetricSpec {
    store_table: "gas_data",
    rate_column: "flow_m3h",
    cumulative_column: "total_m3",
    unit_label: "m³/h",
    total_unit: "m³",
    rate_to_hourly_factor: 1.0,
    payload_rate_field: "flow_m3h",
    payload_cumulative_field: "total_m3",
};

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Electric, Metric::Water, Metric::Gas];

    pub const fn spec(self) -> &'static MetricSpec {
        match self {
            Metric::Electric => &ELECTRIC,
            Metric::Water => &WATER,
            Metric::Gas => &GAS,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Metric::Electric => "electric",
            Metric::Water => "water",
            Metric::Gas => "gas",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown metric '{0}', expected electric, water or gas")]
pub struct UnknownMetric(pub String);

impl FromStr for Metric {
    type Err = UnknownMetric;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "electric" => Ok(Metric::Electric),
            "water" => Ok(Metric::Water),
            "gas" => Ok(Metric::Gas),
            other => Err(UnknownMetric(other.to_string())),
        }
    }
}
