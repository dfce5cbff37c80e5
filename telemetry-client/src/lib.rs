pub mod db;
pub mod domain;

pub use db::{StoreError, TelemetryStore};
pub use domain::{Metric, MetricSpec, SeriesPoint, TelemetryRecord};
