mod metric;
mod series_point;
mod telemetry_record;

pub use metric::{Metric, MetricSpec, UnknownMetric};
pub use series_point::SeriesPoint;
pub use telemetry_record::TelemetryRecord;
