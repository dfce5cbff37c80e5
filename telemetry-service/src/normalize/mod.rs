//! Turns raw broker payloads into [`TelemetryRecord`]s.

use std::collections::HashMap;

use serde_json::{Map, Value};
use telemetry_client::{Metric, TelemetryRecord};
use time::{macros::datetime, OffsetDateTime, UtcOffset};

use crate::{
    config::TopicsConfig,
    pipeline::{Envelope, InboundMessage},
    timefmt::{self, TimestampError},
};

/// How the metric of a message on a given topic is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Per-metric topic.
    Fixed(Metric),
    /// Combined topic; the payload's `type` field names the metric.
    Discriminated,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum NormalizationError {
    #[error("no route for topic '{0}'")]
    UnknownTopic(String),
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("payload is not a JSON object")]
    NotAnObject,
    #[error("payload has no 'type' discriminator")]
    MissingType,
    #[error("unknown telemetry type '{0}'")]
    UnknownType(String),
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
    #[error("field '{field}' is not numeric: {value}")]
    NotNumeric { field: &'static str, value: String },
    #[error("field '{field}' must be finite and non-negative, got {value}")]
    OutOfRange { field: &'static str, value: f64 },
    #[error("invalid timestamp: {0}")]
    Timestamp(#[from] TimestampError),
    #[error("timestamp {0} outside the accepted window")]
    TimestampOutOfWindow(OffsetDateTime),
}

/// Topic → route table. Per-metric topics and the combined topic coexist.
#[derive(Debug, Clone, Default)]
pub struct TopicRoutes {
    routes: HashMap<String, Route>,
}

impl TopicRoutes {
    pub fn from_config(topics: &TopicsConfig) -> Self {
        let mut routes: HashMap<String, Route> = Metric::ALL
            .iter()
            .map(|m| (topics.per_metric(*m).to_string(), Route::Fixed(*m)))
            .collect();
        if let Some(combined) = &topics.combined {
            routes.insert(combined.clone(), Route::Discriminated);
        }
        Self { routes }
    }

    pub fn with_route(mut self, topic: impl Into<String>, route: Route) -> Self {
        self.routes.insert(topic.into(), route);
        self
    }

    pub fn route(&self, topic: &str) -> Option<Route> {
        self.routes.get(topic).copied()
    }

    /// Every topic the transport must subscribe to, sorted.
    pub fn topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = self.routes.keys().cloned().collect();
        topics.sort();
        topics
    }
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    routes: TopicRoutes,
    local: UtcOffset,
}

impl Normalizer {
    pub fn new(routes: TopicRoutes, local: UtcOffset) -> Self {
        Self { routes, local }
    }

    pub fn routes(&self) -> &TopicRoutes {
        &self.routes
    }

    pub fn normalize(&self, env: &Envelope<InboundMessage>) -> Result<TelemetryRecord, NormalizationError> {
        let route = self
            .routes
            .route(&env.payload.topic)
            .ok_or_else(|| NormalizationError::UnknownTopic(env.payload.topic.clone()))?;
        let received_at = OffsetDateTime::from(env.received_at).to_offset(self.local);

        normalize_payload(&env.payload.payload, route, received_at, self.local)
    }
}

/// Parse one payload.
///
/// `received_at` is used when the payload carries no `timestamp`/`ts` field.
pub fn normalize_payload(
    raw: &[u8],
    route: Route,
    received_at: OffsetDateTime,
    local: UtcOffset,
) -> Result<TelemetryRecord, NormalizationError> {
    let value: Value =
        serde_json::from_slice(raw).map_err(|e| NormalizationError::InvalidJson(e.to_string()))?;
    let obj = value.as_object().ok_or(NormalizationError::NotAnObject)?;

    let metric = match route {
        Route::Fixed(metric) => metric,
        Route::Discriminated => {
            let kind = obj
                .get("type")
                .and_then(Value::as_str)
                .ok_or(NormalizationError::MissingType)?;
            kind.parse::<Metric>()
                .map_err(|_| NormalizationError::UnknownType(kind.to_string()))?
        }
    };
    let spec = metric.spec();

    let rate_value = required_f64(obj, spec.payload_rate_field)?;
    if !rate_value.is_finite() || rate_value < 0.0 {
        return Err(NormalizationError::OutOfRange {
            field: spec.payload_rate_field,
            value: rate_value,
        });
    }

    let cumulative_value = required_f64(obj, spec.payload_cumulative_field)?;
    if !cumulative_value.is_finite() {
        return Err(NormalizationError::OutOfRange {
            field: spec.payload_cumulative_field,
            value: cumulative_value,
        });
    }

    let timestamp = match payload_timestamp(obj, local)? {
        Some(ts) => ts,
        None => received_at.to_offset(local),
    };
    let min_ts = datetime!(2000-01-01 00:00:00 UTC);
    let max_ts = datetime!(2100-01-01 00:00:00 UTC);
    if timestamp < min_ts || timestamp >= max_ts {
        return Err(NormalizationError::TimestampOutOfWindow(timestamp));
    }

    Ok(TelemetryRecord {
        device_id: device_id(obj),
        metric,
        timestamp,
        rate_value,
        cumulative_value,
    })
}

fn device_id(obj: &Map<String, Value>) -> String {
    let raw = obj.get("device").or_else(|| obj.get("device_id"));
    match raw {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => "unknown".to_string(),
    }
}

fn required_f64(obj: &Map<String, Value>, field: &'static str) -> Result<f64, NormalizationError> {
    let value = match obj.get(field) {
        None | Some(Value::Null) => return Err(NormalizationError::MissingField(field)),
        Some(v) => v,
    };
    coerce_f64(value).ok_or_else(|| NormalizationError::NotNumeric {
        field,
        value: value.to_string(),
    })
}

/// JSON numbers and numeric strings.
fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn payload_timestamp(
    obj: &Map<String, Value>,
    local: UtcOffset,
) -> Result<Option<OffsetDateTime>, NormalizationError> {
    let raw = match obj.get("timestamp").or_else(|| obj.get("ts")) {
        None | Some(Value::Null) => return Ok(None),
        Some(v) => v,
    };

    let ts = match raw {
        Value::Number(n) => {
            let secs = n.as_f64().ok_or_else(|| TimestampError::Format(n.to_string()))?;
            timefmt::from_epoch_seconds(secs, local)?
        }
        Value::String(s) => match s.trim().parse::<f64>() {
            Ok(secs) => timefmt::from_epoch_seconds(secs, local)?,
            Err(_) => timefmt::parse_datetime(s, local)?,
        },
        other => return Err(TimestampError::Format(other.to_string()).into()),
    };
    Ok(Some(ts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{datetime, offset};

    const LOCAL: UtcOffset = offset!(+8);

    fn received() -> OffsetDateTime {
        datetime!(2024-06-01 09:00:00 +8)
    }

    fn norm(raw: &str, route: Route) -> Result<TelemetryRecord, NormalizationError> {
        normalize_payload(raw.as_bytes(), route, received(), LOCAL)
    }

    #[test]
    fn topic_route_supplies_the_metric() {
        let rec = norm(
            r#"{"device":"B1-201","power_kw":7.5,"total_kwh":"321.4","timestamp":"2024-06-01T08:59:00"}"#,
            Route::Fixed(Metric::Electric),
        )
        .unwrap();

        assert_eq!(rec.metric, Metric::Electric);
        assert_eq!(rec.device_id, "B1-201");
        assert_eq!(rec.rate_value, 7.5);
        assert_eq!(rec.cumulative_value, 321.4);
        assert_eq!(rec.timestamp, datetime!(2024-06-01 08:59:00 +8));
    }

    #[test]
    fn combined_topic_reads_type_field_and_epoch_timestamp() {
        let rec = norm(
            r#"{"device":"B1-201","type":"water","flow_lpm":12,"total_l":480.5,"timestamp":1717203600}"#,
            Route::Discriminated,
        )
        .unwrap();

        assert_eq!(rec.metric, Metric::Water);
        assert_eq!(rec.timestamp.unix_timestamp(), 1_717_203_600);
        assert_eq!(rec.timestamp.offset(), LOCAL);
    }

    #[test]
    fn missing_device_and_timestamp_fall_back() {
        let rec = norm(r#"{"flow_m3h":3.2,"total_m3":1000}"#, Route::Fixed(Metric::Gas)).unwrap();

        assert_eq!(rec.device_id, "unknown");
        assert_eq!(rec.timestamp, received());
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let err = norm(r#"{"device":"d","power_kw":1.0}"#, Route::Fixed(Metric::Electric)).unwrap_err();
        assert_eq!(err, NormalizationError::MissingField("total_kwh"));
    }

    #[test]
    fn non_numeric_field_is_rejected() {
        let err = norm(
            r#"{"flow_lpm":"fast","total_l":1}"#,
            Route::Fixed(Metric::Water),
        )
        .unwrap_err();
        assert!(matches!(err, NormalizationError::NotNumeric { field: "flow_lpm", .. }));
    }

    #[test]
    fn negative_rate_is_rejected() {
        let err = norm(r#"{"flow_m3h":-0.1,"total_m3":1}"#, Route::Fixed(Metric::Gas)).unwrap_err();
        assert!(matches!(err, NormalizationError::OutOfRange { field: "flow_m3h", .. }));
    }

    #[test]
    fn unknown_or_missing_type_is_rejected() {
        assert_eq!(
            norm(r#"{"type":"steam","rate":1}"#, Route::Discriminated).unwrap_err(),
            NormalizationError::UnknownType("steam".to_string())
        );
        assert_eq!(
            norm(r#"{"power_kw":1,"total_kwh":1}"#, Route::Discriminated).unwrap_err(),
            NormalizationError::MissingType
        );
    }

    #[test]
    fn timestamp_outside_window_is_rejected() {
        let err = norm(
            r#"{"power_kw":1,"total_kwh":1,"timestamp":"1970-01-02T00:00:00Z"}"#,
            Route::Fixed(Metric::Electric),
        )
        .unwrap_err();
        assert!(matches!(err, NormalizationError::TimestampOutOfWindow(_)));
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(matches!(
            norm("{not json", Route::Fixed(Metric::Gas)),
            Err(NormalizationError::InvalidJson(_))
        ));
        assert_eq!(norm("[1,2]", Route::Fixed(Metric::Gas)).unwrap_err(), NormalizationError::NotAnObject);
    }

    #[test]
    fn routes_cover_per_metric_and_combined_topics() {
        let routes = TopicRoutes::from_config(&TopicsConfig::default());

        assert_eq!(routes.route("campus/energy/gas"), Some(Route::Fixed(Metric::Gas)));
        assert_eq!(routes.route("campus/energy"), Some(Route::Discriminated));
        assert_eq!(routes.route("campus/other"), None);
        assert_eq!(routes.topics().len(), 4);
    }

    #[test]
    fn normalizer_rejects_unrouted_topic() {
        let normalizer = Normalizer::new(TopicRoutes::default(), LOCAL);
        let env = Envelope {
            payload: InboundMessage::new("nowhere", br#"{"power_kw":1,"total_kwh":1}"#.to_vec()),
            received_at: std::time::SystemTime::now(),
        };

        assert_eq!(
            normalizer.normalize(&env).unwrap_err(),
            NormalizationError::UnknownTopic("nowhere".to_string())
        );
    }
}
