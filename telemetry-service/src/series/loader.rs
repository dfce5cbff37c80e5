use telemetry_client::{Metric, SeriesPoint, StoreError, TelemetryRecord, TelemetryStore};
use time::{Duration, OffsetDateTime};

/// Resolve an ad-hoc query window.
///
/// `end` defaults to `now`, `start` to one day before `end`; inverted bounds
/// are swapped.
pub fn resolve_window(
    start: Option<OffsetDateTime>,
    end: Option<OffsetDateTime>,
    now: OffsetDateTime,
) -> (OffsetDateTime, OffsetDateTime) {
    let end = end.unwrap_or(now);
    let start = start.unwrap_or(end - Duration::days(1));
    if start > end {
        (end, start)
    } else {
        (start, end)
    }
}

/// Reads bounded windows of raw samples.
pub struct SeriesLoader<S> {
    store: S,
}

impl<S> SeriesLoader<S>
where
    S: TelemetryStore,
{
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Samples in `[start, end]` ascending. No data is an empty vec, not an error.
    pub async fn load(
        &self,
        metric: Metric,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<SeriesPoint>, StoreError> {
        let (start, end) = resolve_window(Some(start), Some(end), end);
        let mut points = self.store.range(metric, start, end).await?;
        // Tolerate stores that hand back ties or slightly unordered rows.
        points.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(points)
    }

    /// The trailing `days` days up to `now`.
    pub async fn load_lookback(
        &self,
        metric: Metric,
        days: u32,
        now: OffsetDateTime,
    ) -> Result<Vec<SeriesPoint>, StoreError> {
        self.load(metric, now - Duration::days(i64::from(days)), now).await
    }

    pub async fn latest(&self, metric: Metric, limit: usize) -> Result<Vec<SeriesPoint>, StoreError> {
        self.store.latest(metric, limit).await
    }

    /// Full per-device records in `[start, end]`, for calculations that must
    /// not mix devices.
    pub async fn readings(
        &self,
        metric: Metric,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<Vec<TelemetryRecord>, StoreError> {
        let (start, end) = resolve_window(Some(start), Some(end), end);
        self.store.readings(metric, start, end).await
    }
}
