//! Fixed-interval resampling with bounded gap filling.
//!
//! Raw samples are averaged into epoch-aligned buckets. Runs of at most
//! [`MAX_FILL_RUN`] empty buckets are filled: a short run at the tail is
//! forward-filled, a short run at the head backward-filled, and a short run
//! between two known buckets linearly interpolated. Longer runs stay missing
//! and are dropped from the resampled series.

use telemetry_client::SeriesPoint;
use time::{Duration, OffsetDateTime};

/// Longest run of empty buckets that gap filling will close.
pub const MAX_FILL_RUN: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bucket {
    pub start: OffsetDateTime,
    pub value: Option<f64>,
}

fn align_nanos(ts: OffsetDateTime, step: i128) -> i128 {
    let nanos = ts.unix_timestamp_nanos();
    nanos - nanos.rem_euclid(step)
}

fn at_nanos(nanos: i128, like: OffsetDateTime) -> Option<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .ok()
        .map(|ts| ts.to_offset(like.offset()))
}

/// Start of the epoch-aligned bucket containing `ts`, in `ts`'s offset.
pub fn bucket_start(ts: OffsetDateTime, interval: Duration) -> OffsetDateTime {
    let step = interval.whole_nanoseconds();
    if step <= 0 {
        return ts;
    }
    at_nanos(align_nanos(ts, step), ts).unwrap_or(ts)
}

/// Average `points` into `interval`-wide buckets.
///
/// Without a `span` the buckets run from the first to the last sample; with
/// one, they cover `[span.0, span.1]` and samples outside it are ignored.
/// Empty buckets carry `None`.
pub fn bucketize(
    points: &[SeriesPoint],
    interval: Duration,
    span: Option<(OffsetDateTime, OffsetDateTime)>,
) -> Vec<Bucket> {
    let step = interval.whole_nanoseconds();
    if step <= 0 {
        return Vec::new();
    }

    let (first, last) = match span {
        Some((start, end)) if start <= end => (start, end),
        Some(_) => return Vec::new(),
        None => {
            let first = points.iter().map(|p| p.timestamp).min();
            let last = points.iter().map(|p| p.timestamp).max();
            match (first, last) {
                (Some(first), Some(last)) => (first, last),
                _ => return Vec::new(),
            }
        }
    };

    let origin = align_nanos(first, step);
    let count = ((align_nanos(last, step) - origin) / step + 1) as usize;
    let mut sums = vec![(0.0_f64, 0_u32); count];

    for p in points {
        if p.timestamp < first || p.timestamp > last {
            continue;
        }
        let idx = ((align_nanos(p.timestamp, step) - origin) / step) as usize;
        let slot = &mut sums[idx];
        slot.0 += p.value;
        slot.1 += 1;
    }

    sums.into_iter()
        .enumerate()
        .filter_map(|(i, (sum, n))| {
            let start = at_nanos(origin + step * i as i128, first)?;
            let value = (n > 0).then(|| sum / f64::from(n));
            Some(Bucket { start, value })
        })
        .collect()
}

/// Close runs of at most `max_run` empty buckets, in place.
pub fn fill_gaps(buckets: &mut [Bucket], max_run: usize) {
    let n = buckets.len();
    let mut i = 0;
    while i < n {
        if buckets[i].value.is_some() {
            i += 1;
            continue;
        }

        let run_start = i;
        while i < n && buckets[i].value.is_none() {
            i += 1;
        }
        let run_len = i - run_start;
        if run_len > max_run {
            continue;
        }

        let left = run_start.checked_sub(1).and_then(|j| buckets[j].value);
        let right = buckets.get(i).and_then(|b| b.value);
        let run = &mut buckets[run_start..i];
        match (left, right) {
            (Some(l), None) => run.iter_mut().for_each(|b| b.value = Some(l)),
            (None, Some(r)) => run.iter_mut().for_each(|b| b.value = Some(r)),
            (Some(l), Some(r)) => {
                let span = (run_len + 1) as f64;
                for (k, b) in run.iter_mut().enumerate() {
                    b.value = Some(l + (r - l) * (k + 1) as f64 / span);
                }
            }
            (None, None) => {}
        }
    }
}

fn present(buckets: Vec<Bucket>) -> Vec<SeriesPoint> {
    buckets
        .into_iter()
        .filter_map(|b| b.value.map(|v| SeriesPoint::new(b.start, v)))
        .collect()
}

/// Resample over the extent of the data.
pub fn resample(points: &[SeriesPoint], interval: Duration) -> Vec<SeriesPoint> {
    let mut buckets = bucketize(points, interval, None);
    fill_gaps(&mut buckets, MAX_FILL_RUN);
    present(buckets)
}

/// Resample over an explicit window, so short runs at either end are filled
/// up to the window edges.
pub fn resample_window(
    points: &[SeriesPoint],
    interval: Duration,
    start: OffsetDateTime,
    end: OffsetDateTime,
) -> Vec<SeriesPoint> {
    if points.is_empty() {
        return Vec::new();
    }
    let mut buckets = bucketize(points, interval, Some((start, end)));
    fill_gaps(&mut buckets, MAX_FILL_RUN);
    present(buckets)
}
