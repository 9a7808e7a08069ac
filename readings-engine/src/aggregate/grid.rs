//! Bucket grids shared by meters and groups.

use readings_client::Reading;
use serde::Serialize;
use time::{Duration, Time};

use crate::{
    config::EngineConfig,
    error::EngineError,
    interval::{Span, TimeInterval, Timestamp},
};

/// Earliest start to latest end over `readings`.
pub fn data_extent(readings: &[Reading]) -> Option<Span> {
    readings.iter().fold(None, |extent: Option<Span>, r| {
        let span = Span {
            start: r.start_timestamp.min(r.end_timestamp),
            end: r.end_timestamp.max(r.start_timestamp),
        };
        Some(extent.map_or(span, |e| e.hull(&span)))
    })
}

pub fn floor_to_day(ts: Timestamp) -> Timestamp {
    ts.date().midnight()
}

pub fn ceil_to_day(ts: Timestamp) -> Timestamp {
    if ts.time() == Time::MIDNIGHT {
        ts
    } else {
        ts.date().next_day().map_or(ts, |d| d.midnight())
    }
}

pub fn floor_to_hour(ts: Timestamp) -> Timestamp {
    let into_hour = Duration::minutes(i64::from(ts.minute()))
        + Duration::seconds(i64::from(ts.second()))
        + Duration::nanoseconds(i64::from(ts.nanosecond()));
    ts - into_hour
}

/// Consecutive bars of `width_days` days.
///
/// The requested interval is clipped to `extent` and rounded inward to whole
/// days. Bars are aligned to the end so every bar is full width; a remainder
/// shorter than one bar is dropped at the start.
pub fn bar_grid(
    interval: &TimeInterval,
    extent: &Span,
    width_days: u32,
) -> Result<Vec<Span>, EngineError> {
    if width_days == 0 {
        return Err(EngineError::InvalidBarWidth);
    }
    let Some(window) = interval.resolve(extent) else {
        return Ok(Vec::new());
    };

    let start = ceil_to_day(window.start);
    let end = floor_to_day(window.end);
    if end <= start {
        return Ok(Vec::new());
    }

    let width = i64::from(width_days);
    let count = (end - start).whole_days() / width;
    let first = end - Duration::days(width * count);

    Ok((0..count)
        .map(|i| Span {
            start: first + Duration::days(width * i),
            end: first + Duration::days(width * (i + 1)),
        })
        .collect())
}

/// Granularity of line-chart points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LineResolution {
    Raw,
    Hourly,
    Daily,
}

impl LineResolution {
    /// Raw points while there are few enough readings, otherwise the finest
    /// fixed grid that stays within the hourly point budget.
    pub fn choose(window: &Span, reading_count: usize, config: &EngineConfig) -> Self {
        if reading_count <= config.max_raw_points {
            Self::Raw
        } else {
            Self::for_group(window, config)
        }
    }

    /// Groups always use a fixed grid so that children line up.
    pub fn for_group(window: &Span, config: &EngineConfig) -> Self {
        if window.hours() <= config.max_hour_points as f64 {
            Self::Hourly
        } else {
            Self::Daily
        }
    }

    /// Calendar-aligned buckets covering `window`, clipped to it.
    ///
    /// `Raw` has no fixed grid and yields the window itself.
    pub fn grid(self, window: &Span) -> Vec<Span> {
        let (mut cursor, step) = match self {
            Self::Raw => return vec![*window],
            Self::Hourly => (floor_to_hour(window.start), Duration::HOUR),
            Self::Daily => (floor_to_day(window.start), Duration::DAY),
        };

        let mut buckets = Vec::new();
        while cursor < window.end {
            let bucket = Span {
                start: cursor,
                end: cursor + step,
            };
            if let Some(clipped) = bucket.intersect(window) {
                buckets.push(clipped);
            }
            cursor += step;
        }
        buckets
    }
}
