use std::{fmt, str::FromStr};

use readings_client::Reading;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::{
    format_description::well_known::Rfc3339, macros::format_description, Date, OffsetDateTime,
    PrimitiveDateTime, UtcOffset,
};

use crate::error::EngineError;

/// Wall-clock timestamp as stored with readings (no time zone).
pub type Timestamp = PrimitiveDateTime;

/// Text form of the unbounded interval.
pub const ETERNITY_TEXT: &str = "all";
const NEG_INFINITY_TEXT: &str = "-inf";
const POS_INFINITY_TEXT: &str = "inf";

/// Parse `YYYY-MM-DDTHH:MM:SS`, `YYYY-MM-DD HH:MM:SS`, a bare date, or RFC 3339.
///
/// RFC 3339 values carrying an offset are normalized to UTC.
pub fn parse_timestamp(s: &str) -> Result<Timestamp, EngineError> {
    let s = s.trim();
    if let Ok(ts) = PrimitiveDateTime::parse(
        s,
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second][optional [.[subsecond]]]"),
    ) {
        return Ok(ts);
    }
    if let Ok(ts) = PrimitiveDateTime::parse(
        s,
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second][optional [.[subsecond]]]"),
    ) {
        return Ok(ts);
    }
    if let Ok(date) = Date::parse(s, format_description!("[year]-[month]-[day]")) {
        return Ok(date.midnight());
    }

    OffsetDateTime::parse(s, &Rfc3339)
        .map(|dt| {
            let utc = dt.to_offset(UtcOffset::UTC);
            PrimitiveDateTime::new(utc.date(), utc.time())
        })
        .map_err(|e| EngineError::InvalidInterval(format!("invalid timestamp '{s}': {e}")))
}

/// `YYYY-MM-DDTHH:MM:SS`, with a fractional second only when one is present.
pub fn format_timestamp(ts: Timestamp) -> String {
    let mut text = format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
        ts.year(),
        u8::from(ts.month()),
        ts.day(),
        ts.hour(),
        ts.minute(),
        ts.second()
    );
    if ts.nanosecond() != 0 {
        let fraction = format!("{:09}", ts.nanosecond());
        text.push('.');
        text.push_str(fraction.trim_end_matches('0'));
    }
    text
}

/// Half-open span `[start, end)`. A span with `start == end` is a point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Span {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl Span {
    pub fn new(start: Timestamp, end: Timestamp) -> Result<Self, EngineError> {
        if end < start {
            return Err(EngineError::InvalidInterval(format!(
                "end {} is before start {}",
                format_timestamp(end),
                format_timestamp(start)
            )));
        }
        Ok(Self { start, end })
    }

    pub fn of_reading(reading: &Reading) -> Result<Self, EngineError> {
        Self::new(reading.start_timestamp, reading.end_timestamp)
    }

    pub fn is_point(&self) -> bool {
        self.start == self.end
    }

    pub fn seconds(&self) -> f64 {
        (self.end - self.start).as_seconds_f64()
    }

    pub fn hours(&self) -> f64 {
        self.seconds() / 3600.0
    }

    pub fn contains(&self, ts: Timestamp) -> bool {
        self.start <= ts && ts < self.end
    }

    pub fn overlap_seconds(&self, other: &Span) -> f64 {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        if end > start {
            (end - start).as_seconds_f64()
        } else {
            0.0
        }
    }

    /// Non-empty intersection of two spans.
    pub fn intersect(&self, other: &Span) -> Option<Span> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start < end).then_some(Span { start, end })
    }

    /// Union hull of two spans.
    pub fn hull(&self, other: &Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    /// Whether a reading with this span contributes anything to `bucket`.
    pub fn touches(&self, bucket: &Span) -> bool {
        if self.is_point() {
            bucket.contains(self.start)
        } else {
            self.start < bucket.end && self.end > bucket.start
        }
    }
}

/// Requested time range; a `None` side is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeInterval {
    start: Option<Timestamp>,
    end: Option<Timestamp>,
}

impl TimeInterval {
    pub fn new(start: Option<Timestamp>, end: Option<Timestamp>) -> Result<Self, EngineError> {
        if let (Some(s), Some(e)) = (start, end) {
            if e <= s {
                return Err(EngineError::InvalidInterval(format!(
                    "start {} must be before end {}",
                    format_timestamp(s),
                    format_timestamp(e)
                )));
            }
        }
        Ok(Self { start, end })
    }

    pub fn bounded(start: Timestamp, end: Timestamp) -> Result<Self, EngineError> {
        Self::new(Some(start), Some(end))
    }

    pub const fn unbounded() -> Self {
        Self {
            start: None,
            end: None,
        }
    }

    pub fn start(&self) -> Option<Timestamp> {
        self.start
    }

    pub fn end(&self) -> Option<Timestamp> {
        self.end
    }

    pub fn is_bounded(&self) -> bool {
        self.start.is_some() && self.end.is_some()
    }

    pub fn as_span(&self) -> Option<Span> {
        match (self.start, self.end) {
            (Some(start), Some(end)) => Some(Span { start, end }),
            _ => None,
        }
    }

    /// Whether a reading with span `span` has any part inside this interval.
    pub fn touches(&self, span: &Span) -> bool {
        if span.is_point() {
            return self.start.map_or(true, |s| span.start >= s)
                && self.end.map_or(true, |e| span.start < e);
        }
        self.start.map_or(true, |s| span.end > s) && self.end.map_or(true, |e| span.start < e)
    }

    /// Replace unbounded sides with `extent` and clip to it.
    pub fn resolve(&self, extent: &Span) -> Option<Span> {
        let start = self.start.map_or(extent.start, |s| s.max(extent.start));
        let end = self.end.map_or(extent.end, |e| e.min(extent.end));
        (start < end).then_some(Span { start, end })
    }
}

impl fmt::Display for TimeInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.start, self.end) {
            (None, None) => f.write_str(ETERNITY_TEXT),
            (start, end) => {
                let start = start.map_or_else(|| NEG_INFINITY_TEXT.to_string(), format_timestamp);
                let end = end.map_or_else(|| POS_INFINITY_TEXT.to_string(), format_timestamp);
                write!(f, "{start}_{end}")
            }
        }
    }
}

impl FromStr for TimeInterval {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == ETERNITY_TEXT {
            return Ok(Self::unbounded());
        }
        let (start, end) = s
            .split_once('_')
            .ok_or_else(|| EngineError::InvalidInterval(format!("malformed interval '{s}'")))?;
        let start = match start.trim() {
            NEG_INFINITY_TEXT => None,
            other => Some(parse_timestamp(other)?),
        };
        let end = match end.trim() {
            POS_INFINITY_TEXT => None,
            other => Some(parse_timestamp(other)?),
        };
        Self::new(start, end)
    }
}

impl Serialize for TimeInterval {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeInterval {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
