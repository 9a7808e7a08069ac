//! Resampling of one meter's raw readings into line points and bars.

use readings_client::{Meter, MeterId, Reading, UnitId};
use serde::Serialize;

use super::grid::{bar_grid, data_extent, LineResolution};
use crate::{
    allocate::{allocate, covered_fraction, UnitKind},
    cik::{AffineTransform, Cik},
    config::EngineConfig,
    error::EngineError,
    interval::{Span, TimeInterval, Timestamp},
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LinePoint {
    pub start_timestamp: Timestamp,
    pub end_timestamp: Timestamp,
    /// Converted quantity over the point's span (the value itself for raw units).
    pub quantity: f64,
    /// Converted quantity per hour (the value itself for raw units).
    pub rate: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BarBucket {
    pub start_timestamp: Timestamp,
    pub end_timestamp: Timestamp,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationMode {
    Line,
    Bar { width_days: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", content = "points", rename_all = "lowercase")]
pub enum Series {
    Line(Vec<LinePoint>),
    Bar(Vec<BarBucket>),
}

impl Series {
    pub fn empty(mode: AggregationMode) -> Self {
        match mode {
            AggregationMode::Line => Self::Line(Vec::new()),
            AggregationMode::Bar { .. } => Self::Bar(Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Line(points) => points.len(),
            Self::Bar(bars) => bars.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// How one meter's native readings map into the requested graphic unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeterConversion {
    pub meter_id: MeterId,
    pub unit_id: UnitId,
    pub kind: UnitKind,
    pub transform: AffineTransform,
}

impl MeterConversion {
    pub fn resolve(cik: &Cik, meter: &Meter, graphic_unit: UnitId) -> Result<Self, EngineError> {
        let unit = cik
            .unit(meter.unit_id)
            .ok_or(EngineError::UnknownUnit(meter.unit_id))?;
        if cik.unit(graphic_unit).is_none() {
            return Err(EngineError::UnknownUnit(graphic_unit));
        }
        let transform =
            cik.transform(meter.unit_id, graphic_unit)
                .ok_or(EngineError::IncompatibleUnit {
                    source_unit: meter.unit_id,
                    target_unit: graphic_unit,
                })?;

        Ok(Self {
            meter_id: meter.id,
            unit_id: meter.unit_id,
            kind: UnitKind::of(unit)?,
            transform,
        })
    }

    pub fn require_summable(&self) -> Result<(), EngineError> {
        if self.kind.is_raw() {
            return Err(EngineError::RawNotAggregatable { unit: self.unit_id });
        }
        Ok(())
    }
}

/// Visit every (bucket index, reading span, value) where a reading touches a bucket.
///
/// `buckets` must be sorted and non-overlapping.
fn for_each_overlap(
    readings: &[Reading],
    buckets: &[Span],
    mut visit: impl FnMut(usize, &Span, f64),
) -> Result<(), EngineError> {
    for reading in readings {
        let span = Span::of_reading(reading)?;
        let first = buckets.partition_point(|b| b.end <= span.start);
        for (idx, bucket) in buckets.iter().enumerate().skip(first) {
            if bucket.start > span.end || (bucket.start == span.end && !span.is_point()) {
                break;
            }
            if span.touches(bucket) {
                visit(idx, &span, reading.value);
            }
        }
    }
    Ok(())
}

/// Native quantity per bucket; `None` where no reading touched the bucket.
///
/// For raw units this is the time-weighted mean value instead.
pub fn native_bucket_values(
    readings: &[Reading],
    buckets: &[Span],
    kind: UnitKind,
) -> Result<Vec<Option<f64>>, EngineError> {
    if kind.is_raw() {
        let mut weighted = vec![0.0; buckets.len()];
        let mut covered = vec![0.0; buckets.len()];
        for_each_overlap(readings, buckets, |idx, span, value| {
            weighted[idx] += allocate(span, value, &buckets[idx], kind);
            covered[idx] += span.overlap_seconds(&buckets[idx]);
        })?;
        return Ok(weighted
            .into_iter()
            .zip(covered)
            .map(|(w, c)| (c > 0.0).then(|| w / c))
            .collect());
    }

    let mut sums: Vec<Option<f64>> = vec![None; buckets.len()];
    for_each_overlap(readings, buckets, |idx, span, value| {
        *sums[idx].get_or_insert(0.0) += allocate(span, value, &buckets[idx], kind);
    })?;
    Ok(sums)
}

/// Per-bucket values in the graphic unit. The transform is applied once to
/// each bucket total, so the intercept is never accumulated per reading.
pub fn converted_bucket_values(
    readings: &[Reading],
    buckets: &[Span],
    conversion: &MeterConversion,
) -> Result<Vec<Option<f64>>, EngineError> {
    Ok(native_bucket_values(readings, buckets, conversion.kind)?
        .into_iter()
        .map(|v| v.map(|v| conversion.transform.apply(v)))
        .collect())
}

/// One point per reading touching `window`, clipped to it.
///
/// A reading cut by the window keeps the matching fraction of the intercept.
pub fn raw_line_points(
    readings: &[Reading],
    window: &Span,
    conversion: &MeterConversion,
) -> Result<Vec<LinePoint>, EngineError> {
    let mut ordered: Vec<&Reading> = readings.iter().collect();
    ordered.sort_by_key(|r| r.start_timestamp);

    let t = conversion.transform;
    let mut points = Vec::with_capacity(ordered.len());
    for reading in ordered {
        let span = Span::of_reading(reading)?;
        if !span.touches(window) {
            continue;
        }
        let clipped = span.intersect(window).unwrap_or(span);

        let (quantity, rate) = match conversion.kind {
            UnitKind::Raw => {
                let value = t.apply(reading.value);
                (value, value)
            }
            kind => {
                let native = allocate(&span, reading.value, window, kind);
                let quantity =
                    t.slope * native + t.intercept * covered_fraction(&span, window);
                let hours = clipped.hours();
                (quantity, if hours > 0.0 { quantity / hours } else { 0.0 })
            }
        };

        points.push(LinePoint {
            start_timestamp: clipped.start,
            end_timestamp: clipped.end,
            quantity,
            rate,
        });
    }
    Ok(points)
}

/// Line points on a fixed grid, skipping buckets without data.
pub fn bucketed_line_points(
    readings: &[Reading],
    grid: &[Span],
    conversion: &MeterConversion,
) -> Result<Vec<LinePoint>, EngineError> {
    let values = converted_bucket_values(readings, grid, conversion)?;
    Ok(line_points_from_values(grid, &values, conversion.kind.is_raw()))
}

pub(crate) fn line_points_from_values(
    grid: &[Span],
    values: &[Option<f64>],
    raw: bool,
) -> Vec<LinePoint> {
    grid.iter()
        .zip(values)
        .filter_map(|(bucket, value)| {
            let quantity = (*value)?;
            let rate = if raw {
                quantity
            } else {
                quantity / bucket.hours()
            };
            Some(LinePoint {
                start_timestamp: bucket.start,
                end_timestamp: bucket.end,
                quantity,
                rate,
            })
        })
        .collect()
}

pub(crate) fn bars_from_values(grid: &[Span], values: &[Option<f64>]) -> Vec<BarBucket> {
    grid.iter()
        .zip(values)
        .map(|(bucket, value)| BarBucket {
            start_timestamp: bucket.start,
            end_timestamp: bucket.end,
            value: value.unwrap_or(0.0),
        })
        .collect()
}

/// Fixed-width bars over `grid`; empty bars are zero.
pub fn bar_buckets(
    readings: &[Reading],
    grid: &[Span],
    conversion: &MeterConversion,
) -> Result<Vec<BarBucket>, EngineError> {
    conversion.require_summable()?;
    let values = converted_bucket_values(readings, grid, conversion)?;
    Ok(bars_from_values(grid, &values))
}

/// Converted total over `span`, zero when no reading touches it.
pub fn period_total(
    readings: &[Reading],
    span: &Span,
    conversion: &MeterConversion,
) -> Result<f64, EngineError> {
    conversion.require_summable()?;
    let values = converted_bucket_values(readings, std::slice::from_ref(span), conversion)?;
    Ok(values.first().copied().flatten().unwrap_or(0.0))
}

/// Resample one meter's readings into `graphic_unit`.
pub fn aggregate(
    meter: &Meter,
    readings: &[Reading],
    interval: &TimeInterval,
    cik: &Cik,
    graphic_unit: UnitId,
    mode: AggregationMode,
    config: &EngineConfig,
) -> Result<Series, EngineError> {
    let conversion = MeterConversion::resolve(cik, meter, graphic_unit)?;

    match mode {
        AggregationMode::Line => {
            let Some(window) = data_extent(readings).and_then(|e| interval.resolve(&e)) else {
                return Ok(Series::empty(mode));
            };
            let count = readings
                .iter()
                .filter(|r| Span::of_reading(r).is_ok_and(|s| s.touches(&window)))
                .count();
            let points = match LineResolution::choose(&window, count, config) {
                LineResolution::Raw => raw_line_points(readings, &window, &conversion)?,
                resolution => bucketed_line_points(readings, &resolution.grid(&window), &conversion)?,
            };
            tracing::debug!(meter_id = meter.id, points = points.len(), "meter line aggregated");
            Ok(Series::Line(points))
        }
        AggregationMode::Bar { width_days } => {
            if width_days == 0 {
                return Err(EngineError::InvalidBarWidth);
            }
            conversion.require_summable()?;
            let Some(extent) = data_extent(readings) else {
                return Ok(Series::empty(mode));
            };
            let grid = bar_grid(interval, &extent, width_days)?;
            let bars = bar_buckets(readings, &grid, &conversion)?;
            tracing::debug!(meter_id = meter.id, bars = bars.len(), width_days, "meter bars aggregated");
            Ok(Series::Bar(bars))
        }
    }
}
