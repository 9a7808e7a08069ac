//! Group expansion and summation of member meters on a shared grid.

use std::collections::{HashMap, HashSet};

use readings_client::{Group, GroupId, Meter, MeterId, Reading, UnitId};
use tokio_util::sync::CancellationToken;

use super::{
    grid::{bar_grid, data_extent, LineResolution},
    meter::{
        bars_from_values, converted_bucket_values, line_points_from_values, period_total,
        AggregationMode, MeterConversion, Series,
    },
};
use crate::{
    cik::Cik,
    config::EngineConfig,
    error::EngineError,
    interval::{Span, TimeInterval},
};

/// Every meter reachable from `root`, each listed once, in depth-first order.
///
/// A group that contains itself through any chain of child groups is an error.
pub fn deep_meters(
    root: GroupId,
    groups: &HashMap<GroupId, Group>,
) -> Result<Vec<MeterId>, EngineError> {
    let mut meters = Vec::new();
    let mut seen_meters = HashSet::new();
    let mut finished = HashSet::new();
    // (group, index of the next child group to visit)
    let mut stack: Vec<(GroupId, usize)> = vec![(root, 0)];

    let root_group = groups.get(&root).ok_or(EngineError::UnknownGroup(root))?;
    push_meters(root_group, &mut meters, &mut seen_meters);

    while let Some((gid, next)) = stack.last().copied() {
        let group = groups.get(&gid).ok_or(EngineError::UnknownGroup(gid))?;
        let Some(&child) = group.child_groups.get(next) else {
            finished.insert(gid);
            stack.pop();
            continue;
        };
        if let Some(top) = stack.last_mut() {
            top.1 += 1;
        }

        if let Some(pos) = stack.iter().position(|(g, _)| *g == child) {
            let mut path: Vec<GroupId> = stack[pos..].iter().map(|(g, _)| *g).collect();
            path.push(child);
            return Err(EngineError::CyclicGroup {
                group_id: child,
                path,
            });
        }
        if finished.contains(&child) {
            continue;
        }

        let child_group = groups.get(&child).ok_or(EngineError::UnknownGroup(child))?;
        push_meters(child_group, &mut meters, &mut seen_meters);
        stack.push((child, 0));
    }

    Ok(meters)
}

fn push_meters(group: &Group, meters: &mut Vec<MeterId>, seen: &mut HashSet<MeterId>) {
    for &meter in &group.child_meters {
        if seen.insert(meter) {
            meters.push(meter);
        }
    }
}

/// Element-wise sum of per-child bucket values.
///
/// A bucket is `None` only when no child had data there.
pub fn sum_children(per_child: &[Vec<Option<f64>>], buckets: usize) -> Vec<Option<f64>> {
    let mut sums = vec![None; buckets];
    for values in per_child {
        for (sum, value) in sums.iter_mut().zip(values) {
            if let Some(v) = value {
                *sum.get_or_insert(0.0) += v;
            }
        }
    }
    sums
}

/// Everything needed to aggregate one group without touching the store.
#[derive(Debug, Default, Clone)]
pub struct GroupInputs {
    pub groups: HashMap<GroupId, Group>,
    pub meters: HashMap<MeterId, Meter>,
    pub readings: HashMap<MeterId, Vec<Reading>>,
}

pub(crate) struct Child<'a> {
    pub conversion: MeterConversion,
    pub readings: &'a [Reading],
}

pub(crate) fn resolve_children<'a>(
    group_id: GroupId,
    inputs: &'a GroupInputs,
    cik: &Cik,
    graphic_unit: UnitId,
) -> Result<Vec<Child<'a>>, EngineError> {
    deep_meters(group_id, &inputs.groups)?
        .into_iter()
        .map(|meter_id| {
            let meter = inputs
                .meters
                .get(&meter_id)
                .ok_or(EngineError::UnknownMeter(meter_id))?;
            let conversion = MeterConversion::resolve(cik, meter, graphic_unit)?;
            conversion.require_summable()?;
            Ok(Child {
                conversion,
                readings: inputs
                    .readings
                    .get(&meter_id)
                    .map(Vec::as_slice)
                    .unwrap_or_default(),
            })
        })
        .collect()
}

fn union_extent(children: &[Child<'_>]) -> Option<Span> {
    children
        .iter()
        .filter_map(|c| data_extent(c.readings))
        .reduce(|a, b| a.hull(&b))
}

fn summed_values(
    children: &[Child<'_>],
    grid: &[Span],
    cancel: &CancellationToken,
) -> Result<Vec<Option<f64>>, EngineError> {
    let mut per_child = Vec::with_capacity(children.len());
    for child in children {
        if cancel.is_cancelled() {
            tracing::warn!(meter_id = child.conversion.meter_id, "group aggregation cancelled");
            return Err(EngineError::Cancelled);
        }
        per_child.push(converted_bucket_values(child.readings, grid, &child.conversion)?);
    }
    Ok(sum_children(&per_child, grid.len()))
}

/// Sum of every deep member meter of `group_id`, converted to `graphic_unit`.
#[allow(clippy::too_many_arguments)]
pub fn aggregate_group(
    group_id: GroupId,
    inputs: &GroupInputs,
    interval: &TimeInterval,
    cik: &Cik,
    graphic_unit: UnitId,
    mode: AggregationMode,
    config: &EngineConfig,
    cancel: &CancellationToken,
) -> Result<Series, EngineError> {
    if let AggregationMode::Bar { width_days: 0 } = mode {
        return Err(EngineError::InvalidBarWidth);
    }
    let children = resolve_children(group_id, inputs, cik, graphic_unit)?;
    let Some(extent) = union_extent(&children) else {
        return Ok(Series::empty(mode));
    };

    let series = match mode {
        AggregationMode::Line => {
            let Some(window) = interval.resolve(&extent) else {
                return Ok(Series::empty(mode));
            };
            let grid = LineResolution::for_group(&window, config).grid(&window);
            let values = summed_values(&children, &grid, cancel)?;
            Series::Line(line_points_from_values(&grid, &values, false))
        }
        AggregationMode::Bar { width_days } => {
            let grid = bar_grid(interval, &extent, width_days)?;
            let values = summed_values(&children, &grid, cancel)?;
            Series::Bar(bars_from_values(&grid, &values))
        }
    };

    tracing::debug!(
        group_id,
        meters = children.len(),
        points = series.len(),
        "group aggregated"
    );
    Ok(series)
}

/// Converted total of every deep member meter over `span`.
pub fn group_period_total(
    group_id: GroupId,
    inputs: &GroupInputs,
    span: &Span,
    cik: &Cik,
    graphic_unit: UnitId,
    cancel: &CancellationToken,
) -> Result<f64, EngineError> {
    let mut total = 0.0;
    for child in resolve_children(group_id, inputs, cik, graphic_unit)? {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        total += period_total(child.readings, span, &child.conversion)?;
    }
    Ok(total)
}
