//! Current-versus-prior period totals.

use readings_client::{GroupId, Meter, Reading, UnitId};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::{
    aggregate::{group_period_total, period_total, GroupInputs, MeterConversion},
    cik::Cik,
    error::EngineError,
    interval::{Span, TimeInterval, Timestamp},
    shift::CalendarShift,
};

/// The current period and the same period moved back by a calendar shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ComparePeriods {
    pub current: Span,
    pub prior: Span,
}

impl ComparePeriods {
    pub fn new(
        curr_start: Timestamp,
        curr_end: Timestamp,
        shift: &CalendarShift,
    ) -> Result<Self, EngineError> {
        if curr_end <= curr_start {
            return Err(EngineError::InvalidInterval(format!(
                "compare period {curr_start} to {curr_end} is empty or inverted"
            )));
        }
        let current = Span::new(curr_start, curr_end)?;
        let prior = shift.shift_span_back(&current)?;
        Ok(Self { current, prior })
    }

    /// Smallest interval holding both periods, for fetching readings once.
    pub fn fetch_interval(&self) -> Result<TimeInterval, EngineError> {
        let hull = self.current.hull(&self.prior);
        TimeInterval::bounded(hull.start, hull.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CompareTotals {
    pub curr_use: f64,
    pub prev_use: f64,
}

impl CompareTotals {
    /// Relative change from the prior period, `None` when the prior total is zero.
    pub fn percent_change(&self) -> Option<f64> {
        (self.prev_use != 0.0).then(|| (self.curr_use - self.prev_use) / self.prev_use * 100.0)
    }
}

pub fn compare_meter(
    meter: &Meter,
    readings: &[Reading],
    periods: &ComparePeriods,
    cik: &Cik,
    graphic_unit: UnitId,
) -> Result<CompareTotals, EngineError> {
    let conversion = MeterConversion::resolve(cik, meter, graphic_unit)?;
    Ok(CompareTotals {
        curr_use: period_total(readings, &periods.current, &conversion)?,
        prev_use: period_total(readings, &periods.prior, &conversion)?,
    })
}

pub fn compare_group(
    group_id: GroupId,
    inputs: &GroupInputs,
    periods: &ComparePeriods,
    cik: &Cik,
    graphic_unit: UnitId,
    cancel: &CancellationToken,
) -> Result<CompareTotals, EngineError> {
    Ok(CompareTotals {
        curr_use: group_period_total(group_id, inputs, &periods.current, cik, graphic_unit, cancel)?,
        prev_use: group_period_total(group_id, inputs, &periods.prior, cik, graphic_unit, cancel)?,
    })
}
