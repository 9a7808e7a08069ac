//! Allocation of a reading's value to an arbitrary bucket.

use readings_client::{Unit, UnitRepresent};

use crate::{error::EngineError, interval::Span};

/// How a unit's reading values relate to elapsed time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnitKind {
    /// Value is a total accumulated over the reading's span.
    Quantity,
    /// Value is a rate per `sec_in_rate` seconds.
    Flow { sec_in_rate: f64 },
    /// Value is an instantaneous level (temperature, ...).
    Raw,
}

impl UnitKind {
    pub fn of(unit: &Unit) -> Result<Self, EngineError> {
        match unit.unit_represent {
            UnitRepresent::Quantity => Ok(Self::Quantity),
            UnitRepresent::Raw => Ok(Self::Raw),
            UnitRepresent::Flow if unit.sec_in_rate > 0 => Ok(Self::Flow {
                sec_in_rate: f64::from(unit.sec_in_rate),
            }),
            UnitRepresent::Flow => Err(EngineError::InvalidUnit {
                unit: unit.id,
                reason: format!("flow unit has non-positive sec_in_rate {}", unit.sec_in_rate),
            }),
        }
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, Self::Raw)
    }
}

/// Contribution of one reading to `bucket`, in the reading's native unit.
///
/// - Quantity: the share of `value` proportional to the overlap.
/// - Flow: `value * overlap / sec_in_rate`, independent of the reading length.
/// - Raw: the time integral `value * overlap` (value-seconds); callers divide
///   by the covered seconds to get a mean.
///
/// A zero-length reading is a point sample: a quantity contributes fully to
/// the bucket containing it, while flow and raw readings contribute nothing.
pub fn allocate(reading: &Span, value: f64, bucket: &Span, kind: UnitKind) -> f64 {
    if reading.is_point() {
        return match kind {
            UnitKind::Quantity if bucket.contains(reading.start) => value,
            _ => 0.0,
        };
    }

    let overlap = reading.overlap_seconds(bucket);
    if overlap == 0.0 {
        return 0.0;
    }

    match kind {
        UnitKind::Quantity => value * overlap / reading.seconds(),
        UnitKind::Flow { sec_in_rate } => value * overlap / sec_in_rate,
        UnitKind::Raw => value * overlap,
    }
}

/// Fraction of the reading's span that falls inside `bucket`.
pub fn covered_fraction(reading: &Span, bucket: &Span) -> f64 {
    if reading.is_point() {
        return if bucket.contains(reading.start) { 1.0 } else { 0.0 };
    }
    reading.overlap_seconds(bucket) / reading.seconds()
}
