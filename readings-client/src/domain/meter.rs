use time::Duration;

use super::UnitId;

pub type MeterId = i32;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Meter {
    pub id: MeterId,
    pub name: String,
    /// Native unit of the meter's raw readings.
    pub unit_id: UnitId,
    pub default_graphic_unit: Option<UnitId>,
    /// Nominal sampling interval; individual readings may still vary.
    pub reading_frequency: Duration,
    pub displayable: bool,
}
