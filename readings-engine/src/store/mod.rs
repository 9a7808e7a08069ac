//! Persistence collaborator seam.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use readings_client::{Conversion, Group, GroupId, Meter, MeterId, Reading, Unit};

use crate::{error::EngineError, interval::TimeInterval};

/// Read-only access to units, conversions, meters, groups and readings.
///
/// Missing meters and groups are reported as `UnknownMeter` / `UnknownGroup`.
#[async_trait::async_trait]
pub trait ReadingStore: Send + Sync {
    async fn list_units(&self) -> Result<Vec<Unit>, EngineError>;

    async fn list_conversions(&self) -> Result<Vec<Conversion>, EngineError>;

    async fn get_meter(&self, meter_id: MeterId) -> Result<Meter, EngineError>;

    async fn get_group(&self, group_id: GroupId) -> Result<Group, EngineError>;

    /// Readings of `meter_id` overlapping `interval`, ordered by start.
    async fn get_readings(
        &self,
        meter_id: MeterId,
        interval: &TimeInterval,
    ) -> Result<Vec<Reading>, EngineError>;
}
