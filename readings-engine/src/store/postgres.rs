use readings_client::{db, Conversion, Group, GroupId, Meter, MeterId, Reading, Unit};
use sqlx::PgPool;

use super::ReadingStore;
use crate::{error::EngineError, interval::TimeInterval};

/// `ReadingStore` over the dashboard's Postgres schema.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn store_error(e: anyhow::Error) -> EngineError {
    metrics::counter!("store_query_errors_total").increment(1);
    EngineError::Store(format!("{e:#}"))
}

#[async_trait::async_trait]
impl ReadingStore for PgStore {
    async fn list_units(&self) -> Result<Vec<Unit>, EngineError> {
        db::list_units(&self.pool).await.map_err(store_error)
    }

    async fn list_conversions(&self) -> Result<Vec<Conversion>, EngineError> {
        db::list_conversions(&self.pool).await.map_err(store_error)
    }

    async fn get_meter(&self, meter_id: MeterId) -> Result<Meter, EngineError> {
        db::get_meter(&self.pool, meter_id)
            .await
            .map_err(store_error)?
            .ok_or(EngineError::UnknownMeter(meter_id))
    }

    async fn get_group(&self, group_id: GroupId) -> Result<Group, EngineError> {
        db::get_group(&self.pool, group_id)
            .await
            .map_err(store_error)?
            .ok_or(EngineError::UnknownGroup(group_id))
    }

    async fn get_readings(
        &self,
        meter_id: MeterId,
        interval: &TimeInterval,
    ) -> Result<Vec<Reading>, EngineError> {
        db::load_readings(&self.pool, meter_id, interval.start(), interval.end())
            .await
            .map_err(store_error)
    }
}
