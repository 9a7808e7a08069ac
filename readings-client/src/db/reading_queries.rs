use anyhow::Result;
use sqlx::PgPool;
use time::PrimitiveDateTime;

use crate::domain::{MeterId, Reading};

/// Fetch a time-ordered reading series for a single meter.
///
/// Readings are returned when their span overlaps `[start, end)`; a `None`
/// bound leaves that side open.
pub async fn load_readings(
    pool: &PgPool,
    meter_id: MeterId,
    start: Option<PrimitiveDateTime>,
    end: Option<PrimitiveDateTime>,
) -> Result<Vec<Reading>> {
    let rows = sqlx::query_as::<_, Reading>(
        r#"
        SELECT
            meter_id,
            reading,
            start_timestamp,
            end_timestamp
        FROM readings
        WHERE meter_id = $1
          AND ($2::TIMESTAMP IS NULL OR end_timestamp >  $2)
          AND ($3::TIMESTAMP IS NULL OR start_timestamp < $3)
        ORDER BY start_timestamp
        "#,
    )
    .bind(meter_id)
    .bind(start)
    .bind(end)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
