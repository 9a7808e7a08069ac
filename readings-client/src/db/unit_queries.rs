use anyhow::Result;
use sqlx::PgPool;

use crate::domain::{Conversion, Unit};

/// Fetch every declared unit, ordered by id.
pub async fn list_units(pool: &PgPool) -> Result<Vec<Unit>> {
    let rows = sqlx::query_as::<_, Unit>(
        r#"
        SELECT
            id,
            name,
            identifier,
            unit_represent,
            sec_in_rate,
            type_of_unit,
            suffix,
            displayable,
            preferred_display,
            note
        FROM units
        ORDER BY id
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Fetch every declared conversion.
pub async fn list_conversions(pool: &PgPool) -> Result<Vec<Conversion>> {
    let rows = sqlx::query_as::<_, Conversion>(
        r#"
        SELECT
            source_id,
            destination_id,
            bidirectional,
            slope,
            intercept,
            note
        FROM conversions
        ORDER BY source_id, destination_id
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
