use anyhow::Result;
use sqlx::PgPool;
use time::Duration;

use crate::domain::{Group, GroupId, Meter, MeterId, UnitId};

#[derive(Debug, Clone, sqlx::FromRow)]
struct MeterRow {
    id: MeterId,
    name: String,
    unit_id: UnitId,
    default_graphic_unit: Option<UnitId>,
    reading_frequency_secs: i64,
    displayable: bool,
}

impl From<MeterRow> for Meter {
    fn from(row: MeterRow) -> Self {
        Meter {
            id: row.id,
            name: row.name,
            unit_id: row.unit_id,
            default_graphic_unit: row.default_graphic_unit,
            reading_frequency: Duration::seconds(row.reading_frequency_secs),
            displayable: row.displayable,
        }
    }
}

// The dashboard stores "no default graphic unit" as -99 rather than NULL.
const METER_COLUMNS: &str = r#"
    id,
    name,
    unit_id,
    NULLIF(default_graphic_unit, -99) AS default_graphic_unit,
    EXTRACT(EPOCH FROM reading_frequency)::BIGINT AS reading_frequency_secs,
    displayable
"#;

pub async fn get_meter(pool: &PgPool, meter_id: MeterId) -> Result<Option<Meter>> {
    let sql = format!("SELECT {METER_COLUMNS} FROM meters WHERE id = $1");
    let row = sqlx::query_as::<_, MeterRow>(&sql)
        .bind(meter_id)
        .fetch_optional(pool)
        .await?;

    Ok(row.map(Meter::from))
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct GroupRow {
    id: GroupId,
    name: String,
    default_graphic_unit: Option<UnitId>,
    displayable: bool,
}

/// Fetch a group together with its immediate child meters and child groups.
pub async fn get_group(pool: &PgPool, group_id: GroupId) -> Result<Option<Group>> {
    let row = sqlx::query_as::<_, GroupRow>(
        r#"
        SELECT
            id,
            name,
            NULLIF(default_graphic_unit, -99) AS default_graphic_unit,
            displayable
        FROM groups
        WHERE id = $1
        "#,
    )
    .bind(group_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let child_meters: Vec<MeterId> = sqlx::query_scalar(
        "SELECT meter_id FROM groups_immediate_meters WHERE group_id = $1 ORDER BY meter_id",
    )
    .bind(group_id)
    .fetch_all(pool)
    .await?;

    let child_groups: Vec<GroupId> = sqlx::query_scalar(
        "SELECT child_id FROM groups_immediate_children WHERE parent_id = $1 ORDER BY child_id",
    )
    .bind(group_id)
    .fetch_all(pool)
    .await?;

    Ok(Some(Group {
        id: row.id,
        name: row.name,
        default_graphic_unit: row.default_graphic_unit,
        child_meters,
        child_groups,
        displayable: row.displayable,
    }))
}
