use time::PrimitiveDateTime;

use super::MeterId;

/// One raw reading covering the half-open span `[start_timestamp, end_timestamp)`.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Reading {
    pub meter_id: MeterId,
    #[sqlx(rename = "reading")]
    pub value: f64,
    pub start_timestamp: PrimitiveDateTime,
    pub end_timestamp: PrimitiveDateTime,
}
