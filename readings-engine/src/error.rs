use readings_client::{GroupId, MeterId, UnitId};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("unit {source_unit} has no conversion path to unit {target_unit}")]
    IncompatibleUnit { source_unit: UnitId, target_unit: UnitId },
    #[error(
        "conversion graph is inconsistent from unit {source_unit} to unit {target_unit}: \
         one path gives slope {first_slope} intercept {first_intercept}, \
         another gives slope {second_slope} intercept {second_intercept}"
    )]
    InconsistentConversionGraph {
        source_unit: UnitId,
        target_unit: UnitId,
        first_slope: f64,
        first_intercept: f64,
        second_slope: f64,
        second_intercept: f64,
    },
    #[error("invalid conversion from unit {source_unit} to unit {destination_unit}: {reason}")]
    InvalidConversion {
        source_unit: UnitId,
        destination_unit: UnitId,
        reason: String,
    },
    #[error("invalid unit {unit}: {reason}")]
    InvalidUnit { unit: UnitId, reason: String },
    #[error("group {group_id} is part of a cycle: {path:?}")]
    CyclicGroup { group_id: GroupId, path: Vec<GroupId> },
    #[error("invalid time interval: {0}")]
    InvalidInterval(String),
    #[error("invalid duration: {0}")]
    InvalidDuration(String),
    #[error("bar width must be a positive number of days")]
    InvalidBarWidth,
    #[error("unit {unit} represents raw values which cannot be summed")]
    RawNotAggregatable { unit: UnitId },
    #[error("unknown unit {0}")]
    UnknownUnit(UnitId),
    #[error("unknown meter {0}")]
    UnknownMeter(MeterId),
    #[error("unknown group {0}")]
    UnknownGroup(GroupId),
    #[error("aggregation cancelled")]
    Cancelled,
    #[error("store error: {0}")]
    Store(String),
}

impl EngineError {
    /// Errors caused by the request itself rather than by stored admin data or I/O.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::IncompatibleUnit { .. }
                | Self::InvalidInterval(_)
                | Self::InvalidDuration(_)
                | Self::InvalidBarWidth
                | Self::RawNotAggregatable { .. }
                | Self::UnknownUnit(_)
                | Self::UnknownMeter(_)
                | Self::UnknownGroup(_)
        )
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::IncompatibleUnit { .. } => "incompatible_unit",
            Self::InconsistentConversionGraph { .. } => "inconsistent_conversion_graph",
            Self::InvalidConversion { .. } => "invalid_conversion",
            Self::InvalidUnit { .. } => "invalid_unit",
            Self::CyclicGroup { .. } => "cyclic_group",
            Self::InvalidInterval(_) => "invalid_interval",
            Self::InvalidDuration(_) => "invalid_duration",
            Self::InvalidBarWidth => "invalid_bar_width",
            Self::RawNotAggregatable { .. } => "raw_not_aggregatable",
            Self::UnknownUnit(_) => "unknown_unit",
            Self::UnknownMeter(_) => "unknown_meter",
            Self::UnknownGroup(_) => "unknown_group",
            Self::Cancelled => "cancelled",
            Self::Store(_) => "store",
        }
    }
}
