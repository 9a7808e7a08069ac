use std::{fmt, str::FromStr};

pub type UnitId = i32;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind} value '{value}'")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

/// Role a unit plays in the conversion graph.
///
/// `Meter` units are the native units of raw readings and are never offered
/// for display; `Suffix` units are generated from a unit carrying a suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, sqlx::Type)]
#[sqlx(type_name = "unit_type", rename_all = "lowercase")]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum UnitType {
    Unit,
    Meter,
    Suffix,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, sqlx::Type)]
#[sqlx(type_name = "unit_represent_type", rename_all = "lowercase")]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum UnitRepresent {
    Quantity,
    Flow,
    Raw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, sqlx::Type)]
#[sqlx(type_name = "displayable_type", rename_all = "lowercase")]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Displayable {
    None,
    All,
    Admin,
}

macro_rules! lowercase_enum_text {
    ($ty:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    _ => Err(ParseEnumError {
                        kind: $kind,
                        value: s.to_string(),
                    }),
                }
            }
        }
    };
}

lowercase_enum_text!(UnitType, "unit type", { Unit => "unit", Meter => "meter", Suffix => "suffix" });
lowercase_enum_text!(UnitRepresent, "unit representation", { Quantity => "quantity", Flow => "flow", Raw => "raw" });
lowercase_enum_text!(Displayable, "displayable type", { None => "none", All => "all", Admin => "admin" });

#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Unit {
    pub id: UnitId,
    pub name: String,
    pub identifier: String,
    pub unit_represent: UnitRepresent,
    /// Seconds in the rate base of a flow unit (3600 for per-hour units).
    pub sec_in_rate: i32,
    pub type_of_unit: UnitType,
    pub suffix: String,
    pub displayable: Displayable,
    pub preferred_display: bool,
    pub note: Option<String>,
}

impl Unit {
    pub fn has_suffix(&self) -> bool {
        !self.suffix.trim().is_empty()
    }
}

/// A declared linear relationship: `destination = slope * source + intercept`.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Conversion {
    pub source_id: UnitId,
    pub destination_id: UnitId,
    pub bidirectional: bool,
    pub slope: f64,
    pub intercept: f64,
    pub note: Option<String>,
}
