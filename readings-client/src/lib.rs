pub mod db;
pub mod domain;

pub use domain::{
    Conversion, Displayable, Group, GroupId, Meter, MeterId, Reading, Unit, UnitId, UnitRepresent,
    UnitType,
};
