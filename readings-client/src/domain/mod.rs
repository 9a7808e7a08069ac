mod group;
mod meter;
mod reading;
mod unit;

pub use group::{Group, GroupId};
pub use meter::{Meter, MeterId};
pub use reading::Reading;
pub use unit::{Conversion, Displayable, ParseEnumError, Unit, UnitId, UnitRepresent, UnitType};
