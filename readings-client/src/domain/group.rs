use super::{MeterId, UnitId};

pub type GroupId = i32;

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub default_graphic_unit: Option<UnitId>,
    pub child_meters: Vec<MeterId>,
    pub child_groups: Vec<GroupId>,
    pub displayable: bool,
}
