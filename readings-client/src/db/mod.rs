pub mod meter_queries;
pub mod reading_queries;
pub mod unit_queries;

pub use meter_queries::{get_group, get_meter};
pub use reading_queries::load_readings;
pub use unit_queries::{list_conversions, list_units};
