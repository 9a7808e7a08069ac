//! Unit conversion and reading aggregation for meter dashboards.

pub mod aggregate;
pub mod allocate;
pub mod cik;
pub mod compare;
pub mod config;
pub mod engine;
pub mod error;
pub mod interval;
pub mod metrics_server;
pub mod observability;
pub mod shift;
pub mod store;

pub use cik::{AffineTransform, Cik, CikEntry, Role};
pub use compare::{CompareTotals, ComparePeriods};
pub use engine::{CompareTarget, Engine};
pub use error::EngineError;
pub use interval::{Span, TimeInterval, Timestamp};
pub use shift::CalendarShift;
pub use store::{MemoryStore, PgStore, ReadingStore};
