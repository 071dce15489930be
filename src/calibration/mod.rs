//! Speaker offsets and level calibration

pub mod engine;
pub mod level;
pub mod store;

pub use engine::{CalibrationEngine, ReferenceChannel};
pub use level::{level_for_target, offset_from_reading, CalibrationSession};
pub use store::{create_shared_store, OffsetStore, SharedOffsetStore, Speaker};
