// Common types and utilities shared across the application

pub mod entity_ids;
pub mod id;
pub mod time;

pub use entity_ids::*;
pub use id::{Id, V4, V7};
pub use time::calendar_day_key;
