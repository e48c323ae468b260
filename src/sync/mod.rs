//! Keeps the displayed day's prayer times served and fresh.

mod controller;
mod error;
mod schedule_builder;
mod single_flight;

pub use controller::{DisplayedDay, SyncController, SyncPolicy, SyncState, TodayView};
pub use error::SyncError;
pub use schedule_builder::build_schedule;
pub use single_flight::SingleFlight;
