//! Background services.

pub mod stale_sweeper;

pub use stale_sweeper::StaleStatusSweeper;
