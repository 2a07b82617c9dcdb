//! Scheduled maintenance for Keygate.
//!
//! This crate provides:
//! - The retention sweeper that expires stale sessions and purges
//!   records past their retention windows
//! - A cron scheduler that runs the sweeper on a fixed schedule

pub mod scheduler;
pub mod sweeper;

pub use scheduler::SweepScheduler;
pub use sweeper::{RetentionSweeper, SweepReport};
