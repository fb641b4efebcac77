//! Background jobs
//!
//! The daily analytics run can be driven by an external cron calling the
//! `daily-stats` binary, or by the in-process scheduler here.

pub mod scheduler;

pub use scheduler::Scheduler;
