//! Periodic-job scheduling for the drover control plane.
//!
//! This crate provides:
//! - The [`CronJob`](model::CronJob)/[`CronRun`](model::CronRun) model:
//!   fixed-period jobs with lifetimes, overrun policy, and per-run state
//! - The `CronStore` seam with an in-memory implementation whose run
//!   admission is an atomic compare-and-set
//! - The [`CronManager`](manager::CronManager), driven by an external
//!   control loop calling `run_once` on a fixed tick
//! - System-job registration with start-time jitter and a validated
//!   block list

pub mod error;
pub mod manager;
pub mod model;
pub mod store;
pub mod system;

pub use error::CronError;
pub use manager::{CronManager, RunOutcome, TickReport};
pub use model::{CronJob, CronRun, JobState, NewJob, RunState, FLEET_AGENT};
pub use store::{CronStore, MemoryCronStore};
pub use system::{builtin_system_jobs, jittered_start, schedule_system_jobs, SystemJobDef};
