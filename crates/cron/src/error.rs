//! Error types for job scheduling and run lifecycle.

use drover_core::error::FlowError;
use thiserror::Error;

/// Errors surfaced by the cron scheduler.
#[derive(Debug, Error)]
pub enum CronError {
    /// No job with the given id exists.
    #[error("cron job not found: {0}")]
    JobNotFound(String),

    /// A job with this id already exists.
    #[error("cron job already exists: {0}")]
    JobExists(String),

    /// Create-time validation failure (zero frequency, zero lifetime).
    #[error("cron job rejected: {0}")]
    BadJob(String),

    /// No run with the given id exists for the job.
    #[error("run not found: {run_id} (job {job_id})")]
    RunNotFound { job_id: String, run_id: String },

    /// Run admission lost the compare-and-set race: another caller started
    /// a run for this job first. A benign skip, never a double-launch.
    #[error("job {0} already has a run in flight")]
    RunInFlight(String),

    /// The run already reached a terminal state; the polled timeout may
    /// have beaten the completion signal.
    #[error("run {run_id} (job {job_id}) is already terminal")]
    RunAlreadyTerminal { job_id: String, run_id: String },

    /// A block-list name matches no known system job. Fatal at schedule
    /// time; nothing is scheduled when this is raised.
    #[error("unknown system job in block list: {0}")]
    UnknownSystemJob(String),

    /// Flow engine failure.
    #[error("flow engine error: {0}")]
    Flow(#[from] FlowError),
}

/// Result alias for cron operations.
pub type Result<T> = std::result::Result<T, CronError>;
