//! Job persistence with atomic run admission.
//!
//! The store is an injected seam like the foreman's; the in-memory
//! implementation uses `std::sync::RwLock` and is what the tests and the
//! worker run against. The two operations that matter for correctness are
//! [`begin_run`](CronStore::begin_run) (the compare-and-set that prevents
//! double-launching a job from concurrent ticks) and
//! [`finish_run`](CronStore::finish_run) (the exactly-once terminal
//! transition).

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::error::CronError;
use crate::model::{CronJob, CronRun, RunState};

/// Storage for cron jobs and their run history.
pub trait CronStore: Send + Sync {
    /// Insert a new job; fails with [`CronError::JobExists`] on an id clash.
    fn insert(&self, job: CronJob) -> Result<(), CronError>;
    fn get(&self, job_id: &str) -> Option<CronJob>;
    /// All jobs in creation order.
    fn list(&self) -> Vec<CronJob>;
    /// Flip the enabled flag; returns false when the job does not exist.
    /// Never touches a live run.
    fn set_enabled(&self, job_id: &str, enabled: bool) -> bool;
    /// Remove the job and its whole run history.
    fn remove(&self, job_id: &str) -> bool;

    /// Admit a new run atomically.
    ///
    /// In one step: the job must exist, its `last_run_started` must still
    /// equal `expected_last_start`, and unless the job allows overruns its
    /// current-run pointer must be clear. On success the run is recorded,
    /// the pointer set, and `last_run_started` moved to the run's start. A
    /// failed check is [`CronError::RunInFlight`] — a concurrent tick won.
    fn begin_run(
        &self,
        run: CronRun,
        expected_last_start: Option<DateTime<Utc>>,
    ) -> Result<(), CronError>;

    /// Transition a run to a terminal `state` exactly once.
    ///
    /// Updates the job's last-run status and counters (`Timeout` bumps the
    /// timeout counter, `Error` the failure counter) and clears the
    /// current-run pointer when it still references this run. Fails with
    /// [`CronError::RunAlreadyTerminal`] on a second transition.
    fn finish_run(
        &self,
        job_id: &str,
        run_id: &str,
        state: RunState,
        finished_at: DateTime<Utc>,
        message: Option<String>,
    ) -> Result<CronRun, CronError>;

    fn get_run(&self, job_id: &str, run_id: &str) -> Option<CronRun>;
    /// Run history for a job, newest first.
    fn runs(&self, job_id: &str) -> Vec<CronRun>;
}

// ── In-memory implementation ────────────────────────────────────────

struct JobEntry {
    job: CronJob,
    /// Runs in start order; history queries reverse this.
    runs: Vec<CronRun>,
}

/// Job storage backed by a job-id map, insertion order preserved
/// separately for listings.
#[derive(Default)]
pub struct MemoryCronStore {
    jobs: RwLock<HashMap<String, JobEntry>>,
    order: RwLock<Vec<String>>,
}

impl MemoryCronStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CronStore for MemoryCronStore {
    fn insert(&self, job: CronJob) -> Result<(), CronError> {
        let mut guard = self.jobs.write().expect("cron store lock poisoned");
        if guard.contains_key(&job.id) {
            return Err(CronError::JobExists(job.id));
        }
        let id = job.id.clone();
        guard.insert(id.clone(), JobEntry { job, runs: Vec::new() });
        self.order.write().expect("cron store lock poisoned").push(id);
        Ok(())
    }

    fn get(&self, job_id: &str) -> Option<CronJob> {
        self.jobs
            .read()
            .expect("cron store lock poisoned")
            .get(job_id)
            .map(|e| e.job.clone())
    }

    fn list(&self) -> Vec<CronJob> {
        let order = self.order.read().expect("cron store lock poisoned");
        let guard = self.jobs.read().expect("cron store lock poisoned");
        order
            .iter()
            .filter_map(|id| guard.get(id).map(|e| e.job.clone()))
            .collect()
    }

    fn set_enabled(&self, job_id: &str, enabled: bool) -> bool {
        let mut guard = self.jobs.write().expect("cron store lock poisoned");
        match guard.get_mut(job_id) {
            Some(entry) => {
                entry.job.enabled = enabled;
                true
            }
            None => false,
        }
    }

    fn remove(&self, job_id: &str) -> bool {
        let removed = self
            .jobs
            .write()
            .expect("cron store lock poisoned")
            .remove(job_id)
            .is_some();
        if removed {
            self.order
                .write()
                .expect("cron store lock poisoned")
                .retain(|id| id != job_id);
        }
        removed
    }

    fn begin_run(
        &self,
        run: CronRun,
        expected_last_start: Option<DateTime<Utc>>,
    ) -> Result<(), CronError> {
        let mut guard = self.jobs.write().expect("cron store lock poisoned");
        let entry = guard
            .get_mut(&run.job_id)
            .ok_or_else(|| CronError::JobNotFound(run.job_id.clone()))?;

        if entry.job.last_run_started != expected_last_start {
            return Err(CronError::RunInFlight(run.job_id));
        }
        if entry.job.current_run_id.is_some() && !entry.job.allow_overruns {
            return Err(CronError::RunInFlight(run.job_id));
        }

        entry.job.current_run_id = Some(run.run_id.clone());
        entry.job.last_run_started = Some(run.started_at);
        entry.job.last_run_status = Some(RunState::Running);
        entry.runs.push(run);
        Ok(())
    }

    fn finish_run(
        &self,
        job_id: &str,
        run_id: &str,
        state: RunState,
        finished_at: DateTime<Utc>,
        message: Option<String>,
    ) -> Result<CronRun, CronError> {
        let mut guard = self.jobs.write().expect("cron store lock poisoned");
        let entry = guard
            .get_mut(job_id)
            .ok_or_else(|| CronError::JobNotFound(job_id.to_string()))?;
        let run = entry
            .runs
            .iter_mut()
            .find(|r| r.run_id == run_id)
            .ok_or_else(|| CronError::RunNotFound {
                job_id: job_id.to_string(),
                run_id: run_id.to_string(),
            })?;

        if run.state.is_terminal() {
            return Err(CronError::RunAlreadyTerminal {
                job_id: job_id.to_string(),
                run_id: run_id.to_string(),
            });
        }

        run.state = state;
        run.finished_at = Some(finished_at);
        run.message = message;
        let finished = run.clone();

        entry.job.last_run_status = Some(state);
        match state {
            RunState::Timeout => entry.job.timeout_count += 1,
            RunState::Error => entry.job.failure_count += 1,
            _ => {}
        }
        if entry.job.current_run_id.as_deref() == Some(run_id) {
            entry.job.current_run_id = None;
        }
        Ok(finished)
    }

    fn get_run(&self, job_id: &str, run_id: &str) -> Option<CronRun> {
        self.jobs
            .read()
            .expect("cron store lock poisoned")
            .get(job_id)
            .and_then(|e| e.runs.iter().find(|r| r.run_id == run_id).cloned())
    }

    fn runs(&self, job_id: &str) -> Vec<CronRun> {
        self.jobs
            .read()
            .expect("cron store lock poisoned")
            .get(job_id)
            .map(|e| e.runs.iter().rev().cloned().collect())
            .unwrap_or_default()
    }
}

// ── Tests ───────────────────────────────────────────────────────────
