//! [`CronManager`] — decides on each tick which jobs are due, admits runs
//! through the store's compare-and-set, and retires runs that outlive
//! their job.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use drover_core::flow::FlowId;
use drover_core::traits::{FlowEngine, StatsRecorder};

use crate::error::{CronError, Result};
use crate::model::{CronJob, CronRun, NewJob, RunState};
use crate::store::CronStore;

/// Creator recorded on flows the scheduler starts.
const CRON_CREATOR: &str = "cron";

/// Stats series names.
pub const STAT_RUN_STARTED: &str = "cron.run.started";
pub const STAT_RUN_OK: &str = "cron.run.ok";
pub const STAT_RUN_FAILED: &str = "cron.run.failed";
pub const STAT_RUN_TIMED_OUT: &str = "cron.run.timed_out";
pub const STAT_RUN_DURATION: &str = "cron.run.duration";

/// A run admitted and launched during one tick.
#[derive(Debug, Clone)]
pub struct StartedRun {
    pub job_id: String,
    pub run_id: String,
    pub flow_id: FlowId,
}

/// A run force-terminated for exceeding its job's lifetime.
#[derive(Debug, Clone)]
pub struct TimedOutRun {
    pub job_id: String,
    pub run_id: String,
}

/// A job whose handling failed this tick. The tick itself never fails;
/// failures are reported per job and the pass continues.
#[derive(Debug, Clone)]
pub struct JobFailure {
    pub job_id: String,
    pub message: String,
}

/// What one scheduler tick did.
#[derive(Debug, Default)]
pub struct TickReport {
    pub started: Vec<StartedRun>,
    pub timed_out: Vec<TimedOutRun>,
    pub failures: Vec<JobFailure>,
}

/// How a run ended, signaled by whoever watched the flow execute.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    Success,
    Failure(String),
}

/// Owns job definitions and their run history.
///
/// [`run_once`](CronManager::run_once) is designed to be called repeatedly
/// and concurrently from a timer-driven control loop: run admission is a
/// store-level compare-and-set, so a lost race is a benign skip. Nothing
/// here blocks on flow execution; lifetime enforcement is polling-based
/// and happens on the next tick.
pub struct CronManager {
    store: Arc<dyn CronStore>,
    flows: Arc<dyn FlowEngine>,
    stats: Arc<dyn StatsRecorder>,
    default_lifetime: Duration,
}

impl CronManager {
    pub fn new(
        store: Arc<dyn CronStore>,
        flows: Arc<dyn FlowEngine>,
        stats: Arc<dyn StatsRecorder>,
        default_lifetime: Duration,
    ) -> Self {
        Self {
            store,
            flows,
            stats,
            default_lifetime,
        }
    }

    // ── Job management ──────────────────────────────────────────────

    /// Validate and store a new job. New jobs start enabled.
    pub fn create_job(&self, new: NewJob) -> Result<CronJob> {
        self.create_job_at(new, Utc::now())
    }

    /// [`create_job`](CronManager::create_job) at a fixed creation instant.
    pub fn create_job_at(&self, new: NewJob, now: DateTime<Utc>) -> Result<CronJob> {
        if new.frequency.is_zero() {
            return Err(CronError::BadJob("frequency must be non-zero".to_string()));
        }
        let lifetime = new.lifetime.unwrap_or(self.default_lifetime);
        if lifetime.is_zero() {
            return Err(CronError::BadJob("lifetime must be non-zero".to_string()));
        }

        let job = CronJob {
            id: new.name.unwrap_or_else(|| Uuid::new_v4().to_string()),
            agent_id: new.agent_id,
            flow: new.flow,
            frequency: new.frequency,
            lifetime,
            allow_overruns: new.allow_overruns,
            enabled: true,
            start_time: new.start_time.unwrap_or(now),
            created_at: now,
            current_run_id: None,
            last_run_started: None,
            last_run_status: None,
            timeout_count: 0,
            failure_count: 0,
            system: new.system,
        };
        self.store.insert(job.clone())?;
        info!(
            job_id = %job.id,
            flow = %job.flow.name,
            frequency_secs = job.frequency.as_secs(),
            system = job.system,
            "created cron job"
        );
        Ok(job)
    }

    pub fn read_job(&self, job_id: &str) -> Result<CronJob> {
        self.store
            .get(job_id)
            .ok_or_else(|| CronError::JobNotFound(job_id.to_string()))
    }

    /// Run history for a job, newest first.
    pub fn read_job_runs(&self, job_id: &str) -> Result<Vec<CronRun>> {
        // Distinguish "no runs yet" from "no such job".
        self.read_job(job_id)?;
        Ok(self.store.runs(job_id))
    }

    pub fn list_jobs(&self) -> Vec<CronJob> {
        self.store.list()
    }

    /// Enable a job. Does not touch any live run.
    pub fn enable_job(&self, job_id: &str) -> Result<()> {
        self.set_enabled(job_id, true)
    }

    /// Disable a job. An already-live run keeps running; only future
    /// admissions stop.
    pub fn disable_job(&self, job_id: &str) -> Result<()> {
        self.set_enabled(job_id, false)
    }

    fn set_enabled(&self, job_id: &str, enabled: bool) -> Result<()> {
        if self.store.set_enabled(job_id, enabled) {
            info!(job_id = %job_id, enabled, "cron job toggled");
            Ok(())
        } else {
            Err(CronError::JobNotFound(job_id.to_string()))
        }
    }

    /// Remove a job and its run history.
    pub fn delete_job(&self, job_id: &str) -> Result<()> {
        if self.store.remove(job_id) {
            info!(job_id = %job_id, "deleted cron job");
            Ok(())
        } else {
            Err(CronError::JobNotFound(job_id.to_string()))
        }
    }

    // ── Tick ────────────────────────────────────────────────────────

    /// One scheduler pass over every job. Per-job failures land in the
    /// report; the pass itself never fails and never skips later jobs
    /// because an earlier one misbehaved.
    pub async fn run_once(&self) -> TickReport {
        self.run_once_at(Utc::now()).await
    }

    /// [`run_once`](CronManager::run_once) at a fixed instant, for
    /// deterministic tests.
    pub async fn run_once_at(&self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();
        for job in self.store.list() {
            self.tick_job(&job, now, &mut report).await;
        }
        report
    }

    async fn tick_job(&self, job: &CronJob, now: DateTime<Utc>, report: &mut TickReport) {
        if !job.enabled || now < job.start_time {
            return;
        }

        // Lifetime enforcement first, over every live run: with overruns
        // allowed, a superseded run no longer holds the current-run
        // pointer but is still live and still bound by its lifetime. A
        // job that had a live run at the start of its handling never
        // starts another this cycle unless overruns are allowed, even
        // when that run was just timed out.
        let mut had_live = false;
        for run in self.store.runs(&job.id) {
            if !run.is_live() {
                continue;
            }
            had_live = true;
            if run.age_at(now) > job.lifetime {
                self.time_out_run(job, &run.run_id, now, report);
            }
        }
        if had_live && !job.allow_overruns {
            return;
        }

        if !job.is_due_at(now) {
            return;
        }
        self.start_run(job, now, report).await;
    }

    fn time_out_run(
        &self,
        job: &CronJob,
        run_id: &str,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) {
        match self
            .store
            .finish_run(&job.id, run_id, RunState::Timeout, now, None)
        {
            Ok(finished) => {
                warn!(
                    job_id = %job.id,
                    run_id = %run_id,
                    lifetime_secs = job.lifetime.as_secs(),
                    "run exceeded its lifetime, forced to timeout"
                );
                self.stats.increment_counter(STAT_RUN_TIMED_OUT, 1);
                self.record_run_latency(&finished);
                report.timed_out.push(TimedOutRun {
                    job_id: job.id.clone(),
                    run_id: run_id.to_string(),
                });
            }
            // A completion signal got there first; its terminal state wins.
            Err(e) => debug!(job_id = %job.id, run_id = %run_id, error = %e, "timeout lost race"),
        }
    }

    async fn start_run(&self, job: &CronJob, now: DateTime<Utc>, report: &mut TickReport) {
        let run = CronRun {
            run_id: Uuid::new_v4().to_string(),
            job_id: job.id.clone(),
            started_at: now,
            state: RunState::Running,
            finished_at: None,
            message: None,
        };
        let run_id = run.run_id.clone();

        match self.store.begin_run(run, job.last_run_started) {
            Ok(()) => {}
            Err(CronError::RunInFlight(_)) => {
                // A concurrent tick admitted a run between our read and
                // this write. Its run stands; ours never launches.
                debug!(job_id = %job.id, "lost run admission race, skipping");
                return;
            }
            Err(e) => {
                warn!(job_id = %job.id, error = %e, "run admission failed");
                report.failures.push(JobFailure {
                    job_id: job.id.clone(),
                    message: e.to_string(),
                });
                return;
            }
        }
        self.stats.increment_counter(STAT_RUN_STARTED, 1);

        match self
            .flows
            .start_flow(&job.agent_id, &job.flow, CRON_CREATOR)
            .await
        {
            Ok(flow_id) => {
                info!(
                    job_id = %job.id,
                    run_id = %run_id,
                    flow = %job.flow.name,
                    flow_id = %flow_id,
                    "cron job launched run"
                );
                report.started.push(StartedRun {
                    job_id: job.id.clone(),
                    run_id,
                    flow_id,
                });
            }
            Err(e) => {
                // The run was admitted but its flow never started; it
                // terminates immediately as an error.
                warn!(job_id = %job.id, run_id = %run_id, error = %e, "flow launch failed");
                if let Ok(finished) = self.store.finish_run(
                    &job.id,
                    &run_id,
                    RunState::Error,
                    now,
                    Some(e.to_string()),
                ) {
                    self.stats.increment_counter(STAT_RUN_FAILED, 1);
                    self.record_run_latency(&finished);
                }
                report.failures.push(JobFailure {
                    job_id: job.id.clone(),
                    message: e.to_string(),
                });
            }
        }
    }

    // ── Completion ──────────────────────────────────────────────────

    /// External completion signal for a run.
    pub fn complete_run(&self, job_id: &str, run_id: &str, outcome: RunOutcome) -> Result<CronRun> {
        self.complete_run_at(job_id, run_id, outcome, Utc::now())
    }

    /// [`complete_run`](CronManager::complete_run) at a fixed instant.
    ///
    /// Fails with [`CronError::RunAlreadyTerminal`] when the polled
    /// timeout won the race; callers may ignore that outcome.
    pub fn complete_run_at(
        &self,
        job_id: &str,
        run_id: &str,
        outcome: RunOutcome,
        now: DateTime<Utc>,
    ) -> Result<CronRun> {
        let (state, message) = match outcome {
            RunOutcome::Success => (RunState::Ok, None),
            RunOutcome::Failure(m) => (RunState::Error, Some(m)),
        };
        let finished = self.store.finish_run(job_id, run_id, state, now, message)?;

        match state {
            RunState::Ok => {
                self.stats.increment_counter(STAT_RUN_OK, 1);
                info!(job_id = %job_id, run_id = %run_id, "run completed");
            }
            _ => {
                self.stats.increment_counter(STAT_RUN_FAILED, 1);
                warn!(
                    job_id = %job_id,
                    run_id = %run_id,
                    message = finished.message.as_deref().unwrap_or(""),
                    "run failed"
                );
            }
        }
        self.record_run_latency(&finished);
        Ok(finished)
    }

    fn record_run_latency(&self, run: &CronRun) {
        if let Some(done) = run.finished_at {
            let elapsed = done
                .signed_duration_since(run.started_at)
                .to_std()
                .unwrap_or_default();
            self.stats.record_latency(STAT_RUN_DURATION, elapsed);
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────
