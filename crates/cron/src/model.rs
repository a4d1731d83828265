//! Cron job and run types.

use std::time::Duration;

use chrono::{DateTime, Utc};
use drover_core::flow::FlowSpec;
use serde::{Deserialize, Serialize};

/// Reserved agent id for fleet-wide maintenance flows. The flow engine is
/// expected to fan these out rather than target a single endpoint.
pub const FLEET_AGENT: &str = "fleet";

/// Lifecycle state of one run. Everything but `Running` is terminal, and a
/// run moves to a terminal state exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    Ok,
    Error,
    Timeout,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunState::Running)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RunState::Running => "running",
            RunState::Ok => "ok",
            RunState::Error => "error",
            RunState::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// One execution of a cron job. Created on dispatch, finished exactly once
/// by completion, failure, or timeout detection; never reused.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronRun {
    pub run_id: String,
    pub job_id: String,
    pub started_at: DateTime<Utc>,
    pub state: RunState,
    pub finished_at: Option<DateTime<Utc>>,
    /// Failure detail for `Error` runs.
    pub message: Option<String>,
}

impl CronRun {
    pub fn is_live(&self) -> bool {
        !self.state.is_terminal()
    }

    /// Wall-clock age at `now`, zero when `now` precedes the start.
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.started_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

/// A periodically scheduled flow definition.
///
/// Mutated only through the [`CronManager`](crate::manager::CronManager)
/// and its [`CronStore`](crate::store::CronStore): the enabled flag, run
/// bookkeeping, and the counters move; everything else is fixed at
/// creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronJob {
    pub id: String,
    /// Agent the job's flow targets; [`FLEET_AGENT`] for fleet-wide work.
    pub agent_id: String,
    pub flow: FlowSpec,
    /// Minimum interval between run starts.
    pub frequency: Duration,
    /// Age past which a live run is force-terminated as a timeout.
    pub lifetime: Duration,
    /// Whether a new run may start while a previous one is still live.
    pub allow_overruns: bool,
    pub enabled: bool,
    /// No run starts before this instant.
    pub start_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    /// The live run, when one exists. Set and cleared only by the store's
    /// admission and finish operations.
    pub current_run_id: Option<String>,
    pub last_run_started: Option<DateTime<Utc>>,
    pub last_run_status: Option<RunState>,
    pub timeout_count: u64,
    pub failure_count: u64,
    /// Registered by the system-job scheduler rather than an operator.
    pub system: bool,
}

/// Derived job state, for listings and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Disabled,
    EnabledIdle,
    EnabledRunning,
}

impl CronJob {
    pub fn state(&self) -> JobState {
        if !self.enabled {
            JobState::Disabled
        } else if self.current_run_id.is_some() {
            JobState::EnabledRunning
        } else {
            JobState::EnabledIdle
        }
    }

    /// Whether a new run is due at `now`, ignoring overrun policy.
    pub fn is_due_at(&self, now: DateTime<Utc>) -> bool {
        if now < self.start_time {
            return false;
        }
        match self.last_run_started {
            None => true,
            Some(last) => {
                let freq = chrono::Duration::from_std(self.frequency)
                    .unwrap_or_else(|_| chrono::Duration::zero());
                now.signed_duration_since(last) >= freq
            }
        }
    }
}

/// Parameters for creating a job. The manager assigns the id (unless a
/// well-known name is supplied) and fills defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    /// Job id; generated when `None`. System jobs use their well-known name.
    pub name: Option<String>,
    pub agent_id: String,
    pub flow: FlowSpec,
    pub frequency: Duration,
    /// Manager default applies when `None`.
    pub lifetime: Option<Duration>,
    pub allow_overruns: bool,
    /// Jobs start eligible immediately when `None`.
    pub start_time: Option<DateTime<Utc>>,
    pub system: bool,
}

impl NewJob {
    /// An operator-owned job with the common defaults: immediate start,
    /// no overruns, default lifetime.
    pub fn flow(agent_id: impl Into<String>, flow: FlowSpec, frequency: Duration) -> Self {
        Self {
            name: None,
            agent_id: agent_id.into(),
            flow,
            frequency,
            lifetime: None,
            allow_overruns: false,
            start_time: None,
            system: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn job(frequency_secs: u64) -> CronJob {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        CronJob {
            id: "j1".to_string(),
            agent_id: FLEET_AGENT.to_string(),
            flow: FlowSpec::new("Interrogate"),
            frequency: Duration::from_secs(frequency_secs),
            lifetime: Duration::from_secs(3_600),
            allow_overruns: false,
            enabled: true,
            start_time: t0,
            created_at: t0,
            current_run_id: None,
            last_run_started: None,
            last_run_status: None,
            timeout_count: 0,
            failure_count: 0,
            system: false,
        }
    }

    #[test]
    fn job_state_derivation() {
        let mut j = job(60);
        assert_eq!(j.state(), JobState::EnabledIdle);
        j.current_run_id = Some("r1".to_string());
        assert_eq!(j.state(), JobState::EnabledRunning);
        j.enabled = false;
        assert_eq!(j.state(), JobState::Disabled);
    }

    #[test]
    fn due_before_start_time_is_false() {
        let j = job(60);
        assert!(!j.is_due_at(j.start_time - chrono::Duration::seconds(1)));
        assert!(j.is_due_at(j.start_time));
    }

    #[test]
    fn due_tracks_last_run_start() {
        let mut j = job(3_600);
        let t0 = j.start_time;
        assert!(j.is_due_at(t0));
        j.last_run_started = Some(t0);
        assert!(!j.is_due_at(t0 + chrono::Duration::seconds(3_599)));
        assert!(j.is_due_at(t0 + chrono::Duration::seconds(3_600)));
    }

    #[test]
    fn run_age_never_goes_negative() {
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let run = CronRun {
            run_id: "r1".to_string(),
            job_id: "j1".to_string(),
            started_at: t0,
            state: RunState::Running,
            finished_at: None,
            message: None,
        };
        assert_eq!(run.age_at(t0 - chrono::Duration::seconds(5)), Duration::ZERO);
        assert_eq!(
            run.age_at(t0 + chrono::Duration::seconds(90)),
            Duration::from_secs(90)
        );
    }
}
