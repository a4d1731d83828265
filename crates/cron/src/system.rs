//! Well-known system jobs and their schedule-time registration.
//!
//! System jobs are fleet-wide maintenance flows registered at worker
//! startup. Their start times are jittered within one frequency period so
//! a restarted fleet of workers does not thunder in lockstep; the jitter
//! is a pure function of (now, frequency, supplied random source) so tests
//! can inject determinism.

use std::time::Duration;

use chrono::{DateTime, Utc};
use drover_core::config::CronConfig;
use drover_core::flow::FlowSpec;
use rand::Rng;
use tracing::info;

use crate::error::{CronError, Result};
use crate::manager::CronManager;
use crate::model::{NewJob, FLEET_AGENT};

/// Definition of one well-known system job.
#[derive(Debug, Clone)]
pub struct SystemJobDef {
    /// Well-known name, doubling as the job id.
    pub name: &'static str,
    pub flow: FlowSpec,
    pub frequency: Duration,
    pub lifetime: Duration,
    pub allow_overruns: bool,
}

/// The built-in system job set the worker registers at startup.
pub fn builtin_system_jobs() -> Vec<SystemJobDef> {
    vec![
        SystemJobDef {
            name: "fleet-interrogate",
            flow: FlowSpec::new("Interrogate"),
            frequency: Duration::from_secs(7 * 86_400),
            lifetime: Duration::from_secs(86_400),
            allow_overruns: false,
        },
        SystemJobDef {
            name: "stale-snapshot-sweep",
            flow: FlowSpec::new("SweepStaleSnapshots"),
            frequency: Duration::from_secs(86_400),
            lifetime: Duration::from_secs(2 * 3_600),
            allow_overruns: false,
        },
    ]
}

/// Start instant for a system job: `now` plus a uniform offset within one
/// frequency period.
pub fn jittered_start<R: Rng>(
    now: DateTime<Utc>,
    frequency: Duration,
    rng: &mut R,
) -> DateTime<Utc> {
    let period = frequency.as_secs();
    if period == 0 {
        return now;
    }
    now + chrono::Duration::seconds(rng.gen_range(0..period) as i64)
}

/// Register the system job set, honoring the configured block list.
///
/// Every block-list name must match a known system job; an unknown name is
/// a fatal [`CronError::UnknownSystemJob`] raised before anything is
/// scheduled. Blocked jobs are registered disabled. Re-scheduling is
/// idempotent: an existing job keeps its state except the enabled flag,
/// which re-follows the block list. Returns the number of newly created
/// jobs.
pub fn schedule_system_jobs<R: Rng>(
    manager: &CronManager,
    defs: &[SystemJobDef],
    config: &CronConfig,
    now: DateTime<Utc>,
    rng: &mut R,
) -> Result<usize> {
    for blocked in &config.disabled_system_jobs {
        if !defs.iter().any(|d| d.name == blocked.as_str()) {
            return Err(CronError::UnknownSystemJob(blocked.clone()));
        }
    }

    let mut created = 0;
    for def in defs {
        let enabled = !config
            .disabled_system_jobs
            .iter()
            .any(|b| b == def.name);

        if manager.read_job(def.name).is_ok() {
            if enabled {
                manager.enable_job(def.name)?;
            } else {
                manager.disable_job(def.name)?;
            }
            continue;
        }

        let start_time = if config.randomize_system_starts {
            jittered_start(now, def.frequency, rng)
        } else {
            now
        };
        manager.create_job_at(
            NewJob {
                name: Some(def.name.to_string()),
                agent_id: FLEET_AGENT.to_string(),
                flow: def.flow.clone(),
                frequency: def.frequency,
                lifetime: Some(def.lifetime),
                allow_overruns: def.allow_overruns,
                start_time: Some(start_time),
                system: true,
            },
            now,
        )?;
        if !enabled {
            manager.disable_job(def.name)?;
        }
        info!(
            job = def.name,
            enabled,
            start_time = %start_time,
            "registered system job"
        );
        created += 1;
    }
    Ok(created)
}

// ── Tests ───────────────────────────────────────────────────────────
