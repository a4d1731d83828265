//! drover-worker — the periodic background process behind the control
//! plane.
//!
//! On each tick it:
//! - runs one `CronManager` scheduler pass
//! - runs a foreman pass for every agent that checked in since the
//!   previous tick
//!
//! Flow creation and hunt membership go through logging adapters over the
//! in-memory collaborators; an embedding deployment swaps in its own
//! `FlowEngine`/`HuntRegistry` implementations. Shutdown on
//! SIGINT/SIGTERM finishes the in-flight tick, then exits cleanly.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use clap::Parser;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use drover_core::config::{load_dotenv, Config};
use drover_core::error::{FlowError, HuntError};
use drover_core::flow::{FlowId, FlowSpec};
use drover_core::memory::{
    MemoryAgentStore, MemoryFlowEngine, MemoryHuntRegistry, MemoryStatsRecorder,
};
use drover_core::traits::{AgentStore, FlowEngine, HuntRegistry};
use drover_cron::{builtin_system_jobs, schedule_system_jobs, CronManager, MemoryCronStore};
use drover_foreman::{Foreman, MemoryDispatchLedger, MemoryRuleStore};

// ── CLI ─────────────────────────────────────────────────────────────

/// Drover background worker — cron scheduling and rule dispatch.
#[derive(Parser, Debug)]
#[command(name = "drover-worker", version, about)]
struct Cli {
    /// Seconds between scheduler ticks; overrides DROVER_TICK_SECS.
    #[arg(long)]
    tick_secs: Option<u64>,

    /// Log a stats summary every N ticks (0 disables).
    #[arg(long, env = "DROVER_STATS_EVERY", default_value_t = 10)]
    stats_every: u64,
}

// ── Logging collaborators ───────────────────────────────────────────

/// Flow engine that records every request and logs each launch.
struct LoggingFlowEngine {
    inner: MemoryFlowEngine,
}

#[async_trait]
impl FlowEngine for LoggingFlowEngine {
    async fn start_flow(
        &self,
        agent_id: &str,
        flow: &FlowSpec,
        creator: &str,
    ) -> Result<FlowId, FlowError> {
        let flow_id = self.inner.start_flow(agent_id, flow, creator).await?;
        info!(
            agent_id = %agent_id,
            flow = %flow.name,
            creator = %creator,
            flow_id = %flow_id,
            "flow started"
        );
        Ok(flow_id)
    }
}

/// Hunt registry that records membership and logs every notice.
struct LoggingHuntRegistry {
    inner: MemoryHuntRegistry,
}

#[async_trait]
impl HuntRegistry for LoggingHuntRegistry {
    async fn enroll(&self, hunt_id: &str, agent_id: &str) -> Result<(), HuntError> {
        self.inner.enroll(hunt_id, agent_id).await?;
        info!(hunt_id = %hunt_id, agent_id = %agent_id, "agent enrolled into hunt");
        Ok(())
    }

    async fn rule_expired(&self, hunt_id: &str, rule_id: &str) -> Result<(), HuntError> {
        self.inner.rule_expired(hunt_id, rule_id).await?;
        info!(hunt_id = %hunt_id, rule_id = %rule_id, "hunt notified of expired rule");
        Ok(())
    }
}

// ── Control plane ───────────────────────────────────────────────────

/// The wired-up core the tick loop drives.
struct ControlPlane {
    cron: CronManager,
    foreman: Foreman,
    agents: Arc<MemoryAgentStore>,
    stats: Arc<MemoryStatsRecorder>,
}

impl ControlPlane {
    /// One tick: a scheduler pass, then a foreman pass per recently
    /// checked-in agent. Per-item failures are logged and never stop the
    /// tick or the loop.
    async fn tick(&self, now: DateTime<Utc>, since: DateTime<Utc>) {
        let report = self.cron.run_once_at(now).await;
        if !report.started.is_empty() || !report.timed_out.is_empty() {
            info!(
                started = report.started.len(),
                timed_out = report.timed_out.len(),
                "cron pass done"
            );
        }
        for failure in &report.failures {
            warn!(job_id = %failure.job_id, message = %failure.message, "cron job failed this tick");
        }

        match self.agents.checked_in_since(since).await {
            Ok(agent_ids) => {
                for agent_id in agent_ids {
                    match self.foreman.assign_tasks_to_client_at(&agent_id, now).await {
                        Ok(report) if report.dispatched() > 0 => {
                            info!(
                                agent_id = %agent_id,
                                dispatched = report.dispatched(),
                                "foreman pass dispatched actions"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => warn!(agent_id = %agent_id, error = %e, "foreman pass failed"),
                    }
                }
            }
            Err(e) => warn!(error = %e, "could not list checked-in agents"),
        }
    }

    fn log_stats_summary(&self) {
        for (name, value) in self.stats.counters() {
            info!(counter = %name, value, "stats");
        }
    }
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    load_dotenv();
    let mut config = Config::from_env()?;
    if let Some(secs) = cli.tick_secs {
        config.worker.tick = Duration::from_secs(secs);
    }
    config.log_summary();

    let agents = Arc::new(MemoryAgentStore::new());
    let stats = Arc::new(MemoryStatsRecorder::new());
    let flows = Arc::new(LoggingFlowEngine {
        inner: MemoryFlowEngine::new(),
    });
    let hunts = Arc::new(LoggingHuntRegistry {
        inner: MemoryHuntRegistry::new(),
    });

    let cron = CronManager::new(
        Arc::new(MemoryCronStore::new()),
        flows.clone(),
        stats.clone(),
        config.cron.default_lifetime,
    );
    let foreman = Foreman::new(
        Arc::new(MemoryRuleStore::new()),
        Arc::new(MemoryDispatchLedger::new()),
        agents.clone(),
        flows,
        hunts,
    );

    // Unknown block-list names abort startup here, before the first tick.
    let mut rng = rand::thread_rng();
    let registered = schedule_system_jobs(
        &cron,
        &builtin_system_jobs(),
        &config.cron,
        Utc::now(),
        &mut rng,
    )?;
    info!(registered, "system jobs scheduled");

    let plane = ControlPlane {
        cron,
        foreman,
        agents,
        stats,
    };

    let mut ticker = tokio::time::interval(config.worker.tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    info!("drover-worker started");
    let mut last_tick = Utc::now();
    let mut ticks: u64 = 0;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = Utc::now();
                plane.tick(now, last_tick).await;
                last_tick = now;
                ticks += 1;
                if cli.stats_every > 0 && ticks % cli.stats_every == 0 {
                    plane.log_stats_summary();
                }
            }
            _ = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }
        }
    }
    info!("drover-worker exited cleanly");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to register SIGINT");
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM");
        tokio::select! {
            _ = sigint.recv() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl_c");
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use drover_core::snapshot::{AgentSnapshot, OsFamily};
    use drover_foreman::{NewRule, OsSelector, RuleAction, RuleCondition, RuleSet};
    use std::time::Duration as StdDuration;

    fn plane() -> (ControlPlane, Arc<MemoryFlowEngine>) {
        let agents = Arc::new(MemoryAgentStore::new());
        let stats = Arc::new(MemoryStatsRecorder::new());
        let flows = Arc::new(MemoryFlowEngine::new());
        let hunts = Arc::new(MemoryHuntRegistry::new());
        let cron = CronManager::new(
            Arc::new(MemoryCronStore::new()),
            flows.clone(),
            stats.clone(),
            StdDuration::from_secs(86_400),
        );
        let foreman = Foreman::new(
            Arc::new(MemoryRuleStore::new()),
            Arc::new(MemoryDispatchLedger::new()),
            agents.clone(),
            flows.clone(),
            hunts,
        );
        (
            ControlPlane {
                cron,
                foreman,
                agents,
                stats,
            },
            flows,
        )
    }

    #[tokio::test]
    async fn tick_drives_cron_and_foreman_together() {
        let (plane, flows) = plane();
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();

        // A checked-in Linux agent and a rule that targets it.
        plane
            .agents
            .upsert_at(AgentSnapshot::new("A.linux", OsFamily::Linux), t0);
        plane
            .foreman
            .create_rule_at(
                NewRule {
                    owner: "admin".to_string(),
                    expires: t0 + chrono::Duration::days(7),
                    ruleset: RuleSet::match_all(vec![RuleCondition::Os(OsSelector {
                        linux: true,
                        ..OsSelector::default()
                    })]),
                    action: RuleAction::StartFlow {
                        flow: FlowSpec::new("Interrogate"),
                    },
                },
                t0,
            )
            .unwrap();

        // A due cron job.
        let mut job = drover_cron::NewJob::flow(
            drover_cron::FLEET_AGENT,
            FlowSpec::new("SweepStaleSnapshots"),
            StdDuration::from_secs(3_600),
        );
        job.name = Some("sweep".to_string());
        job.start_time = Some(t0);
        plane.cron.create_job_at(job, t0).unwrap();

        let since = t0 - chrono::Duration::minutes(1);
        plane.tick(t0, since).await;

        // One cron launch plus one rule dispatch; a second tick with no
        // new check-ins or rules adds nothing.
        assert_eq!(flows.started_count(), 2);
        plane.tick(t0 + chrono::Duration::minutes(1), t0).await;
        assert_eq!(flows.started_count(), 2);
    }

    #[tokio::test]
    async fn tick_only_visits_recently_checked_in_agents() {
        let (plane, flows) = plane();
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();

        plane
            .agents
            .upsert_at(AgentSnapshot::new("A.stale", OsFamily::Linux), t0 - chrono::Duration::hours(6));
        plane
            .foreman
            .create_rule_at(
                NewRule {
                    owner: "admin".to_string(),
                    expires: t0 + chrono::Duration::days(7),
                    ruleset: RuleSet::match_all(vec![]),
                    action: RuleAction::StartFlow {
                        flow: FlowSpec::new("Interrogate"),
                    },
                },
                t0,
            )
            .unwrap();

        plane.tick(t0, t0 - chrono::Duration::minutes(1)).await;
        assert_eq!(flows.started_count(), 0);

        // The agent checks in again and the next tick picks it up.
        plane
            .agents
            .upsert_at(AgentSnapshot::new("A.stale", OsFamily::Linux), t0 + chrono::Duration::minutes(2));
        plane.tick(t0 + chrono::Duration::minutes(5), t0).await;
        assert_eq!(flows.started_count(), 1);
    }
}
