// src/ingest/scheduler.rs
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::pipeline::PipelineConfig;
use crate::ingest::{Pipeline, Scope};

#[derive(Clone, Copy, Debug)]
pub struct SchedulerCfg {
    pub aggregates_every: Duration,
    pub live_every: Duration,
}

impl From<&PipelineConfig> for SchedulerCfg {
    fn from(cfg: &PipelineConfig) -> Self {
        Self {
            aggregates_every: Duration::from_secs(cfg.aggregates_interval_secs),
            live_every: Duration::from_secs(cfg.live_interval_secs),
        }
    }
}

/// Drive both cadences until `shutdown` fires. Cycles run one at a time;
/// a tick that comes due while a cycle is running is skipped, not queued.
/// Shutdown during a cycle drops it, which kills the agent process and
/// leaves the last committed files in place.
pub fn spawn_scheduler(
    pipeline: Arc<Pipeline>,
    cfg: SchedulerCfg,
    mut shutdown: oneshot::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut aggregates = tokio::time::interval(cfg.aggregates_every);
        aggregates.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut live = tokio::time::interval(cfg.live_every);
        live.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let scope = tokio::select! {
                _ = &mut shutdown => break,
                _ = aggregates.tick() => Scope::Aggregates,
                _ = live.tick() => Scope::Live,
            };

            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!(target: "scheduler", scope = scope.as_str(), "shutdown during cycle; cycle abandoned");
                    break;
                }
                res = pipeline.run_cycle(scope) => match res {
                    Ok(report) => tracing::debug!(
                        target: "scheduler",
                        scope = scope.as_str(),
                        political_written = report.political_written,
                        live_written = report.live_written,
                        "tick done"
                    ),
                    Err(e) => tracing::error!(
                        target: "scheduler",
                        scope = scope.as_str(),
                        error = ?e,
                        "cycle aborted"
                    ),
                },
            }
        }
        tracing::info!(target: "scheduler", "scheduler stopped");
    })
}
