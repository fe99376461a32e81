//! Interval scheduling: each job runs its target on a fixed cadence until
//! the process is cancelled.

use anyhow::{bail, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use trawl::{CompiledTarget, RunOptions, RunOrchestrator};

use crate::settings::ScheduleSettings;

/// Run every scheduled job until `cancel` fires. A run that overlaps its
/// own next tick delays the tick instead of stacking runs.
pub async fn run_schedule(
    schedule: &ScheduleSettings,
    targets: Vec<CompiledTarget>,
    orchestrator: Arc<RunOrchestrator>,
    cancel: CancellationToken,
) -> Result<()> {
    if schedule.jobs.is_empty() {
        bail!("schedule is enabled but has no jobs");
    }

    let targets: HashMap<String, Arc<CompiledTarget>> = targets
        .into_iter()
        .map(|t| (t.name().to_string(), Arc::new(t)))
        .collect();

    let mut handles = Vec::new();
    for job in &schedule.jobs {
        let Some(target) = targets.get(&job.target).cloned() else {
            bail!("scheduled target `{}` not found in configuration", job.target);
        };
        if job.every_secs == 0 {
            bail!("scheduled target `{}` has a zero interval", job.target);
        }

        let orchestrator = orchestrator.clone();
        let cancel = cancel.clone();
        let every = Duration::from_secs(job.every_secs);
        info!(target = target.name(), every_secs = job.every_secs, "job scheduled");

        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let options = RunOptions::with_cancel(cancel.clone());
                let result = orchestrator.run(&target, &options).await;
                if result.is_failed() {
                    warn!(
                        target = %result.target,
                        run_id = %result.run_id,
                        "scheduled run failed"
                    );
                }
            }
        }));
    }

    for handle in handles {
        // A panicked job should surface, not vanish.
        if let Err(err) = handle.await {
            warn!(error = %err, "scheduled job aborted");
        }
    }
    Ok(())
}
