//! Cron-driven tick loop.
//!
//! Each due tick runs as its own task so a slow cycle never delays the
//! schedule; overlapping cycles are rejected by the watcher's cycle guard.

use std::future::Future;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use shipwatch_core::component::normalize_cron;
use shipwatch_core::error::{Result, WatchError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Parsed five- or six-field cron expression.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    schedule: cron::Schedule,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self> {
        let schedule = cron::Schedule::from_str(&normalize_cron(expression)).map_err(|e| {
            WatchError::Parse(format!("invalid cron expression '{}': {}", expression, e))
        })?;
        Ok(Self {
            expression: expression.trim().to_string(),
            schedule,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First fire time strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule.after(&after).next()
    }
}

/// Run `tick` on every fire time of `schedule` until `cancel` fires.
///
/// With `run_at_start` one tick runs immediately. Tick tasks still running
/// at cancellation are dropped at their next await point.
pub fn spawn<F, Fut>(
    name: String,
    schedule: CronSchedule,
    run_at_start: bool,
    cancel: CancellationToken,
    tick: F,
) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        tracing::info!(watcher = %name, cron = %schedule.expression(), "Schedule started");
        if run_at_start {
            spawn_tick(tick(), cancel.clone());
        }

        let mut last = Utc::now();
        loop {
            let now = Utc::now();
            let Some(next) = schedule.next_after(last.max(now)) else {
                tracing::warn!(watcher = %name, "Cron expression has no upcoming fire time");
                break;
            };
            let delay = (next - now).to_std().unwrap_or_default();

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {
                    last = next;
                    spawn_tick(tick(), cancel.clone());
                }
            }
        }
        tracing::info!(watcher = %name, "Schedule stopped");
    })
}

fn spawn_tick<Fut>(cycle: Fut, cancel: CancellationToken)
where
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = cycle => {}
        }
    });
}
