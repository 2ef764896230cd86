// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use crate::notifier::Notifier;
use crate::sweep::{self, SweepReport};

use chrono::{Local, NaiveDate, NaiveDateTime, Timelike};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info};

/// True once the local clock has reached `reminder_hour` on a day that has
/// not been swept yet.
pub fn sweep_due(now: NaiveDateTime, reminder_hour: u32, last_run: Option<NaiveDate>) -> bool {
    now.hour() >= reminder_hour && last_run.is_none_or(|day| day < now.date())
}

/// Background task that runs the reminder sweep once a day.
///
/// The task keeps nothing but the date of its last successful run; all
/// billing data stays in the ledger.
pub struct ReminderScheduler {
    pool: SqlitePool,
    notifier: Arc<dyn Notifier>,
    reminder_hour: u32,
    check_interval: Duration,
}

impl ReminderScheduler {
    pub fn new(
        pool: SqlitePool,
        notifier: Arc<dyn Notifier>,
        reminder_hour: u32,
        check_interval: Duration,
    ) -> Self {
        Self {
            pool,
            notifier,
            reminder_hour,
            check_interval,
        }
    }

    /// Runs the sweep for `now`'s day if it is due and records the run.
    /// A failed run leaves `last_run` alone so the next check tries again.
    pub async fn run_if_due(
        &self,
        now: NaiveDateTime,
        last_run: &mut Option<NaiveDate>,
    ) -> Option<SweepReport> {
        if !sweep_due(now, self.reminder_hour, *last_run) {
            debug!(
                "No sweep due. Now: {}. Last sweep: {:?}.",
                now, *last_run
            );
            return None;
        }

        let today = now.date();
        info!("New day detected: {}, running the reminder sweep.", today);
        match sweep::run_reminder_sweep(&self.pool, self.notifier.as_ref(), today).await {
            Ok(report) => {
                *last_run = Some(today);
                Some(report)
            }
            Err(e) => {
                error!("Error during the reminder sweep: {:?}", e);
                None
            }
        }
    }

    /// Spawns the timer loop. It stops when `shutdown` changes or its
    /// sender is dropped; a sweep in progress is allowed to finish first.
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Reminder scheduler started (daily at {:02}:00 via {}, checking every {:?}).",
                self.reminder_hour,
                self.notifier.name(),
                self.check_interval
            );

            let mut interval = time::interval(self.check_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last_run: Option<NaiveDate> = None;

            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    _ = shutdown.changed() => {
                        info!("Reminder scheduler stopping.");
                        break;
                    }
                }

                self.run_if_due(Local::now().naive_local(), &mut last_run)
                    .await;
            }
        })
    }
}
