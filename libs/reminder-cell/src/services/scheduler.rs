use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::services::sweep::ReminderSweep;

pub struct ReminderScheduler;

impl ReminderScheduler {
    /// Runs the sweep right away and then every `every`, until `shutdown`
    /// turns true or its sender is dropped.
    pub fn spawn(
        sweep: Arc<ReminderSweep>,
        every: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Reminder scheduler started, sweeping every {:?}", every);
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match sweep.sweep().await {
                            Ok(count) => debug!("Reminder sweep sent {}", count),
                            Err(e) => error!("Reminder sweep failed: {}", e),
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Reminder scheduler stopped");
        })
    }
}
