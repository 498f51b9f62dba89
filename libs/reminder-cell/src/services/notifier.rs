use async_trait::async_trait;
use tracing::info;

use crate::models::{Reminder, ReminderError};

/// Delivery channel for reminders.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReminderNotifier: Send + Sync {
    async fn notify(&self, reminder: &Reminder) -> Result<(), ReminderError>;
}

/// Default channel: one structured log line per reminder.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl ReminderNotifier for LogNotifier {
    async fn notify(&self, reminder: &Reminder) -> Result<(), ReminderError> {
        info!(
            appointment_id = %reminder.appointment_id,
            patient_id = %reminder.patient_id,
            "{}",
            reminder.message()
        );
        Ok(())
    }
}
