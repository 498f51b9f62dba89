use std::sync::Arc;

use chrono::{Days, NaiveDate, Utc};
use serde_json::json;
use tracing::{debug, error, info, instrument, warn};

use records_cell::{Appointment, Entity};
use shared_database::{Query, RecordStore};

use crate::models::{Reminder, ReminderError};
use crate::services::notifier::ReminderNotifier;

/// One pass over tomorrow's appointments. Delivery is at-least-once: a
/// reminder whose flag write fails goes out again on the next pass.
pub struct ReminderSweep {
    store: Arc<dyn RecordStore>,
    notifier: Arc<dyn ReminderNotifier>,
}

impl ReminderSweep {
    pub fn new(store: Arc<dyn RecordStore>, notifier: Arc<dyn ReminderNotifier>) -> Self {
        Self { store, notifier }
    }

    /// Sweep relative to the current UTC date.
    pub async fn sweep(&self) -> Result<usize, ReminderError> {
        self.sweep_for(Utc::now().date_naive()).await
    }

    /// Returns the number of reminders dispatched.
    #[instrument(skip(self))]
    pub async fn sweep_for(&self, today: NaiveDate) -> Result<usize, ReminderError> {
        let Some(target) = today.checked_add_days(Days::new(1)) else {
            return Ok(0);
        };

        let rows = self
            .store
            .select(Appointment::TABLE, &Query::new().eq("date", target), None)
            .await?;
        let due: Vec<Appointment> = rows
            .into_iter()
            .filter_map(|row| match serde_json::from_value::<Appointment>(row) {
                Ok(appointment) => Some(appointment),
                Err(e) => {
                    warn!("Skipping unreadable appointment: {}", e);
                    None
                }
            })
            .filter(|a| !a.reminder_sent)
            .collect();
        debug!("{} appointment(s) due a reminder for {}", due.len(), target);

        let mut dispatched = 0;
        for appointment in &due {
            let reminder = Reminder::from(appointment);
            if let Err(e) = self.notifier.notify(&reminder).await {
                error!("Reminder for appointment {} not sent: {}", appointment.id, e);
                continue;
            }
            dispatched += 1;

            let flagged = self
                .store
                .update(
                    Appointment::TABLE,
                    &Query::new().eq("id", &appointment.id),
                    json!({ "reminder_sent": true }),
                    None,
                )
                .await;
            if let Err(e) = flagged {
                warn!("Reminder flag not saved for {}, it may repeat: {}", appointment.id, e);
            }
        }

        if dispatched > 0 {
            info!("Dispatched {} reminder(s) for {}", dispatched, target);
        }
        Ok(dispatched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::Value;
    use shared_database::InMemoryRecordStore;

    use crate::services::notifier::MockReminderNotifier;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 9).unwrap()
    }

    async fn seed(store: &InMemoryRecordStore, rows: Vec<Value>) {
        for row in rows {
            store.insert("appointments", row, None).await.unwrap();
        }
    }

    fn appointment(id: &str, date: &str) -> Value {
        json!({
            "id": id, "user_id": "p1", "doctor_name": "Dr. Grey",
            "date": date, "time": "09:00", "status": "scheduled", "reminder_sent": false
        })
    }

    #[tokio::test]
    async fn test_tomorrow_dispatches_once_then_zero() {
        let store = Arc::new(InMemoryRecordStore::default());
        seed(&store, vec![appointment("a1", "2024-06-10"), appointment("a2", "2024-06-12")]).await;

        let mut notifier = MockReminderNotifier::new();
        notifier
            .expect_notify()
            .withf(|r: &Reminder| r.appointment_id == "a1")
            .times(1)
            .returning(|_| Ok(()));
        let sweep = ReminderSweep::new(store.clone(), Arc::new(notifier));

        assert_eq!(sweep.sweep_for(today()).await.unwrap(), 1);
        assert_eq!(sweep.sweep_for(today()).await.unwrap(), 0);

        let rows = store.rows("appointments").await;
        assert_eq!(rows[0]["reminder_sent"], true);
        assert_eq!(rows[1]["reminder_sent"], false);
    }

    #[tokio::test]
    async fn test_selection_ignores_status_and_skips_already_sent() {
        let store = Arc::new(InMemoryRecordStore::default());
        let mut cancelled = appointment("c1", "2024-06-10");
        cancelled["status"] = json!("cancelled");
        let mut sent = appointment("s1", "2024-06-10");
        sent["reminder_sent"] = json!(true);
        seed(&store, vec![cancelled, sent]).await;

        let mut notifier = MockReminderNotifier::new();
        notifier
            .expect_notify()
            .withf(|r: &Reminder| r.appointment_id == "c1")
            .times(1)
            .returning(|_| Ok(()));
        let sweep = ReminderSweep::new(store, Arc::new(notifier));

        assert_eq!(sweep.sweep_for(today()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failed_flag_write_repeats_next_sweep() {
        let store = Arc::new(InMemoryRecordStore::default());
        seed(&store, vec![appointment("a1", "2024-06-10")]).await;

        let mut notifier = MockReminderNotifier::new();
        notifier.expect_notify().times(2).returning(|_| Ok(()));
        let sweep = ReminderSweep::new(store.clone(), Arc::new(notifier));

        store.set_writes_available(false);
        assert_eq!(sweep.sweep_for(today()).await.unwrap(), 1);
        store.set_writes_available(true);
        assert_eq!(sweep.sweep_for(today()).await.unwrap(), 1);
        assert_eq!(sweep.sweep_for(today()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_notification_leaves_flag_unset() {
        let store = Arc::new(InMemoryRecordStore::default());
        seed(&store, vec![appointment("a1", "2024-06-10")]).await;

        let mut notifier = MockReminderNotifier::new();
        notifier
            .expect_notify()
            .returning(|_| Err(ReminderError::Notification("smtp down".to_string())));
        let sweep = ReminderSweep::new(store.clone(), Arc::new(notifier));

        assert_eq!(sweep.sweep_for(today()).await.unwrap(), 0);
        assert_eq!(store.rows("appointments").await[0]["reminder_sent"], false);
    }

    #[tokio::test]
    async fn test_unreachable_store_is_an_error() {
        let store = Arc::new(InMemoryRecordStore::default());
        store.set_available(false);
        let sweep = ReminderSweep::new(store, Arc::new(MockReminderNotifier::new()));

        assert_matches!(sweep.sweep_for(today()).await, Err(ReminderError::Store(_)));
    }
}
