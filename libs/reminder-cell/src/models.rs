use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use records_cell::Appointment;
use shared_database::StoreError;

/// What a patient is told about tomorrow's appointment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reminder {
    pub appointment_id: String,
    pub patient_id: String,
    pub doctor_name: String,
    pub specialty: String,
    pub date: NaiveDate,
    pub time: String,
    pub notes: Option<String>,
}

impl From<&Appointment> for Reminder {
    fn from(appointment: &Appointment) -> Self {
        Self {
            appointment_id: appointment.id.clone(),
            patient_id: appointment.user_id.clone(),
            doctor_name: appointment.doctor_name.clone(),
            specialty: appointment.specialty.clone(),
            date: appointment.date,
            time: appointment.time.clone(),
            notes: appointment.notes.clone().filter(|n| !n.trim().is_empty()),
        }
    }
}

impl Reminder {
    pub fn message(&self) -> String {
        let mut message = format!(
            "Reminder: appointment with {} ({}) tomorrow, {} at {}",
            self.doctor_name, self.specialty, self.date, self.time
        );
        if let Some(notes) = &self.notes {
            message.push_str(&format!(". Notes: {}", notes));
        }
        message
    }
}

#[derive(Error, Debug)]
pub enum ReminderError {
    #[error("Could not load appointments: {0}")]
    Store(#[from] StoreError),

    #[error("Notification failed: {0}")]
    Notification(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use records_cell::AppointmentStatus;

    fn appointment(notes: Option<&str>) -> Appointment {
        Appointment {
            id: "a1".to_string(),
            user_id: "p1".to_string(),
            doctor_id: None,
            doctor_name: "Dr. Grey".to_string(),
            specialty: "Cardiology".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
            time: "09:00".to_string(),
            notes: notes.map(str::to_string),
            status: AppointmentStatus::Scheduled,
            reminder_sent: false,
            created_at: None,
        }
    }

    #[test]
    fn test_message_carries_notes_when_present() {
        let reminder = Reminder::from(&appointment(Some("Bring previous ECG")));
        assert_eq!(reminder.notes.as_deref(), Some("Bring previous ECG"));
        assert_eq!(
            reminder.message(),
            "Reminder: appointment with Dr. Grey (Cardiology) tomorrow, 2024-06-10 at 09:00. Notes: Bring previous ECG"
        );
    }

    #[test]
    fn test_blank_notes_are_left_out() {
        let reminder = Reminder::from(&appointment(Some("  ")));
        assert!(reminder.notes.is_none());
        assert!(!reminder.message().contains("Notes"));
    }
}
