pub mod models;
pub mod services;

pub use models::{Reminder, ReminderError};
pub use services::{LogNotifier, ReminderNotifier, ReminderScheduler, ReminderSweep};
