pub mod notifier;
pub mod scheduler;
pub mod sweep;

pub use notifier::{LogNotifier, ReminderNotifier};
pub use scheduler::ReminderScheduler;
pub use sweep::ReminderSweep;
