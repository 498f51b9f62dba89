pub mod doctor;
pub mod repository;
pub mod summary;

pub use doctor::DoctorAppointmentService;
pub use repository::{Entity, ReconcilingRepository};
pub use summary::{BloodPressure, HealthSummary};
