pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use handlers::RecordsState;
pub use models::*;
pub use router::*;
pub use services::{
    DoctorAppointmentService, Entity, HealthSummary, ReconcilingRepository,
};
