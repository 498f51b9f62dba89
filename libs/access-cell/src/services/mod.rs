pub mod views;
pub mod workflow;

pub use views::AccessRequestView;
pub use workflow::AccessControlService;
