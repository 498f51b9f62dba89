pub mod events;
pub mod handlers;
pub mod models;
pub mod provider;
pub mod router;
pub mod services;

pub use events::{AuthEvent, SessionEvents};
pub use models::*;
pub use provider::{IdentityProvider, SupabaseAuthClient};
pub use router::*;
pub use services::AuthService;
