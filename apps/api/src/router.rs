use std::sync::Arc;

use axum::{routing::get, Router};

use access_cell::create_access_router;
use assistant_cell::{create_assistant_router, AssistantState};
use auth_cell::{auth_routes, AuthService, IdentityProvider};
use profile_cell::{create_profile_router, ProfileService};
use records_cell::{create_records_router, RecordsState};
use shared_database::PortalContext;

/// Everything the HTTP surface is built from.
#[derive(Clone)]
pub struct ApiServices {
    pub ctx: PortalContext,
    pub auth: Arc<AuthService>,
    pub assistant: AssistantState,
}

impl ApiServices {
    pub fn new(ctx: PortalContext, provider: Arc<dyn IdentityProvider>) -> Self {
        let profiles = ProfileService::new(ctx.store.clone());
        Self {
            auth: Arc::new(AuthService::new(provider, profiles, Default::default())),
            assistant: AssistantState::new(ctx.clone()),
            ctx,
        }
    }
}

pub fn create_router(services: ApiServices) -> Router {
    let config = services.ctx.config.clone();

    Router::new()
        .route("/", get(|| async { "MedVault API is running!" }))
        .nest("/auth", auth_routes(config, services.auth))
        .nest("/profiles", create_profile_router(services.ctx.clone()))
        .nest("/access", create_access_router(services.ctx.clone()))
        .nest("/records", create_records_router(RecordsState::new(services.ctx)))
        .nest("/assistant", create_assistant_router(services.assistant))
}
