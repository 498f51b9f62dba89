use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use profile_cell::ProfileService;
use shared_models::auth::{Role, Session, User};
use shared_utils::validation::{require_non_empty, validate_email, validate_name, validate_password};

use crate::events::{AuthEvent, SessionEvents};
use crate::models::{AuthError, SignInRequest, SignInResponse, SignUpRequest, SignUpResponse};
use crate::provider::IdentityProvider;

pub struct AuthService {
    provider: Arc<dyn IdentityProvider>,
    profiles: ProfileService,
    events: SessionEvents,
}

impl AuthService {
    pub fn new(provider: Arc<dyn IdentityProvider>, profiles: ProfileService, events: SessionEvents) -> Self {
        Self { provider, profiles, events }
    }

    pub fn events(&self) -> &SessionEvents {
        &self.events
    }

    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn sign_in(&self, request: SignInRequest) -> Result<SignInResponse, AuthError> {
        validate_email(&request.email)?;
        require_non_empty("Password", &request.password)?;

        let session = self.provider.sign_in(request.email.trim(), &request.password).await?;
        let role = self.resolve_role(&session.user, &session.access_token).await?;

        if let Some(expected) = request.portal {
            if expected != role {
                warn!("{} account tried the {} portal", role, expected);
                return Err(AuthError::WrongPortal { expected, actual: role });
            }
        }

        info!("User {} signed in as {}", session.user.id, role);
        self.events.publish(AuthEvent::SignedIn, Some(session.clone()));

        Ok(SignInResponse { session, role, home_route: role.home_route() })
    }

    #[instrument(skip(self, request), fields(email = %request.email, role = %request.role))]
    pub async fn sign_up(&self, request: SignUpRequest) -> Result<SignUpResponse, AuthError> {
        validate_email(&request.email)?;
        validate_password(&request.password)?;

        let metadata = match request.role {
            Role::Patient => {
                let first = request.first_name.as_deref().unwrap_or("");
                let last = request.last_name.as_deref().unwrap_or("");
                validate_name("First name", first)?;
                validate_name("Last name", last)?;
                json!({
                    "role": Role::Patient,
                    "profileData": { "firstName": first.trim(), "lastName": last.trim() }
                })
            }
            Role::Doctor => {
                let name = request.name.as_deref().unwrap_or("");
                let specialization = request.specialization.as_deref().unwrap_or("");
                validate_name("Name", name)?;
                require_non_empty("Specialization", specialization)?;
                json!({
                    "role": Role::Doctor,
                    "name": name.trim(),
                    "specialization": specialization.trim()
                })
            }
        };

        let registration = self
            .provider
            .sign_up(request.email.trim(), &request.password, metadata)
            .await?;

        let token = registration.session.as_ref().map(|s| s.access_token.as_str());
        let profile_created = self
            .profiles
            .create_initial_profile(
                request.role,
                &registration.user.id,
                &request.display_name(),
                request.specialization.as_deref().map(str::trim),
                token,
            )
            .await;

        info!("Registered {} account {}", request.role, registration.user.id);
        self.events.publish(AuthEvent::SignedUp, registration.session.clone());

        Ok(SignUpResponse {
            confirmed: registration.session.is_some(),
            user: registration.user,
            session: registration.session,
            role: request.role,
            profile_created,
        })
    }

    pub async fn sign_out(&self, access_token: &str) -> Result<(), AuthError> {
        self.provider.sign_out(access_token).await?;
        self.events.publish(AuthEvent::SignedOut, None);
        debug!("Session signed out");
        Ok(())
    }

    /// Current user as the identity provider sees it, with the portal role
    /// resolved.
    pub async fn current_user(&self, access_token: &str) -> Result<(User, Option<Role>), AuthError> {
        let user = self.provider.get_user(access_token).await?;
        let role = match self.resolve_role(&user, access_token).await {
            Ok(role) => Some(role),
            Err(AuthError::NoRole) => None,
            Err(e) => return Err(e),
        };
        Ok((user, role))
    }

    /// Merges caller-supplied metadata. The `role` key is owned by the portal
    /// and is never taken from the caller.
    pub async fn update_metadata(&self, access_token: &str, data: Value) -> Result<User, AuthError> {
        let mut data = match data {
            Value::Object(map) => map,
            _ => return Err(AuthError::MalformedInput("Metadata must be a JSON object".to_string())),
        };
        if data.remove("role").is_some() {
            warn!("Ignored role change in metadata update");
        }

        let user = self.provider.update_user(access_token, Value::Object(data)).await?;
        self.events.publish(
            AuthEvent::UserUpdated,
            Some(Session {
                access_token: access_token.to_string(),
                refresh_token: None,
                expires_in: None,
                user: user.clone(),
            }),
        );
        Ok(user)
    }

    /// Role from `user_metadata.role`; otherwise from the profile tables,
    /// written back to the metadata so the next session carries it.
    async fn resolve_role(&self, user: &User, access_token: &str) -> Result<Role, AuthError> {
        if let Some(role) = user.portal_role() {
            return Ok(role);
        }

        let role = match self.profiles.registered_role(&user.id, Some(access_token)).await {
            Ok(Some(role)) => role,
            Ok(None) => return Err(AuthError::NoRole),
            Err(e) => {
                warn!("Role lookup failed for {}: {}", user.id, e);
                return Err(AuthError::NoRole);
            }
        };

        match self.provider.update_user(access_token, json!({ "role": role })).await {
            Ok(_) => info!("Recorded {} role in metadata for {}", role, user.id),
            Err(e) => warn!("Could not record role for {}: {}", user.id, e),
        }
        Ok(role)
    }
}
