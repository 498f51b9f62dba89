use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtHeader {
    pub alg: String,
    pub typ: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub app_metadata: Option<serde_json::Value>,
    pub user_metadata: Option<serde_json::Value>,
    pub aud: Option<String>,
    pub iat: Option<u64>,
}

/// Portal role. Stored by the identity provider as `user_metadata.role`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Patient,
    Doctor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Doctor => "doctor",
        }
    }

    /// Landing route after sign-in.
    pub fn home_route(&self) -> &'static str {
        match self {
            Role::Patient => "/",
            Role::Doctor => "/doctor/dashboard",
        }
    }

    /// Route for the role's sign-in screen.
    pub fn login_route(&self) -> &'static str {
        match self {
            Role::Patient => "/login",
            Role::Doctor => "/doctor/login",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "patient" => Ok(Role::Patient),
            "doctor" => Ok(Role::Doctor),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    #[serde(alias = "user_metadata")]
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    /// Resolves the portal role, preferring `metadata.role` over the token's
    /// top-level `role` claim (which Supabase sets to `authenticated`).
    pub fn portal_role(&self) -> Option<Role> {
        self.metadata
            .as_ref()
            .and_then(|meta| meta.get("role"))
            .and_then(|role| role.as_str())
            .and_then(|role| role.parse().ok())
            .or_else(|| self.role.as_deref().and_then(|role| role.parse().ok()))
    }

    pub fn display_name(&self) -> Option<String> {
        let meta = self.metadata.as_ref()?;
        if let Some(name) = meta.get("name").and_then(|v| v.as_str()) {
            return Some(name.to_string());
        }
        let profile = meta.get("profileData")?;
        let first = profile.get("firstName").and_then(|v| v.as_str()).unwrap_or("");
        let last = profile.get("lastName").and_then(|v| v.as_str()).unwrap_or("");
        let full = format!("{} {}", first, last).trim().to_string();
        if full.is_empty() { None } else { Some(full) }
    }
}

/// An authenticated session issued by the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
    pub user: User,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub valid: bool,
    pub user_id: String,
    pub email: Option<String>,
    pub role: Option<Role>,
}
