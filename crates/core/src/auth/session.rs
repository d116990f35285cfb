use std::fmt;
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::role::Role;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    pub role: Role,
}

impl Identity {
    pub fn display_name(&self) -> &str {
        self.full_name.as_deref().filter(|name| !name.trim().is_empty()).unwrap_or(&self.email)
    }
}

/// Opaque credential issued by the verification service. Never empty.
#[derive(Clone)]
pub struct SessionToken(SecretString);

impl SessionToken {
    pub fn new(value: impl Into<String>) -> Result<Self, SessionError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(SessionError::EmptyToken);
        }
        Ok(Self(value.into()))
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(<redacted>)")
    }
}

impl PartialEq for SessionToken {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

impl Eq for SessionToken {}

/// Which login form created a session. Display only; authorization reads
/// [`Identity::role`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginPortal {
    User,
    Admin,
    SuperAdmin,
}

impl LoginPortal {
    pub const ALL: [LoginPortal; 3] = [LoginPortal::User, LoginPortal::Admin, LoginPortal::SuperAdmin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
            Self::SuperAdmin => "super_admin",
        }
    }

    /// Public screen hosting this portal's form.
    pub fn login_path(&self) -> &'static str {
        match self {
            Self::User => "/login",
            Self::Admin => "/admin-login",
            Self::SuperAdmin => "/super-admin-login",
        }
    }
}

impl fmt::Display for LoginPortal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unsupported login portal `{0}` (expected user|admin|super_admin)")]
pub struct UnknownPortal(pub String);

impl FromStr for LoginPortal {
    type Err = UnknownPortal;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            "super_admin" | "superadmin" => Ok(Self::SuperAdmin),
            other => Err(UnknownPortal(other.to_string())),
        }
    }
}

/// Authenticated identity plus credential for one browser context.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub identity: Identity,
    pub token: SessionToken,
    pub user_type: LoginPortal,
}

impl Session {
    pub fn new(identity: Identity, token: SessionToken, user_type: LoginPortal) -> Self {
        Self { identity, token, user_type }
    }

    pub fn role(&self) -> Role {
        self.identity.role
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("session token must not be empty")]
    EmptyToken,
}
