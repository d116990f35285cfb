use thiserror::Error;

use crate::auth::login::LoginError;
use crate::auth::role::Role;
use crate::auth::session::LoginPortal;
use crate::auth::storage::StorageError;
use crate::flows::engine::WizardError;

/// Stable tag carried on log records as `failure_class`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureClass {
    AuthenticationFailure,
    AuthorizationFailure,
    SessionCorruption,
    NavigationFallthrough,
    WizardRangeViolation,
}

impl FailureClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AuthenticationFailure => "authentication_failure",
            Self::AuthorizationFailure => "authorization_failure",
            Self::SessionCorruption => "session_corruption",
            Self::NavigationFallthrough => "navigation_fallthrough",
            Self::WizardRangeViolation => "wizard_range_violation",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    Wizard(#[from] WizardError),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("{0}")]
    Authentication(String),
    #[error("authentication required for `{path}`")]
    Unauthenticated { path: String },
    #[error("role `{role}` may not open `{path}`")]
    Forbidden { path: String, role: Role },
    #[error("a {portal} login is already in progress")]
    LoginInProgress { portal: LoginPortal },
    #[error("login was abandoned by a later navigation")]
    LoginDiscarded,
    #[error("session storage failure: {0}")]
    Storage(String),
    #[error("integration failure: {0}")]
    Integration(String),
}

impl ApplicationError {
    pub fn failure_class(&self) -> Option<FailureClass> {
        match self {
            Self::Authentication(_) | Self::Unauthenticated { .. } => {
                Some(FailureClass::AuthenticationFailure)
            }
            Self::Forbidden { .. } => Some(FailureClass::AuthorizationFailure),
            Self::Storage(_) => Some(FailureClass::SessionCorruption),
            _ => None,
        }
    }
}

impl From<WizardError> for ApplicationError {
    fn from(value: WizardError) -> Self {
        Self::Domain(DomainError::Wizard(value))
    }
}

impl From<StorageError> for ApplicationError {
    fn from(value: StorageError) -> Self {
        Self::Storage(value.to_string())
    }
}

impl From<LoginError> for ApplicationError {
    fn from(value: LoginError) -> Self {
        match value {
            LoginError::Authentication { reason } => Self::Authentication(reason),
            LoginError::InFlight { portal } => Self::LoginInProgress { portal },
            LoginError::Discarded => Self::LoginDiscarded,
            LoginError::Unavailable(message) => Self::Integration(message),
            LoginError::Storage(error) => Self::from(error),
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("unauthorized: {message}")]
    Unauthorized { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::Unauthorized { .. } => "Sign in failed. Check your email and password.",
            Self::Forbidden { .. } => "You do not have access to this page.",
            Self::Conflict { .. } => "The request conflicts with the current state. Refresh and retry.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. }
            | Self::Unauthorized { message, .. }
            | Self::Forbidden { message, .. }
            | Self::Conflict { message, .. }
            | Self::ServiceUnavailable { message, .. } => message,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::Unauthorized { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::Unauthorized { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let unassigned = || "unassigned".to_owned();
        match value {
            ApplicationError::Domain(DomainError::Wizard(error @ WizardError::Submitted { .. })) => {
                Self::Conflict { message: error.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::Domain(DomainError::Wizard(
                error @ WizardError::MissingRequiredFields { .. },
            )) => Self::BadRequest { message: error.to_string(), correlation_id: unassigned() },
            ApplicationError::Authentication(message) => {
                Self::Unauthorized { message, correlation_id: unassigned() }
            }
            error @ ApplicationError::Unauthenticated { .. } => {
                Self::Unauthorized { message: error.to_string(), correlation_id: unassigned() }
            }
            error @ ApplicationError::Forbidden { .. } => {
                Self::Forbidden { message: error.to_string(), correlation_id: unassigned() }
            }
            error @ (ApplicationError::LoginInProgress { .. } | ApplicationError::LoginDiscarded) => {
                Self::Conflict { message: error.to_string(), correlation_id: unassigned() }
            }
            ApplicationError::Storage(message) | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id: unassigned() }
            }
        }
    }
}
