//! One login flow shared by the user, admin and super-admin portals.
//!
//! A submission is a sequential task: take a ticket under the context lock,
//! release the lock while the credential service answers, then hand the
//! answer back with the ticket. A navigation in between invalidates the
//! ticket and the answer is dropped without touching the session. A ticket
//! dropped before it is handed back (the request went away) frees its portal.

use std::collections::HashSet;
use std::sync::Arc;

use secrecy::ExposeSecret;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

use crate::app::AppContext;
use crate::auth::session::{Identity, LoginPortal};
use crate::auth::storage::{KeyValueStorage, StorageError};
use crate::auth::verifier::{CredentialVerifier, Credentials};
use crate::errors::FailureClass;
use crate::routing::navigator::NavigationOutcome;

#[derive(Debug, Error)]
pub enum LoginError {
    /// Shown on the form; the session is left as it was.
    #[error("{reason}")]
    Authentication { reason: String },
    #[error("a {portal} login is already in progress")]
    InFlight { portal: LoginPortal },
    #[error("login result discarded after navigation")]
    Discarded,
    #[error("credential service unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Portals with a login in flight, and the generation tickets must match.
#[derive(Debug, Default)]
pub(crate) struct PendingLogins {
    state: std::sync::Mutex<PendingState>,
}

#[derive(Debug, Default)]
struct PendingState {
    generation: u64,
    portals: HashSet<LoginPortal>,
}

impl PendingLogins {
    fn with_state<T>(&self, apply: impl FnOnce(&mut PendingState) -> T) -> T {
        match self.state.lock() {
            Ok(mut state) => apply(&mut *state),
            Err(poisoned) => {
                let mut state = poisoned.into_inner();
                apply(&mut *state)
            }
        }
    }

    /// Claims `portal`; `None` when it already has a login in flight.
    pub(crate) fn acquire(&self, portal: LoginPortal) -> Option<u64> {
        self.with_state(|state| state.portals.insert(portal).then_some(state.generation))
    }

    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.with_state(|state| state.generation == generation)
    }

    /// Frees every portal and invalidates outstanding tickets. Returns how
    /// many were pending.
    pub(crate) fn cancel(&self) -> usize {
        self.with_state(|state| {
            let pending = state.portals.len();
            state.portals.clear();
            state.generation = state.generation.wrapping_add(1);
            pending
        })
    }

    pub(crate) fn len(&self) -> usize {
        self.with_state(|state| state.portals.len())
    }

    fn release(&self, portal: LoginPortal, generation: u64) {
        self.with_state(|state| {
            if state.generation == generation {
                state.portals.remove(&portal);
            }
        });
    }
}

/// Proof that a login was started for `portal` before the context moved on.
///
/// Dropping the ticket frees the portal unless a navigation already did.
#[derive(Debug)]
pub struct LoginTicket {
    pub(crate) portal: LoginPortal,
    pub(crate) generation: u64,
    pub(crate) correlation_id: String,
    pending: Arc<PendingLogins>,
}

impl LoginTicket {
    pub(crate) fn new(
        portal: LoginPortal,
        generation: u64,
        correlation_id: String,
        pending: Arc<PendingLogins>,
    ) -> Self {
        Self { portal, generation, correlation_id, pending }
    }

    pub fn portal(&self) -> LoginPortal {
        self.portal
    }

    /// Request that started the login; its audit events carry this id.
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }
}

impl Drop for LoginTicket {
    fn drop(&mut self) {
        self.pending.release(self.portal, self.generation);
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LoginSuccess {
    pub identity: Identity,
    pub user_type: LoginPortal,
    pub navigation: NavigationOutcome,
}

pub struct RoleLoginFlow<'a> {
    portal: LoginPortal,
    verifier: &'a dyn CredentialVerifier,
    correlation_id: Option<String>,
}

impl<'a> RoleLoginFlow<'a> {
    pub fn new(portal: LoginPortal, verifier: &'a dyn CredentialVerifier) -> Self {
        Self { portal, verifier, correlation_id: None }
    }

    /// Tags the login's audit events with the caller's request id.
    pub fn correlated(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn portal(&self) -> LoginPortal {
        self.portal
    }

    pub async fn submit<S>(
        &self,
        context: &Mutex<AppContext<S>>,
        credentials: Credentials,
    ) -> Result<LoginSuccess, LoginError>
    where
        S: KeyValueStorage,
    {
        if credentials.email.trim().is_empty()
            || credentials.password.expose_secret().trim().is_empty()
        {
            info!(
                event_name = "login.form.incomplete",
                failure_class = FailureClass::AuthenticationFailure.as_str(),
                portal = %self.portal,
                "login rejected before contacting the credential service"
            );
            return Err(LoginError::Authentication {
                reason: "Email and password are required".to_string(),
            });
        }

        let ticket = {
            let mut context = context.lock().await;
            if let Some(correlation_id) = &self.correlation_id {
                context.set_correlation_id(correlation_id.clone());
            }
            context.begin_login(self.portal)?
        };
        let verified = self.verifier.verify(self.portal, &credentials).await;
        context.lock().await.finish_login(ticket, verified)
    }
}
