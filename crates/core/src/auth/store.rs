use tracing::{debug, warn};

use crate::auth::session::{Identity, LoginPortal, Session, SessionToken};
use crate::auth::storage::{KeyValueStorage, StorageError, StorageOp};
use crate::errors::FailureClass;

pub const TOKEN_KEY: &str = "token";
pub const USER_KEY: &str = "user";
pub const USER_TYPE_KEY: &str = "userType";

const SESSION_KEYS: [&str; 3] = [TOKEN_KEY, USER_KEY, USER_TYPE_KEY];

/// Persists the current session as one unit under fixed storage keys.
#[derive(Debug)]
pub struct SessionStore<S> {
    storage: S,
}

impl<S> SessionStore<S>
where
    S: KeyValueStorage,
{
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn save(&self, session: &Session) -> Result<(), StorageError> {
        let user = serde_json::to_string(&session.identity).map_err(StorageError::Encode)?;
        self.storage.apply(vec![
            StorageOp::set(TOKEN_KEY, session.token.expose()),
            StorageOp::set(USER_KEY, user),
            StorageOp::set(USER_TYPE_KEY, session.user_type.as_str()),
        ])?;
        debug!(
            event_name = "session.store.saved",
            role = %session.identity.role,
            user_type = %session.user_type,
            "session persisted"
        );
        Ok(())
    }

    /// Rebuilds the persisted session. Anything missing or malformed is
    /// treated as no session and the leftovers are cleared.
    pub fn load(&self) -> Option<Session> {
        match self.read() {
            Ok(Some(session)) => Some(session),
            Ok(None) => None,
            Err(reason) => {
                warn!(
                    event_name = "session.store.corrupt",
                    failure_class = FailureClass::SessionCorruption.as_str(),
                    reason = %reason,
                    "discarding unusable persisted session"
                );
                if let Err(error) = self.clear() {
                    warn!(
                        event_name = "session.store.clear_failed",
                        error = %error,
                        "could not remove corrupt session remnants"
                    );
                }
                None
            }
        }
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        self.storage.apply(SESSION_KEYS.iter().map(|key| StorageOp::remove(*key)).collect())
    }

    fn read(&self) -> Result<Option<Session>, String> {
        let token = self.storage.get(TOKEN_KEY).map_err(|error| error.to_string())?;
        let user = self.storage.get(USER_KEY).map_err(|error| error.to_string())?;
        let user_type = self.storage.get(USER_TYPE_KEY).map_err(|error| error.to_string())?;

        let (token, user, user_type) = match (token, user, user_type) {
            (None, None, None) => return Ok(None),
            (Some(token), Some(user), Some(user_type)) => (token, user, user_type),
            _ => return Err("session fields are only partially present".to_string()),
        };

        let token = SessionToken::new(token).map_err(|error| error.to_string())?;
        let identity: Identity =
            serde_json::from_str(&user).map_err(|error| format!("user record: {error}"))?;
        if identity.email.trim().is_empty() {
            return Err("user record has an empty email".to_string());
        }
        let user_type =
            user_type.parse::<LoginPortal>().map_err(|error| format!("user type: {error}"))?;

        Ok(Some(Session::new(identity, token, user_type)))
    }
}
