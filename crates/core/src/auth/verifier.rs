//! Credential verification: the external login service seen through a trait.
//!
//! `HttpCredentialVerifier` speaks the JSON contract of the role-specific
//! login endpoints:
//!
//! - request:  `POST <base_url><portal path>` with `{"email", "password"}`
//! - success:  2xx with `{"token", "user": {"email", "full_name"?, "role"}}`
//! - failure:  non-2xx with `{"error"}`

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::auth::role::Role;
use crate::auth::session::{Identity, LoginPortal, SessionToken};
use crate::config::AuthServiceConfig;

#[derive(Clone, Debug)]
pub struct Credentials {
    pub email: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self { email: email.into(), password: SecretString::from(password.into()) }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifiedCredentials {
    pub identity: Identity,
    pub token: SessionToken,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum VerificationError {
    /// The service refused the credentials; the reason is shown on the form.
    #[error("{reason}")]
    Rejected { reason: String },
    #[error("credential service unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(
        &self,
        portal: LoginPortal,
        credentials: &Credentials,
    ) -> Result<VerifiedCredentials, VerificationError>;
}

#[derive(Serialize)]
struct LoginRequestBody<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginSuccessBody {
    token: String,
    user: Identity,
}

#[derive(Deserialize)]
struct LoginErrorBody {
    error: String,
}

#[derive(Clone, Debug)]
pub struct HttpCredentialVerifier {
    client: Client,
    base_url: String,
    user_login_path: String,
    admin_login_path: String,
    super_admin_login_path: String,
}

impl HttpCredentialVerifier {
    pub fn new(config: &AuthServiceConfig) -> Result<Self, VerificationError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| {
                VerificationError::Unavailable(format!("http client init failed: {error}"))
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            user_login_path: config.user_login_path.clone(),
            admin_login_path: config.admin_login_path.clone(),
            super_admin_login_path: config.super_admin_login_path.clone(),
        })
    }

    pub fn endpoint(&self, portal: LoginPortal) -> String {
        let path = match portal {
            LoginPortal::User => &self.user_login_path,
            LoginPortal::Admin => &self.admin_login_path,
            LoginPortal::SuperAdmin => &self.super_admin_login_path,
        };
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl CredentialVerifier for HttpCredentialVerifier {
    async fn verify(
        &self,
        portal: LoginPortal,
        credentials: &Credentials,
    ) -> Result<VerifiedCredentials, VerificationError> {
        let endpoint = self.endpoint(portal);
        let response = self
            .client
            .post(&endpoint)
            .json(&LoginRequestBody {
                email: &credentials.email,
                password: credentials.password.expose_secret(),
            })
            .send()
            .await
            .map_err(|error| {
                warn!(
                    event_name = "login.verifier.transport_error",
                    portal = %portal,
                    endpoint = %endpoint,
                    error = %error,
                    "credential service request failed"
                );
                VerificationError::Unavailable(error.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if let Ok(LoginErrorBody { error }) = serde_json::from_str::<LoginErrorBody>(&body) {
                debug!(
                    event_name = "login.verifier.rejected",
                    portal = %portal,
                    status = status.as_u16(),
                    "credential service rejected login"
                );
                return Err(VerificationError::Rejected { reason: error });
            }
            if status.is_server_error() {
                return Err(VerificationError::Unavailable(format!(
                    "credential service returned {status}"
                )));
            }
            return Err(VerificationError::Rejected {
                reason: format!("login failed ({})", status.as_u16()),
            });
        }

        let body: LoginSuccessBody = response.json().await.map_err(|error| {
            VerificationError::Unavailable(format!("malformed login response: {error}"))
        })?;
        let token = SessionToken::new(body.token).map_err(|_| {
            VerificationError::Unavailable("malformed login response: empty token".to_string())
        })?;

        Ok(VerifiedCredentials { identity: body.user, token })
    }
}

#[derive(Clone, Debug)]
struct Account {
    password: String,
    identity: Identity,
}

/// Verifier backed by a fixed account list, for tests and local demos.
#[derive(Clone, Debug, Default)]
pub struct InMemoryCredentialVerifier {
    accounts: Arc<Mutex<HashMap<(LoginPortal, String), Account>>>,
    calls: Arc<AtomicUsize>,
}

impl InMemoryCredentialVerifier {
    pub fn with_account(
        self,
        portal: LoginPortal,
        email: impl Into<String>,
        password: impl Into<String>,
        role: Role,
    ) -> Self {
        let email = email.into();
        let account = Account {
            password: password.into(),
            identity: Identity { email: email.clone(), full_name: None, role },
        };
        match self.accounts.lock() {
            Ok(mut accounts) => accounts.insert((portal, email), account),
            Err(poisoned) => poisoned.into_inner().insert((portal, email), account),
        };
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialVerifier for InMemoryCredentialVerifier {
    async fn verify(
        &self,
        portal: LoginPortal,
        credentials: &Credentials,
    ) -> Result<VerifiedCredentials, VerificationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let account = match self.accounts.lock() {
            Ok(accounts) => accounts.get(&(portal, credentials.email.clone())).cloned(),
            Err(poisoned) => poisoned.into_inner().get(&(portal, credentials.email.clone())).cloned(),
        };

        match account {
            Some(account) if account.password == credentials.password.expose_secret() => {
                let token = SessionToken::new(format!("tok-{}", uuid::Uuid::new_v4()))
                    .map_err(|error| VerificationError::Unavailable(error.to_string()))?;
                Ok(VerifiedCredentials { identity: account.identity, token })
            }
            _ => Err(VerificationError::Rejected { reason: "Invalid credentials".to_string() }),
        }
    }
}
