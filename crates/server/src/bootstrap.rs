use std::sync::Arc;
use std::time::Duration;

use stonequote_core::config::{AppConfig, ConfigError};
use stonequote_core::flows::UnknownStep;
use stonequote_core::{AdvancePolicy, HttpCredentialVerifier, TracingAuditSink, VerificationError};
use thiserror::Error;
use tracing::info;

use crate::api::ApiState;
use crate::contexts::ContextRegistry;
use crate::health::HealthState;

pub struct Application {
    pub config: AppConfig,
    pub api: ApiState,
    pub health: HealthState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("wizard policy is invalid: {0}")]
    WizardPolicy(#[from] UnknownStep),
    #[error("credential verifier could not be built: {0}")]
    Verifier(#[source] VerificationError),
}

pub fn bootstrap(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let policy = AdvancePolicy::from_required_fields(&config.wizard.required_fields)?;
    let verifier = HttpCredentialVerifier::new(&config.auth).map_err(BootstrapError::Verifier)?;
    info!(
        event_name = "system.bootstrap.verifier_ready",
        correlation_id = "bootstrap",
        auth_base_url = %config.auth.base_url,
        required_field_checks = !policy.is_unchecked(),
        "credential verifier configured"
    );

    let contexts = ContextRegistry::new(policy, Arc::new(TracingAuditSink)).with_limits(
        Duration::from_secs(config.server.context_idle_secs),
        config.server.max_contexts,
    );
    Ok(Application {
        api: ApiState { contexts: contexts.clone(), verifier: Arc::new(verifier) },
        health: HealthState { contexts, auth_base_url: config.auth.base_url.clone() },
        config,
    })
}
