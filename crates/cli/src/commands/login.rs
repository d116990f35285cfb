use std::env;
use std::sync::Arc;

use serde_json::json;
use stonequote_core::config::AppConfig;
use stonequote_core::{
    AdvancePolicy, AppContext, CredentialVerifier, Credentials, FileStorage,
    HttpCredentialVerifier, LoginError, LoginPortal, RoleLoginFlow, TracingAuditSink,
};
use tokio::sync::Mutex;

use crate::commands::{load_config, CommandResult};

pub const PASSWORD_ENV: &str = "STONEQUOTE_PASSWORD";

pub fn run(portal: LoginPortal, email: &str) -> CommandResult {
    let config = match load_config("login") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let Some(password) = env::var(PASSWORD_ENV).ok().filter(|value| !value.is_empty()) else {
        return CommandResult::failure(
            "login",
            "missing_password",
            format!("set {PASSWORD_ENV} to the account password"),
            2,
        );
    };
    let verifier = match HttpCredentialVerifier::new(&config.auth) {
        Ok(verifier) => verifier,
        Err(error) => return CommandResult::failure("login", "verifier_init", error.to_string(), 3),
    };

    execute(&config, &verifier, portal, email, password)
}

/// Runs the portal login against `verifier` and persists the session to
/// `storage.session_file`.
pub fn execute(
    config: &AppConfig,
    verifier: &dyn CredentialVerifier,
    portal: LoginPortal,
    email: &str,
    password: String,
) -> CommandResult {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "login",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let context = Mutex::new(AppContext::new(
        FileStorage::new(&config.storage.session_file),
        AdvancePolicy::unchecked(),
        Arc::new(TracingAuditSink),
    ));
    let flow = RoleLoginFlow::new(portal, verifier);
    let result = runtime.block_on(flow.submit(&context, Credentials::new(email, password)));

    match result {
        Ok(success) => CommandResult::success_with(
            "login",
            format!("signed in as {} ({})", success.identity.email, success.identity.role),
            Some(json!({
                "identity": success.identity,
                "user_type": success.user_type,
                "redirect": success.navigation.location,
                "session_file": config.storage.session_file.display().to_string(),
            })),
        ),
        Err(LoginError::Authentication { reason }) => {
            CommandResult::failure("login", "authentication_failure", reason, 4)
        }
        Err(LoginError::Unavailable(message)) => {
            CommandResult::failure("login", "service_unavailable", message, 5)
        }
        Err(LoginError::Storage(error)) => {
            CommandResult::failure("login", "storage", error.to_string(), 6)
        }
        Err(error @ (LoginError::InFlight { .. } | LoginError::Discarded)) => {
            CommandResult::failure("login", "conflict", error.to_string(), 7)
        }
    }
}
