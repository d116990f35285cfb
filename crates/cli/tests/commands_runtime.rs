use std::env;
use std::path::Path;
use std::sync::{Mutex, OnceLock};

use serde_json::Value;
use stonequote_cli::commands::{access, login, logout, routes, whoami};
use stonequote_core::config::AppConfig;
use stonequote_core::{InMemoryCredentialVerifier, LoginPortal, Role};

#[test]
fn routes_lists_every_screen_with_role_homes() {
    let result = routes::run();
    assert_eq!(result.exit_code, 0);

    let payload = parse_payload(&result.output);
    assert_eq!(payload["command"], "routes");
    assert_eq!(payload["status"], "ok");
    assert_eq!(payload["data"]["routes"].as_array().map(Vec::len), Some(11));
    assert_eq!(payload["data"]["homes"]["super_admin"], "/super-admin");
    assert_eq!(payload["data"]["homes"]["user"], "/quotation");
    assert_eq!(payload["data"]["homes"]["admin"], "/admin-panel");
}

#[test]
fn access_redirects_admin_away_from_super_admin_dashboard() {
    let result = access::run(Some(Role::Admin), "/super-admin");
    assert_eq!(result.exit_code, 0);

    let payload = parse_payload(&result.output);
    assert_eq!(payload["data"]["role"], "admin");
    assert_eq!(payload["data"]["outcome"]["location"], "/unauthorized");
    assert_eq!(payload["data"]["outcome"]["redirect"], "forbidden");
}

#[test]
fn anonymous_access_to_admin_area_lands_on_admin_login() {
    let result = access::run(None, "/admin-panel/quotations");
    let payload = parse_payload(&result.output);

    assert_eq!(payload["data"]["role"], Value::Null);
    assert_eq!(payload["data"]["outcome"]["location"], "/admin-login");
}

#[test]
fn login_persists_session_that_whoami_reads_back() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = config_with_session_file(&dir.path().join("session.json"));
    let verifier = InMemoryCredentialVerifier::default().with_account(
        LoginPortal::Admin,
        "ops@example.com",
        "s3cret",
        Role::Admin,
    );

    let result = login::execute(
        &config,
        &verifier,
        LoginPortal::Admin,
        "ops@example.com",
        "s3cret".to_owned(),
    );
    assert_eq!(result.exit_code, 0, "{}", result.output);
    let payload = parse_payload(&result.output);
    assert_eq!(payload["data"]["redirect"], "/admin-panel");
    assert_eq!(payload["data"]["user_type"], "admin");

    let whoami = whoami::execute(&config);
    assert_eq!(whoami.exit_code, 0);
    let payload = parse_payload(&whoami.output);
    assert_eq!(payload["data"]["identity"]["email"], "ops@example.com");
    assert_eq!(payload["data"]["identity"]["role"], "admin");
}

#[test]
fn rejected_login_reports_authentication_failure_and_writes_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let session_file = dir.path().join("session.json");
    let config = config_with_session_file(&session_file);
    let verifier = InMemoryCredentialVerifier::default();

    let result =
        login::execute(&config, &verifier, LoginPortal::User, "nobody@example.com", "x".to_owned());
    assert_eq!(result.exit_code, 4);
    assert_eq!(parse_payload(&result.output)["error_class"], "authentication_failure");
    assert!(!session_file.exists());
}

#[test]
fn blank_login_never_reaches_the_service() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = config_with_session_file(&dir.path().join("session.json"));
    let verifier = InMemoryCredentialVerifier::default();

    let result = login::execute(&config, &verifier, LoginPortal::User, "  ", String::new());
    assert_eq!(result.exit_code, 4);
    assert_eq!(verifier.calls(), 0);
}

#[test]
fn logout_clears_the_persisted_session() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = config_with_session_file(&dir.path().join("session.json"));
    let verifier = InMemoryCredentialVerifier::default().with_account(
        LoginPortal::User,
        "pat@example.com",
        "pw",
        Role::User,
    );
    let login =
        login::execute(&config, &verifier, LoginPortal::User, "pat@example.com", "pw".to_owned());
    assert_eq!(login.exit_code, 0, "{}", login.output);

    let result = logout::execute(&config);
    assert_eq!(result.exit_code, 0);

    let whoami = whoami::execute(&config);
    assert_eq!(whoami.exit_code, 1);
    assert_eq!(parse_payload(&whoami.output)["error_class"], "no_session");
}

#[test]
fn whoami_reads_session_file_from_env() {
    let dir = tempfile::tempdir().expect("tempdir");
    let session_file = dir.path().join("nested").join("session.json");
    let session_file_value = session_file.display().to_string();

    with_env(&[("STONEQUOTE_STORAGE_SESSION_FILE", session_file_value.as_str())], || {
        let result = whoami::run();
        assert_eq!(result.exit_code, 1);
        assert_eq!(parse_payload(&result.output)["command"], "whoami");

        let result = logout::run();
        assert_eq!(result.exit_code, 0, "clearing a missing session is not an error");
    });
}

#[test]
fn invalid_env_reports_config_validation() {
    with_env(&[("STONEQUOTE_SERVER_PORT", "eighty")], || {
        let result = whoami::run();
        assert_eq!(result.exit_code, 2);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn login_without_password_env_fails_before_contacting_the_service() {
    with_env(&[], || {
        let result = login::run(LoginPortal::User, "pat@example.com");
        assert_eq!(result.exit_code, 2);
        assert_eq!(parse_payload(&result.output)["error_class"], "missing_password");
    });
}

fn config_with_session_file(path: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.storage.session_file = path.to_path_buf();
    config
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid json")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "STONEQUOTE_SERVER_BIND_ADDRESS",
        "STONEQUOTE_SERVER_PORT",
        "STONEQUOTE_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "STONEQUOTE_SERVER_CONTEXT_IDLE_SECS",
        "STONEQUOTE_SERVER_MAX_CONTEXTS",
        "STONEQUOTE_AUTH_BASE_URL",
        "STONEQUOTE_AUTH_TIMEOUT_SECS",
        "STONEQUOTE_AUTH_USER_LOGIN_PATH",
        "STONEQUOTE_AUTH_ADMIN_LOGIN_PATH",
        "STONEQUOTE_AUTH_SUPER_ADMIN_LOGIN_PATH",
        "STONEQUOTE_STORAGE_SESSION_FILE",
        "STONEQUOTE_LOGGING_LEVEL",
        "STONEQUOTE_LOGGING_FORMAT",
        "STONEQUOTE_LOG_LEVEL",
        "STONEQUOTE_LOG_FORMAT",
        login::PASSWORD_ENV,
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
