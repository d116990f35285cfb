use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::flows::steps::QuoteStep;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthServiceConfig,
    pub storage: StorageConfig,
    pub wizard: WizardConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
    /// Browser contexts untouched for this long are dropped.
    pub context_idle_secs: u64,
    pub max_contexts: usize,
}

/// Where the external credential-verification service lives.
#[derive(Clone, Debug)]
pub struct AuthServiceConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub user_login_path: String,
    pub admin_login_path: String,
    pub super_admin_login_path: String,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub session_file: PathBuf,
}

#[derive(Clone, Debug, Default)]
pub struct WizardConfig {
    /// Step slug to the fields that must be filled before leaving that step.
    /// Empty means advancing is never blocked.
    pub required_fields: BTreeMap<String, Vec<String>>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub bind_address: Option<String>,
    pub port: Option<u16>,
    pub auth_base_url: Option<String>,
    pub session_file: Option<PathBuf>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AuthServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:4000".to_string(),
            timeout_secs: 10,
            user_login_path: "/api/auth/login".to_string(),
            admin_login_path: "/api/admin/login".to_string(),
            super_admin_login_path: "/api/super-admin/login".to_string(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
                context_idle_secs: 1800,
                max_contexts: 10_000,
            },
            auth: AuthServiceConfig::default(),
            storage: StorageConfig { session_file: PathBuf::from(".stonequote/session.json") },
            wizard: WizardConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("stonequote.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
            if let Some(context_idle_secs) = server.context_idle_secs {
                self.server.context_idle_secs = context_idle_secs;
            }
            if let Some(max_contexts) = server.max_contexts {
                self.server.max_contexts = max_contexts;
            }
        }

        if let Some(auth) = patch.auth {
            if let Some(base_url) = auth.base_url {
                self.auth.base_url = base_url;
            }
            if let Some(timeout_secs) = auth.timeout_secs {
                self.auth.timeout_secs = timeout_secs;
            }
            if let Some(path) = auth.user_login_path {
                self.auth.user_login_path = path;
            }
            if let Some(path) = auth.admin_login_path {
                self.auth.admin_login_path = path;
            }
            if let Some(path) = auth.super_admin_login_path {
                self.auth.super_admin_login_path = path;
            }
        }

        if let Some(storage) = patch.storage {
            if let Some(session_file) = storage.session_file {
                self.storage.session_file = session_file;
            }
        }

        if let Some(wizard) = patch.wizard {
            if let Some(required_fields) = wizard.required_fields {
                self.wizard.required_fields = required_fields;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("STONEQUOTE_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("STONEQUOTE_SERVER_PORT") {
            self.server.port = parse_u16("STONEQUOTE_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("STONEQUOTE_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("STONEQUOTE_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }
        if let Some(value) = read_env("STONEQUOTE_SERVER_CONTEXT_IDLE_SECS") {
            self.server.context_idle_secs =
                parse_u64("STONEQUOTE_SERVER_CONTEXT_IDLE_SECS", &value)?;
        }
        if let Some(value) = read_env("STONEQUOTE_SERVER_MAX_CONTEXTS") {
            self.server.max_contexts = parse_usize("STONEQUOTE_SERVER_MAX_CONTEXTS", &value)?;
        }

        if let Some(value) = read_env("STONEQUOTE_AUTH_BASE_URL") {
            self.auth.base_url = value;
        }
        if let Some(value) = read_env("STONEQUOTE_AUTH_TIMEOUT_SECS") {
            self.auth.timeout_secs = parse_u64("STONEQUOTE_AUTH_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("STONEQUOTE_AUTH_USER_LOGIN_PATH") {
            self.auth.user_login_path = value;
        }
        if let Some(value) = read_env("STONEQUOTE_AUTH_ADMIN_LOGIN_PATH") {
            self.auth.admin_login_path = value;
        }
        if let Some(value) = read_env("STONEQUOTE_AUTH_SUPER_ADMIN_LOGIN_PATH") {
            self.auth.super_admin_login_path = value;
        }

        if let Some(value) = read_env("STONEQUOTE_STORAGE_SESSION_FILE") {
            self.storage.session_file = PathBuf::from(value);
        }

        let log_level =
            read_env("STONEQUOTE_LOGGING_LEVEL").or_else(|| read_env("STONEQUOTE_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("STONEQUOTE_LOGGING_FORMAT").or_else(|| read_env("STONEQUOTE_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = bind_address;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        if let Some(base_url) = overrides.auth_base_url {
            self.auth.base_url = base_url;
        }
        if let Some(session_file) = overrides.session_file {
            self.storage.session_file = session_file;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_server(&self.server)?;
        validate_auth(&self.auth)?;
        validate_storage(&self.storage)?;
        validate_wizard(&self.wizard)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("stonequote.toml"), PathBuf::from("config/stonequote.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }

    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    if server.context_idle_secs == 0 {
        return Err(ConfigError::Validation(
            "server.context_idle_secs must be greater than zero".to_string(),
        ));
    }

    if server.max_contexts == 0 {
        return Err(ConfigError::Validation(
            "server.max_contexts must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_auth(auth: &AuthServiceConfig) -> Result<(), ConfigError> {
    if !auth.base_url.starts_with("http://") && !auth.base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "auth.base_url must start with http:// or https://".to_string(),
        ));
    }

    if auth.timeout_secs == 0 || auth.timeout_secs > 120 {
        return Err(ConfigError::Validation(
            "auth.timeout_secs must be in range 1..=120".to_string(),
        ));
    }

    for (key, path) in [
        ("auth.user_login_path", &auth.user_login_path),
        ("auth.admin_login_path", &auth.admin_login_path),
        ("auth.super_admin_login_path", &auth.super_admin_login_path),
    ] {
        if !path.starts_with('/') {
            return Err(ConfigError::Validation(format!("{key} must start with `/`")));
        }
    }

    Ok(())
}

fn validate_storage(storage: &StorageConfig) -> Result<(), ConfigError> {
    if storage.session_file.as_os_str().is_empty() {
        return Err(ConfigError::Validation(
            "storage.session_file must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_wizard(wizard: &WizardConfig) -> Result<(), ConfigError> {
    for (step, fields) in &wizard.required_fields {
        if step.parse::<QuoteStep>().is_err() {
            return Err(ConfigError::Validation(format!(
                "wizard.required_fields has unknown step `{step}` (expected one of {})",
                QuoteStep::ALL.iter().map(|step| step.slug()).collect::<Vec<_>>().join("|")
            )));
        }
        if fields.iter().any(|field| field.trim().is_empty()) {
            return Err(ConfigError::Validation(format!(
                "wizard.required_fields.{step} contains an empty field name"
            )));
        }
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    server: Option<ServerPatch>,
    auth: Option<AuthPatch>,
    storage: Option<StoragePatch>,
    wizard: Option<WizardPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
    context_idle_secs: Option<u64>,
    max_contexts: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthPatch {
    base_url: Option<String>,
    timeout_secs: Option<u64>,
    user_login_path: Option<String>,
    admin_login_path: Option<String>,
    super_admin_login_path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StoragePatch {
    session_file: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct WizardPatch {
    required_fields: Option<BTreeMap<String, Vec<String>>>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
