use serde_json::json;
use stonequote_core::config::AppConfig;
use stonequote_core::{FileStorage, SessionStore};

use crate::commands::{load_config, CommandResult};

pub fn run() -> CommandResult {
    match load_config("whoami") {
        Ok(config) => execute(&config),
        Err(failure) => failure,
    }
}

pub fn execute(config: &AppConfig) -> CommandResult {
    let store = SessionStore::new(FileStorage::new(&config.storage.session_file));
    match store.load() {
        Some(session) => CommandResult::success_with(
            "whoami",
            format!("{} ({})", session.identity.display_name(), session.role()),
            Some(json!({ "identity": session.identity, "user_type": session.user_type })),
        ),
        None => CommandResult::failure("whoami", "no_session", "not signed in", 1),
    }
}
