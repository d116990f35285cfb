use stonequote_core::config::AppConfig;
use stonequote_core::{FileStorage, SessionStore};

use crate::commands::{load_config, CommandResult};

pub fn run() -> CommandResult {
    match load_config("logout") {
        Ok(config) => execute(&config),
        Err(failure) => failure,
    }
}

pub fn execute(config: &AppConfig) -> CommandResult {
    let store = SessionStore::new(FileStorage::new(&config.storage.session_file));
    match store.clear() {
        Ok(()) => CommandResult::success("logout", "session cleared"),
        Err(error) => CommandResult::failure("logout", "storage", error.to_string(), 6),
    }
}
