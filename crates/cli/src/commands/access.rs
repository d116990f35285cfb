use serde_json::json;
use stonequote_core::{Identity, LoginPortal, Navigator, Role, Session, SessionToken};

use crate::commands::CommandResult;

/// Previews a navigation without touching any persisted session.
pub fn run(role: Option<Role>, path: &str) -> CommandResult {
    let session = match role.map(preview_session).transpose() {
        Ok(session) => session,
        Err(error) => return CommandResult::failure("access", "session", error.to_string(), 1),
    };

    let outcome = Navigator::default().plan(session.as_ref(), path);
    let message = match outcome.redirect {
        None => format!("{path} is allowed"),
        Some(_) => format!("{path} redirects to {}", outcome.location),
    };
    CommandResult::success_with(
        "access",
        message,
        Some(json!({
            "role": role.map(|role| role.as_str()),
            "outcome": outcome,
        })),
    )
}

fn preview_session(role: Role) -> Result<Session, stonequote_core::auth::SessionError> {
    let portal = match role {
        Role::User => LoginPortal::User,
        Role::Admin => LoginPortal::Admin,
        Role::SuperAdmin => LoginPortal::SuperAdmin,
    };
    Ok(Session::new(
        Identity { email: format!("preview-{role}@stonequote.local"), full_name: None, role },
        SessionToken::new("preview")?,
        portal,
    ))
}
