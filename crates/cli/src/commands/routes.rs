use serde_json::json;
use stonequote_core::routing::{home_screen_for, RouteTable};
use stonequote_core::Role;

use crate::commands::CommandResult;

pub fn run() -> CommandResult {
    let table = RouteTable::standard();
    let routes: Vec<_> = table
        .entries()
        .iter()
        .map(|entry| {
            let access = match &entry.requirement {
                None => json!("public"),
                Some(requirement) if requirement.allowed_roles.is_empty() => {
                    json!("any_authenticated")
                }
                Some(requirement) => json!(requirement
                    .allowed_roles
                    .iter()
                    .map(|role| role.as_str())
                    .collect::<Vec<_>>()),
            };
            json!({ "path": entry.path, "screen": entry.screen, "access": access })
        })
        .collect();
    let homes: serde_json::Map<_, _> = Role::ALL
        .into_iter()
        .map(|role| (role.as_str().to_string(), json!(home_screen_for(role).path())))
        .collect();

    CommandResult::success_with(
        "routes",
        format!("{} routes; unmatched paths redirect to /login", routes.len()),
        Some(json!({ "routes": routes, "homes": homes })),
    )
}
