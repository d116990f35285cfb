use serde::{Deserialize, Serialize};

use crate::auth::role::{AllowedRoles, Role};
use crate::auth::session::Session;

/// Access policy attached to a non-public screen. Public screens carry no
/// requirement at all.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRequirement {
    pub allowed_roles: AllowedRoles,
}

impl RouteRequirement {
    pub fn authenticated() -> Self {
        Self { allowed_roles: AllowedRoles::any_authenticated() }
    }

    pub fn roles(roles: impl IntoIterator<Item = Role>) -> Self {
        Self { allowed_roles: AllowedRoles::only(roles) }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardDecision {
    Allow,
    DenyUnauthenticated,
    DenyForbidden,
}

impl GuardDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

pub fn evaluate(session: Option<&Session>, requirement: Option<&RouteRequirement>) -> GuardDecision {
    let Some(requirement) = requirement else {
        return GuardDecision::Allow;
    };
    let Some(session) = session else {
        return GuardDecision::DenyUnauthenticated;
    };
    if !requirement.allowed_roles.is_empty() && !requirement.allowed_roles.contains(session.role())
    {
        return GuardDecision::DenyForbidden;
    }
    GuardDecision::Allow
}
