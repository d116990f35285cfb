use std::fmt;

use serde::Serialize;

use crate::auth::guard::RouteRequirement;
use crate::auth::role::Role;

pub const LOGIN_PATH: &str = "/login";
pub const ADMIN_LOGIN_PATH: &str = "/admin-login";
pub const SUPER_ADMIN_LOGIN_PATH: &str = "/super-admin-login";
pub const UNAUTHORIZED_PATH: &str = "/unauthorized";
pub const DASHBOARD_PATH: &str = "/dashboard";
pub const QUOTATION_PATH: &str = "/quotation";
pub const ADMIN_PANEL_PATH: &str = "/admin-panel";
pub const ADMIN_QUOTATIONS_PATH: &str = "/admin-panel/quotations";
pub const ADMIN_USERS_PATH: &str = "/admin-panel/users";
pub const SUPER_ADMIN_PATH: &str = "/super-admin";
pub const SUPER_ADMIN_ADMINS_PATH: &str = "/super-admin/admins";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Screen {
    Login,
    AdminLogin,
    SuperAdminLogin,
    Unauthorized,
    Dashboard,
    Quotation,
    AdminDashboard,
    AdminQuotations,
    AdminUsers,
    SuperAdminPanel,
    SuperAdminAdmins,
}

impl Screen {
    pub const ALL: [Screen; 11] = [
        Screen::Login,
        Screen::AdminLogin,
        Screen::SuperAdminLogin,
        Screen::Unauthorized,
        Screen::Dashboard,
        Screen::Quotation,
        Screen::AdminDashboard,
        Screen::AdminQuotations,
        Screen::AdminUsers,
        Screen::SuperAdminPanel,
        Screen::SuperAdminAdmins,
    ];

    pub fn path(self) -> &'static str {
        match self {
            Self::Login => LOGIN_PATH,
            Self::AdminLogin => ADMIN_LOGIN_PATH,
            Self::SuperAdminLogin => SUPER_ADMIN_LOGIN_PATH,
            Self::Unauthorized => UNAUTHORIZED_PATH,
            Self::Dashboard => DASHBOARD_PATH,
            Self::Quotation => QUOTATION_PATH,
            Self::AdminDashboard => ADMIN_PANEL_PATH,
            Self::AdminQuotations => ADMIN_QUOTATIONS_PATH,
            Self::AdminUsers => ADMIN_USERS_PATH,
            Self::SuperAdminPanel => SUPER_ADMIN_PATH,
            Self::SuperAdminAdmins => SUPER_ADMIN_ADMINS_PATH,
        }
    }

    /// `None` marks a public screen.
    pub fn requirement(self) -> Option<RouteRequirement> {
        match self {
            Self::Login | Self::AdminLogin | Self::SuperAdminLogin | Self::Unauthorized => None,
            Self::Dashboard | Self::Quotation => Some(RouteRequirement::authenticated()),
            Self::AdminDashboard | Self::AdminQuotations | Self::AdminUsers => {
                Some(RouteRequirement::roles([Role::Admin, Role::SuperAdmin]))
            }
            Self::SuperAdminPanel | Self::SuperAdminAdmins => {
                Some(RouteRequirement::roles([Role::SuperAdmin]))
            }
        }
    }
}

impl fmt::Display for Screen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RouteEntry {
    pub path: &'static str,
    pub screen: Screen,
    pub requirement: Option<RouteRequirement>,
}

/// Enumerable `(path, requirement)` list. Anything not listed falls through
/// to the catch-all, which sends the caller to `/login`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    pub fn standard() -> Self {
        let entries = Screen::ALL
            .into_iter()
            .map(|screen| RouteEntry {
                path: screen.path(),
                screen,
                requirement: screen.requirement(),
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }

    pub fn resolve(&self, path: &str) -> Option<&RouteEntry> {
        let path = normalize_path(path);
        self.entries.iter().find(|entry| entry.path == path)
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::standard()
    }
}

/// Drops the query string, the fragment and a single trailing slash.
pub fn normalize_path(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    let path = &path[..end];
    match path.strip_suffix('/') {
        Some(trimmed) if !trimmed.is_empty() => trimmed,
        _ => path,
    }
}

/// Login screen for an unauthenticated request, picked by substring so
/// nested admin paths land on the matching portal.
pub fn login_screen_for(path: &str) -> Screen {
    let path = normalize_path(path);
    if path.contains("super-admin") {
        Screen::SuperAdminLogin
    } else if path.contains("admin") {
        Screen::AdminLogin
    } else {
        Screen::Login
    }
}

pub fn home_screen_for(role: Role) -> Screen {
    match role {
        Role::User => Screen::Quotation,
        Role::Admin => Screen::AdminDashboard,
        Role::SuperAdmin => Screen::SuperAdminPanel,
    }
}
