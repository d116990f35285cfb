use serde::Serialize;
use tracing::{debug, info};

use crate::auth::guard::{evaluate, GuardDecision};
use crate::auth::session::Session;
use crate::errors::FailureClass;
use crate::routing::routes::{login_screen_for, RouteTable, Screen};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RedirectReason {
    Unauthenticated,
    Forbidden,
    Unmatched,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NavigationOutcome {
    pub requested: String,
    /// Where the caller ends up; differs from `requested` on redirect.
    pub location: &'static str,
    pub screen: Screen,
    /// `None` when the path matched no route and the guard never ran.
    pub decision: Option<GuardDecision>,
    pub redirect: Option<RedirectReason>,
}

impl NavigationOutcome {
    pub fn is_redirect(&self) -> bool {
        self.redirect.is_some()
    }
}

/// Owns the current location of one browser context.
#[derive(Clone, Debug)]
pub struct Navigator {
    routes: RouteTable,
    location: &'static str,
}

impl Navigator {
    pub fn new(routes: RouteTable) -> Self {
        Self { routes, location: Screen::Login.path() }
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn location(&self) -> &'static str {
        self.location
    }

    /// Decides where a request for `path` lands without moving.
    pub fn plan(&self, session: Option<&Session>, path: &str) -> NavigationOutcome {
        let requested = path.to_string();
        let Some(entry) = self.routes.resolve(path) else {
            return NavigationOutcome {
                requested,
                location: Screen::Login.path(),
                screen: Screen::Login,
                decision: None,
                redirect: Some(RedirectReason::Unmatched),
            };
        };

        let decision = evaluate(session, entry.requirement.as_ref());
        let (screen, redirect) = match decision {
            GuardDecision::Allow => (entry.screen, None),
            GuardDecision::DenyUnauthenticated => {
                (login_screen_for(path), Some(RedirectReason::Unauthenticated))
            }
            GuardDecision::DenyForbidden => (Screen::Unauthorized, Some(RedirectReason::Forbidden)),
        };

        NavigationOutcome {
            requested,
            location: screen.path(),
            screen,
            decision: Some(decision),
            redirect,
        }
    }

    pub fn navigate(&mut self, session: Option<&Session>, path: &str) -> NavigationOutcome {
        let outcome = self.plan(session, path);
        match outcome.redirect {
            Some(RedirectReason::Unmatched) => debug!(
                event_name = "router.navigation.fallthrough",
                failure_class = FailureClass::NavigationFallthrough.as_str(),
                requested = %outcome.requested,
                location = outcome.location,
                "unmatched path redirected to login"
            ),
            Some(RedirectReason::Forbidden) => info!(
                event_name = "router.navigation.forbidden",
                failure_class = FailureClass::AuthorizationFailure.as_str(),
                requested = %outcome.requested,
                role = session.map(|session| session.role().as_str()).unwrap_or("none"),
                "navigation denied for role"
            ),
            Some(RedirectReason::Unauthenticated) => debug!(
                event_name = "router.navigation.login_required",
                requested = %outcome.requested,
                location = outcome.location,
                "navigation requires a session"
            ),
            None => debug!(
                event_name = "router.navigation.allowed",
                location = outcome.location,
                "navigation allowed"
            ),
        }
        self.location = outcome.location;
        outcome
    }
}

impl Default for Navigator {
    fn default() -> Self {
        Self::new(RouteTable::standard())
    }
}

#[cfg(test)]
mod tests {
    use super::{Navigator, RedirectReason};
    use crate::auth::guard::GuardDecision;
    use crate::auth::role::Role;
    use crate::auth::session::{Identity, LoginPortal, Session, SessionToken};
    use crate::routing::routes::{RouteTable, Screen};

    fn session(role: Role) -> Session {
        Session::new(
            Identity { email: "someone@example.com".into(), full_name: None, role },
            SessionToken::new("tok-1").expect("token"),
            LoginPortal::User,
        )
    }

    const PROTECTED: [&str; 7] = [
        "/dashboard",
        "/quotation",
        "/admin-panel",
        "/admin-panel/quotations",
        "/admin-panel/users",
        "/super-admin",
        "/super-admin/admins",
    ];

    #[test]
    fn anonymous_requests_for_protected_paths_go_to_prefix_chosen_login() {
        let navigator = Navigator::default();
        for path in PROTECTED {
            let outcome = navigator.plan(None, path);
            assert_eq!(outcome.decision, Some(GuardDecision::DenyUnauthenticated), "{path}");
            assert_eq!(outcome.redirect, Some(RedirectReason::Unauthenticated));
        }
        assert_eq!(navigator.plan(None, "/super-admin").location, "/super-admin-login");
        assert_eq!(navigator.plan(None, "/admin-panel/users").location, "/admin-login");
        assert_eq!(navigator.plan(None, "/quotation").location, "/login");
    }

    #[test]
    fn users_on_admin_routes_are_forbidden_not_sent_to_login() {
        let navigator = Navigator::default();
        let user = session(Role::User);
        for path in ["/admin-panel", "/admin-panel/quotations", "/admin-panel/users"] {
            let outcome = navigator.plan(Some(&user), path);
            assert_eq!(outcome.decision, Some(GuardDecision::DenyForbidden));
            assert_eq!(outcome.screen, Screen::Unauthorized);
            assert_eq!(outcome.location, "/unauthorized");
        }
    }

    #[test]
    fn admins_may_not_open_super_admin_screens() {
        let navigator = Navigator::default();
        let outcome = navigator.plan(Some(&session(Role::Admin)), "/super-admin");
        assert_eq!(outcome.screen, Screen::Unauthorized);

        let outcome = navigator.plan(Some(&session(Role::SuperAdmin)), "/admin-panel");
        assert_eq!(outcome.screen, Screen::AdminDashboard);
        assert!(!outcome.is_redirect());
    }

    #[test]
    fn unmatched_paths_fall_through_to_login_regardless_of_session() {
        let mut navigator = Navigator::new(RouteTable::standard());
        for current in [None, Some(session(Role::SuperAdmin))] {
            let outcome = navigator.navigate(current.as_ref(), "/admin-secrets");
            assert_eq!(outcome.location, "/login");
            assert_eq!(outcome.redirect, Some(RedirectReason::Unmatched));
            assert_eq!(outcome.decision, None);
        }
        assert_eq!(navigator.location(), "/login");
    }

    #[test]
    fn navigate_moves_the_location_plan_does_not() {
        let mut navigator = Navigator::default();
        let user = session(Role::User);

        navigator.plan(Some(&user), "/quotation");
        assert_eq!(navigator.location(), "/login");

        navigator.navigate(Some(&user), "/quotation");
        assert_eq!(navigator.location(), "/quotation");
    }
}
