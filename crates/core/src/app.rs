use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::auth::guard::GuardDecision;
use crate::auth::login::{LoginError, LoginSuccess, LoginTicket, PendingLogins};
use crate::auth::session::{LoginPortal, Session};
use crate::auth::storage::{KeyValueStorage, StorageError};
use crate::auth::store::SessionStore;
use crate::auth::verifier::{VerificationError, VerifiedCredentials};
use crate::errors::{ApplicationError, FailureClass};
use crate::flows::engine::{AdvancePolicy, WizardEngine, WizardOutcome};
use crate::flows::steps::WizardCommand;
use crate::routing::navigator::{NavigationOutcome, Navigator, RedirectReason};
use crate::routing::routes::{home_screen_for, Screen};

/// Everything one browser context owns: the persisted session, the current
/// location and the quotation in progress.
pub struct AppContext<S> {
    context_id: Uuid,
    correlation_id: String,
    store: SessionStore<S>,
    session: Option<Session>,
    navigator: Navigator,
    wizard: WizardEngine,
    logins: Arc<PendingLogins>,
    audit: Arc<dyn AuditSink>,
}

impl<S> AppContext<S>
where
    S: KeyValueStorage,
{
    /// Restores any session left in `storage` by an earlier run.
    pub fn new(storage: S, policy: AdvancePolicy, audit: Arc<dyn AuditSink>) -> Self {
        let store = SessionStore::new(storage);
        let session = store.load();
        Self {
            context_id: Uuid::new_v4(),
            correlation_id: "unassigned".to_owned(),
            store,
            session,
            navigator: Navigator::default(),
            wizard: WizardEngine::new(policy),
            logins: Arc::new(PendingLogins::default()),
            audit,
        }
    }

    pub fn context_id(&self) -> Uuid {
        self.context_id
    }

    /// Tags audit events raised by the following calls.
    pub fn set_correlation_id(&mut self, correlation_id: impl Into<String>) {
        self.correlation_id = correlation_id.into();
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn store(&self) -> &SessionStore<S> {
        &self.store
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    pub fn location(&self) -> &'static str {
        self.navigator.location()
    }

    pub fn wizard(&self) -> &WizardEngine {
        &self.wizard
    }

    pub fn logins_in_flight(&self) -> usize {
        self.logins.len()
    }

    /// Moves to `path` through the guard. Any pending login is abandoned.
    pub fn navigate(&mut self, path: &str) -> NavigationOutcome {
        self.cancel_pending_logins();
        let outcome = self.navigator.navigate(self.session.as_ref(), path);
        if let Some(reason) = outcome.redirect {
            let event = AuditEvent::new(
                &self.audit_context(),
                "router.navigation.redirected",
                AuditCategory::Navigation,
                AuditOutcome::Rejected,
            )
            .with_metadata("requested", outcome.requested.clone())
            .with_metadata("location", outcome.location)
            .with_metadata("reason", redirect_label(reason));
            self.audit.emit(event);
        }
        outcome
    }

    /// Claims `portal` for one login. The ticket remembers the current
    /// correlation id so the outcome is audited against the right request.
    pub fn begin_login(&mut self, portal: LoginPortal) -> Result<LoginTicket, LoginError> {
        let Some(generation) = self.logins.acquire(portal) else {
            return Err(LoginError::InFlight { portal });
        };
        Ok(LoginTicket::new(portal, generation, self.correlation_id.clone(), Arc::clone(&self.logins)))
    }

    pub fn finish_login(
        &mut self,
        ticket: LoginTicket,
        verified: Result<VerifiedCredentials, VerificationError>,
    ) -> Result<LoginSuccess, LoginError> {
        if !self.logins.is_current(ticket.generation) {
            info!(
                event_name = "login.result.discarded",
                context_id = %self.context_id,
                correlation_id = %ticket.correlation_id,
                portal = %ticket.portal,
                "login answered after the context moved on"
            );
            return Err(LoginError::Discarded);
        }
        let portal = ticket.portal();
        self.correlation_id = ticket.correlation_id.clone();
        drop(ticket);

        match verified {
            Ok(verified) => self.complete_login(portal, verified),
            Err(VerificationError::Rejected { reason }) => {
                info!(
                    event_name = "login.result.rejected",
                    failure_class = FailureClass::AuthenticationFailure.as_str(),
                    context_id = %self.context_id,
                    portal = %portal,
                    "credentials rejected"
                );
                self.audit_login(portal, AuditOutcome::Rejected, &reason);
                Err(LoginError::Authentication { reason })
            }
            Err(VerificationError::Unavailable(message)) => {
                warn!(
                    event_name = "login.result.unavailable",
                    context_id = %self.context_id,
                    portal = %portal,
                    error = %message,
                    "credential service unavailable"
                );
                self.audit_login(portal, AuditOutcome::Failed, &message);
                Err(LoginError::Unavailable(message))
            }
        }
    }

    /// Persists the verified session, starts a fresh quotation and lands on
    /// the role's home screen. The session is durable before the guard sees
    /// the home route.
    pub fn complete_login(
        &mut self,
        portal: LoginPortal,
        verified: VerifiedCredentials,
    ) -> Result<LoginSuccess, LoginError> {
        let session = Session::new(verified.identity, verified.token, portal);
        self.store.save(&session)?;

        let identity = session.identity.clone();
        self.session = Some(session);
        self.wizard.reset();
        self.audit_login(portal, AuditOutcome::Success, identity.role.as_str());
        info!(
            event_name = "login.result.accepted",
            context_id = %self.context_id,
            portal = %portal,
            role = %identity.role,
            "session established"
        );

        let navigation = self.navigate(home_screen_for(identity.role).path());
        Ok(LoginSuccess { identity, user_type: portal, navigation })
    }

    /// Clears the persisted session before moving anywhere. If clearing
    /// fails the in-memory session is still dropped and the error returned
    /// without navigating.
    pub fn logout(&mut self) -> Result<NavigationOutcome, StorageError> {
        let cleared = self.store.clear();
        let actor = self.actor();
        self.session = None;
        self.wizard.reset();
        self.cancel_pending_logins();

        let outcome = if cleared.is_ok() { AuditOutcome::Success } else { AuditOutcome::Failed };
        self.audit.emit(AuditEvent::new(
            &AuditContext::new(
                Some(self.context_id.to_string()),
                self.correlation_id.clone(),
                actor,
            ),
            "session.logout",
            AuditCategory::Session,
            outcome,
        ));
        cleared?;

        Ok(self.navigate(Screen::Login.path()))
    }

    /// Guard check for API calls that act on a screen without navigating.
    pub fn authorize(&self, path: &str) -> Result<&Session, ApplicationError> {
        let outcome = self.navigator.plan(self.session.as_ref(), path);
        match (outcome.decision, self.session.as_ref()) {
            (Some(GuardDecision::Allow), Some(session)) => Ok(session),
            (Some(GuardDecision::DenyForbidden), Some(session)) => {
                Err(ApplicationError::Forbidden { path: path.to_string(), role: session.role() })
            }
            _ => Err(ApplicationError::Unauthenticated { path: path.to_string() }),
        }
    }

    /// The quotation wizard, for sessions allowed on `/quotation`.
    pub fn quotation(&mut self) -> Result<&mut WizardEngine, ApplicationError> {
        self.authorize(Screen::Quotation.path())?;
        Ok(&mut self.wizard)
    }

    pub fn apply_wizard(
        &mut self,
        command: WizardCommand,
    ) -> Result<WizardOutcome, ApplicationError> {
        self.authorize(Screen::Quotation.path())?;
        let audit = self.audit_context();
        let outcome = self.wizard.apply_with_audit(command, self.audit.as_ref(), &audit)?;
        Ok(outcome)
    }

    fn cancel_pending_logins(&mut self) {
        let pending = self.logins.cancel();
        if pending > 0 {
            info!(
                event_name = "login.ticket.cancelled",
                context_id = %self.context_id,
                pending,
                "pending logins abandoned"
            );
        }
    }

    fn actor(&self) -> String {
        self.session
            .as_ref()
            .map(|session| session.identity.email.clone())
            .unwrap_or_else(|| "anonymous".to_owned())
    }

    fn audit_context(&self) -> AuditContext {
        AuditContext::new(Some(self.context_id.to_string()), self.correlation_id.clone(), self.actor())
    }

    fn audit_login(&self, portal: LoginPortal, outcome: AuditOutcome, detail: &str) {
        let event_type = match outcome {
            AuditOutcome::Success => "login.accepted",
            AuditOutcome::Rejected => "login.rejected",
            AuditOutcome::Failed => "login.failed",
        };
        self.audit.emit(
            AuditEvent::new(&self.audit_context(), event_type, AuditCategory::Login, outcome)
                .with_metadata("portal", portal.as_str())
                .with_metadata("detail", detail),
        );
    }
}

fn redirect_label(reason: RedirectReason) -> &'static str {
    match reason {
        RedirectReason::Unauthenticated => "unauthenticated",
        RedirectReason::Forbidden => "forbidden",
        RedirectReason::Unmatched => "unmatched",
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::AppContext;
    use crate::audit::{AuditCategory, InMemoryAuditSink};
    use crate::auth::login::LoginError;
    use crate::auth::role::Role;
    use crate::auth::session::{Identity, LoginPortal, SessionToken};
    use crate::auth::storage::MemoryStorage;
    use crate::auth::verifier::{VerificationError, VerifiedCredentials};
    use crate::errors::ApplicationError;
    use crate::flows::engine::AdvancePolicy;
    use crate::flows::steps::{ActiveView, QuoteStep, WizardCommand};

    fn verified(role: Role) -> VerifiedCredentials {
        VerifiedCredentials {
            identity: Identity { email: format!("{role}@example.com"), full_name: None, role },
            token: SessionToken::new(format!("tok-{role}")).expect("token"),
        }
    }

    fn context(storage: MemoryStorage) -> (AppContext<MemoryStorage>, InMemoryAuditSink) {
        let sink = InMemoryAuditSink::default();
        (AppContext::new(storage, AdvancePolicy::unchecked(), Arc::new(sink.clone())), sink)
    }

    #[test]
    fn navigation_discards_a_pending_login_result() {
        let (mut context, _) = context(MemoryStorage::default());
        let ticket = context.begin_login(LoginPortal::Admin).expect("ticket");

        context.navigate("/login");
        let result = context.finish_login(ticket, Ok(verified(Role::Admin)));

        assert!(matches!(result, Err(LoginError::Discarded)));
        assert!(context.session().is_none());
        assert!(context.store().load().is_none());
        assert_eq!(context.logins_in_flight(), 0);
    }

    #[test]
    fn portals_track_their_own_pending_login() {
        let (mut context, _) = context(MemoryStorage::default());
        let _user = context.begin_login(LoginPortal::User).expect("user ticket");
        let _admin = context.begin_login(LoginPortal::Admin).expect("admin ticket");
        assert!(matches!(
            context.begin_login(LoginPortal::User),
            Err(LoginError::InFlight { portal: LoginPortal::User })
        ));
    }

    #[test]
    fn logout_discards_a_pending_login_result() {
        let (mut context, _) = context(MemoryStorage::default());
        let ticket = context.begin_login(LoginPortal::SuperAdmin).expect("ticket");

        context.logout().expect("logout");
        let result = context.finish_login(ticket, Ok(verified(Role::SuperAdmin)));

        assert!(matches!(result, Err(LoginError::Discarded)));
        assert!(context.session().is_none());
        assert!(context.store().load().is_none());
        assert_eq!(context.location(), "/login");
    }

    #[test]
    fn dropped_ticket_frees_its_portal() {
        let (mut context, _) = context(MemoryStorage::default());
        let ticket = context.begin_login(LoginPortal::Admin).expect("ticket");
        assert_eq!(context.logins_in_flight(), 1);

        drop(ticket);
        assert_eq!(context.logins_in_flight(), 0);
        assert!(context.begin_login(LoginPortal::Admin).is_ok());
    }

    #[test]
    fn stale_ticket_dropped_after_navigation_leaves_newer_logins_alone() {
        let (mut context, _) = context(MemoryStorage::default());
        let stale = context.begin_login(LoginPortal::User).expect("first ticket");
        context.navigate("/login");
        let _fresh = context.begin_login(LoginPortal::User).expect("second ticket");

        drop(stale);
        assert_eq!(context.logins_in_flight(), 1);
        assert!(matches!(
            context.begin_login(LoginPortal::User),
            Err(LoginError::InFlight { portal: LoginPortal::User })
        ));
    }

    #[test]
    fn login_outcome_is_audited_under_the_request_that_started_it() {
        let (mut context, sink) = context(MemoryStorage::default());
        context.set_correlation_id("req-login");
        let ticket = context.begin_login(LoginPortal::User).expect("ticket");
        context.set_correlation_id("req-other");

        let result = context.finish_login(
            ticket,
            Err(VerificationError::Rejected { reason: "Invalid credentials".into() }),
        );

        assert!(result.is_err());
        let rejected = sink
            .events()
            .into_iter()
            .find(|event| event.event_type == "login.rejected")
            .expect("rejection audited");
        assert_eq!(rejected.correlation_id, "req-login");
    }

    #[test]
    fn rejected_login_frees_the_portal_for_a_retry() {
        let (mut context, sink) = context(MemoryStorage::default());
        let ticket = context.begin_login(LoginPortal::User).expect("ticket");
        let result = context.finish_login(
            ticket,
            Err(VerificationError::Rejected { reason: "Invalid credentials".into() }),
        );

        assert!(matches!(result, Err(LoginError::Authentication { .. })));
        assert!(context.begin_login(LoginPortal::User).is_ok());
        assert!(sink.events().iter().any(|event| event.event_type == "login.rejected"));
    }

    #[test]
    fn session_persisted_by_one_context_is_restored_by_the_next() {
        let storage = MemoryStorage::default();
        let (mut first, _) = context(storage.clone());
        first.complete_login(LoginPortal::User, verified(Role::User)).expect("login");

        let (restored, _) = context(storage);
        assert_eq!(restored.session().map(|session| session.role()), Some(Role::User));
        assert_eq!(restored.location(), "/login");
    }

    #[test]
    fn wizard_requires_a_session() {
        let (mut context, _) = context(MemoryStorage::default());
        assert!(matches!(
            context.apply_wizard(WizardCommand::Advance),
            Err(ApplicationError::Unauthenticated { .. })
        ));
        assert!(context.quotation().is_err());
    }

    #[test]
    fn logout_while_submitted_starts_the_next_quotation_fresh() {
        let (mut context, sink) = context(MemoryStorage::default());
        context.complete_login(LoginPortal::User, verified(Role::User)).expect("login");
        context
            .apply_wizard(WizardCommand::Record {
                step: QuoteStep::Contact,
                fields: [("name".to_string(), json!("Ada"))].into_iter().collect(),
            })
            .expect("record");
        context.apply_wizard(WizardCommand::Submit).expect("submit");
        assert_eq!(context.wizard().state().active_view(), ActiveView::Summary);

        let landing = context.logout().expect("logout");
        assert_eq!(landing.location, "/login");
        assert!(context.store().load().is_none());

        context.complete_login(LoginPortal::User, verified(Role::User)).expect("login again");
        let wizard = context.quotation().expect("allowed");
        assert_eq!(wizard.state().current_step(), 1);
        assert!(wizard.state().step_data().is_empty());
        assert!(!wizard.state().is_submitted());
        assert!(sink.events().iter().any(|event| event.category == AuditCategory::Session));
    }
}
