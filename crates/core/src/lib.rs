pub mod app;
pub mod audit;
pub mod auth;
pub mod config;
pub mod errors;
pub mod flows;
pub mod routing;

pub use app::AppContext;
pub use audit::{
    AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink,
    TracingAuditSink,
};
pub use auth::{
    evaluate, CredentialVerifier, Credentials, FileStorage, GuardDecision, HttpCredentialVerifier,
    Identity, InMemoryCredentialVerifier, KeyValueStorage, LoginError, LoginPortal, LoginSuccess,
    MemoryStorage, Role, RoleLoginFlow, RouteRequirement, Session, SessionStore, SessionToken,
    VerificationError,
};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions};
pub use errors::{ApplicationError, DomainError, FailureClass, InterfaceError};
pub use flows::{
    ActiveView, AdvancePolicy, QuoteStep, QuoteSummary, WizardCommand, WizardEngine, WizardError,
    WizardOutcome, WizardSnapshot, WizardState, TOTAL_STEPS,
};
pub use routing::{NavigationOutcome, Navigator, RedirectReason, RouteTable, Screen};
