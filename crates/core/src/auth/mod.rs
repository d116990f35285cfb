pub mod guard;
pub mod login;
pub mod role;
pub mod session;
pub mod storage;
pub mod store;
pub mod verifier;

pub use guard::{evaluate, GuardDecision, RouteRequirement};
pub use login::{LoginError, LoginSuccess, LoginTicket, RoleLoginFlow};
pub use role::{AllowedRoles, Role, UnknownRole};
pub use session::{Identity, LoginPortal, Session, SessionError, SessionToken, UnknownPortal};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage, StorageError, StorageOp};
pub use store::SessionStore;
pub use verifier::{
    CredentialVerifier, Credentials, HttpCredentialVerifier, InMemoryCredentialVerifier,
    VerificationError, VerifiedCredentials,
};
