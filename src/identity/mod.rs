//! Central identity handling: credential verification, role resolution and
//! the authorization gate every handler consults before touching data.
//! Keep the public surface thin and split implementation across sub-modules.

mod authorizer;
mod error;
mod principal;
mod request_context;
mod resolver;
mod verifier;

pub use authorizer::{
    authorize, AccessRequest, Action, AuthDecision, DenialReason, Placement, ResourceKind,
    ResourceRef,
};
pub use error::{AuthError, AuthResult};
pub use principal::{Principal, Role, ScopeBinding, ScopeClaims, VerifiedIdentity};
pub use request_context::RequestContext;
pub use resolver::RoleResolver;
pub use verifier::{CredentialVerifier, ProviderVerifier};
