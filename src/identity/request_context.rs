use uuid::Uuid;

use super::Principal;

/// Per-request context threaded through handler logging. Carries the
/// resolved principal and a correlation id minted when the request enters
/// the service.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub principal: Principal,
    pub request_id: String,
}

impl RequestContext {
    pub fn new(principal: Principal) -> Self {
        Self { principal, request_id: Uuid::new_v4().to_string() }
    }

    pub fn subject_id(&self) -> &str {
        &self.principal.identity.subject_id
    }
}
