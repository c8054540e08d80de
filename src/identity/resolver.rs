//! Maps a verified identity to a role and scope binding.
//!
//! Resolution prefers claims embedded on the credential (no extra I/O) and
//! otherwise performs exactly one directory read keyed by subject id. Every
//! uncertain outcome fails closed: unknown subjects, unrecognized role
//! strings and records missing their scope attributes all deny, never
//! defaulting to an unscoped role.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::debug;

use crate::directory::{Directory, UserRecord};

use super::error::{AuthError, AuthResult};
use super::principal::{Role, ScopeBinding, VerifiedIdentity};

struct CacheEntry {
    stored_at: Instant,
    role: Role,
    scope: ScopeBinding,
}

/// Bounded-TTL cache over directory resolutions. The TTL must not exceed the
/// provider's credential lifetime, so a cached role can never outlive the
/// credential that carried it. Off unless a TTL is configured.
struct ResolverCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl ResolverCache {
    fn get(&self, subject_id: &str) -> Option<(Role, ScopeBinding)> {
        let map = self.entries.read();
        let entry = map.get(subject_id)?;
        if entry.stored_at.elapsed() > self.ttl {
            return None;
        }
        Some((entry.role, entry.scope.clone()))
    }

    fn put(&self, subject_id: &str, role: Role, scope: &ScopeBinding) {
        let mut map = self.entries.write();
        // Opportunistically drop anything already expired.
        map.retain(|_, e| e.stored_at.elapsed() <= self.ttl);
        map.insert(
            subject_id.to_string(),
            CacheEntry { stored_at: Instant::now(), role, scope: scope.clone() },
        );
    }
}

pub struct RoleResolver {
    directory: Arc<dyn Directory>,
    cache: Option<ResolverCache>,
}

impl RoleResolver {
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        Self { directory, cache: None }
    }

    /// Enable caching of directory resolutions for `ttl`. Callers are
    /// responsible for keeping `ttl` at or below the provider's token
    /// lifetime.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache = Some(ResolverCache { ttl, entries: RwLock::new(HashMap::new()) });
        self
    }

    pub async fn resolve(&self, identity: &VerifiedIdentity) -> AuthResult<(Role, ScopeBinding)> {
        // Fast path: role and scope both present on the credential.
        if let Some(claim) = identity.embedded_role.as_deref() {
            if let Some(role) = Role::parse(claim) {
                if let Some(scope) = scope_from_claims(role, identity) {
                    debug!(target: "auth", subject_id = %identity.subject_id, role = role.as_str(), "resolved from embedded claims");
                    return Ok((role, scope));
                }
                // Claim names a role but lacks its scope attributes; the
                // directory record is the source of truth then.
            }
            // Unrecognized claim strings also fall through. They grant
            // nothing on their own.
        }

        if let Some(cache) = &self.cache {
            if let Some((role, scope)) = cache.get(&identity.subject_id) {
                return Ok((role, scope));
            }
        }

        let record = self
            .directory
            .user_record(&identity.subject_id)
            .await
            .map_err(|e| AuthError::ProviderUnavailable(e.to_string()))?
            .ok_or_else(|| AuthError::UnknownIdentity(identity.subject_id.clone()))?;

        let Some(role) = Role::parse(&record.role) else {
            return Err(AuthError::IncompleteProfile {
                subject_id: identity.subject_id.clone(),
                missing: "role",
            });
        };
        let scope = scope_from_record(role, &record).map_err(|missing| {
            AuthError::IncompleteProfile { subject_id: identity.subject_id.clone(), missing }
        })?;

        if let Some(cache) = &self.cache {
            cache.put(&identity.subject_id, role, &scope);
        }
        debug!(target: "auth", subject_id = %identity.subject_id, role = role.as_str(), "resolved from directory");
        Ok((role, scope))
    }
}

/// Build the scope binding a role requires from embedded claims. `None`
/// means the claims are insufficient, not that the caller is unscoped.
fn scope_from_claims(role: Role, identity: &VerifiedIdentity) -> Option<ScopeBinding> {
    let claims = &identity.embedded_scope;
    match role {
        Role::SuperAdmin => Some(ScopeBinding::Unrestricted),
        Role::Admin => claims
            .hostel_id
            .clone()
            .map(|hostel_id| ScopeBinding::Hostel { hostel_id }),
        Role::CoAdmin => match (claims.hostel_id.clone(), claims.floor_ids.clone()) {
            (Some(hostel_id), Some(floor_ids)) if !floor_ids.is_empty() => {
                Some(ScopeBinding::Floors { hostel_id, floor_ids })
            }
            _ => None,
        },
        Role::Student => match (claims.hostel_id.clone(), claims.room_id.clone()) {
            (Some(hostel_id), Some(room_id)) => Some(ScopeBinding::Room {
                hostel_id,
                room_id,
                occupant_id: identity.subject_id.clone(),
            }),
            _ => None,
        },
    }
}

/// Same construction from a directory record. `Err` names the first missing
/// field for the incomplete-profile report.
fn scope_from_record(role: Role, record: &UserRecord) -> Result<ScopeBinding, &'static str> {
    match role {
        Role::SuperAdmin => Ok(ScopeBinding::Unrestricted),
        Role::Admin => match record.hostel_id.clone() {
            Some(hostel_id) => Ok(ScopeBinding::Hostel { hostel_id }),
            None => Err("hostel_id"),
        },
        Role::CoAdmin => {
            let Some(hostel_id) = record.hostel_id.clone() else { return Err("hostel_id") };
            match record.floor_ids.clone() {
                Some(floor_ids) if !floor_ids.is_empty() => {
                    Ok(ScopeBinding::Floors { hostel_id, floor_ids })
                }
                _ => Err("floor_ids"),
            }
        }
        Role::Student => {
            let Some(hostel_id) = record.hostel_id.clone() else { return Err("hostel_id") };
            match record.room_id.clone() {
                Some(room_id) => Ok(ScopeBinding::Room {
                    hostel_id,
                    room_id,
                    occupant_id: record.subject_id.clone(),
                }),
                None => Err("room_id"),
            }
        }
    }
}
