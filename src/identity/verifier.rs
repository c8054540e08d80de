//! Credential verification against the hosted identity provider.
//!
//! Cryptographic checks (signature, expiry, issuer, revocation) are entirely
//! the provider's job; this module only calls its verification endpoint and
//! maps the outcome onto the [`AuthError`] taxonomy. Verification is
//! read-only and never mutates provider state.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use super::error::{AuthError, AuthResult};
use super::principal::{ScopeClaims, VerifiedIdentity};

/// Verifies an opaque bearer credential and decodes its claims. Callers must
/// reject empty credentials before calling in; an empty string here is a
/// caller bug, not an input to classify.
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(&self, credential: &str) -> AuthResult<VerifiedIdentity>;
}

/// HTTP client for the provider's `accounts.lookup`-style verification call.
/// Constructed once at startup with the shared outbound client; the request
/// timeout configured on that client bounds how long a slow provider can
/// stall a handler.
pub struct ProviderVerifier {
    http: reqwest::Client,
    lookup_url: String,
    api_key: String,
}

impl ProviderVerifier {
    pub fn new(http: reqwest::Client, lookup_url: String, api_key: String) -> Self {
        Self { http, lookup_url, api_key }
    }
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<ProviderUser>,
}

#[derive(Debug, Deserialize)]
struct ProviderUser {
    #[serde(rename = "localId")]
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    /// Custom claims arrive as a JSON document encoded into a string field.
    #[serde(default, rename = "customAttributes")]
    custom_attributes: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: ProviderErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorDetail {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Default, Deserialize)]
struct ClaimsBlob {
    #[serde(default)]
    role: Option<String>,
    #[serde(default, rename = "hostelId")]
    hostel_id: Option<String>,
    #[serde(default, rename = "floorIds")]
    floor_ids: Option<Vec<String>>,
    #[serde(default, rename = "roomId")]
    room_id: Option<String>,
}

/// Map the provider's rejection codes onto the credential taxonomy. Unknown
/// codes classify as malformed, which still denies.
fn map_provider_code(code: &str) -> AuthError {
    if code.contains("EXPIRED") {
        AuthError::Expired
    } else if code.contains("REVOKED") || code.contains("DISABLED") || code.contains("USER_NOT_FOUND") {
        AuthError::Revoked
    } else {
        AuthError::Malformed
    }
}

/// Decode the stringified custom-claims document. Undecodable claims are
/// treated as absent so they establish nothing; the resolver then falls back
/// to the directory lookup.
fn parse_custom_attributes(subject_id: &str, raw: Option<&str>) -> ClaimsBlob {
    let Some(raw) = raw else { return ClaimsBlob::default() };
    match serde_json::from_str::<ClaimsBlob>(raw) {
        Ok(blob) => blob,
        Err(e) => {
            warn!(target: "auth", subject_id, "undecodable custom claims: {e}");
            ClaimsBlob::default()
        }
    }
}

#[async_trait]
impl CredentialVerifier for ProviderVerifier {
    async fn verify(&self, credential: &str) -> AuthResult<VerifiedIdentity> {
        let resp = self
            .http
            .post(&self.lookup_url)
            .query(&[("key", self.api_key.as_str())])
            .json(&serde_json::json!({ "idToken": credential }))
            .send()
            .await
            .map_err(|e| AuthError::ProviderUnavailable(e.to_string()))?;

        let status = resp.status();
        if status.is_server_error() {
            return Err(AuthError::ProviderUnavailable(format!("HTTP {status}")));
        }
        if !status.is_success() {
            let body: ProviderErrorBody = resp
                .json()
                .await
                .map_err(|_| AuthError::Malformed)?;
            return Err(map_provider_code(&body.error.message));
        }

        let body: LookupResponse = resp
            .json()
            .await
            .map_err(|e| AuthError::ProviderUnavailable(e.to_string()))?;
        let Some(user) = body.users.into_iter().next() else {
            // Verified but resolving to no account; nothing to act as.
            return Err(AuthError::Malformed);
        };

        let claims = parse_custom_attributes(&user.local_id, user.custom_attributes.as_deref());
        Ok(VerifiedIdentity {
            subject_id: user.local_id,
            email: user.email,
            embedded_role: claims.role,
            embedded_scope: ScopeClaims {
                hostel_id: claims.hostel_id,
                floor_ids: claims.floor_ids,
                room_id: claims.room_id,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_codes_map_to_taxonomy() {
        assert_eq!(map_provider_code("TOKEN_EXPIRED"), AuthError::Expired);
        assert_eq!(map_provider_code("TOKEN_REVOKED"), AuthError::Revoked);
        assert_eq!(map_provider_code("USER_DISABLED"), AuthError::Revoked);
        assert_eq!(map_provider_code("USER_NOT_FOUND"), AuthError::Revoked);
        assert_eq!(map_provider_code("INVALID_ID_TOKEN"), AuthError::Malformed);
        assert_eq!(map_provider_code("SOMETHING_ELSE"), AuthError::Malformed);
    }

    #[test]
    fn custom_attributes_decode_role_and_scope() {
        let raw = r#"{"role":"coAdmin","hostelId":"H1","floorIds":["F1","F2"]}"#;
        let blob = parse_custom_attributes("u1", Some(raw));
        assert_eq!(blob.role.as_deref(), Some("coAdmin"));
        assert_eq!(blob.hostel_id.as_deref(), Some("H1"));
        assert_eq!(blob.floor_ids, Some(vec!["F1".to_string(), "F2".to_string()]));
        assert_eq!(blob.room_id, None);
    }

    #[test]
    fn garbage_custom_attributes_establish_nothing() {
        let blob = parse_custom_attributes("u1", Some("not json"));
        assert_eq!(blob.role, None);
        assert_eq!(blob.hostel_id, None);

        let blob = parse_custom_attributes("u1", None);
        assert_eq!(blob.role, None);
    }
}
