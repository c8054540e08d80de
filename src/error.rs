//! Unified application error model and mapping helpers.
//! This module provides the common error enum used by the HTTP handlers,
//! along with the mapping from the identity layer's typed failures. The
//! cardinal rule of the mapping: authentication failures (401) and
//! authorization failures (403) are distinct categories and are never
//! conflated, so clients can tell "log in again" from "you lack permission".

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use crate::directory::DirectoryError;
use crate::identity::AuthError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AppError {
    UserInput { code: String, message: String },
    NotFound { code: String, message: String },
    Conflict { code: String, message: String },
    /// No valid identity could be established (missing, invalid, expired or
    /// revoked credential; unknown or incomplete directory profile).
    Auth { code: String, message: String },
    /// Valid identity, insufficient permission.
    Forbidden { code: String, message: String },
    /// A hosted dependency (identity provider, document store, image CDN)
    /// failed or timed out. Fail closed, report service-unavailable, leave
    /// retries to the caller.
    Upstream { code: String, message: String },
    Internal { code: String, message: String },
}

impl AppError {
    pub fn code_str(&self) -> &str {
        match self {
            AppError::UserInput { code, .. }
            | AppError::NotFound { code, .. }
            | AppError::Conflict { code, .. }
            | AppError::Auth { code, .. }
            | AppError::Forbidden { code, .. }
            | AppError::Upstream { code, .. }
            | AppError::Internal { code, .. } => code.as_str(),
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AppError::UserInput { message, .. }
            | AppError::NotFound { message, .. }
            | AppError::Conflict { message, .. }
            | AppError::Auth { message, .. }
            | AppError::Forbidden { message, .. }
            | AppError::Upstream { message, .. }
            | AppError::Internal { message, .. } => message.as_str(),
        }
    }

    pub fn user<S: Into<String>>(code: S, msg: S) -> Self { AppError::UserInput { code: code.into(), message: msg.into() } }
    pub fn not_found<S: Into<String>>(code: S, msg: S) -> Self { AppError::NotFound { code: code.into(), message: msg.into() } }
    pub fn conflict<S: Into<String>>(code: S, msg: S) -> Self { AppError::Conflict { code: code.into(), message: msg.into() } }
    pub fn auth<S: Into<String>>(code: S, msg: S) -> Self { AppError::Auth { code: code.into(), message: msg.into() } }
    pub fn forbidden<S: Into<String>>(code: S, msg: S) -> Self { AppError::Forbidden { code: code.into(), message: msg.into() } }
    pub fn upstream<S: Into<String>>(code: S, msg: S) -> Self { AppError::Upstream { code: code.into(), message: msg.into() } }
    pub fn internal<S: Into<String>>(code: S, msg: S) -> Self { AppError::Internal { code: code.into(), message: msg.into() } }

    /// Map to HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::UserInput { .. } => 400,
            AppError::NotFound { .. } => 404,
            AppError::Conflict { .. } => 409,
            AppError::Auth { .. } => 401,
            AppError::Forbidden { .. } => 403,
            AppError::Upstream { .. } => 503,
            AppError::Internal { .. } => 500,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code_str(), self.message())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Expired => AppError::auth("credential_expired", "credential expired"),
            AuthError::Malformed => AppError::auth("credential_invalid", "credential invalid"),
            AuthError::Revoked => AppError::auth("credential_revoked", "credential revoked"),
            AuthError::UnknownIdentity(_) => {
                AppError::auth("unknown_identity", "no role is registered for this account")
            }
            AuthError::IncompleteProfile { .. } => {
                AppError::auth("incomplete_profile", "account profile is incomplete")
            }
            AuthError::ProviderUnavailable(detail) => {
                AppError::Upstream { code: "identity_provider_unavailable".into(), message: detail }
            }
        }
    }
}

impl From<DirectoryError> for AppError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::Unavailable(detail) => {
                AppError::Upstream { code: "directory_unavailable".into(), message: detail }
            }
            DirectoryError::Rejected { status, detail } => AppError::Internal {
                code: "directory_rejected".into(),
                message: format!("HTTP {status}: {detail}"),
            },
            DirectoryError::Decode(detail) => {
                AppError::Internal { code: "directory_decode".into(), message: detail }
            }
        }
    }
}

impl From<crate::images::CdnError> for AppError {
    fn from(err: crate::images::CdnError) -> Self {
        match err {
            crate::images::CdnError::Unavailable(detail) => {
                AppError::Upstream { code: "cdn_unavailable".into(), message: detail }
            }
            crate::images::CdnError::Rejected { status, detail } => AppError::Internal {
                code: "cdn_rejected".into(),
                message: format!("HTTP {status}: {detail}"),
            },
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal { code: "internal".into(), message: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_mapping() {
        assert_eq!(AppError::user("bad_input", "oops").http_status(), 400);
        assert_eq!(AppError::not_found("not_found", "missing").http_status(), 404);
        assert_eq!(AppError::conflict("conflict", "dup").http_status(), 409);
        assert_eq!(AppError::auth("auth", "no").http_status(), 401);
        assert_eq!(AppError::forbidden("forbidden", "blocked").http_status(), 403);
        assert_eq!(AppError::upstream("upstream", "down").http_status(), 503);
        assert_eq!(AppError::internal("internal", "panic").http_status(), 500);
    }

    #[test]
    fn auth_failures_stay_distinct_from_forbidden() {
        // Every verifier/resolver failure maps to 401 or 503, never 403.
        let cases = vec![
            AuthError::Expired,
            AuthError::Malformed,
            AuthError::Revoked,
            AuthError::UnknownIdentity("u1".into()),
            AuthError::IncompleteProfile { subject_id: "u1".into(), missing: "room_id" },
        ];
        for e in cases {
            assert_eq!(AppError::from(e).http_status(), 401);
        }
        let unavailable = AppError::from(AuthError::ProviderUnavailable("timeout".into()));
        assert_eq!(unavailable.http_status(), 503);
    }
}
