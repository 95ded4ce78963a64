//! Failure taxonomy shared by stores, upstream clients and the sync
//! orchestrator.
//!
//! Components return typed errors across their boundaries wherever failure is
//! an expected outcome (missing token, one metric endpoint down). The API
//! layer maps each variant to its HTTP convention; the orchestrator contains
//! them at per-employee granularity so one employee cannot abort a batch.

use thiserror::Error;

/// Subkind of a provider rejection, derived from the embedded error code.
///
/// Classification only improves diagnostics and lets the orchestrator spot
/// token problems; it never changes control flow inside the client itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamKind {
    /// Access token rejected as invalid (re-authorization required).
    TokenInvalid,
    /// Access token past its lifetime (refresh or re-authorize).
    TokenExpired,
    /// API quota for the application is used up.
    QuotaExhausted,
    /// The application was never granted this capability.
    CapabilityMissing,
    /// The application (or this capability) is banned or offline.
    AppBanned,
    /// Any other non-zero embedded code.
    Other,
}

impl UpstreamKind {
    /// True for the two kinds that mean the stored credential is unusable.
    pub fn is_token_problem(self) -> bool {
        matches!(self, UpstreamKind::TokenInvalid | UpstreamKind::TokenExpired)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// Missing or duplicate input, surfaced immediately to the caller.
    #[error("{0}")]
    Validation(String),

    /// Missing employee, token or snapshot.
    #[error("{0}")]
    NotFound(String),

    /// The provider answered with a non-zero embedded error code.
    #[error("{message}")]
    Upstream { kind: UpstreamKind, message: String },

    /// Network or HTTP failure reaching the provider.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("{0}")]
    Internal(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    pub fn upstream(kind: UpstreamKind, message: impl Into<String>) -> Self {
        Error::Upstream {
            kind,
            message: message.into(),
        }
    }

    /// True when the failure indicates the stored token must be replaced.
    pub fn is_token_problem(&self) -> bool {
        matches!(self, Error::Upstream { kind, .. } if kind.is_token_problem())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Transport(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_problem_detection() {
        let expired = Error::upstream(UpstreamKind::TokenExpired, "access token expired");
        assert!(expired.is_token_problem());

        let invalid = Error::upstream(UpstreamKind::TokenInvalid, "access token invalid");
        assert!(invalid.is_token_problem());

        let quota = Error::upstream(UpstreamKind::QuotaExhausted, "quota used up");
        assert!(!quota.is_token_problem());

        assert!(!Error::validation("name required").is_token_problem());
    }

    #[test]
    fn test_display_is_human_readable() {
        let err = Error::upstream(UpstreamKind::AppBanned, "application is banned");
        assert_eq!(err.to_string(), "application is banned");

        let err = Error::not_found("employee emp_1 not found");
        assert_eq!(err.to_string(), "employee emp_1 not found");
    }
}
