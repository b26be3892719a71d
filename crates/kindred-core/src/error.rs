//! Error types for the kindred identity graph.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type alias using kindred's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for identity graph operations.
///
/// Storage unavailability (pool exhaustion, connection loss) surfaces as
/// [`Error::Database`]; callers may retry those with backoff. Everything
/// else is a terminal outcome for the attempted operation.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Platform profile not found for a (platform, platform_user_id) pair
    #[error("Profile not found: {platform}/{platform_user_id}")]
    ProfileNotFound {
        platform: String,
        platform_user_id: String,
    },

    /// Identity not found
    #[error("Identity not found: {0}")]
    IdentityNotFound(uuid::Uuid),

    /// Link request passed its deadline. Carries enough context for the
    /// caller to prompt a fresh request.
    #[error("Link request for {target_platform} expired (requested at {requested_at})")]
    Expired {
        target_platform: String,
        requested_at: DateTime<Utc>,
    },

    /// A schema invariant would be broken. Not reachable through the public
    /// API; observing it means manual repair, never an automatic retry.
    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),

    /// A racing write won a conditional update (code already consumed,
    /// profile already reassigned). Surfaced as an ordinary failure.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl Error {
    /// True if the operation may be retried without risk of double-apply.
    ///
    /// Only connection-level database failures qualify; conflicts and
    /// terminal states must be reported to the caller instead.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Database(sqlx::Error::PoolTimedOut) | Error::Database(sqlx::Error::Io(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("link request".to_string());
        assert_eq!(err.to_string(), "Not found: link request");
    }

    #[test]
    fn test_error_display_profile_not_found() {
        let err = Error::ProfileNotFound {
            platform: "discord".to_string(),
            platform_user_id: "u123".to_string(),
        };
        assert_eq!(err.to_string(), "Profile not found: discord/u123");
    }

    #[test]
    fn test_error_display_identity_not_found() {
        let id = Uuid::nil();
        let err = Error::IdentityNotFound(id);
        assert_eq!(err.to_string(), format!("Identity not found: {}", id));
    }

    #[test]
    fn test_error_display_expired_carries_context() {
        let requested_at = Utc::now();
        let err = Error::Expired {
            target_platform: "telegram".to_string(),
            requested_at,
        };
        let rendered = err.to_string();
        assert!(rendered.contains("telegram"));
        assert!(rendered.contains(&requested_at.to_string()));
    }

    #[test]
    fn test_error_display_conflict() {
        let err = Error::Conflict("code already verified".to_string());
        assert_eq!(err.to_string(), "Conflict: code already verified");
    }

    #[test]
    fn test_error_display_integrity_violation() {
        let err = Error::IntegrityViolation("duplicate link pair".to_string());
        assert_eq!(err.to_string(), "Integrity violation: duplicate link pair");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_pool_timeout_is_retryable() {
        assert!(Error::Database(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(!Error::Conflict("raced".to_string()).is_retryable());
        assert!(!Error::NotFound("x".to_string()).is_retryable());
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
