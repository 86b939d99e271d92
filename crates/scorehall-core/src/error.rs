//! Error types for ScoreHall.
//!
//! Every component returns a classified [`ScoreHallError`]. The HTTP boundary
//! maps the class to a status code and an opaque message; the full message is
//! only ever written to the server log.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, ScoreHallError>;

/// Classified failure returned by every ScoreHall component.
#[derive(Debug, Error)]
pub enum ScoreHallError {
    /// Malformed user input (tenant name, cursor, state transition).
    #[error("Validation error: {0}")]
    Validation(String),

    /// A unique value (tenant name) is already taken.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Missing, invalid or mismatched credential.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Authenticated, but not allowed to do this.
    #[error("Forbidden: {0}")]
    Authorization(String),

    /// Unknown tenant, competition or player.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Busy/locked signal from the central registry. Safe to retry.
    #[error("Transient store error: {0}")]
    TransientStore(String),

    /// A tenant shard could not be provisioned, opened or locked.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Any other database failure.
    #[error("Database error: {0}")]
    Database(String),

    /// Configuration or key material could not be loaded.
    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScoreHallError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    pub fn authorization(msg: impl Into<String>) -> Self {
        Self::Authorization(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn store_unavailable(msg: impl Into<String>) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    /// Only busy/locked registry failures are worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientStore(_))
    }

    /// HTTP status the boundary should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::Conflict(_) => 400,
            Self::Authentication(_) => 401,
            Self::Authorization(_) => 403,
            Self::NotFound(_) => 404,
            Self::TransientStore(_)
            | Self::StoreUnavailable(_)
            | Self::Database(_)
            | Self::Config(_)
            | Self::Io(_) => 500,
        }
    }

    /// Short message safe to show to clients.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::Validation(_) => "bad request",
            Self::Conflict(_) => "duplicate entry",
            Self::Authentication(_) => "unauthorized",
            Self::Authorization(_) => "forbidden",
            Self::NotFound(_) => "not found",
            _ => "internal server error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ScoreHallError::validation("x").status_code(), 400);
        assert_eq!(ScoreHallError::Conflict("x".into()).status_code(), 400);
        assert_eq!(ScoreHallError::authentication("x").status_code(), 401);
        assert_eq!(ScoreHallError::authorization("x").status_code(), 403);
        assert_eq!(ScoreHallError::not_found("x").status_code(), 404);
        assert_eq!(ScoreHallError::store_unavailable("x").status_code(), 500);
        assert_eq!(ScoreHallError::TransientStore("x".into()).status_code(), 500);
    }

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(ScoreHallError::TransientStore("busy".into()).is_transient());
        assert!(!ScoreHallError::Database("boom".into()).is_transient());
        assert!(!ScoreHallError::store_unavailable("gone").is_transient());
    }

    #[test]
    fn test_public_message_hides_details() {
        let err = ScoreHallError::Database("SELECT * FROM secret failed".into());
        assert_eq!(err.public_message(), "internal server error");
        assert!(err.to_string().contains("secret"));
    }
}
