//! Mapping of SQLite and pool failures onto [`ScoreHallError`].

use rusqlite::ErrorCode;
use scorehall_core::error::ScoreHallError;

/// Busy/locked is the only retryable signal SQLite gives; everything else is a plain failure.
pub(crate) fn classify(context: &str, err: rusqlite::Error) -> ScoreHallError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
        {
            ScoreHallError::TransientStore(format!("{context}: {err}"))
        }
        _ => ScoreHallError::Database(format!("{context}: {err}")),
    }
}

pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::ConstraintViolation
                && e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

pub(crate) fn pool_error(err: r2d2::Error) -> ScoreHallError {
    ScoreHallError::Database(format!("registry pool: {err}"))
}
