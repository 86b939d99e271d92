//! Cluster-wide identifier sequence.
//!
//! Every externally visible id (tenants, players, competitions, scores) is
//! taken from one AUTOINCREMENT counter in the central registry. SQLite never
//! hands out an AUTOINCREMENT value twice, so ids are strictly increasing
//! for the lifetime of the registry.

use std::sync::Arc;

use rusqlite::params;
use scorehall_core::error::{Result, ScoreHallError};

use crate::registry::TenantRegistry;
use crate::sqlite::classify;

/// Attempts the reference deployment allows before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 100;

/// Bounded retry on [`ScoreHallError::TransientStore`]. Any other error is
/// returned immediately; exhausting the bound returns the last transient error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: DEFAULT_MAX_ATTEMPTS }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts: max_attempts.max(1) }
    }

    pub fn run<T>(&self, operation: &str, mut f: impl FnMut() -> Result<T>) -> Result<T> {
        let mut last_error = None;
        for attempt in 1..=self.max_attempts {
            match f() {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::debug!(operation, attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if err.is_transient() => {
                    tracing::debug!(operation, attempt, error = %err, "transient error, retrying");
                    last_error = Some(err);
                }
                Err(err) => return Err(err),
            }
        }

        tracing::warn!(operation, attempts = self.max_attempts, "retries exhausted");
        Err(last_error.unwrap_or_else(|| {
            ScoreHallError::Database(format!("{operation}: retry loop ran zero attempts"))
        }))
    }
}

/// Source of unique, strictly increasing identifiers.
pub struct IdentifierSequence {
    registry: Arc<TenantRegistry>,
    policy: RetryPolicy,
}

impl IdentifierSequence {
    pub fn new(registry: Arc<TenantRegistry>, policy: RetryPolicy) -> Self {
        Self { registry, policy }
    }

    /// Next raw sequence value.
    pub fn next_value(&self) -> Result<i64> {
        self.policy.run("dispense id", || {
            let conn = self.registry.connection()?;
            conn.execute("REPLACE INTO id_generator (stub) VALUES (?1)", params!["a"])
                .map_err(|e| classify("REPLACE INTO id_generator", e))?;
            let id = conn.last_insert_rowid();
            if id <= 0 {
                return Err(ScoreHallError::Database(format!(
                    "id_generator returned non-positive id {id}"
                )));
            }
            Ok(id)
        })
    }

    /// Next identifier rendered as lowercase hexadecimal.
    pub fn next(&self) -> Result<String> {
        self.next_value().map(|id| format!("{id:x}"))
    }
}
