//! Advisory per-tenant locks.
//!
//! A [`TenantLock`] hands out an exclusive guard per tenant id. The guard
//! releases on drop, so every exit path of the critical section unlocks.

use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{ArcMutexGuard, Mutex, RawMutex};
use scorehall_core::error::{Result, ScoreHallError};

/// Named-resource mutual exclusion keyed by tenant id.
pub trait TenantLock: Send + Sync {
    /// Block until the tenant's lock is held.
    fn acquire(&self, tenant_id: i64) -> Result<TenantLockGuard>;
}

/// Held lock. Dropping it releases the lock.
pub struct TenantLockGuard {
    tenant_id: i64,
    inner: GuardInner,
}

enum GuardInner {
    File(File),
    Keyed { _guard: ArcMutexGuard<RawMutex, ()> },
}

impl TenantLockGuard {
    pub fn tenant_id(&self) -> i64 {
        self.tenant_id
    }
}

impl Drop for TenantLockGuard {
    fn drop(&mut self) {
        if let GuardInner::File(file) = &self.inner {
            if let Err(e) = file.unlock() {
                tracing::warn!("unlock tenant {} failed: {e}", self.tenant_id);
            }
        }
    }
}

/// Cross-process lock: an exclusive OS lock on `<dir>/<id>.lock`.
pub struct FileTenantLock {
    dir: PathBuf,
}

impl FileTenantLock {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn lock_path(&self, tenant_id: i64) -> PathBuf {
        self.dir.join(format!("{tenant_id}.lock"))
    }
}

impl TenantLock for FileTenantLock {
    fn acquire(&self, tenant_id: i64) -> Result<TenantLockGuard> {
        let path = self.lock_path(tenant_id);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| {
                ScoreHallError::store_unavailable(format!("open lock {}: {e}", path.display()))
            })?;
        file.lock().map_err(|e| {
            ScoreHallError::store_unavailable(format!("lock {}: {e}", path.display()))
        })?;
        Ok(TenantLockGuard { tenant_id, inner: GuardInner::File(file) })
    }
}

/// In-process lock for single-process deployments and tests.
#[derive(Default)]
pub struct KeyedTenantLock {
    locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl KeyedTenantLock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TenantLock for KeyedTenantLock {
    fn acquire(&self, tenant_id: i64) -> Result<TenantLockGuard> {
        // Clone the mutex out first so no map shard stays locked while we wait.
        let mutex = self.locks.entry(tenant_id).or_default().clone();
        Ok(TenantLockGuard { tenant_id, inner: GuardInner::Keyed { _guard: mutex.lock_arc() } })
    }
}
