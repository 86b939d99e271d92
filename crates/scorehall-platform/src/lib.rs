//! # ScoreHall Platform
//!
//! Tenant sharding, central registry, billing and credential resolution.
//! [`Platform`] wires one of each service together and implements the two
//! operations that span several of them: reset and tenant provisioning.

pub mod auth;
pub mod billing;
pub mod lock;
pub mod registry;
pub mod schema;
pub mod sequence;
pub mod shard;
mod sqlite;

#[cfg(test)]
pub(crate) mod testutil;

use std::sync::{Arc, LazyLock};

use regex::Regex;
use scorehall_core::ScoreHallConfig;
use scorehall_core::error::{Result, ScoreHallError};
use scorehall_core::types::TenantRow;

pub use auth::{CredentialCache, ViewerResolver};
pub use billing::BillingAggregator;
pub use lock::{FileTenantLock, KeyedTenantLock, TenantLock};
pub use registry::TenantRegistry;
pub use sequence::{IdentifierSequence, RetryPolicy};
pub use shard::{ShardManager, ShardStore};

static TENANT_NAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9-]{0,61}[a-z0-9]$").ok());

/// Tenant names are DNS labels: lowercase, 2..=63 chars, no leading digit or
/// hyphen, no trailing hyphen.
pub fn validate_tenant_name(name: &str) -> Result<()> {
    if TENANT_NAME.as_ref().is_some_and(|re| re.is_match(name)) {
        Ok(())
    } else {
        Err(ScoreHallError::validation(format!("invalid tenant name: {name:?}")))
    }
}

/// Composition root owning every platform service.
pub struct Platform {
    registry: Arc<TenantRegistry>,
    sequence: Arc<IdentifierSequence>,
    shards: Arc<ShardManager>,
    credentials: Arc<CredentialCache>,
    viewer: Arc<ViewerResolver>,
    billing: Arc<BillingAggregator>,
}

impl Platform {
    /// Open with file locks beside the shards, which also serialize
    /// processes sharing the tenant directory.
    pub fn open(config: &ScoreHallConfig) -> Result<Self> {
        let dir = config.tenant_db_dir();
        std::fs::create_dir_all(&dir)?;
        Self::with_lock(config, Arc::new(FileTenantLock::new(dir)))
    }

    pub fn with_lock(config: &ScoreHallConfig, lock: Arc<dyn TenantLock>) -> Result<Self> {
        let registry = Arc::new(TenantRegistry::open(&config.registry_path(), &config.registry)?);
        let sequence = Arc::new(IdentifierSequence::new(
            registry.clone(),
            RetryPolicy::new(config.registry.id_retry_limit),
        ));

        let tenant_schema = match &config.tenant.schema_file {
            Some(file) => {
                let path = scorehall_core::config::expand_path(file);
                std::fs::read_to_string(&path).map_err(|e| {
                    ScoreHallError::Config(format!("read tenant schema {}: {e}", path.display()))
                })?
            }
            None => schema::TENANT_SCHEMA.to_string(),
        };
        let shards = Arc::new(ShardManager::new(config.tenant_db_dir(), tenant_schema, lock));

        let credentials = Arc::new(CredentialCache::new());
        let viewer = Arc::new(ViewerResolver::new(
            registry.clone(),
            credentials.clone(),
            config.jwt_key_file(),
            config.auth.base_hostname.clone(),
        ));
        let billing = Arc::new(BillingAggregator::new(registry.clone(), shards.clone()));

        Ok(Self { registry, sequence, shards, credentials, viewer, billing })
    }

    pub fn registry(&self) -> &Arc<TenantRegistry> {
        &self.registry
    }

    pub fn sequence(&self) -> &Arc<IdentifierSequence> {
        &self.sequence
    }

    pub fn shards(&self) -> &Arc<ShardManager> {
        &self.shards
    }

    pub fn credentials(&self) -> &Arc<CredentialCache> {
        &self.credentials
    }

    pub fn viewer(&self) -> &Arc<ViewerResolver> {
        &self.viewer
    }

    pub fn billing(&self) -> &Arc<BillingAggregator> {
        &self.billing
    }

    /// Destroy all tenant data and recreate an empty registry.
    pub fn reset(&self) -> Result<()> {
        self.shards.reset_all();
        self.credentials.reset();
        self.registry.reset_schema()?;
        self.shards.wipe_all()?;
        tracing::info!("🧹 Platform reset: registry recreated, shards wiped");
        Ok(())
    }

    /// Register a tenant and create its shard.
    ///
    /// A duplicate name fails with `Conflict` before any shard is touched. If
    /// the shard cannot be created the directory row is removed again.
    pub fn provision_tenant(&self, name: &str, display_name: &str) -> Result<TenantRow> {
        validate_tenant_name(name)?;

        let id = self.sequence.next_value()?;
        let now = chrono::Utc::now().timestamp();
        let tenant = self.registry.insert_tenant(id, name, display_name, now)?;

        if let Err(e) = self.shards.provision(id) {
            tracing::error!("provisioning shard for tenant {} ({}) failed: {e}", id, name);
            if let Err(cleanup) = self.registry.delete_tenant(id) {
                tracing::warn!("could not remove tenant row {}: {cleanup}", id);
            }
            return Err(e);
        }

        tracing::info!("✅ Tenant {} ({}) provisioned", name, id);
        Ok(tenant)
    }
}
