//! ScoreHall configuration, loaded from TOML with environment overrides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, ScoreHallError};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreHallConfig {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub tenant: TenantConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Central registry (tenant directory, id sequence, visit log).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// SQLite file holding the central registry.
    #[serde(default = "default_registry_path")]
    pub path: String,
    /// Upper bound on pooled registry connections.
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    /// How long a caller waits for a free pooled connection.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
    /// SQLite busy timeout applied to every connection.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Attempts made by the id sequence before giving up on busy errors.
    #[serde(default = "default_id_retry_limit")]
    pub id_retry_limit: u32,
}

fn default_registry_path() -> String { "data/registry.db".into() }
fn default_pool_size() -> u32 { 10 }
fn default_connection_timeout_ms() -> u64 { 30_000 }
fn default_busy_timeout_ms() -> u64 { 5_000 }
fn default_id_retry_limit() -> u32 { 100 }

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: default_registry_path(),
            pool_size: default_pool_size(),
            connection_timeout_ms: default_connection_timeout_ms(),
            busy_timeout_ms: default_busy_timeout_ms(),
            id_retry_limit: default_id_retry_limit(),
        }
    }
}

/// Per-tenant shard storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantConfig {
    /// Directory holding `<id>.db` shard files and `<id>.lock` lock files.
    #[serde(default = "default_tenant_db_dir")]
    pub db_dir: String,
    /// Optional SQL file replacing the built-in tenant schema.
    #[serde(default)]
    pub schema_file: Option<String>,
}

fn default_tenant_db_dir() -> String { "data/tenant_db".into() }

impl Default for TenantConfig {
    fn default() -> Self {
        Self { db_dir: default_tenant_db_dir(), schema_file: None }
    }
}

/// Credential verification and host routing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// PEM file with the RSA public key credentials are verified against.
    #[serde(default = "default_jwt_key_file")]
    pub jwt_key_file: String,
    /// Suffix stripped from the Host header to get the tenant name.
    #[serde(default = "default_base_hostname")]
    pub base_hostname: String,
    /// Host serving the administrative API.
    #[serde(default = "default_admin_hostname")]
    pub admin_hostname: String,
}

fn default_jwt_key_file() -> String { "public.pem".into() }
fn default_base_hostname() -> String { ".t.isucon.dev".into() }
fn default_admin_hostname() -> String { "admin.t.isucon.dev".into() }

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_key_file: default_jwt_key_file(),
            base_hostname: default_base_hostname(),
            admin_hostname: default_admin_hostname(),
        }
    }
}

/// HTTP listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String { "0.0.0.0".into() }
fn default_port() -> u16 { 3000 }

impl Default for GatewayConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port() }
    }
}

impl ScoreHallConfig {
    /// Default config location, relative to the working directory.
    pub fn default_path() -> PathBuf {
        PathBuf::from("scorehall.toml")
    }

    /// Load configuration from a TOML file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ScoreHallError::Config(format!("read {}: {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| ScoreHallError::Config(format!("parse config: {e}")))
    }

    /// Load from `path` if it exists, fall back to defaults, then apply env overrides.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            Self::load_from(path)?
        } else {
            tracing::debug!("config file {} not found, using defaults", path.display());
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Override individual fields from `SCOREHALL_*` environment variables.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("SCOREHALL_REGISTRY_PATH") {
            self.registry.path = v;
        }
        if let Some(v) = lookup("SCOREHALL_TENANT_DB_DIR") {
            self.tenant.db_dir = v;
        }
        if let Some(v) = lookup("SCOREHALL_JWT_KEY_FILE") {
            self.auth.jwt_key_file = v;
        }
        if let Some(v) = lookup("SCOREHALL_BASE_HOSTNAME") {
            self.auth.base_hostname = v;
        }
        if let Some(v) = lookup("SCOREHALL_ADMIN_HOSTNAME") {
            self.auth.admin_hostname = v;
        }
        if let Some(port) = lookup("SCOREHALL_PORT").and_then(|v| v.parse().ok()) {
            self.gateway.port = port;
        }
    }

    pub fn registry_path(&self) -> PathBuf {
        expand_path(&self.registry.path)
    }

    pub fn tenant_db_dir(&self) -> PathBuf {
        expand_path(&self.tenant.db_dir)
    }

    pub fn jwt_key_file(&self) -> PathBuf {
        expand_path(&self.auth.jwt_key_file)
    }
}

/// Expand a leading `~` in a configured path.
pub fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let cfg = ScoreHallConfig::default();
        assert_eq!(cfg.registry.pool_size, 10);
        assert_eq!(cfg.registry.id_retry_limit, 100);
        assert_eq!(cfg.auth.base_hostname, ".t.isucon.dev");
        assert_eq!(cfg.gateway.port, 3000);
        assert!(cfg.tenant.schema_file.is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let cfg = ScoreHallConfig::from_toml(
            r#"
[registry]
pool_size = 4

[gateway]
port = 8080
"#,
        )
        .unwrap();
        assert_eq!(cfg.registry.pool_size, 4);
        assert_eq!(cfg.registry.path, "data/registry.db");
        assert_eq!(cfg.gateway.port, 8080);
        assert_eq!(cfg.gateway.host, "0.0.0.0");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = ScoreHallConfig::from_toml("registry = 3").unwrap_err();
        assert!(matches!(err, ScoreHallError::Config(_)));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("SCOREHALL_TENANT_DB_DIR", "/tmp/shards"),
            ("SCOREHALL_PORT", "9000"),
            ("SCOREHALL_BASE_HOSTNAME", ".example.test"),
        ]);
        let mut cfg = ScoreHallConfig::default();
        cfg.apply_overrides(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.tenant.db_dir, "/tmp/shards");
        assert_eq!(cfg.gateway.port, 9000);
        assert_eq!(cfg.auth.base_hostname, ".example.test");
        assert_eq!(cfg.registry.path, "data/registry.db");
    }

    #[test]
    fn test_load_or_default_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scorehall.toml");
        std::fs::write(&path, "[tenant]\ndb_dir = \"shards\"\n").unwrap();
        let cfg = ScoreHallConfig::load_from(&path).unwrap();
        assert_eq!(cfg.tenant.db_dir, "shards");
    }
}
