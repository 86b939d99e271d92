//! Central registry: tenant directory and ranking visit log on a pooled SQLite file.

use std::path::Path;
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{OptionalExtension, Row, params, params_from_iter};
use scorehall_core::config::RegistryConfig;
use scorehall_core::error::{Result, ScoreHallError};
use scorehall_core::types::{TenantRow, VisitSummary};

use crate::schema::{REGISTRY_SCHEMA, REGISTRY_TEARDOWN};
use crate::sqlite::{classify, is_unique_violation, pool_error};

pub type RegistryConnection = PooledConnection<SqliteConnectionManager>;

/// Central registry manager. Cheap to share behind an `Arc`; every call
/// checks a connection out of the bounded pool and blocks while none is free.
pub struct TenantRegistry {
    pool: Pool<SqliteConnectionManager>,
}

const TENANT_COLUMNS: &str = "id, name, display_name, created_at, updated_at";

fn tenant_from_row(row: &Row<'_>) -> rusqlite::Result<TenantRow> {
    Ok(TenantRow {
        id: row.get(0)?,
        name: row.get(1)?,
        display_name: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

impl TenantRegistry {
    /// Open (or create) the registry file and make sure its schema exists.
    pub fn open(path: &Path, config: &RegistryConfig) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                row.get::<_, String>(0)
            })?;
            Ok(())
        });

        let pool = Pool::builder()
            .max_size(config.pool_size)
            .min_idle(Some(1))
            .connection_timeout(Duration::from_millis(config.connection_timeout_ms))
            .build(manager)
            .map_err(pool_error)?;

        let registry = Self { pool };
        registry.init_schema()?;
        tracing::info!(
            "registry opened at {} (pool_size={})",
            path.display(),
            config.pool_size
        );
        Ok(registry)
    }

    /// Check a connection out of the pool.
    pub fn connection(&self) -> Result<RegistryConnection> {
        self.pool.get().map_err(pool_error)
    }

    fn init_schema(&self) -> Result<()> {
        self.connection()?
            .execute_batch(REGISTRY_SCHEMA)
            .map_err(|e| classify("registry schema", e))
    }

    /// Drop and recreate every registry table. Destroys all tenants, visits
    /// and the id sequence.
    pub fn reset_schema(&self) -> Result<()> {
        let conn = self.connection()?;
        conn.execute_batch(REGISTRY_TEARDOWN)
            .map_err(|e| classify("registry teardown", e))?;
        conn.execute_batch(REGISTRY_SCHEMA)
            .map_err(|e| classify("registry schema", e))?;
        tracing::info!("registry schema reprovisioned");
        Ok(())
    }

    // ── Tenants ────────────────────────────────────

    /// Insert a tenant row. A taken name is a [`ScoreHallError::Conflict`].
    pub fn insert_tenant(&self, id: i64, name: &str, display_name: &str, now: i64) -> Result<TenantRow> {
        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO tenant (id, name, display_name, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)",
            params![id, name, display_name, now],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                ScoreHallError::Conflict(format!("duplicate tenant: {name}"))
            } else {
                classify("insert tenant", e)
            }
        })?;

        Ok(TenantRow {
            id,
            name: name.to_string(),
            display_name: display_name.to_string(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Remove a tenant row; used to roll back a failed provisioning.
    pub fn delete_tenant(&self, id: i64) -> Result<()> {
        self.connection()?
            .execute("DELETE FROM tenant WHERE id = ?1", params![id])
            .map_err(|e| classify("delete tenant", e))?;
        Ok(())
    }

    pub fn tenant_by_name(&self, name: &str) -> Result<Option<TenantRow>> {
        self.connection()?
            .query_row(
                &format!("SELECT {TENANT_COLUMNS} FROM tenant WHERE name = ?1"),
                params![name],
                tenant_from_row,
            )
            .optional()
            .map_err(|e| classify("tenant by name", e))
    }

    /// Full directory, newest (highest id) first.
    pub fn list_tenants_desc(&self) -> Result<Vec<TenantRow>> {
        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(&format!("SELECT {TENANT_COLUMNS} FROM tenant ORDER BY id DESC"))
            .map_err(|e| classify("prepare tenant list", e))?;
        let tenants = stmt
            .query_map([], tenant_from_row)
            .map_err(|e| classify("query tenant list", e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| classify("read tenant list", e))?;
        Ok(tenants)
    }

    // ── Visit log ────────────────────────────────────

    /// Log that a player looked at a competition's ranking.
    pub fn record_visit(&self, player_id: &str, tenant_id: i64, competition_id: &str, at: i64) -> Result<()> {
        self.connection()?
            .execute(
                "INSERT INTO visit_history (player_id, tenant_id, competition_id, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)",
                params![player_id, tenant_id, competition_id, at],
            )
            .map_err(|e| classify("record visit", e))?;
        Ok(())
    }

    /// Earliest visit per (player, competition, tenant) for the given tenants,
    /// in one query, ordered by tenant then competition.
    pub fn earliest_visits(&self, tenant_ids: &[i64]) -> Result<Vec<VisitSummary>> {
        if tenant_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; tenant_ids.len()].join(", ");
        let sql = format!(
            "SELECT player_id, competition_id, tenant_id, MIN(created_at) AS min_created_at
             FROM visit_history
             WHERE tenant_id IN ({placeholders})
             GROUP BY player_id, competition_id, tenant_id
             ORDER BY tenant_id, competition_id, player_id"
        );

        let conn = self.connection()?;
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| classify("prepare visit summary", e))?;
        let visits = stmt
            .query_map(params_from_iter(tenant_ids.iter()), |row| {
                Ok(VisitSummary {
                    player_id: row.get(0)?,
                    competition_id: row.get(1)?,
                    tenant_id: row.get(2)?,
                    min_created_at: row.get(3)?,
                })
            })
            .map_err(|e| classify("query visit summary", e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| classify("read visit summary", e))?;
        Ok(visits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_registry() -> (TempDir, TenantRegistry) {
        let dir = tempfile::tempdir().unwrap();
        let reg = TenantRegistry::open(&dir.path().join("registry.db"), &RegistryConfig::default())
            .unwrap();
        (dir, reg)
    }

    #[test]
    fn test_insert_and_list_tenants() {
        let (_dir, reg) = temp_registry();
        reg.insert_tenant(1, "alpha", "Alpha", 100).unwrap();
        reg.insert_tenant(3, "gamma", "Gamma", 100).unwrap();
        reg.insert_tenant(2, "beta", "Beta", 100).unwrap();

        let ids: Vec<i64> = reg.list_tenants_desc().unwrap().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn test_duplicate_name_is_conflict() {
        let (_dir, reg) = temp_registry();
        reg.insert_tenant(1, "alpha", "Alpha", 100).unwrap();
        let err = reg.insert_tenant(2, "alpha", "Other", 200).unwrap_err();
        assert!(matches!(err, ScoreHallError::Conflict(_)));
        assert_eq!(reg.list_tenants_desc().unwrap().len(), 1);
    }

    #[test]
    fn test_lookup_by_name_and_delete() {
        let (_dir, reg) = temp_registry();
        reg.insert_tenant(7, "alpha", "Alpha", 100).unwrap();
        assert_eq!(reg.tenant_by_name("alpha").unwrap().unwrap().id, 7);
        assert!(reg.tenant_by_name("nope").unwrap().is_none());

        reg.delete_tenant(7).unwrap();
        assert!(reg.tenant_by_name("alpha").unwrap().is_none());
    }

    #[test]
    fn test_earliest_visits_grouped() {
        let (_dir, reg) = temp_registry();
        reg.record_visit("p1", 1, "c1", 50).unwrap();
        reg.record_visit("p1", 1, "c1", 20).unwrap();
        reg.record_visit("p2", 1, "c1", 30).unwrap();
        reg.record_visit("p1", 2, "c9", 10).unwrap();
        reg.record_visit("p1", 3, "c1", 5).unwrap();

        let visits = reg.earliest_visits(&[1, 2]).unwrap();
        assert_eq!(visits.len(), 3);
        let p1 = visits
            .iter()
            .find(|v| v.player_id == "p1" && v.tenant_id == 1)
            .unwrap();
        assert_eq!(p1.min_created_at, 20);
        assert!(visits.iter().all(|v| v.tenant_id != 3));
        assert!(reg.earliest_visits(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_reset_schema_clears_everything() {
        let (_dir, reg) = temp_registry();
        reg.insert_tenant(1, "alpha", "Alpha", 100).unwrap();
        reg.record_visit("p1", 1, "c1", 50).unwrap();
        reg.reset_schema().unwrap();
        assert!(reg.list_tenants_desc().unwrap().is_empty());
        assert!(reg.earliest_visits(&[1]).unwrap().is_empty());
    }
}
