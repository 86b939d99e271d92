//! Tenant shard manager: provision, open, cache and lock per-tenant SQLite stores.
//!
//! Each tenant owns exactly one `<id>.db` file. It is created once by
//! [`ShardManager::provision`], opened lazily by [`ShardManager::open`] and
//! kept open until [`ShardManager::reset_all`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, OptionalExtension, Row, params};
use scorehall_core::error::{Result, ScoreHallError};
use scorehall_core::types::{CompetitionRow, PlayerRow};
#[cfg(test)]
use scorehall_core::types::PlayerScoreRow;

use crate::lock::TenantLock;
use crate::sqlite::classify;

/// Open handle on one tenant's store. Calls are serialized on its connection.
pub struct ShardStore {
    tenant_id: i64,
    conn: Mutex<Connection>,
}

/// Score to append with [`ShardStore::insert_scores`].
#[derive(Debug, Clone)]
pub struct NewScore {
    pub id: String,
    pub player_id: String,
    pub competition_id: String,
    pub score: i64,
}

fn player_from_row(row: &Row<'_>) -> rusqlite::Result<PlayerRow> {
    Ok(PlayerRow {
        tenant_id: row.get(0)?,
        id: row.get(1)?,
        display_name: row.get(2)?,
        is_disqualified: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn competition_from_row(row: &Row<'_>) -> rusqlite::Result<CompetitionRow> {
    Ok(CompetitionRow {
        tenant_id: row.get(0)?,
        id: row.get(1)?,
        title: row.get(2)?,
        finished_at: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn player_by_id(conn: &Connection, id: &str) -> Result<Option<PlayerRow>> {
    conn.query_row(
        "SELECT tenant_id, id, display_name, is_disqualified, created_at, updated_at FROM player WHERE id = ?1",
        params![id],
        player_from_row,
    )
    .optional()
    .map_err(|e| classify("select player", e))
}

fn competition_by_id(conn: &Connection, id: &str) -> Result<Option<CompetitionRow>> {
    conn.query_row(
        "SELECT tenant_id, id, title, finished_at, created_at, updated_at FROM competition WHERE id = ?1",
        params![id],
        competition_from_row,
    )
    .optional()
    .map_err(|e| classify("select competition", e))
}

impl ShardStore {
    fn new(tenant_id: i64, conn: Connection) -> Self {
        Self { tenant_id, conn: Mutex::new(conn) }
    }

    pub fn tenant_id(&self) -> i64 {
        self.tenant_id
    }

    // ── Players ────────────────────────────────────

    pub fn insert_player(&self, id: &str, display_name: &str, now: i64) -> Result<PlayerRow> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO player (tenant_id, id, display_name, is_disqualified, created_at, updated_at) VALUES (?1, ?2, ?3, 0, ?4, ?4)",
            params![self.tenant_id, id, display_name, now],
        )
        .map_err(|e| classify("insert player", e))?;
        Ok(PlayerRow {
            tenant_id: self.tenant_id,
            id: id.to_string(),
            display_name: display_name.to_string(),
            is_disqualified: false,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn retrieve_player(&self, id: &str) -> Result<Option<PlayerRow>> {
        player_by_id(&self.conn.lock(), id)
    }

    pub fn disqualify_player(&self, id: &str, now: i64) -> Result<PlayerRow> {
        let conn = self.conn.lock();
        let changed = conn
            .execute(
                "UPDATE player SET is_disqualified = 1, updated_at = ?1 WHERE id = ?2",
                params![now, id],
            )
            .map_err(|e| classify("disqualify player", e))?;
        if changed == 0 {
            return Err(ScoreHallError::not_found(format!("player {id}")));
        }
        player_by_id(&conn, id)?.ok_or_else(|| ScoreHallError::not_found(format!("player {id}")))
    }

    /// Gate for player-facing operations. An unknown subject is treated as a
    /// bad credential; a disqualified one is forbidden whatever its role.
    pub fn authorize_player(&self, id: &str) -> Result<()> {
        match self.retrieve_player(id)? {
            None => Err(ScoreHallError::authentication(format!("player {id} not found"))),
            Some(p) if p.is_disqualified => {
                Err(ScoreHallError::authorization(format!("player {id} is disqualified")))
            }
            Some(_) => Ok(()),
        }
    }

    // ── Competitions ────────────────────────────────────

    pub fn insert_competition(&self, id: &str, title: &str, now: i64) -> Result<CompetitionRow> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO competition (tenant_id, id, title, finished_at, created_at, updated_at) VALUES (?1, ?2, ?3, NULL, ?4, ?4)",
            params![self.tenant_id, id, title, now],
        )
        .map_err(|e| classify("insert competition", e))?;
        Ok(CompetitionRow {
            tenant_id: self.tenant_id,
            id: id.to_string(),
            title: title.to_string(),
            finished_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn retrieve_competition(&self, id: &str) -> Result<Option<CompetitionRow>> {
        competition_by_id(&self.conn.lock(), id)
    }

    /// Mark a competition finished. Finishing is one-way: a second call fails.
    pub fn finish_competition(&self, id: &str, finished_at: i64) -> Result<CompetitionRow> {
        let conn = self.conn.lock();
        let changed = conn
            .execute(
                "UPDATE competition SET finished_at = ?1, updated_at = ?1 WHERE id = ?2 AND finished_at IS NULL",
                params![finished_at, id],
            )
            .map_err(|e| classify("finish competition", e))?;

        let comp = competition_by_id(&conn, id)?
            .ok_or_else(|| ScoreHallError::not_found(format!("competition {id}")))?;
        if changed == 0 {
            return Err(ScoreHallError::validation(format!("competition {id} already finished")));
        }
        Ok(comp)
    }

    // ── Scores ────────────────────────────────────

    /// Append scores in one transaction, numbering rows in ingestion order.
    /// Rejects scores for unknown players and unknown or finished competitions.
    pub fn insert_scores(&self, scores: &[NewScore], now: i64) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(|e| classify("begin score import", e))?;

        let mut row_num: i64 = tx
            .query_row("SELECT COALESCE(MAX(row_num), 0) FROM player_score", [], |r| r.get(0))
            .map_err(|e| classify("max row_num", e))?;

        for s in scores {
            let comp = competition_by_id(&tx, &s.competition_id)?.ok_or_else(|| {
                ScoreHallError::not_found(format!("competition {}", s.competition_id))
            })?;
            if comp.is_finished() {
                return Err(ScoreHallError::validation(format!(
                    "competition {} is finished",
                    s.competition_id
                )));
            }
            if player_by_id(&tx, &s.player_id)?.is_none() {
                return Err(ScoreHallError::not_found(format!("player {}", s.player_id)));
            }

            row_num += 1;
            tx.execute(
                "INSERT INTO player_score (tenant_id, id, player_id, competition_id, score, row_num, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                params![self.tenant_id, s.id, s.player_id, s.competition_id, s.score, row_num, now],
            )
            .map_err(|e| classify("insert score", e))?;
        }

        tx.commit().map_err(|e| classify("commit score import", e))?;
        Ok(scores.len())
    }

    /// All scores of a competition in ingestion order.
    #[cfg(test)]
    pub(crate) fn scores_for(&self, competition_id: &str) -> Result<Vec<PlayerScoreRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT tenant_id, id, player_id, competition_id, score, row_num, created_at, updated_at
                 FROM player_score WHERE competition_id = ?1 ORDER BY row_num",
            )
            .map_err(|e| classify("prepare scores", e))?;
        let rows = stmt
            .query_map(params![competition_id], |row| {
                Ok(PlayerScoreRow {
                    tenant_id: row.get(0)?,
                    id: row.get(1)?,
                    player_id: row.get(2)?,
                    competition_id: row.get(3)?,
                    score: row.get(4)?,
                    row_num: row.get(5)?,
                    created_at: row.get(6)?,
                    updated_at: row.get(7)?,
                })
            })
            .map_err(|e| classify("query scores", e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| classify("read scores", e))?;
        Ok(rows)
    }

    /// Distinct (player_id, competition_id) pairs with at least one score,
    /// grouped by competition.
    pub fn scored_pairs(&self) -> Result<Vec<(String, String)>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT DISTINCT player_id, competition_id FROM player_score ORDER BY competition_id, player_id",
            )
            .map_err(|e| classify("prepare scored players", e))?;
        let pairs = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .map_err(|e| classify("query scored players", e))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| classify("read scored players", e))?;
        Ok(pairs)
    }
}

/// Manages tenant shards across the process.
pub struct ShardManager {
    dir: PathBuf,
    schema: String,
    handles: DashMap<i64, Arc<ShardStore>>,
    lock: Arc<dyn TenantLock>,
}

impl ShardManager {
    pub fn new(dir: impl Into<PathBuf>, schema: impl Into<String>, lock: Arc<dyn TenantLock>) -> Self {
        Self {
            dir: dir.into(),
            schema: schema.into(),
            handles: DashMap::new(),
            lock,
        }
    }

    pub fn shard_path(&self, tenant_id: i64) -> PathBuf {
        self.dir.join(format!("{tenant_id}.db"))
    }

    /// Create the tenant's store from the schema. Runs once per tenant id.
    ///
    /// The schema goes into `<id>.db.tmp`, which is renamed into place only
    /// once complete, so a failure never leaves an openable store behind.
    pub fn provision(&self, tenant_id: i64) -> Result<()> {
        let path = self.shard_path(tenant_id);
        if path.exists() {
            return Err(ScoreHallError::store_unavailable(format!(
                "shard for tenant {tenant_id} already exists at {}",
                path.display()
            )));
        }
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            ScoreHallError::store_unavailable(format!("create {}: {e}", self.dir.display()))
        })?;

        let tmp = self.dir.join(format!("{tenant_id}.db.tmp"));
        let result = self.write_schema(&tmp).and_then(|()| {
            std::fs::rename(&tmp, &path).map_err(|e| {
                ScoreHallError::store_unavailable(format!("rename {}: {e}", tmp.display()))
            })
        });
        if result.is_err() {
            let _ = std::fs::remove_file(&tmp);
        }
        result?;

        tracing::info!("🗄 Provisioned shard for tenant {} at {}", tenant_id, path.display());
        Ok(())
    }

    fn write_schema(&self, tmp: &Path) -> Result<()> {
        if tmp.exists() {
            std::fs::remove_file(tmp)?;
        }
        let conn = Connection::open(tmp).map_err(|e| {
            ScoreHallError::store_unavailable(format!("create {}: {e}", tmp.display()))
        })?;
        conn.execute_batch(&self.schema).map_err(|e| {
            ScoreHallError::store_unavailable(format!("apply tenant schema: {e}"))
        })?;
        conn.close().map_err(|(_, e)| {
            ScoreHallError::store_unavailable(format!("close {}: {e}", tmp.display()))
        })
    }

    /// Cached handle, or open the existing store read-write and cache it.
    /// Opening a tenant that was never provisioned is an error.
    pub fn open(&self, tenant_id: i64) -> Result<Arc<ShardStore>> {
        if let Some(handle) = self.handles.get(&tenant_id) {
            return Ok(Arc::clone(handle.value()));
        }

        let path = self.shard_path(tenant_id);
        if !path.exists() {
            return Err(ScoreHallError::store_unavailable(format!(
                "shard for tenant {tenant_id} not provisioned"
            )));
        }
        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| ScoreHallError::store_unavailable(format!("open {}: {e}", path.display())))?;

        // A concurrent opener may have won; keep whichever handle landed first.
        let entry = self
            .handles
            .entry(tenant_id)
            .or_insert_with(|| Arc::new(ShardStore::new(tenant_id, conn)));
        tracing::debug!("opened shard for tenant {}", tenant_id);
        Ok(Arc::clone(entry.value()))
    }

    /// Run `f` while holding the tenant's advisory lock. The lock is released
    /// on every exit path, including errors.
    pub fn with_exclusive_lock<T>(&self, tenant_id: i64, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let _guard = self.lock.acquire(tenant_id)?;
        f()
    }

    /// Drop every cached handle.
    pub fn reset_all(&self) {
        let count = self.handles.len();
        self.handles.clear();
        tracing::info!("⏹ Closed {} cached shard handles", count);
    }

    /// Delete every shard, temporary and lock file in the shard directory.
    pub fn wipe_all(&self) -> Result<()> {
        if !self.dir.exists() {
            return Ok(());
        }
        const SUFFIXES: [&str; 6] = [".db", ".db.tmp", ".db-wal", ".db-shm", ".db-journal", ".lock"];
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if SUFFIXES.iter().any(|s| name.ends_with(s)) {
                std::fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    pub fn cached_count(&self) -> usize {
        self.handles.len()
    }
}
