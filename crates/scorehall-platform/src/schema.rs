//! SQL schema definitions for the central registry and tenant shards.

/// Central registry: tenant directory, id sequence, ranking visit log.
pub const REGISTRY_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS tenant (
        id INTEGER PRIMARY KEY,
        name TEXT NOT NULL UNIQUE,
        display_name TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS id_generator (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        stub TEXT NOT NULL UNIQUE
    );

    CREATE TABLE IF NOT EXISTS visit_history (
        player_id TEXT NOT NULL,
        tenant_id INTEGER NOT NULL,
        competition_id TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS visit_history_tenant_idx
        ON visit_history (tenant_id, competition_id, player_id, created_at);
";

/// Drops everything [`REGISTRY_SCHEMA`] creates. Dropping `id_generator`
/// also clears its AUTOINCREMENT high-water mark.
pub const REGISTRY_TEARDOWN: &str = "
    DROP INDEX IF EXISTS visit_history_tenant_idx;
    DROP TABLE IF EXISTS visit_history;
    DROP TABLE IF EXISTS id_generator;
    DROP TABLE IF EXISTS tenant;
";

/// Built-in schema for a freshly provisioned tenant shard.
pub const TENANT_SCHEMA: &str = "
    CREATE TABLE competition (
        tenant_id INTEGER NOT NULL,
        id TEXT NOT NULL PRIMARY KEY,
        title TEXT NOT NULL,
        finished_at INTEGER NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );

    CREATE TABLE player (
        tenant_id INTEGER NOT NULL,
        id TEXT NOT NULL PRIMARY KEY,
        display_name TEXT NOT NULL,
        is_disqualified INTEGER NOT NULL DEFAULT 0,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );

    CREATE TABLE player_score (
        tenant_id INTEGER NOT NULL,
        id TEXT NOT NULL PRIMARY KEY,
        player_id TEXT NOT NULL,
        competition_id TEXT NOT NULL,
        score INTEGER NOT NULL,
        row_num INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );

    CREATE INDEX player_score_competition_idx
        ON player_score (competition_id, player_id);
";
