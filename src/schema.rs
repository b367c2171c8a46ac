//! # Tenant Store Schema & Migrations
//!
//! Every tenant store is brought to the latest schema version on open. The
//! current version lives in SQLite's `PRAGMA user_version`; each pending
//! migration executes in its own transaction together with the version bump,
//! so a failed migration leaves the store exactly where it was.
//!
//! The reserved `mutation_journal` table lives in the same store as the
//! domain tables. That is a hard requirement, not a convenience: a domain
//! change and the journal row describing it must commit atomically, and a
//! single local transaction is the only mechanism that provides that without
//! a distributed commit protocol.

use std::time::Duration;

use rusqlite::Connection;

use crate::error::{Error, Result};

// =============================================================================
// Connection Pragmas
// =============================================================================

/// SQLite busy timeout for every tenant-store connection.
const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Applies the per-connection pragmas every store connection needs.
///
/// WAL keeps readers off the writer's back; `synchronous = NORMAL` syncs the
/// WAL on commit but not on every page, which is the standard WAL trade.
pub fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA journal_mode = WAL")?;
    conn.execute_batch("PRAGMA synchronous = NORMAL")?;
    conn.execute_batch("PRAGMA foreign_keys = ON")?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(())
}

// =============================================================================
// Migrations
// =============================================================================

/// One schema migration: runs once, in its own transaction, when the store's
/// `user_version` is below `version`.
pub struct Migration {
    pub version: i32,
    pub name: &'static str,
    pub sql: &'static str,
}

/// All migrations, ascending by version. Append-only: released entries are
/// never edited.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "core",
        sql: r#"
CREATE TABLE projects (
    id         TEXT PRIMARY KEY,
    name       TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE kanban_columns (
    id       TEXT PRIMARY KEY,
    name     TEXT NOT NULL,
    position INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE kanban_cards (
    id                   TEXT PRIMARY KEY,
    project_id           TEXT NOT NULL,
    column_name          TEXT NOT NULL DEFAULT 'backlog',
    title                TEXT NOT NULL,
    position             INTEGER NOT NULL DEFAULT 0,
    approval_status      TEXT NOT NULL DEFAULT 'none',
    assigned_approver_id TEXT,
    due_date             TEXT,
    client               TEXT,
    priority             TEXT NOT NULL DEFAULT 'normal',
    notes                TEXT,
    created_at           TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE INDEX kanban_cards_project ON kanban_cards(project_id);

CREATE TABLE mutation_journal (
    seq        INTEGER PRIMARY KEY AUTOINCREMENT,
    table_name TEXT NOT NULL,
    entity_id  TEXT NOT NULL,
    operation  TEXT NOT NULL,
    payload    TEXT NOT NULL,
    version    INTEGER NOT NULL
);
CREATE INDEX mutation_journal_version ON mutation_journal(version);
"#,
    },
    Migration {
        version: 2,
        name: "card_details",
        sql: r#"
CREATE TABLE card_tags (
    id      TEXT PRIMARY KEY,
    card_id TEXT NOT NULL REFERENCES kanban_cards(id) ON DELETE CASCADE,
    label   TEXT NOT NULL
);
CREATE INDEX card_tags_card ON card_tags(card_id);

CREATE TABLE card_assignees (
    id      TEXT PRIMARY KEY,
    card_id TEXT NOT NULL REFERENCES kanban_cards(id) ON DELETE CASCADE,
    user_id TEXT NOT NULL
);
CREATE INDEX card_assignees_card ON card_assignees(card_id);
"#,
    },
    Migration {
        version: 3,
        name: "pos",
        sql: r#"
CREATE TABLE products (
    id    TEXT PRIMARY KEY,
    name  TEXT NOT NULL,
    price REAL NOT NULL DEFAULT 0
);

CREATE TABLE orders (
    uuid       TEXT PRIMARY KEY,
    short_id   TEXT NOT NULL,
    card_id    TEXT,
    project_id TEXT,
    total      REAL NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE order_items (
    id         TEXT PRIMARY KEY,
    order_id   TEXT NOT NULL REFERENCES orders(uuid) ON DELETE CASCADE,
    product_id TEXT NOT NULL,
    qty        INTEGER NOT NULL
);
CREATE INDEX order_items_order ON order_items(order_id);
"#,
    },
];

/// Reads the store's current schema version.
pub fn schema_version(conn: &Connection) -> Result<i32> {
    let v = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    Ok(v)
}

/// Applies every migration newer than the store's current version.
///
/// Idempotent: re-running against an up-to-date store does nothing.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    let mut current = schema_version(conn)?;

    for migration in MIGRATIONS {
        if migration.version <= current {
            continue;
        }
        tracing::info!(
            from = current,
            to = migration.version,
            name = migration.name,
            "applying migration"
        );

        let apply = |conn: &mut Connection| -> std::result::Result<(), rusqlite::Error> {
            let tx = conn.transaction()?;
            tx.execute_batch(migration.sql)?;
            tx.pragma_update(None, "user_version", migration.version)?;
            tx.commit()
        };
        apply(conn).map_err(|source| Error::Migration {
            version: migration.version,
            name: migration.name,
            source,
        })?;

        current = migration.version;
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
