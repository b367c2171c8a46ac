//! # Mutation Journal
//!
//! The per-tenant append-only log of entity changes. Every domain write
//! appends one or more rows here *inside the same transaction* as the domain
//! change, labeled with the version the oracle allocated for the request.
//! Clients rebuild their replica by reading rows with `version > since` in
//! ascending order and applying them as upserts/deletes keyed by entity id.
//!
//! The journal is never pruned by the engine; replay from version 0 must
//! always reproduce the tenant's current domain state.

use rusqlite::{params, Connection};

use crate::error::Result;
use crate::types::{JournalEntry, Operation, Version};

/// The payload recorded for DELETE rows: clients only need the entity id.
pub const DELETE_PAYLOAD: &str = "{}";

/// Appends one journal row.
///
/// Must be called with a transaction open on `conn`; the row becomes
/// durable if and only if that transaction commits.
pub fn append(
    conn: &Connection,
    table_name: &str,
    entity_id: &str,
    operation: Operation,
    payload: &str,
    version: Version,
) -> Result<()> {
    conn.execute(
        "INSERT INTO mutation_journal (table_name, entity_id, operation, payload, version)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            table_name,
            entity_id,
            operation.as_str(),
            payload,
            version.as_raw()
        ],
    )?;
    Ok(())
}

/// Reads every journal row with `version > since`, ascending by version.
///
/// Unbounded on purpose: pagination is not an engine concern, and a WAL
/// snapshot guarantees a row from a concurrent write either appears whole or
/// not at all.
pub fn read_since(conn: &Connection, since: Version) -> Result<Vec<JournalEntry>> {
    let mut stmt = conn.prepare(
        "SELECT seq, table_name, entity_id, operation, payload, version
         FROM mutation_journal
         WHERE version > ?1
         ORDER BY version ASC, seq ASC",
    )?;

    let rows = stmt.query_map([since.as_raw()], |row| {
        let op: String = row.get(3)?;
        Ok(JournalEntry {
            seq: row.get(0)?,
            table_name: row.get(1)?,
            entity_id: row.get(2)?,
            // Unknown spellings cannot appear: append() only writes Operation.
            operation: Operation::from_str(&op).unwrap_or(Operation::Patch),
            payload: row.get(4)?,
            version: Version::from_raw(row.get(5)?),
        })
    })?;

    let mut entries = Vec::new();
    for row in rows {
        entries.push(row?);
    }
    Ok(entries)
}

/// The highest version recorded in this store's journal (0 when empty).
pub fn max_version(conn: &Connection) -> Result<Version> {
    let v: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM mutation_journal",
        [],
        |row| row.get(0),
    )?;
    Ok(Version::from_raw(v))
}

// =============================================================================
// Tests
// =============================================================================
