//! # Domain Types
//!
//! Core types for the delta-sync engine: tenants, versions, journal
//! operations, and the per-request identity. Newtypes keep the integer and
//! string domains from mixing — a [`Version`] is never accidentally a journal
//! `seq`, and a [`TenantId`] is never an arbitrary string that could escape
//! into a file path.
//!
//! ## Invariants
//!
//! - [`TenantId`]: validated at construction; safe to embed in a store file
//!   name and a coordination-service key.
//! - [`Version`]: strictly increasing per tenant, allocated only by the
//!   version oracle. Gaps are possible (a write that allocated and then
//!   failed), repeats are not.

use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Tenant Identity
// =============================================================================

/// Maximum accepted length of a tenant id.
pub const TENANT_ID_MAX_LEN: usize = 64;

/// An opaque tenant identifier, the unit of isolation.
///
/// Every tenant owns one store file, one version counter, and one
/// notification topic. The id is embedded verbatim in all three, so the
/// constructor only accepts `[A-Za-z0-9._-]` (no leading dot) up to 64
/// characters. Anything else is rejected at the identity boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    /// Parses a tenant id, returning `None` if it fails validation.
    pub fn parse(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        if id.is_empty() || id.len() > TENANT_ID_MAX_LEN || id.starts_with('.') {
            return None;
        }
        if !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        {
            return None;
        }
        Some(Self(id))
    }

    /// Returns the string form of the id.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The tenant's store file name inside the data directory.
    pub fn store_file_name(&self) -> String {
        format!("tenant_{}.db", self.0)
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Versions
// =============================================================================

/// A point in a tenant's history.
///
/// 64-bit, strictly increasing, allocated by one atomic increment of the
/// tenant's counter in the coordination service. Version 0 means "nothing
/// applied yet" and never labels a journal row.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Version(i64);

impl Version {
    /// The sentinel "before any write" version.
    pub const ZERO: Version = Version(0);

    /// Wraps a raw counter value.
    pub fn from_raw(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw value for storage and wire encoding.
    pub fn as_raw(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Journal Operations
// =============================================================================

/// The kind of change a journal row records.
///
/// Clients apply `INSERT`/`UPDATE`/`PATCH` as an upsert keyed by the entity's
/// primary key and `DELETE` as a delete by primary key, which is what makes
/// replay idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    Insert,
    Update,
    Delete,
    Patch,
}

impl Operation {
    /// The wire/storage spelling of the operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Insert => "INSERT",
            Operation::Update => "UPDATE",
            Operation::Delete => "DELETE",
            Operation::Patch => "PATCH",
        }
    }

    /// Parses the storage spelling back into an operation.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "INSERT" => Some(Operation::Insert),
            "UPDATE" => Some(Operation::Update),
            "DELETE" => Some(Operation::Delete),
            "PATCH" => Some(Operation::Patch),
            _ => None,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Journal Entries
// =============================================================================

/// One row of a tenant's mutation journal, as stored and as served by the
/// delta endpoint.
///
/// `seq` is the store-local autoincrement (informational; serialized as
/// `id` on the wire). Ordering between clients is defined by `version`
/// alone. `payload` is opaque JSON text: the engine never parses it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalEntry {
    #[serde(rename = "id")]
    pub seq: i64,
    pub table_name: String,
    pub entity_id: String,
    pub operation: Operation,
    pub payload: String,
    pub version: Version,
}

// =============================================================================
// Request Identity
// =============================================================================

/// The `(tenant, user)` pair extracted from a request's bearer credential.
///
/// Attached to the request scope by the auth middleware; never persisted.
#[derive(Debug, Clone)]
pub struct Identity {
    pub tenant: TenantId,
    pub user_id: String,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_id_accepts_reasonable_names() {
        for id in ["acme", "globex-2", "team_42", "a.b.c", "X"] {
            assert!(TenantId::parse(id).is_some(), "{id} should parse");
        }
    }

    #[test]
    fn tenant_id_rejects_hostile_names() {
        for id in ["", "../../etc/passwd", "a/b", "a b", ".hidden", "ü"] {
            assert!(TenantId::parse(id).is_none(), "{id:?} should be rejected");
        }
        let too_long = "a".repeat(TENANT_ID_MAX_LEN + 1);
        assert!(TenantId::parse(too_long).is_none());
    }

    #[test]
    fn tenant_store_file_name_is_deterministic() {
        let t = TenantId::parse("acme").unwrap();
        assert_eq!(t.store_file_name(), "tenant_acme.db");
    }

    #[test]
    fn version_ordering_and_display() {
        assert!(Version::ZERO < Version::from_raw(1));
        assert_eq!(Version::from_raw(7).to_string(), "7");
        assert_eq!(Version::ZERO.as_raw(), 0);
    }

    #[test]
    fn operation_round_trips_storage_spelling() {
        for op in [
            Operation::Insert,
            Operation::Update,
            Operation::Delete,
            Operation::Patch,
        ] {
            assert_eq!(Operation::from_str(op.as_str()), Some(op));
        }
        assert_eq!(Operation::from_str("UPSERT"), None);
    }

    #[test]
    fn journal_entry_serializes_seq_as_id() {
        let entry = JournalEntry {
            seq: 3,
            table_name: "projects".into(),
            entity_id: "p-1".into(),
            operation: Operation::Insert,
            payload: r#"{"id":"p-1"}"#.into(),
            version: Version::from_raw(9),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["id"], 3);
        assert_eq!(json["operation"], "INSERT");
        assert_eq!(json["version"], 9);
        assert!(json.get("seq").is_none());
    }
}
