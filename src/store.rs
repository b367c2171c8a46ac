//! # Tenant Store
//!
//! One self-contained SQLite database per tenant, holding the domain tables
//! and the mutation journal. A store owns two connections:
//!
//! - a **writer** behind an async mutex — SQLite performs best with a single
//!   writer, and serializing writers per tenant is also what makes the
//!   allocate-then-commit version ordering hold;
//! - a **read-only** connection — under WAL it sees the latest committed
//!   snapshot without ever blocking the writer.
//!
//! Handles are cheap to share (`Arc`) and safe for concurrent use; all
//! mutual exclusion is internal.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::{Connection, OpenFlags};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::Result;
use crate::schema;
use crate::types::TenantId;

/// An open tenant store.
pub struct TenantStore {
    tenant: TenantId,
    path: PathBuf,
    write: Arc<Mutex<Connection>>,
    read: Arc<Mutex<Connection>>,
}

impl TenantStore {
    /// Opens (creating if necessary) and migrates the store for `tenant`
    /// inside `data_dir`.
    ///
    /// The writer connection is opened first so the file exists before the
    /// read-only connection attaches to it. Any migration failure aborts the
    /// open; nothing is cached by the caller in that case.
    pub(crate) fn open(data_dir: &Path, tenant: &TenantId) -> Result<Self> {
        let path = data_dir.join(tenant.store_file_name());

        let mut write = Connection::open(&path)?;
        schema::configure(&write)?;
        schema::migrate(&mut write)?;

        // The file exists now; the reader attaches read-only and needs only
        // a busy timeout (WAL mode is a property of the database file).
        let read = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        read.busy_timeout(std::time::Duration::from_millis(5000))?;

        tracing::info!(tenant = %tenant, path = %path.display(), "opened tenant store");

        Ok(Self {
            tenant: tenant.clone(),
            path,
            write: Arc::new(Mutex::new(write)),
            read: Arc::new(Mutex::new(read)),
        })
    }

    /// The tenant this store belongs to.
    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    /// The store's file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquires the single writer connection.
    ///
    /// The guard is owned so a write transaction can carry it across await
    /// points (the oracle round-trip happens while it is held).
    pub(crate) async fn lock_write(&self) -> OwnedMutexGuard<Connection> {
        self.write.clone().lock_owned().await
    }

    /// Runs a closure against the read-only connection.
    ///
    /// Reads see the latest committed state and never block on an in-flight
    /// write transaction.
    pub async fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.read.lock().await;
        f(&conn)
    }
}

impl std::fmt::Debug for TenantStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantStore")
            .field("tenant", &self.tenant)
            .field("path", &self.path)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
