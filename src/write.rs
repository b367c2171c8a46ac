//! # Write Pipeline
//!
//! Every domain mutation, without exception, runs inside a [`WriteTx`]:
//!
//! 1. the tenant store is opened and its single writer connection locked;
//! 2. `BEGIN IMMEDIATE` starts the transaction;
//! 3. the handler mutates domain rows and reads back their post-state;
//! 4. [`WriteTx::allocate`] asks the version oracle for this request's
//!    version — failure rolls everything back;
//! 5. [`WriteTx::journal`] appends one row per mutated entity, all at the
//!    allocated version;
//! 6. [`WriteTx::commit`] commits, and only then publishes exactly one
//!    notification.
//!
//! The ordering is load-bearing. Allocating before commit puts the journal
//! row and the domain row in the same atomic unit; notifying after commit
//! guarantees that a client who sees version `v` on its stream will find it
//! in a subsequent delta pull. The writer lock is held from step 1 through
//! commit, so per tenant the journal's insertion order equals version order.
//!
//! Dropping a `WriteTx` before commit — an error return, a panic, or the
//! client hanging up and axum dropping the handler future — rolls the
//! transaction back. A failed request leaves no journal row and publishes
//! nothing.

use std::sync::Arc;

use rusqlite::Connection;
use tokio::sync::OwnedMutexGuard;

use crate::coord::{Notifier, VersionSource};
use crate::error::{Error, Result};
use crate::journal;
use crate::store::TenantStore;
use crate::types::{Operation, TenantId, Version};

/// An open write transaction on one tenant's store.
pub struct WriteTx {
    tenant: TenantId,
    conn: OwnedMutexGuard<Connection>,
    oracle: Arc<dyn VersionSource>,
    notifier: Arc<dyn Notifier>,
    version: Option<Version>,
    finished: bool,
}

impl WriteTx {
    /// Locks the store's writer and begins the transaction.
    ///
    /// Handlers reach this through
    /// [`AppState::begin_write`](crate::server::AppState::begin_write);
    /// operator tooling may drive it directly.
    pub async fn begin(
        store: &TenantStore,
        oracle: Arc<dyn VersionSource>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let conn = store.lock_write().await;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(Self {
            tenant: store.tenant().clone(),
            conn,
            oracle,
            notifier,
            version: None,
            finished: false,
        })
    }

    /// The transaction's connection, for domain SQL.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// The tenant this transaction is scoped to.
    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    /// Allocates this request's version from the oracle.
    ///
    /// One allocation per request: every journal row this transaction
    /// appends carries the returned version. The oracle round-trip happens
    /// while the writer lock is held, which is what linearises concurrent
    /// writers to the same tenant.
    pub async fn allocate(&mut self) -> Result<Version> {
        if self.version.is_some() {
            return Err(Error::Internal(
                "version already allocated for this write".into(),
            ));
        }
        let version = self.oracle.next(&self.tenant).await?;
        self.version = Some(version);
        Ok(version)
    }

    /// Appends a journal row describing one mutated entity.
    ///
    /// Requires [`allocate`](Self::allocate) to have succeeded; multiple
    /// rows (one request mutating several entities) share the version.
    pub fn journal(
        &mut self,
        operation: Operation,
        table_name: &str,
        entity_id: &str,
        payload: &str,
    ) -> Result<()> {
        let version = self
            .version
            .ok_or_else(|| Error::Internal("journal before version allocation".into()))?;
        journal::append(&self.conn, table_name, entity_id, operation, payload, version)
    }

    /// Commits and, on success, publishes exactly one notification.
    ///
    /// A publish failure is logged and swallowed: the write is durable and
    /// clients self-heal by pulling. A commit failure propagates and the
    /// `Drop` impl rolls back — no one is ever told about a version that is
    /// not in the journal.
    pub async fn commit(mut self) -> Result<Version> {
        let version = self
            .version
            .ok_or_else(|| Error::Internal("commit before version allocation".into()))?;

        self.conn.execute_batch("COMMIT")?;
        self.finished = true;

        if let Err(e) = self.notifier.notify(&self.tenant, version).await {
            tracing::warn!(tenant = %self.tenant, %version, error = %e,
                "commit notification failed; clients will recover via delta pull");
        }
        Ok(version)
    }

    /// Explicitly abandons the transaction. Dropping does the same.
    pub fn rollback(self) {
        // Drop impl performs the ROLLBACK.
    }
}

impl Drop for WriteTx {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.conn.execute_batch("ROLLBACK") {
                tracing::error!(tenant = %self.tenant, error = %e, "rollback failed");
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct TestOracle {
        counters: Mutex<HashMap<TenantId, i64>>,
        fail: std::sync::atomic::AtomicBool,
    }

    impl TestOracle {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                counters: Mutex::new(HashMap::new()),
                fail: std::sync::atomic::AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl VersionSource for TestOracle {
        async fn next(&self, tenant: &TenantId) -> Result<Version> {
            if self.fail.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(Error::Internal("oracle down".into()));
            }
            let mut counters = self.counters.lock().unwrap();
            let v = counters.entry(tenant.clone()).or_insert(0);
            *v += 1;
            Ok(Version::from_raw(*v))
        }

        async fn current(&self, tenant: &TenantId) -> Result<Version> {
            let counters = self.counters.lock().unwrap();
            Ok(Version::from_raw(
                counters.get(tenant).copied().unwrap_or(0),
            ))
        }
    }

    struct RecordingNotifier {
        events: Mutex<Vec<(TenantId, Version)>>,
    }

    impl RecordingNotifier {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                events: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, tenant: &TenantId, version: Version) -> Result<()> {
            self.events.lock().unwrap().push((tenant.clone(), version));
            Ok(())
        }
    }

    fn tenant(id: &str) -> TenantId {
        TenantId::parse(id).unwrap()
    }

    async fn test_store(dir: &std::path::Path) -> TenantStore {
        TenantStore::open(dir, &tenant("acme")).unwrap()
    }

    #[tokio::test]
    async fn committed_write_journals_and_notifies_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path()).await;
        let oracle = TestOracle::new();
        let notifier = RecordingNotifier::new();

        let mut tx = WriteTx::begin(&store, oracle.clone(), notifier.clone())
            .await
            .unwrap();
        tx.conn()
            .execute("INSERT INTO projects (id, name) VALUES ('p-1', 'Roadmap')", [])
            .unwrap();
        let v = tx.allocate().await.unwrap();
        tx.journal(Operation::Insert, "projects", "p-1", r#"{"id":"p-1"}"#)
            .unwrap();
        let committed = tx.commit().await.unwrap();
        assert_eq!(committed, v);

        let events = notifier.events.lock().unwrap().clone();
        assert_eq!(events, vec![(tenant("acme"), Version::from_raw(1))]);

        let entries = store
            .read(|c| journal::read_since(c, Version::ZERO))
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].version, Version::from_raw(1));
    }

    #[tokio::test]
    async fn oracle_failure_rolls_back_and_stays_silent() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path()).await;
        let oracle = TestOracle::new();
        let notifier = RecordingNotifier::new();

        {
            let mut tx = WriteTx::begin(&store, oracle.clone(), notifier.clone())
                .await
                .unwrap();
            tx.conn()
                .execute("INSERT INTO projects (id, name) VALUES ('p-1', 'Doomed')", [])
                .unwrap();
            oracle.fail.store(true, std::sync::atomic::Ordering::SeqCst);
            assert!(tx.allocate().await.is_err());
            // tx dropped here -> rollback
        }

        assert!(notifier.events.lock().unwrap().is_empty());
        let count: i64 = store
            .read(|c| Ok(c.query_row("SELECT COUNT(*) FROM projects", [], |r| r.get(0))?))
            .await
            .unwrap();
        assert_eq!(count, 0, "domain row must be rolled back");
        let entries = store
            .read(|c| journal::read_since(c, Version::ZERO))
            .await
            .unwrap();
        assert!(entries.is_empty(), "no journal row for a failed write");
    }

    #[tokio::test]
    async fn drop_without_commit_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path()).await;
        let oracle = TestOracle::new();
        let notifier = RecordingNotifier::new();

        {
            let mut tx = WriteTx::begin(&store, oracle.clone(), notifier.clone())
                .await
                .unwrap();
            tx.conn()
                .execute("INSERT INTO projects (id, name) VALUES ('p-1', 'Lost')", [])
                .unwrap();
            let _ = tx.allocate().await.unwrap();
            tx.journal(Operation::Insert, "projects", "p-1", "{}").unwrap();
            // dropped without commit (e.g. client disconnected)
        }

        let count: i64 = store
            .read(|c| Ok(c.query_row("SELECT COUNT(*) FROM mutation_journal", [], |r| r.get(0))?))
            .await
            .unwrap();
        assert_eq!(count, 0);
        assert!(notifier.events.lock().unwrap().is_empty());

        // The counter advanced: that gap is allowed, order is what matters.
        assert_eq!(
            oracle.current(&tenant("acme")).await.unwrap(),
            Version::from_raw(1)
        );
    }

    #[tokio::test]
    async fn journal_before_allocate_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path()).await;
        let mut tx = WriteTx::begin(&store, TestOracle::new(), RecordingNotifier::new())
            .await
            .unwrap();
        assert!(tx
            .journal(Operation::Insert, "projects", "p-1", "{}")
            .is_err());
    }

    #[tokio::test]
    async fn sequential_writes_get_consecutive_versions_in_journal_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path()).await;
        let oracle = TestOracle::new();
        let notifier = RecordingNotifier::new();

        for name in ["one", "two", "three"] {
            let mut tx = WriteTx::begin(&store, oracle.clone(), notifier.clone())
                .await
                .unwrap();
            let id = format!("p-{name}");
            tx.conn()
                .execute(
                    "INSERT INTO projects (id, name) VALUES (?1, ?2)",
                    rusqlite::params![id, name],
                )
                .unwrap();
            tx.allocate().await.unwrap();
            tx.journal(Operation::Insert, "projects", &id, "{}").unwrap();
            tx.commit().await.unwrap();
        }

        let entries = store
            .read(|c| journal::read_since(c, Version::ZERO))
            .await
            .unwrap();
        let versions: Vec<i64> = entries.iter().map(|e| e.version.as_raw()).collect();
        assert_eq!(versions, vec![1, 2, 3]);
        let seqs: Vec<i64> = entries.iter().map(|e| e.seq).collect();
        assert!(seqs.windows(2).all(|w| w[0] < w[1]), "seq order == version order");
    }
}
