#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use rusqlite::Connection;
use tower::ServiceExt;

use tidepool::auth::{Auth, TOKEN_TTL};
use tidepool::sysdb::SystemDb;
use tidepool::{
    router, AppState, Config, Error, Hub, JournalEntry, Notifier, Operation, Result, StoreManager,
    TenantId, Version, VersionSource,
};

// =============================================================================
// Coordination doubles
// =============================================================================

/// In-memory version counter with a failure switch, standing in for the
/// coordination service in tests.
pub struct MemoryOracle {
    counters: Mutex<HashMap<TenantId, i64>>,
    pub fail: AtomicBool,
}

impl MemoryOracle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            counters: Mutex::new(HashMap::new()),
            fail: AtomicBool::new(false),
        })
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl VersionSource for MemoryOracle {
    async fn next(&self, tenant: &TenantId) -> Result<Version> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::Internal("oracle offline".into()));
        }
        let mut counters = self.counters.lock().unwrap();
        let v = counters.entry(tenant.clone()).or_insert(0);
        *v += 1;
        Ok(Version::from_raw(*v))
    }

    async fn current(&self, tenant: &TenantId) -> Result<Version> {
        let counters = self.counters.lock().unwrap();
        Ok(Version::from_raw(counters.get(tenant).copied().unwrap_or(0)))
    }
}

/// Delivers notifications straight into the local hub — the same path the
/// pub/sub relay takes in production.
pub struct LoopbackNotifier {
    pub hub: Arc<Hub>,
}

#[async_trait]
impl Notifier for LoopbackNotifier {
    async fn notify(&self, tenant: &TenantId, version: Version) -> Result<()> {
        self.hub.deliver(tenant, version);
        Ok(())
    }
}

// =============================================================================
// Test application
// =============================================================================

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub oracle: Arc<MemoryOracle>,
    pub hub: Arc<Hub>,
    _dir: tempfile::TempDir,
}

pub fn test_app() -> TestApp {
    test_app_with_capacity(8)
}

pub fn test_app_with_capacity(capacity: usize) -> TestApp {
    let dir = tempfile::tempdir().expect("create temp dir");
    let hub = Arc::new(Hub::new());
    let oracle = MemoryOracle::new();
    let notifier = Arc::new(LoopbackNotifier { hub: hub.clone() });

    let config = Config {
        data_dir: dir.path().to_path_buf(),
        tenant_cache_cap: capacity,
        ..Config::default()
    };
    let stores = Arc::new(StoreManager::new(dir.path(), capacity).expect("store manager"));
    let sysdb = Arc::new(SystemDb::open(dir.path().join("system.db")).expect("system db"));
    let auth = Arc::new(Auth::new(b"test-secret"));

    let state = AppState {
        config: Arc::new(config),
        stores,
        oracle: oracle.clone(),
        notifier,
        hub: hub.clone(),
        auth,
        sysdb,
    };

    TestApp {
        router: router(state.clone()),
        state,
        oracle,
        hub,
        _dir: dir,
    }
}

impl TestApp {
    pub fn tenant(&self, id: &str) -> TenantId {
        TenantId::parse(id).expect("valid tenant id")
    }

    pub fn token(&self, tenant: &str, user: &str) -> String {
        self.state
            .auth
            .issue(&self.tenant(tenant), user, TOKEN_TTL)
            .expect("issue token")
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("build request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router never errors");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("collect body")
            .to_bytes();
        let value = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, value)
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, serde_json::Value) {
        self.request(Method::GET, uri, Some(token), None).await
    }

    pub async fn post(
        &self,
        uri: &str,
        token: &str,
        body: serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        self.request(Method::POST, uri, Some(token), Some(body)).await
    }

    pub async fn put(
        &self,
        uri: &str,
        token: &str,
        body: serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        self.request(Method::PUT, uri, Some(token), Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: &str) -> (StatusCode, serde_json::Value) {
        self.request(Method::DELETE, uri, Some(token), None).await
    }

    /// Pulls and decodes the tenant's deltas.
    pub async fn deltas(&self, token: &str, since: i64) -> Vec<JournalEntry> {
        let (status, body) = self.get(&format!("/api/sync?since={since}"), token).await;
        assert_eq!(status, StatusCode::OK, "delta pull failed: {body}");
        serde_json::from_value(body).expect("journal entries")
    }
}

// =============================================================================
// Client-replica applier
// =============================================================================

/// Primary-key column for a domain table, as a replica would know it.
fn primary_key(table: &str) -> &'static str {
    match table {
        "orders" => "uuid",
        _ => "id",
    }
}

/// Opens an empty replica with the same schema as a tenant store.
pub fn fresh_replica() -> Connection {
    let mut conn = Connection::open_in_memory().expect("open replica");
    tidepool::schema::configure(&conn).expect("configure replica");
    tidepool::schema::migrate(&mut conn).expect("migrate replica");
    conn
}

/// Applies journal entries the way a client replica does: upsert on primary
/// key for INSERT/UPDATE/PATCH, delete on primary key for DELETE, in the
/// order given. Payload keys with no matching column are ignored.
pub fn apply_journal(conn: &Connection, entries: &[JournalEntry]) {
    for entry in entries {
        let pk = primary_key(&entry.table_name);
        match entry.operation {
            Operation::Delete => {
                conn.execute(
                    &format!("DELETE FROM {} WHERE {} = ?1", entry.table_name, pk),
                    [&entry.entity_id],
                )
                .expect("replica delete");
            }
            Operation::Insert | Operation::Update | Operation::Patch => {
                let payload: serde_json::Map<String, serde_json::Value> =
                    serde_json::from_str(&entry.payload).expect("payload is a JSON object");
                let columns = table_columns(conn, &entry.table_name);

                let mut names = Vec::new();
                let mut values: Vec<rusqlite::types::Value> = Vec::new();
                for (key, value) in &payload {
                    if !columns.iter().any(|c| c == key) {
                        continue;
                    }
                    names.push(key.clone());
                    values.push(json_to_sql(value));
                }
                assert!(
                    names.iter().any(|n| n == pk),
                    "payload for {} must carry its primary key",
                    entry.table_name
                );

                let placeholders: Vec<String> =
                    (1..=names.len()).map(|i| format!("?{i}")).collect();
                conn.execute(
                    &format!(
                        "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
                        entry.table_name,
                        names.join(", "),
                        placeholders.join(", ")
                    ),
                    rusqlite::params_from_iter(values),
                )
                .expect("replica upsert");
            }
        }
    }
}

fn table_columns(conn: &Connection, table: &str) -> Vec<String> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .expect("table_info");
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .expect("column names");
    rows.map(|r| r.expect("column name")).collect()
}

fn json_to_sql(value: &serde_json::Value) -> rusqlite::types::Value {
    use rusqlite::types::Value as Sql;
    match value {
        serde_json::Value::Null => Sql::Null,
        serde_json::Value::Bool(b) => Sql::Integer(*b as i64),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Sql::Integer(i)
            } else {
                Sql::Real(n.as_f64().unwrap_or(0.0))
            }
        }
        serde_json::Value::String(s) => Sql::Text(s.clone()),
        other => Sql::Text(other.to_string()),
    }
}

/// Dumps a table's rows (excluding server-owned timestamp columns) for
/// state comparison, ordered by primary key.
pub fn dump_table(conn: &Connection, table: &str) -> Vec<Vec<String>> {
    let pk = primary_key(table);
    let columns: Vec<String> = table_columns(conn, table)
        .into_iter()
        .filter(|c| c != "created_at")
        .collect();
    let mut stmt = conn
        .prepare(&format!(
            "SELECT {} FROM {} ORDER BY {}",
            columns.join(", "),
            table,
            pk
        ))
        .expect("dump query");
    let rows = stmt
        .query_map([], |row| {
            let mut out = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                let value: rusqlite::types::Value = row.get(i)?;
                out.push(format!("{value:?}"));
            }
            Ok(out)
        })
        .expect("dump rows");
    rows.map(|r| r.expect("dump row")).collect()
}
