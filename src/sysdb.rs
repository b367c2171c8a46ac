//! # System Identity Database
//!
//! The one database that is *not* per-tenant: a central `system.db` holding
//! user accounts for registration and login. The engine core never touches
//! it; it exists so the surrounding executable can mint the bearer tokens
//! the identity context consumes.
//!
//! Passwords are stored as HKDF-SHA256 derivations with a per-user random
//! salt. Verification re-derives and compares; the plaintext never persists.

use std::path::Path;

use hkdf::Hkdf;
use rand::RngCore;
use rusqlite::{params, Connection, ErrorCode};
use serde::Serialize;
use sha2::Sha256;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::schema;
use crate::types::TenantId;

/// Domain-separation info string for password derivation.
const PASSWORD_HKDF_INFO: &[u8] = b"tidepool.password.v1";
const SALT_LEN: usize = 16;
const DERIVED_LEN: usize = 32;

const CREATE_USERS: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id            TEXT PRIMARY KEY,
    email         TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    salt          TEXT NOT NULL,
    tenant_id     TEXT NOT NULL,
    created_at    TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE INDEX IF NOT EXISTS users_tenant ON users(tenant_id);
"#;

/// A registered account, as returned to clients (no secrets).
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub tenant_id: String,
}

/// Handle to the central users database. Single connection, single writer.
pub struct SystemDb {
    conn: Mutex<Connection>,
}

impl SystemDb {
    /// Opens (creating if necessary) the system database.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        schema::configure(&conn)?;
        conn.execute_batch(CREATE_USERS)?;
        tracing::info!(path = %path.as_ref().display(), "system db ready");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates a user. Duplicate email surfaces as a conflict.
    pub async fn register(&self, email: &str, password: &str, tenant: &TenantId) -> Result<User> {
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        let hash = derive_password(password, &salt);
        let id = Uuid::now_v7().to_string();

        let conn = self.conn.lock().await;
        let inserted = conn.execute(
            "INSERT INTO users (id, email, password_hash, salt, tenant_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, email, hash, hex_encode(&salt), tenant.as_str()],
        );
        match inserted {
            Ok(_) => Ok(User {
                id,
                email: email.to_string(),
                tenant_id: tenant.as_str().to_string(),
            }),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == ErrorCode::ConstraintViolation =>
            {
                Err(Error::Conflict("email already registered".into()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Verifies credentials and returns the account.
    ///
    /// Unknown email and wrong password are indistinguishable to the caller.
    pub async fn login(&self, email: &str, password: &str) -> Result<User> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                "SELECT id, email, tenant_id, password_hash, salt FROM users WHERE email = ?1",
                [email],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    Error::Unauthenticated("invalid email or password".into())
                }
                other => Error::Store(other),
            })?;

        let (id, email, tenant_id, stored_hash, salt_hex) = row;
        let salt = hex_decode(&salt_hex)
            .ok_or_else(|| Error::Internal("corrupt salt in system db".into()))?;
        if derive_password(password, &salt) != stored_hash {
            return Err(Error::Unauthenticated("invalid email or password".into()));
        }
        Ok(User {
            id,
            email,
            tenant_id,
        })
    }
}

/// Derives the stored password hash: HKDF-SHA256(salt, password) → 32 bytes,
/// hex-encoded.
fn derive_password(password: &str, salt: &[u8]) -> String {
    let hkdf = Hkdf::<Sha256>::new(Some(salt), password.as_bytes());
    let mut okm = [0u8; DERIVED_LEN];
    // expand only fails for absurd output lengths; 32 bytes is always fine.
    let _ = hkdf.expand(PASSWORD_HKDF_INFO, &mut okm);
    hex_encode(&okm)
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

fn hex_decode(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant(id: &str) -> TenantId {
        TenantId::parse(id).unwrap()
    }

    async fn test_db() -> (tempfile::TempDir, SystemDb) {
        let dir = tempfile::tempdir().unwrap();
        let db = SystemDb::open(dir.path().join("system.db")).unwrap();
        (dir, db)
    }

    #[tokio::test]
    async fn register_then_login() {
        let (_dir, db) = test_db().await;
        let user = db
            .register("ada@acme.test", "hunter22", &tenant("acme"))
            .await
            .unwrap();
        assert_eq!(user.tenant_id, "acme");

        let back = db.login("ada@acme.test", "hunter22").await.unwrap();
        assert_eq!(back.id, user.id);
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let (_dir, db) = test_db().await;
        db.register("ada@acme.test", "pw1", &tenant("acme"))
            .await
            .unwrap();
        let err = db
            .register("ada@acme.test", "pw2", &tenant("globex"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn wrong_password_and_unknown_email_look_the_same() {
        let (_dir, db) = test_db().await;
        db.register("ada@acme.test", "correct", &tenant("acme"))
            .await
            .unwrap();

        let wrong = db.login("ada@acme.test", "incorrect").await.unwrap_err();
        let missing = db.login("nobody@acme.test", "whatever").await.unwrap_err();
        assert_eq!(wrong.to_string(), missing.to_string());
    }

    #[test]
    fn password_derivation_is_salted() {
        let h1 = derive_password("pw", b"salt-one-16bytes");
        let h2 = derive_password("pw", b"salt-two-16bytes");
        assert_ne!(h1, h2);
        assert_eq!(h1, derive_password("pw", b"salt-one-16bytes"));
    }

    #[test]
    fn hex_round_trip() {
        let bytes = [0x00, 0xff, 0x10, 0xab];
        assert_eq!(hex_decode(&hex_encode(&bytes)).unwrap(), bytes);
        assert!(hex_decode("abc").is_none());
    }
}
