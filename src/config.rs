//! # Environment Configuration
//!
//! All runtime configuration comes from environment variables, every one of
//! them optional with a development default. The server takes no CLI flags.

use std::env;
use std::path::PathBuf;

// =============================================================================
// Defaults
// =============================================================================

const DEFAULT_PORT: u16 = 9090;
const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_REDIS_ADDR: &str = "localhost:6379";
const DEFAULT_JWT_SECRET: &str = "tidepool-dev-secret-change-in-prod";
const DEFAULT_TENANT_CACHE_CAP: usize = 64;

// =============================================================================
// Config
// =============================================================================

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen port (`PORT`).
    pub port: u16,
    /// Directory holding the system database and one store file per tenant
    /// (`DATA_DIR`).
    pub data_dir: PathBuf,
    /// Coordination-service endpoint, `host:port` or a full `redis://` /
    /// `rediss://` URL (`REDIS_ADDR`).
    pub redis_addr: String,
    /// HMAC key for bearer tokens (`JWT_SECRET`).
    pub jwt_secret: String,
    /// Optional static asset root served with an SPA fallback (`STATIC_DIR`).
    pub static_dir: Option<PathBuf>,
    /// Maximum number of tenant stores held open at once
    /// (`TENANT_CACHE_CAP`).
    pub tenant_cache_cap: usize,
}

impl Config {
    /// Builds a config from the process environment.
    ///
    /// Unparseable numeric values fall back to their defaults rather than
    /// failing startup; an empty `STATIC_DIR` means "no static serving".
    pub fn from_env() -> Self {
        let port = env_or("PORT", DEFAULT_PORT.to_string())
            .parse()
            .unwrap_or(DEFAULT_PORT);
        let tenant_cache_cap = env_or("TENANT_CACHE_CAP", DEFAULT_TENANT_CACHE_CAP.to_string())
            .parse()
            .ok()
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_TENANT_CACHE_CAP);
        let static_dir = env::var("STATIC_DIR")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        Self {
            port,
            data_dir: PathBuf::from(env_or("DATA_DIR", DEFAULT_DATA_DIR.to_string())),
            redis_addr: env_or("REDIS_ADDR", DEFAULT_REDIS_ADDR.to_string()),
            jwt_secret: env_or("JWT_SECRET", DEFAULT_JWT_SECRET.to_string()),
            static_dir,
            tenant_cache_cap,
        }
    }

    /// Path of the central identity database.
    pub fn system_db_path(&self) -> PathBuf {
        self.data_dir.join("system.db")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            redis_addr: DEFAULT_REDIS_ADDR.to_string(),
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            static_dir: None,
            tenant_cache_cap: DEFAULT_TENANT_CACHE_CAP,
        }
    }
}

fn env_or(key: &str, fallback: String) -> String {
    match env::var(key) {
        Ok(v) if !v.is_empty() => v,
        _ => fallback,
    }
}

// =============================================================================
// Tests
// =============================================================================
