//! # Coordination Service Client
//!
//! The one piece of non-tenant-local state the engine depends on lives in
//! Redis: the per-tenant version counter and the pub/sub topics that carry
//! commit notifications between processes.
//!
//! Two seams are traits so tests (and future backends) can substitute
//! in-memory implementations:
//!
//! - [`VersionSource`] — atomically allocates per-tenant versions.
//! - [`Notifier`] — publishes `(tenant, version)` after a commit.
//!
//! Even a single-process deployment publishes through the coordination
//! service and receives on its own subscription: the relay spawned by
//! [`Coordinator::spawn_relay`] is the only writer into the local
//! [`Hub`](crate::hub::Hub), so no local shortcut can bypass the bus.
//!
//! ## Keys and topics
//!
//! - counter: hash `tenant:{id}:version`, field `v`, `HINCRBY ... 1`
//! - topic: `sync:{id}`, message payload is the decimal version

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::hub::Hub;
use crate::types::{TenantId, Version};

/// Prefix of every notification topic.
pub const TOPIC_PREFIX: &str = "sync:";

/// Pattern the relay subscribes to: every tenant's topic.
const TOPIC_PATTERN: &str = "sync:*";

/// Attempts made to reach the coordination service at startup.
const CONNECT_ATTEMPTS: u32 = 5;

// =============================================================================
// Traits
// =============================================================================

/// Allocates strictly monotonic per-tenant versions.
///
/// Contract: if `next` returns, the counter has been durably incremented;
/// concurrent callers for one tenant receive distinct, consecutive values in
/// the order the backing service processed them. Implementations never
/// cache.
#[async_trait]
pub trait VersionSource: Send + Sync {
    /// Atomically increments and returns the tenant's counter.
    async fn next(&self, tenant: &TenantId) -> Result<Version>;

    /// Reads the counter without incrementing (0 for an unseen tenant).
    async fn current(&self, tenant: &TenantId) -> Result<Version>;
}

/// Publishes commit notifications.
///
/// Strictly fire-and-forget from the write pipeline's point of view: the
/// caller logs failures but never fails the request over one, because
/// clients recover by pulling deltas.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, tenant: &TenantId, version: Version) -> Result<()>;
}

// =============================================================================
// Redis Implementation
// =============================================================================

/// Redis-backed [`VersionSource`] and [`Notifier`].
///
/// Holds one multiplexed command connection (cloned per call, as the client
/// intends) plus the `redis::Client` for spawning pub/sub connections.
#[derive(Clone)]
pub struct Coordinator {
    client: redis::Client,
    conn: MultiplexedConnection,
}

impl Coordinator {
    /// Connects to the coordination service, accepting either `host:port`
    /// or a full `redis://` / `rediss://` URL.
    ///
    /// Pings up to [`CONNECT_ATTEMPTS`] times, one second apart, so the
    /// server can start alongside the service without a race.
    pub async fn connect(addr: &str) -> Result<Self> {
        let url = normalize_addr(addr);
        let client = redis::Client::open(url.as_str())?;

        let mut last_err = None;
        for attempt in 1..=CONNECT_ATTEMPTS {
            match client.get_multiplexed_tokio_connection().await {
                Ok(mut conn) => match redis::cmd("PING").query_async::<String>(&mut conn).await {
                    Ok(_) => {
                        tracing::info!(addr = %addr, "connected to coordination service");
                        return Ok(Self { client, conn });
                    }
                    Err(e) => last_err = Some(e),
                },
                Err(e) => last_err = Some(e),
            }
            if attempt < CONNECT_ATTEMPTS {
                tracing::warn!(
                    attempt,
                    of = CONNECT_ATTEMPTS,
                    "coordination service not ready, retrying in 1s"
                );
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
        // last_err is always set when we get here.
        Err(last_err
            .map(crate::error::Error::Oracle)
            .unwrap_or_else(|| {
                crate::error::Error::Internal("coordination connect failed".into())
            }))
    }

    fn version_key(tenant: &TenantId) -> String {
        format!("tenant:{tenant}:version")
    }

    fn topic(tenant: &TenantId) -> String {
        format!("{TOPIC_PREFIX}{tenant}")
    }

    /// Spawns the per-process fan-out relay.
    ///
    /// Pattern-subscribes to every tenant topic and delivers each received
    /// version into the local hub. Reconnects with a delay on failure; the
    /// handle is aborted on shutdown.
    pub fn spawn_relay(&self, hub: Arc<Hub>) -> JoinHandle<()> {
        let client = self.client.clone();
        tokio::spawn(async move {
            loop {
                match relay_once(&client, &hub).await {
                    Ok(()) => {
                        tracing::warn!("pub/sub stream ended, resubscribing in 1s");
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "pub/sub relay failed, retrying in 1s");
                    }
                }
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        })
    }
}

/// One pub/sub session: subscribe, then pump messages into the hub until the
/// connection drops.
async fn relay_once(client: &redis::Client, hub: &Hub) -> redis::RedisResult<()> {
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.psubscribe(TOPIC_PATTERN).await?;
    tracing::info!(pattern = TOPIC_PATTERN, "relay listening for sync events");

    let mut messages = pubsub.on_message();
    while let Some(msg) = messages.next().await {
        let channel = msg.get_channel_name().to_string();
        let Some(raw_tenant) = channel.strip_prefix(TOPIC_PREFIX) else {
            continue;
        };
        let Some(tenant) = TenantId::parse(raw_tenant) else {
            tracing::warn!(channel = %channel, "ignoring message on malformed topic");
            continue;
        };
        let payload: String = match msg.get_payload() {
            Ok(p) => p,
            Err(_) => continue,
        };
        let Ok(version) = payload.parse::<i64>() else {
            tracing::warn!(tenant = %tenant, payload = %payload, "ignoring non-numeric version");
            continue;
        };
        hub.deliver(&tenant, Version::from_raw(version));
    }
    Ok(())
}

#[async_trait]
impl VersionSource for Coordinator {
    async fn next(&self, tenant: &TenantId) -> Result<Version> {
        let mut conn = self.conn.clone();
        let v: i64 = conn.hincr(Self::version_key(tenant), "v", 1).await?;
        Ok(Version::from_raw(v))
    }

    async fn current(&self, tenant: &TenantId) -> Result<Version> {
        let mut conn = self.conn.clone();
        let v: Option<i64> = conn.hget(Self::version_key(tenant), "v").await?;
        Ok(Version::from_raw(v.unwrap_or(0)))
    }
}

#[async_trait]
impl Notifier for Coordinator {
    async fn notify(&self, tenant: &TenantId, version: Version) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.publish::<_, _, ()>(Self::topic(tenant), version.as_raw())
            .await?;
        Ok(())
    }
}

/// Accepts both bare `host:port` and full URL forms.
fn normalize_addr(addr: &str) -> String {
    if addr.starts_with("redis://") || addr.starts_with("rediss://") || addr.starts_with("unix://")
    {
        addr.to_string()
    } else {
        format!("redis://{addr}")
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_addr_handles_both_forms() {
        assert_eq!(normalize_addr("localhost:6379"), "redis://localhost:6379");
        assert_eq!(
            normalize_addr("redis://cache.internal:6380/1"),
            "redis://cache.internal:6380/1"
        );
        assert_eq!(
            normalize_addr("rediss://secure:6379"),
            "rediss://secure:6379"
        );
    }

    #[test]
    fn keys_and_topics_are_tenant_scoped() {
        let t = TenantId::parse("acme").unwrap();
        assert_eq!(Coordinator::version_key(&t), "tenant:acme:version");
        assert_eq!(Coordinator::topic(&t), "sync:acme");
    }
}
