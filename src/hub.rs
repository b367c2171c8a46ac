//! # Notification Hub
//!
//! In-process fan-out of version numbers to stream subscribers. The hub maps
//! each tenant to a set of bounded queues; [`Hub::deliver`] pushes a version
//! into every queue for that tenant, dropping it when a queue is full.
//! Dropping is safe because the stream protocol is only a hint — a client
//! that misses a notification recovers on its next delta pull by `since`.
//!
//! Producers never call `deliver` directly. They publish through the
//! coordination service and the per-process relay (see [`crate::coord`])
//! delivers here, so one code path covers single- and multi-process
//! deployments alike.
//!
//! Fan-out takes the read side of the subscriber map's lock; subscribe and
//! unsubscribe take the write side.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use crate::types::{TenantId, Version};

/// Depth of each subscriber's queue. One missed notification costs the
/// client at most one extra pull, so this stays small.
pub const SUBSCRIBER_QUEUE_DEPTH: usize = 16;

// =============================================================================
// Hub
// =============================================================================

/// The per-process subscriber registry.
pub struct Hub {
    next_id: AtomicU64,
    topics: RwLock<HashMap<TenantId, HashMap<u64, mpsc::Sender<Version>>>>,
}

impl Hub {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            topics: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a subscriber for `tenant`.
    ///
    /// The returned [`Subscription`] yields version numbers and removes
    /// itself from the hub when dropped, so the stream endpoint's
    /// termination path needs no explicit cleanup call.
    pub fn subscribe(self: Arc<Self>, tenant: TenantId) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_DEPTH);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut topics = self.topics.write().expect("hub lock poisoned");
        topics.entry(tenant.clone()).or_default().insert(id, tx);
        drop(topics);

        Subscription {
            hub: self,
            tenant,
            id,
            rx,
        }
    }

    fn unsubscribe(&self, tenant: &TenantId, id: u64) {
        let mut topics = self.topics.write().expect("hub lock poisoned");
        if let Some(subscribers) = topics.get_mut(tenant) {
            subscribers.remove(&id);
            if subscribers.is_empty() {
                topics.remove(tenant);
            }
        }
    }

    /// Fans `version` out to every subscriber of `tenant`.
    ///
    /// Non-blocking: a full or closed queue drops the version instead of
    /// stalling the relay.
    pub fn deliver(&self, tenant: &TenantId, version: Version) {
        let topics = self.topics.read().expect("hub lock poisoned");
        let Some(subscribers) = topics.get(tenant) else {
            return;
        };
        for tx in subscribers.values() {
            if tx.try_send(version).is_err() {
                tracing::trace!(tenant = %tenant, %version, "slow subscriber, dropping version");
            }
        }
    }

    /// Number of live subscribers for `tenant`.
    pub fn subscriber_count(&self, tenant: &TenantId) -> usize {
        self.topics
            .read()
            .expect("hub lock poisoned")
            .get(tenant)
            .map(|s| s.len())
            .unwrap_or(0)
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Subscription
// =============================================================================

/// One subscriber's handle: a bounded queue of versions scoped to a tenant.
///
/// Lifetime equals one stream connection. Implements [`Stream`] so the SSE
/// endpoint can frame versions directly off it; dropping it unsubscribes.
pub struct Subscription {
    hub: Arc<Hub>,
    tenant: TenantId,
    id: u64,
    rx: mpsc::Receiver<Version>,
}

impl Subscription {
    /// Waits for the next version. `None` only if the hub side closed.
    pub async fn recv(&mut self) -> Option<Version> {
        self.rx.recv().await
    }

    /// Non-blocking receive, for draining in tests.
    pub fn try_recv(&mut self) -> Option<Version> {
        self.rx.try_recv().ok()
    }

    /// The tenant this subscription is scoped to.
    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }
}

impl Stream for Subscription {
    type Item = Version;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(&self.tenant, self.id);
    }
}

// =============================================================================
// Tests
// =============================================================================
