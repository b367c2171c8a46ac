//! # Tidepool — multi-tenant delta-sync backend
//!
//! Tidepool keeps a browser-resident replica of each tenant's relational
//! dataset in sync with an authoritative server replica. The browser reads
//! locally; every write goes through this server, which journals it as an
//! ordered mutation and tells every connected session of the same tenant to
//! pull what it is missing.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        HTTP Surface (axum)                       │
//! │   auth middleware · domain writes · GET /api/sync · /sse/events  │
//! └──────────────┬──────────────────────────────────┬────────────────┘
//!                │ writes                           │ notifications
//!                ▼                                  ▼
//! ┌───────────────────────────────┐   ┌──────────────────────────────┐
//! │        Write Pipeline         │   │       Notification Hub       │
//! │ BEGIN → mutate → allocate v → │   │  tenant → bounded queues of  │
//! │ journal(v) → COMMIT → notify  │   │  version numbers (drop-full) │
//! └──────┬────────────────┬───────┘   └──────────────▲───────────────┘
//!        │                │                          │ relay (PSUBSCRIBE)
//!        ▼                ▼                          │
//! ┌──────────────┐  ┌───────────────────────────────┴──────────────┐
//! │ Tenant Store │  │            Coordination Service (Redis)      │
//! │ Manager (LRU)│  │  tenant:{id}:version counter · sync:{id} bus │
//! │ SQLite + WAL │  └──────────────────────────────────────────────┘
//! └──────────────┘
//! ```
//!
//! ## Core Invariants
//!
//! 1. **One writer per tenant store**: the store's writer lock is held from
//!    `BEGIN` through `COMMIT`, so journal insertion order equals version
//!    order.
//! 2. **Journaled iff committed**: journal rows live in the tenant store and
//!    commit atomically with the domain change they describe.
//! 3. **Announced only after committed**: a version a client sees on its
//!    stream is always already readable through the delta endpoint.
//! 4. **Versions strictly increase per tenant**: allocated by one atomic
//!    increment in the coordination service; gaps (crashed writes) are
//!    possible, reorders and duplicates are not.
//! 5. **Lossy notifications are safe**: subscriber queues drop on overflow;
//!    clients recover by pulling with `since`.

pub mod auth;
pub mod config;
pub mod coord;
pub mod error;
pub mod handlers;
pub mod hub;
pub mod journal;
pub mod manager;
pub mod schema;
pub mod server;
pub mod store;
pub mod sysdb;
pub mod types;
pub mod write;

pub use config::Config;
pub use coord::{Coordinator, Notifier, VersionSource};
pub use error::{Error, Result};
pub use hub::{Hub, Subscription};
pub use manager::StoreManager;
pub use server::{router, AppState};
pub use store::TenantStore;
pub use types::{Identity, JournalEntry, Operation, TenantId, Version};
pub use write::WriteTx;
