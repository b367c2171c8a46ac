//! # Server Assembly
//!
//! Builds the shared application state, the router, and the listener, and
//! owns the process lifecycle: startup ordering (data dir → system db →
//! coordination service → relay → listener) and graceful shutdown
//! (stop accepting → drain with a deadline → close stores → stop the relay).

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderValue};
use axum::middleware;
use axum::routing::{delete, get, post, put};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::auth::{self, Auth};
use crate::config::Config;
use crate::coord::{Coordinator, Notifier, VersionSource};
use crate::error::{Error, Result};
use crate::handlers::{auth_routes, cards, columns, pos, projects, stream, sync};
use crate::hub::Hub;
use crate::manager::StoreManager;
use crate::sysdb::SystemDb;
use crate::types::TenantId;
use crate::write::WriteTx;

/// How long in-flight requests (including open streams) get to finish after
/// a termination signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

// =============================================================================
// Application State
// =============================================================================

/// Everything a handler needs, cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub stores: Arc<StoreManager>,
    pub oracle: Arc<dyn VersionSource>,
    pub notifier: Arc<dyn Notifier>,
    pub hub: Arc<Hub>,
    pub auth: Arc<Auth>,
    pub sysdb: Arc<SystemDb>,
}

impl AppState {
    /// Opens the tenant's store and starts a write-pipeline transaction.
    pub async fn begin_write(&self, tenant: &TenantId) -> Result<WriteTx> {
        let store = self.stores.open(tenant).await?;
        WriteTx::begin(&store, self.oracle.clone(), self.notifier.clone()).await
    }
}

// =============================================================================
// Router
// =============================================================================

/// Assembles the full route table with auth middleware and CORS.
pub fn router(state: AppState) -> Router {
    let mut app = Router::new()
        // Public auth endpoints (skipped by the middleware).
        .route("/api/auth/register", post(auth_routes::register))
        .route("/api/auth/login", post(auth_routes::login))
        // Sync surface.
        .route("/api/sync", get(sync::get_deltas))
        .route("/sse/events", get(stream::events))
        // Domain surface.
        .route("/api/projects", post(projects::create).get(projects::list))
        .route("/api/projects/{id}", delete(projects::remove))
        .route(
            "/api/kanban/columns",
            post(columns::create).get(columns::list),
        )
        .route(
            "/api/kanban/columns/{id}",
            put(columns::update).delete(columns::remove),
        )
        .route("/api/kanban/cards", post(cards::create).get(cards::list))
        .route("/api/kanban/cards/{id}", put(cards::update))
        .route("/api/kanban/cards/{card_id}/tags", post(cards::add_tag))
        .route(
            "/api/kanban/cards/{card_id}/tags/{tag_id}",
            delete(cards::remove_tag),
        )
        .route("/api/kanban/cards/{card_id}/assignees", post(cards::assign))
        .route(
            "/api/kanban/cards/{card_id}/assignees/{assignee_id}",
            delete(cards::unassign),
        )
        .route(
            "/api/products",
            post(pos::create_product).get(pos::list_products),
        )
        .route(
            "/api/orders",
            post(pos::create_order).get(pos::list_orders),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    // Optional SPA serving. COOP/COEP headers are required by browser-side
    // storage (SharedArrayBuffer / OPFS) in the client.
    if let Some(static_dir) = state.config.static_dir.as_ref() {
        if static_dir.is_dir() {
            tracing::info!(dir = %static_dir.display(), "serving static files");
            let spa = ServeDir::new(static_dir)
                .fallback(ServeFile::new(static_dir.join("index.html")));
            let spa = ServiceBuilder::new()
                .layer(SetResponseHeaderLayer::if_not_present(
                    header::HeaderName::from_static("cross-origin-opener-policy"),
                    HeaderValue::from_static("same-origin"),
                ))
                .layer(SetResponseHeaderLayer::if_not_present(
                    header::HeaderName::from_static("cross-origin-embedder-policy"),
                    HeaderValue::from_static("require-corp"),
                ))
                .service(spa);
            app = app.fallback_service(spa);
        } else {
            tracing::warn!(dir = %static_dir.display(), "STATIC_DIR is not a directory, ignoring");
        }
    }

    app.with_state(state)
}

// =============================================================================
// Lifecycle
// =============================================================================

/// Runs the server until SIGINT/SIGTERM, then shuts down cleanly.
pub async fn run(config: Config) -> Result<()> {
    std::fs::create_dir_all(&config.data_dir)?;

    let sysdb = Arc::new(SystemDb::open(config.system_db_path())?);
    let coordinator = Coordinator::connect(&config.redis_addr).await?;
    let hub = Arc::new(Hub::new());
    let relay = coordinator.spawn_relay(hub.clone());
    let stores = Arc::new(StoreManager::new(
        &config.data_dir,
        config.tenant_cache_cap,
    )?);
    let auth = Arc::new(Auth::new(config.jwt_secret.as_bytes()));

    let port = config.port;
    let state = AppState {
        config: Arc::new(config),
        stores: stores.clone(),
        oracle: Arc::new(coordinator.clone()),
        notifier: Arc::new(coordinator),
        hub,
        auth,
        sysdb,
    };
    let app = router(state);

    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "listening");

    // Signal → watch channel; the graceful-shutdown future and the drain
    // deadline below both observe it.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let mut drain_rx = shutdown_rx.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        let mut rx = shutdown_rx;
        let _ = rx.wait_for(|stop| *stop).await;
    });
    let mut server_task = tokio::spawn(server.into_future());

    tokio::select! {
        result = &mut server_task => {
            // Server ended on its own (listener error).
            join_result(result)?;
        }
        _ = drain_rx.wait_for(|stop| *stop) => {
            tracing::info!("shutdown signal received, draining");
            match tokio::time::timeout(DRAIN_TIMEOUT, &mut server_task).await {
                Ok(result) => {
                    join_result(result)?;
                    tracing::info!("drained cleanly");
                }
                Err(_) => {
                    tracing::warn!("drain deadline exceeded, closing remaining connections");
                    server_task.abort();
                }
            }
        }
    }

    stores.close_all().await;
    relay.abort();
    tracing::info!("shutdown complete");
    Ok(())
}

fn join_result(result: std::result::Result<std::io::Result<()>, tokio::task::JoinError>) -> Result<()> {
    match result {
        Ok(serve_result) => serve_result.map_err(Error::Io),
        Err(join_err) if join_err.is_cancelled() => Ok(()),
        Err(join_err) => Err(Error::Internal(format!("server task failed: {join_err}"))),
    }
}

/// Completes on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
