//! Seeds a demo tenant through the real write pipeline.
//!
//! Usage: `DATA_DIR=./data REDIS_ADDR=localhost:6379 tidepool-seed`
//!
//! Registers `demo@tidepool.local` (password `demo-password`) under tenant
//! `demo`, then creates a project board and a small product catalog. Every
//! row goes through the same allocate→journal→commit→notify sequence the
//! API uses, so connected clients see the seed data arrive live.

use std::sync::Arc;

use tidepool::{
    Config, Coordinator, Error, Operation, Result, StoreManager, TenantId, WriteTx,
};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run().await {
        tracing::error!(error = %e, "seed failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = Config::from_env();
    std::fs::create_dir_all(&config.data_dir)?;

    let tenant = TenantId::parse("demo")
        .ok_or_else(|| Error::Internal("demo tenant id invalid".into()))?;

    let sysdb = tidepool::sysdb::SystemDb::open(config.system_db_path())?;
    match sysdb
        .register("demo@tidepool.local", "demo-password", &tenant)
        .await
    {
        Ok(user) => tracing::info!(user = %user.email, "registered demo user"),
        Err(Error::Conflict(_)) => tracing::info!("demo user already registered"),
        Err(e) => return Err(e),
    }

    let coordinator = Coordinator::connect(&config.redis_addr).await?;
    let oracle = Arc::new(coordinator.clone());
    let notifier = Arc::new(coordinator);
    let stores = StoreManager::new(&config.data_dir, config.tenant_cache_cap)?;
    let store = stores.open(&tenant).await?;

    // One transaction per logical write, exactly like the API handlers.
    let project_id = {
        let mut tx = WriteTx::begin(&store, oracle.clone(), notifier.clone()).await?;
        let id = Uuid::now_v7().to_string();
        tx.conn().execute(
            "INSERT INTO projects (id, name) VALUES (?1, 'Demo Roadmap')",
            rusqlite::params![id],
        )?;
        tx.allocate().await?;
        tx.journal(
            Operation::Insert,
            "projects",
            &id,
            &format!(r#"{{"id":"{id}","name":"Demo Roadmap"}}"#),
        )?;
        tx.commit().await?;
        id
    };

    for (position, name) in ["backlog", "doing", "done"].iter().enumerate() {
        let mut tx = WriteTx::begin(&store, oracle.clone(), notifier.clone()).await?;
        let id = Uuid::now_v7().to_string();
        tx.conn().execute(
            "INSERT INTO kanban_columns (id, name, position) VALUES (?1, ?2, ?3)",
            rusqlite::params![id, name, position as i64],
        )?;
        tx.allocate().await?;
        tx.journal(
            Operation::Insert,
            "kanban_columns",
            &id,
            &format!(r#"{{"id":"{id}","name":"{name}","position":{position}}}"#),
        )?;
        tx.commit().await?;
    }

    for title in ["Ship the sync engine", "Write the docs"] {
        let mut tx = WriteTx::begin(&store, oracle.clone(), notifier.clone()).await?;
        let id = Uuid::now_v7().to_string();
        tx.conn().execute(
            "INSERT INTO kanban_cards (id, project_id, title) VALUES (?1, ?2, ?3)",
            rusqlite::params![id, project_id, title],
        )?;
        tx.allocate().await?;
        tx.journal(
            Operation::Insert,
            "kanban_cards",
            &id,
            &format!(
                r#"{{"id":"{id}","project_id":"{project_id}","column_name":"backlog","title":"{title}","position":0,"approval_status":"none","assigned_approver_id":null,"due_date":null,"client":null,"priority":"normal","notes":null}}"#
            ),
        )?;
        tx.commit().await?;
    }

    for (name, price) in [("Espresso", 2.5), ("Flat White", 3.8), ("Croissant", 2.2)] {
        let mut tx = WriteTx::begin(&store, oracle.clone(), notifier.clone()).await?;
        let id = Uuid::now_v7().to_string();
        tx.conn().execute(
            "INSERT INTO products (id, name, price) VALUES (?1, ?2, ?3)",
            rusqlite::params![id, name, price],
        )?;
        tx.allocate().await?;
        tx.journal(
            Operation::Insert,
            "products",
            &id,
            &format!(r#"{{"id":"{id}","name":"{name}","price":{price}}}"#),
        )?;
        tx.commit().await?;
    }

    stores.close_all().await;
    tracing::info!(tenant = %tenant, "seed complete");
    Ok(())
}
