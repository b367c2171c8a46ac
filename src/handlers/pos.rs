//! Product and order endpoints.
//!
//! Order creation is the engine's multi-entity write: the order row and
//! every item row land in one transaction and are journaled at one version,
//! so replicas always see an order together with its items.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{short_id, AppJson};
use crate::error::{Error, Result};
use crate::server::AppState;
use crate::types::{Identity, Operation};

// =============================================================================
// Products
// =============================================================================

#[derive(Debug, Serialize)]
struct Product {
    id: String,
    name: String,
    price: f64,
}

#[derive(Debug, Deserialize)]
pub struct CreateProduct {
    name: String,
    #[serde(default)]
    price: f64,
}

/// `POST /api/products`
pub async fn create_product(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    AppJson(req): AppJson<CreateProduct>,
) -> Result<impl IntoResponse> {
    if req.name.trim().is_empty() {
        return Err(Error::BadRequest("name required".into()));
    }

    let mut tx = state.begin_write(&identity.tenant).await?;
    let id = Uuid::now_v7().to_string();
    let product = tx.conn().query_row(
        "INSERT INTO products (id, name, price) VALUES (?1, ?2, ?3)
         RETURNING id, name, price",
        params![id, req.name, req.price],
        |row| {
            Ok(Product {
                id: row.get(0)?,
                name: row.get(1)?,
                price: row.get(2)?,
            })
        },
    )?;

    tx.allocate().await?;
    tx.journal(
        Operation::Insert,
        "products",
        &product.id,
        &serde_json::to_string(&product)?,
    )?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(product)))
}

/// `GET /api/products`
pub async fn list_products(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse> {
    let store = state.stores.open(&identity.tenant).await?;
    let products = store
        .read(|conn| {
            let mut stmt = conn.prepare("SELECT id, name, price FROM products ORDER BY name")?;
            let rows = stmt.query_map([], |row| {
                Ok(Product {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    price: row.get(2)?,
                })
            })?;
            let mut products = Vec::new();
            for row in rows {
                products.push(row?);
            }
            Ok(products)
        })
        .await?;
    Ok(Json(products))
}

// =============================================================================
// Orders
// =============================================================================

#[derive(Debug, Serialize)]
struct Order {
    uuid: String,
    short_id: String,
    card_id: Option<String>,
    project_id: Option<String>,
    total: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    items: Vec<OrderItem>,
}

#[derive(Debug, Serialize)]
struct OrderItem {
    id: String,
    order_id: String,
    product_id: String,
    qty: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrder {
    #[serde(default)]
    card_id: Option<String>,
    #[serde(default)]
    project_id: Option<String>,
    items: Vec<CreateOrderItem>,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderItem {
    product_id: String,
    qty: i64,
}

#[derive(Debug, Deserialize)]
pub struct OrderFilter {
    card_id: Option<String>,
}

/// `POST /api/orders`
pub async fn create_order(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    AppJson(req): AppJson<CreateOrder>,
) -> Result<impl IntoResponse> {
    if req.items.is_empty() {
        return Err(Error::BadRequest("items required".into()));
    }

    let mut tx = state.begin_write(&identity.tenant).await?;

    // Orders against a rejected card are locked out.
    if let Some(card_id) = req.card_id.as_deref().filter(|c| !c.is_empty()) {
        let status: String = tx
            .conn()
            .query_row(
                "SELECT approval_status FROM kanban_cards WHERE id = ?1",
                params![card_id],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Error::BadRequest("card not found".into()),
                other => Error::Store(other),
            })?;
        if status == "rejected" {
            return Err(Error::Forbidden("card is rejected; sales are locked".into()));
        }
    }

    let mut total = 0.0;
    for item in &req.items {
        let price: f64 = tx
            .conn()
            .query_row(
                "SELECT price FROM products WHERE id = ?1",
                params![item.product_id],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    Error::BadRequest("product not found".into())
                }
                other => Error::Store(other),
            })?;
        total += price * item.qty as f64;
    }

    let order_uuid = Uuid::now_v7().to_string();
    let sid = short_id();
    tx.conn().execute(
        "INSERT INTO orders (uuid, short_id, card_id, project_id, total)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![order_uuid, sid, req.card_id, req.project_id, total],
    )?;

    let mut items = Vec::with_capacity(req.items.len());
    for item in &req.items {
        let id = Uuid::now_v7().to_string();
        let stored = tx.conn().query_row(
            "INSERT INTO order_items (id, order_id, product_id, qty) VALUES (?1, ?2, ?3, ?4)
             RETURNING id, order_id, product_id, qty",
            params![id, order_uuid, item.product_id, item.qty],
            |row| {
                Ok(OrderItem {
                    id: row.get(0)?,
                    order_id: row.get(1)?,
                    product_id: row.get(2)?,
                    qty: row.get(3)?,
                })
            },
        )?;
        items.push(stored);
    }

    let order = Order {
        uuid: order_uuid,
        short_id: sid,
        card_id: req.card_id,
        project_id: req.project_id,
        total,
        items,
    };

    // One version for the whole request: the order row and every item row
    // are journaled together and delivered to replicas as a group.
    tx.allocate().await?;
    tx.journal(
        Operation::Insert,
        "orders",
        &order.uuid,
        &serde_json::to_string(&order)?,
    )?;
    for item in &order.items {
        tx.journal(
            Operation::Insert,
            "order_items",
            &item.id,
            &serde_json::to_string(item)?,
        )?;
    }
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(order)))
}

/// `GET /api/orders?card_id=`
pub async fn list_orders(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(filter): Query<OrderFilter>,
) -> Result<impl IntoResponse> {
    let store = state.stores.open(&identity.tenant).await?;
    let orders = store
        .read(|conn| {
            let base = "SELECT uuid, short_id, card_id, project_id, total FROM orders";
            let map = |row: &rusqlite::Row<'_>| {
                Ok(Order {
                    uuid: row.get(0)?,
                    short_id: row.get(1)?,
                    card_id: row.get(2)?,
                    project_id: row.get(3)?,
                    total: row.get(4)?,
                    items: Vec::new(),
                })
            };
            let mut orders = Vec::new();
            match filter.card_id.as_deref().filter(|c| !c.is_empty()) {
                Some(card_id) => {
                    let mut stmt = conn.prepare(&format!(
                        "{base} WHERE card_id = ?1 ORDER BY created_at DESC"
                    ))?;
                    let rows = stmt.query_map(params![card_id], map)?;
                    for row in rows {
                        orders.push(row?);
                    }
                }
                None => {
                    let mut stmt = conn.prepare(&format!("{base} ORDER BY created_at DESC"))?;
                    let rows = stmt.query_map([], map)?;
                    for row in rows {
                        orders.push(row?);
                    }
                }
            }
            Ok(orders)
        })
        .await?;
    Ok(Json(orders))
}
