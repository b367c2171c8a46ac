//! Kanban column endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AppJson;
use crate::error::{Error, Result};
use crate::journal;
use crate::server::AppState;
use crate::types::{Identity, Operation};

#[derive(Debug, Serialize)]
struct Column {
    id: String,
    name: String,
    position: i64,
}

fn column_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Column> {
    Ok(Column {
        id: row.get(0)?,
        name: row.get(1)?,
        position: row.get(2)?,
    })
}

#[derive(Debug, Deserialize)]
pub struct CreateColumn {
    name: String,
    #[serde(default)]
    position: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateColumn {
    name: Option<String>,
    position: Option<i64>,
}

/// `POST /api/kanban/columns`
pub async fn create(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    AppJson(req): AppJson<CreateColumn>,
) -> Result<impl IntoResponse> {
    if req.name.trim().is_empty() {
        return Err(Error::BadRequest("name required".into()));
    }

    let mut tx = state.begin_write(&identity.tenant).await?;
    let id = Uuid::now_v7().to_string();
    let column = tx.conn().query_row(
        "INSERT INTO kanban_columns (id, name, position) VALUES (?1, ?2, ?3)
         RETURNING id, name, position",
        params![id, req.name, req.position],
        column_from_row,
    )?;

    tx.allocate().await?;
    tx.journal(
        Operation::Insert,
        "kanban_columns",
        &column.id,
        &serde_json::to_string(&column)?,
    )?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(column)))
}

/// `PUT /api/kanban/columns/{id}` — partial update; absent fields keep
/// their stored values.
pub async fn update(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdateColumn>,
) -> Result<impl IntoResponse> {
    let mut tx = state.begin_write(&identity.tenant).await?;
    let column = tx
        .conn()
        .query_row(
            "UPDATE kanban_columns
             SET name = COALESCE(?1, name), position = COALESCE(?2, position)
             WHERE id = ?3
             RETURNING id, name, position",
            params![req.name, req.position, id],
            column_from_row,
        )
        .map_err(not_found_on_no_rows)?;

    tx.allocate().await?;
    tx.journal(
        Operation::Update,
        "kanban_columns",
        &column.id,
        &serde_json::to_string(&column)?,
    )?;
    tx.commit().await?;

    Ok(Json(column))
}

/// `DELETE /api/kanban/columns/{id}`
pub async fn remove(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let mut tx = state.begin_write(&identity.tenant).await?;
    let deleted = tx
        .conn()
        .execute("DELETE FROM kanban_columns WHERE id = ?1", params![id])?;
    if deleted == 0 {
        return Err(Error::NotFound("column"));
    }

    tx.allocate().await?;
    tx.journal(
        Operation::Delete,
        "kanban_columns",
        &id,
        journal::DELETE_PAYLOAD,
    )?;
    tx.commit().await?;

    Ok(Json(serde_json::json!({ "id": id })))
}

/// `GET /api/kanban/columns`
pub async fn list(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse> {
    let store = state.stores.open(&identity.tenant).await?;
    let columns = store
        .read(|conn| {
            let mut stmt = conn
                .prepare("SELECT id, name, position FROM kanban_columns ORDER BY position, name")?;
            let rows = stmt.query_map([], column_from_row)?;
            let mut columns = Vec::new();
            for row in rows {
                columns.push(row?);
            }
            Ok(columns)
        })
        .await?;
    Ok(Json(columns))
}

fn not_found_on_no_rows(e: rusqlite::Error) -> Error {
    match e {
        rusqlite::Error::QueryReturnedNoRows => Error::NotFound("column"),
        other => Error::Store(other),
    }
}
