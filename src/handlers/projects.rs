//! Project endpoints.

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
struct Project {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateProject {
    name: String,
}

/// `POST /api/projects`
pub async fn create(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    AppJson(req): AppJson<CreateProject>,
) -> Result<impl IntoResponse> {
    if req.name.trim().is_empty() {
        return Err(Error::BadRequest("name required".into()));
    }

    let mut tx = state.begin_write(&identity.tenant).await?;
    let id = Uuid::now_v7().to_string();
    let project = tx.conn().query_row(
        "INSERT INTO projects (id, name) VALUES (?1, ?2) RETURNING id, name",
        params![id, req.name],
        |row| {
            Ok(Project {
                id: row.get(0)?,
                name: row.get(1)?,
            })
        },
    )?;

    tx.allocate().await?;
    tx.journal(
        Operation::Insert,
        "projects",
        &project.id,
        &serde_json::to_string(&project)?,
    )?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(project)))
}

/// `GET /api/projects`
pub async fn list(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse> {
    let store = state.stores.open(&identity.tenant).await?;
    let projects = store
        .read(|conn| {
            let mut stmt = conn.prepare("SELECT id, name FROM projects ORDER BY created_at")?;
            let rows = stmt.query_map([], |row| {
                Ok(Project {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?;
            let mut projects = Vec::new();
            for row in rows {
                projects.push(row?);
            }
            Ok(projects)
        })
        .await?;
    Ok(Json(projects))
}

/// `DELETE /api/projects/{id}`
pub async fn remove(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let mut tx = state.begin_write(&identity.tenant).await?;
    let deleted = tx
        .conn()
        .execute("DELETE FROM projects WHERE id = ?1", params![id])?;
    if deleted == 0 {
        return Err(Error::NotFound("project"));
    }

    tx.allocate().await?;
    tx.journal(Operation::Delete, "projects", &id, journal::DELETE_PAYLOAD)?;
    tx.commit().await?;

    Ok(Json(serde_json::json!({ "id": id })))
}
