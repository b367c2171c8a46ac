//! Kanban card endpoints, including the tag and assignee sub-resources.
//!
//! Tag and assignee writes journal against their own tables
//! (`card_tags`, `card_assignees`) so client replicas keep those tables
//! populated independently of the cards themselves.

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
struct Card {
    id: String,
    project_id: String,
    column_name: String,
    title: String,
    position: i64,
    approval_status: String,
    assigned_approver_id: Option<String>,
    due_date: Option<String>,
    client: Option<String>,
    priority: String,
    notes: Option<String>,
}

const CARD_COLUMNS: &str = "id, project_id, column_name, title, position, approval_status, \
                            assigned_approver_id, due_date, client, priority, notes";

fn card_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Card> {
    Ok(Card {
        id: row.get(0)?,
        project_id: row.get(1)?,
        column_name: row.get(2)?,
        title: row.get(3)?,
        position: row.get(4)?,
        approval_status: row.get(5)?,
        assigned_approver_id: row.get(6)?,
        due_date: row.get(7)?,
        client: row.get(8)?,
        priority: row.get(9)?,
        notes: row.get(10)?,
    })
}

#[derive(Debug, Deserialize)]
pub struct CreateCard {
    project_id: String,
    #[serde(default)]
    column_name: Option<String>,
    title: String,
    #[serde(default)]
    position: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCard {
    column_name: Option<String>,
    title: Option<String>,
    position: Option<i64>,
    approval_status: Option<String>,
    assigned_approver_id: Option<String>,
    due_date: Option<String>,
    client: Option<String>,
    priority: Option<String>,
    notes: Option<String>,
}

/// `POST /api/kanban/cards`
pub async fn create(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    AppJson(req): AppJson<CreateCard>,
) -> Result<impl IntoResponse> {
    if req.title.trim().is_empty() || req.project_id.trim().is_empty() {
        return Err(Error::BadRequest("project_id and title required".into()));
    }
    let column_name = req
        .column_name
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| "backlog".to_string());

    let mut tx = state.begin_write(&identity.tenant).await?;
    let id = Uuid::now_v7().to_string();
    let card = tx.conn().query_row(
        &format!(
            "INSERT INTO kanban_cards (id, project_id, column_name, title, position)
             VALUES (?1, ?2, ?3, ?4, ?5)
             RETURNING {CARD_COLUMNS}"
        ),
        params![id, req.project_id, column_name, req.title, req.position],
        card_from_row,
    )?;

    tx.allocate().await?;
    tx.journal(
        Operation::Insert,
        "kanban_cards",
        &card.id,
        &serde_json::to_string(&card)?,
    )?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(card)))
}

/// `PUT /api/kanban/cards/{id}` — partial update; absent fields keep their
/// stored values.
pub async fn update(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(id): Path<String>,
    AppJson(req): AppJson<UpdateCard>,
) -> Result<impl IntoResponse> {
    let mut tx = state.begin_write(&identity.tenant).await?;
    let card = tx
        .conn()
        .query_row(
            &format!(
                "UPDATE kanban_cards SET
                     column_name          = COALESCE(?1, column_name),
                     title                = COALESCE(?2, title),
                     position             = COALESCE(?3, position),
                     approval_status      = COALESCE(?4, approval_status),
                     assigned_approver_id = COALESCE(?5, assigned_approver_id),
                     due_date             = COALESCE(?6, due_date),
                     client               = COALESCE(?7, client),
                     priority             = COALESCE(?8, priority),
                     notes                = COALESCE(?9, notes)
                 WHERE id = ?10
                 RETURNING {CARD_COLUMNS}"
            ),
            params![
                req.column_name,
                req.title,
                req.position,
                req.approval_status,
                req.assigned_approver_id,
                req.due_date,
                req.client,
                req.priority,
                req.notes,
                id
            ],
            card_from_row,
        )
        .map_err(|e| match e {
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound("card"),
            other => Error::Store(other),
        })?;

    tx.allocate().await?;
    tx.journal(
        Operation::Update,
        "kanban_cards",
        &card.id,
        &serde_json::to_string(&card)?,
    )?;
    tx.commit().await?;

    Ok(Json(card))
}

/// `GET /api/kanban/cards`
pub async fn list(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse> {
    let store = state.stores.open(&identity.tenant).await?;
    let cards = store
        .read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CARD_COLUMNS} FROM kanban_cards ORDER BY position, created_at"
            ))?;
            let rows = stmt.query_map([], card_from_row)?;
            let mut cards = Vec::new();
            for row in rows {
                cards.push(row?);
            }
            Ok(cards)
        })
        .await?;
    Ok(Json(cards))
}

// =============================================================================
// Tags
// =============================================================================

#[derive(Debug, Serialize)]
struct Tag {
    id: String,
    card_id: String,
    label: String,
}

#[derive(Debug, Deserialize)]
pub struct AddTag {
    label: String,
}

/// `POST /api/kanban/cards/{card_id}/tags`
pub async fn add_tag(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(card_id): Path<String>,
    AppJson(req): AppJson<AddTag>,
) -> Result<impl IntoResponse> {
    if req.label.trim().is_empty() {
        return Err(Error::BadRequest("label required".into()));
    }

    let mut tx = state.begin_write(&identity.tenant).await?;
    ensure_card_exists(tx.conn(), &card_id)?;

    let id = Uuid::now_v7().to_string();
    let tag = tx.conn().query_row(
        "INSERT INTO card_tags (id, card_id, label) VALUES (?1, ?2, ?3)
         RETURNING id, card_id, label",
        params![id, card_id, req.label],
        |row| {
            Ok(Tag {
                id: row.get(0)?,
                card_id: row.get(1)?,
                label: row.get(2)?,
            })
        },
    )?;

    tx.allocate().await?;
    tx.journal(
        Operation::Insert,
        "card_tags",
        &tag.id,
        &serde_json::to_string(&tag)?,
    )?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(tag)))
}

/// `DELETE /api/kanban/cards/{card_id}/tags/{tag_id}`
pub async fn remove_tag(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path((card_id, tag_id)): Path<(String, String)>,
) -> Result<impl IntoResponse> {
    let mut tx = state.begin_write(&identity.tenant).await?;
    let deleted = tx.conn().execute(
        "DELETE FROM card_tags WHERE id = ?1 AND card_id = ?2",
        params![tag_id, card_id],
    )?;
    if deleted == 0 {
        return Err(Error::NotFound("tag"));
    }

    tx.allocate().await?;
    tx.journal(
        Operation::Delete,
        "card_tags",
        &tag_id,
        journal::DELETE_PAYLOAD,
    )?;
    tx.commit().await?;

    Ok(Json(serde_json::json!({ "id": tag_id })))
}

// =============================================================================
// Assignees
// =============================================================================

#[derive(Debug, Serialize)]
struct Assignee {
    id: String,
    card_id: String,
    user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct AssignUser {
    user_id: String,
}

/// `POST /api/kanban/cards/{card_id}/assignees`
pub async fn assign(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(card_id): Path<String>,
    AppJson(req): AppJson<AssignUser>,
) -> Result<impl IntoResponse> {
    if req.user_id.trim().is_empty() {
        return Err(Error::BadRequest("user_id required".into()));
    }

    let mut tx = state.begin_write(&identity.tenant).await?;
    ensure_card_exists(tx.conn(), &card_id)?;

    let id = Uuid::now_v7().to_string();
    let assignee = tx.conn().query_row(
        "INSERT INTO card_assignees (id, card_id, user_id) VALUES (?1, ?2, ?3)
         RETURNING id, card_id, user_id",
        params![id, card_id, req.user_id],
        |row| {
            Ok(Assignee {
                id: row.get(0)?,
                card_id: row.get(1)?,
                user_id: row.get(2)?,
            })
        },
    )?;

    tx.allocate().await?;
    tx.journal(
        Operation::Insert,
        "card_assignees",
        &assignee.id,
        &serde_json::to_string(&assignee)?,
    )?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(assignee)))
}

/// `DELETE /api/kanban/cards/{card_id}/assignees/{assignee_id}`
pub async fn unassign(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path((card_id, assignee_id)): Path<(String, String)>,
) -> Result<impl IntoResponse> {
    let mut tx = state.begin_write(&identity.tenant).await?;
    let deleted = tx.conn().execute(
        "DELETE FROM card_assignees WHERE id = ?1 AND card_id = ?2",
        params![assignee_id, card_id],
    )?;
    if deleted == 0 {
        return Err(Error::NotFound("assignee"));
    }

    tx.allocate().await?;
    tx.journal(
        Operation::Delete,
        "card_assignees",
        &assignee_id,
        journal::DELETE_PAYLOAD,
    )?;
    tx.commit().await?;

    Ok(Json(serde_json::json!({ "id": assignee_id })))
}

fn ensure_card_exists(conn: &rusqlite::Connection, card_id: &str) -> Result<()> {
    let exists: i64 = conn.query_row(
        "SELECT COUNT(*) FROM kanban_cards WHERE id = ?1",
        params![card_id],
        |row| row.get(0),
    )?;
    if exists == 0 {
        return Err(Error::NotFound("card"));
    }
    Ok(())
}
