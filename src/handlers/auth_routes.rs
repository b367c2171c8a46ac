//! Public authentication endpoints: the only `/api` paths that skip the
//! identity middleware.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::AppJson;
use crate::auth::TOKEN_TTL;
use crate::error::{Error, Result};
use crate::server::AppState;
use crate::sysdb::User;
use crate::types::TenantId;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    email: String,
    password: String,
    #[serde(default)]
    tenant_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    email: String,
    password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    token: String,
    user: User,
    tenant_id: String,
}

/// `POST /api/auth/register`
///
/// Creates an account and returns a signed token. When no tenant id is
/// given, the email's local part becomes the tenant — the common
/// one-person-one-tenant onboarding path.
pub async fn register(
    State(state): State<AppState>,
    AppJson(req): AppJson<RegisterRequest>,
) -> Result<impl IntoResponse> {
    if req.email.is_empty() || req.password.is_empty() {
        return Err(Error::BadRequest("email and password required".into()));
    }
    if req.password.len() < 6 {
        return Err(Error::BadRequest(
            "password must be at least 6 characters".into(),
        ));
    }

    let raw_tenant = match req.tenant_id.filter(|t| !t.is_empty()) {
        Some(t) => t,
        None => req
            .email
            .split('@')
            .next()
            .unwrap_or_default()
            .to_string(),
    };
    let tenant = TenantId::parse(raw_tenant)
        .ok_or_else(|| Error::BadRequest("invalid tenant id".into()))?;

    let user = state.sysdb.register(&req.email, &req.password, &tenant).await?;
    let token = state.auth.issue(&tenant, &user.id, TOKEN_TTL)?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            tenant_id: user.tenant_id.clone(),
            user,
        }),
    ))
}

/// `POST /api/auth/login`
pub async fn login(
    State(state): State<AppState>,
    AppJson(req): AppJson<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    let user = state.sysdb.login(&req.email, &req.password).await?;
    let tenant = TenantId::parse(user.tenant_id.clone())
        .ok_or_else(|| Error::Internal("stored tenant id is invalid".into()))?;
    let token = state.auth.issue(&tenant, &user.id, TOKEN_TTL)?;

    Ok(Json(AuthResponse {
        token,
        tenant_id: user.tenant_id.clone(),
        user,
    }))
}
