//! # Identity Context
//!
//! Extracts `(tenant, user)` from each request's bearer token and attaches
//! it to the request scope, so downstream handlers and the engine never
//! re-parse credentials. Tokens are HS256 JWTs carrying `tid` and `uid`
//! claims; no database lookup happens on the hot path.
//!
//! Public endpoints (paths under `/api/auth/`) bypass extraction entirely.
//! Protected surfaces are the rest of `/api/*` and the stream endpoint;
//! anything else (static assets) is public.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::server::AppState;
use crate::types::{Identity, TenantId};

/// How long issued tokens stay valid.
pub const TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Claims embedded in every token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Tenant id.
    pub tid: String,
    /// User id.
    pub uid: String,
    /// Issued-at, Unix seconds.
    pub iat: u64,
    /// Expiry, Unix seconds.
    pub exp: u64,
}

/// Issues and verifies bearer tokens. Entirely in-memory.
pub struct Auth {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl Auth {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation: Validation::default(),
        }
    }

    /// Creates a signed token for the given tenant and user.
    pub fn issue(&self, tenant: &TenantId, user_id: &str, ttl: Duration) -> Result<String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| Error::Internal(format!("system clock before epoch: {e}")))?
            .as_secs();
        let claims = Claims {
            tid: tenant.as_str().to_string(),
            uid: user_id.to_string(),
            iat: now,
            exp: now + ttl.as_secs(),
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| Error::Internal(format!("token signing failed: {e}")))
    }

    /// Verifies a token and resolves the identity it carries.
    ///
    /// Signature, expiry, and the tenant-id shape are all checked here; a
    /// token whose tenant id would not be storable is as invalid as a bad
    /// signature.
    pub fn verify(&self, token: &str) -> Result<Identity> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|_| Error::Unauthenticated("invalid token".into()))?;
        let tenant = TenantId::parse(data.claims.tid)
            .ok_or_else(|| Error::Unauthenticated("invalid token".into()))?;
        Ok(Identity {
            tenant,
            user_id: data.claims.uid,
        })
    }
}

/// Whether a path requires a credential.
fn is_protected(path: &str) -> bool {
    if path.starts_with("/api/auth/") {
        return false;
    }
    path.starts_with("/api/") || path.starts_with("/sse/")
}

/// Router middleware: authenticate protected paths and stash the
/// [`Identity`] in request extensions.
pub async fn require_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    if !is_protected(req.uri().path()) {
        return next.run(req).await;
    }

    let token = match bearer_token(&req) {
        Some(t) => t,
        None => return Error::Unauthenticated("missing authorization".into()).into_response(),
    };
    let identity = match state.auth.verify(token) {
        Ok(identity) => identity,
        Err(e) => return e.into_response(),
    };

    req.extensions_mut().insert(identity);
    next.run(req).await
}

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

// =============================================================================
// Tests
// =============================================================================
