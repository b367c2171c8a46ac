//! # HTTP Handlers
//!
//! One submodule per resource, mirroring the route table in
//! [`crate::server`]. Every write handler drives the same pipeline: domain
//! SQL through the open [`WriteTx`](crate::write::WriteTx), version
//! allocation, journal append(s), commit, done.

pub mod auth_routes;
pub mod cards;
pub mod columns;
pub mod pos;
pub mod projects;
pub mod stream;
pub mod sync;

use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::Json;
use rand::Rng;
use serde::de::DeserializeOwned;

use crate::error::Error;

/// Bound on reading a request body. Streams carry no body, so only the
/// write endpoints ever hit this.
const BODY_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// JSON body extractor whose rejection is our 400, not axum's 422.
///
/// The API contract is "unparseable body → 400 Bad Request" regardless of
/// whether the failure is syntax, shape, or a client that stops sending
/// mid-body (the read is bounded by [`BODY_READ_TIMEOUT`]).
pub struct AppJson<T>(pub T);

impl<S, T> FromRequest<S> for AppJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let read = tokio::time::timeout(BODY_READ_TIMEOUT, Json::<T>::from_request(req, state));
        match read.await {
            Ok(Ok(Json(value))) => Ok(AppJson(value)),
            Ok(Err(rejection)) => Err(Error::BadRequest(rejection_message(rejection))),
            Err(_) => Err(Error::BadRequest("request body read timed out".into())),
        }
    }
}

fn rejection_message(rejection: JsonRejection) -> String {
    match rejection {
        JsonRejection::MissingJsonContentType(_) => "expected application/json body".to_string(),
        other => other.body_text(),
    }
}

/// 8-character alphanumeric id for human-facing references (order slips).
pub(crate) fn short_id() -> String {
    const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    (0..8)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_ids_are_eight_alphanumeric_chars() {
        for _ in 0..100 {
            let id = short_id();
            assert_eq!(id.len(), 8);
            assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        }
    }
}
