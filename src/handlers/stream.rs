//! Stream endpoint: the push half of the sync protocol.
//!
//! A long-lived SSE response carrying nothing but version numbers. The
//! protocol is deliberately minimal — `data: <version>\n\n` and no other
//! event types — because the stream is only a doorbell: clients pull actual
//! rows from the delta endpoint. The initial `:ok` comment defeats proxy
//! buffering so the first event is not held back.

use std::convert::Infallible;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, HeaderName};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use futures::StreamExt;

use crate::server::AppState;
use crate::types::Identity;

/// `GET /sse/events`
///
/// Subscribes the caller to its tenant's notifications for the lifetime of
/// the connection. The subscription unregisters itself when the response
/// body is dropped — client disconnect, server shutdown, either way.
pub async fn events(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Response {
    let subscription = state.hub.clone().subscribe(identity.tenant.clone());

    let preamble = futures::stream::once(async {
        Ok::<Bytes, Infallible>(Bytes::from_static(b":ok\n\n"))
    });
    let frames = subscription.map(|version| Ok(Bytes::from(format!("data: {version}\n\n"))));
    let body = Body::from_stream(preamble.chain(frames));

    (
        [
            (
                header::CONTENT_TYPE,
                "text/event-stream; charset=utf-8",
            ),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
            (HeaderName::from_static("x-accel-buffering"), "no"),
        ],
        body,
    )
        .into_response()
}
