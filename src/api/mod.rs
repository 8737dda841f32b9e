/// API routes and handlers
pub mod address;
pub mod organisation;
pub mod routing;

use crate::{
    context::AppContext,
    engine::WriteOutcome,
    error::{ResolverError, ResolverResult},
    hash::Hash,
};
use axum::{
    body::Bytes,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    Router,
};
use serde::de::DeserializeOwned;
use serde_json::json;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(address::routes())
        .merge(routing::routes())
        .merge(organisation::routes())
}

/// Path hash, normalised to lowercase
pub(crate) fn parse_hash(raw: &str) -> ResolverResult<Hash> {
    Hash::parse(raw)
}

/// JSON request body. Malformed bodies are "invalid data".
pub(crate) fn parse_body<T: DeserializeOwned>(body: &Bytes) -> ResolverResult<T> {
    serde_json::from_slice(body).map_err(|e| {
        tracing::debug!("rejecting request body: {}", e);
        ResolverError::validation("invalid data")
    })
}

/// Same as [`parse_body`], but an empty body is `None`
pub(crate) fn parse_optional_body<T: DeserializeOwned>(body: &Bytes) -> ResolverResult<Option<T>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    parse_body(body).map(Some)
}

pub(crate) fn ok_message(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "status": "ok", "message": message }))).into_response()
}

/// 201 for a fresh record, 200 for an update
pub(crate) fn write_response(outcome: WriteOutcome, entity: &str) -> Response {
    match outcome {
        WriteOutcome::Created => ok_message(StatusCode::CREATED, &format!("{} has been created", entity)),
        WriteOutcome::Updated => ok_message(StatusCode::OK, &format!("{} has been updated", entity)),
    }
}
