/// /address/* endpoints
use super::{ok_message, parse_body, parse_hash, parse_optional_body, write_response};
use crate::{
    auth::BearerHeader,
    context::AppContext,
    engine::{AddressDeleteRequest, AddressInfo, AddressUpload, KeyStatusInfo},
    error::ResolverResult,
};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

/// Build address routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route(
            "/address/:hash",
            get(get_address).post(upload_address).delete(delete_address),
        )
        .route("/address/:hash/delete", post(soft_delete_address))
        .route("/address/:hash/undelete", post(undelete_address))
        .route(
            "/address/:hash/check/:fingerprint",
            get(get_key_status).post(set_key_status),
        )
}

#[derive(Debug, Deserialize)]
struct KeyStatusBody {
    status: String,
}

async fn get_address(
    State(ctx): State<AppContext>,
    Path(hash): Path<String>,
) -> ResolverResult<Json<AddressInfo>> {
    let hash = parse_hash(&hash)?;
    let info = ctx.engine.get_address(&hash).await?;
    Ok(Json(info))
}

async fn upload_address(
    State(ctx): State<AppContext>,
    Path(hash): Path<String>,
    auth: BearerHeader,
    body: Bytes,
) -> ResolverResult<Response> {
    let hash = parse_hash(&hash)?;
    let upload: AddressUpload = parse_body(&body)?;

    let outcome = ctx.engine.upsert_address(&hash, upload, auth.as_deref()).await?;
    Ok(write_response(outcome, "address"))
}

async fn delete_address(
    State(ctx): State<AppContext>,
    Path(hash): Path<String>,
    auth: BearerHeader,
    body: Bytes,
) -> ResolverResult<Response> {
    let hash = parse_hash(&hash)?;
    let request: Option<AddressDeleteRequest> = parse_optional_body(&body)?;

    ctx.engine.delete_address(&hash, request, auth.as_deref()).await?;
    Ok(ok_message(StatusCode::OK, "address has been deleted"))
}

async fn soft_delete_address(
    State(ctx): State<AppContext>,
    Path(hash): Path<String>,
    auth: BearerHeader,
) -> ResolverResult<Response> {
    let hash = parse_hash(&hash)?;
    let serial = ctx.engine.soft_delete_address(&hash, auth.as_deref()).await?;

    Ok(Json(json!({
        "status": "ok",
        "message": "address has been soft-deleted",
        "serial_number": serial,
    }))
    .into_response())
}

async fn undelete_address(
    State(ctx): State<AppContext>,
    Path(hash): Path<String>,
    auth: BearerHeader,
) -> ResolverResult<Response> {
    let hash = parse_hash(&hash)?;
    let serial = ctx.engine.undelete_address(&hash, auth.as_deref()).await?;

    Ok(Json(json!({
        "status": "ok",
        "message": "address has been undeleted",
        "serial_number": serial,
    }))
    .into_response())
}

async fn get_key_status(
    State(ctx): State<AppContext>,
    Path((hash, fingerprint)): Path<(String, String)>,
) -> ResolverResult<Json<KeyStatusInfo>> {
    let hash = parse_hash(&hash)?;
    let info = ctx.engine.get_key_status(&hash, &fingerprint).await?;
    Ok(Json(info))
}

async fn set_key_status(
    State(ctx): State<AppContext>,
    Path((hash, fingerprint)): Path<(String, String)>,
    auth: BearerHeader,
    body: Bytes,
) -> ResolverResult<Json<KeyStatusInfo>> {
    let hash = parse_hash(&hash)?;
    let body: KeyStatusBody = parse_body(&body)?;

    let info = ctx
        .engine
        .set_key_status(&hash, &fingerprint, &body.status, auth.as_deref())
        .await?;
    Ok(Json(info))
}
