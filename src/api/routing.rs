/// /routing/* endpoints
use super::{ok_message, parse_body, parse_hash, write_response};
use crate::{
    auth::BearerHeader,
    context::AppContext,
    engine::{RoutingInfo, RoutingUpload},
    error::ResolverResult,
};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::Response,
    routing::get,
    Json, Router,
};

/// Build routing routes
pub fn routes() -> Router<AppContext> {
    Router::new().route(
        "/routing/:hash",
        get(get_routing).post(upload_routing).delete(delete_routing),
    )
}

async fn get_routing(
    State(ctx): State<AppContext>,
    Path(hash): Path<String>,
) -> ResolverResult<Json<RoutingInfo>> {
    let hash = parse_hash(&hash)?;
    Ok(Json(ctx.engine.get_routing(&hash).await?))
}

async fn upload_routing(
    State(ctx): State<AppContext>,
    Path(hash): Path<String>,
    auth: BearerHeader,
    body: Bytes,
) -> ResolverResult<Response> {
    let hash = parse_hash(&hash)?;
    let upload: RoutingUpload = parse_body(&body)?;

    let outcome = ctx.engine.upsert_routing(&hash, upload, auth.as_deref()).await?;
    Ok(write_response(outcome, "routing"))
}

async fn delete_routing(
    State(ctx): State<AppContext>,
    Path(hash): Path<String>,
    auth: BearerHeader,
) -> ResolverResult<Response> {
    let hash = parse_hash(&hash)?;
    ctx.engine.delete_routing(&hash, auth.as_deref()).await?;
    Ok(ok_message(StatusCode::OK, "routing has been deleted"))
}
