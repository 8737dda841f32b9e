/// /organisation/* endpoints
use super::{ok_message, parse_body, parse_hash, write_response};
use crate::{
    auth::BearerHeader,
    context::AppContext,
    engine::{OrganisationInfo, OrganisationUpload},
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

/// Build organisation routes
pub fn routes() -> Router<AppContext> {
    Router::new().route(
        "/organisation/:hash",
        get(get_organisation)
            .post(upload_organisation)
            .delete(delete_organisation),
    )
}

async fn get_organisation(
    State(ctx): State<AppContext>,
    Path(hash): Path<String>,
) -> ResolverResult<Json<OrganisationInfo>> {
    let hash = parse_hash(&hash)?;
    Ok(Json(ctx.engine.get_organisation(&hash).await?))
}

async fn upload_organisation(
    State(ctx): State<AppContext>,
    Path(hash): Path<String>,
    auth: BearerHeader,
    body: Bytes,
) -> ResolverResult<Response> {
    let hash = parse_hash(&hash)?;
    let upload: OrganisationUpload = parse_body(&body)?;

    let outcome = ctx
        .engine
        .upsert_organisation(&hash, upload, auth.as_deref())
        .await?;
    Ok(write_response(outcome, "organisation"))
}

async fn delete_organisation(
    State(ctx): State<AppContext>,
    Path(hash): Path<String>,
    auth: BearerHeader,
) -> ResolverResult<Response> {
    let hash = parse_hash(&hash)?;
    ctx.engine.delete_organisation(&hash, auth.as_deref()).await?;
    Ok(ok_message(StatusCode::OK, "organisation has been deleted"))
}
