// Route handlers

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::error::ApiError;
use super::AppContext;
use crate::proxy::relay::DEFAULT_CONTENT_TYPE;
use crate::proxy::ProxyError;

pub const STATUS_MESSAGE: &str = "OldTube Proxy Server Running";

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/", get(home))
        .route("/video/:id", get(video))
        .route("/play/:id", get(play))
        .route("/stream/:id", get(stream))
        .route("/formats/:id", get(formats))
        .route("/search", get(search))
        .route("/trending", get(trending))
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
}

async fn home() -> impl IntoResponse {
    Json(json!({ "status": STATUS_MESSAGE }))
}

async fn video(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let resolved = ctx.service.video(&id).await?;

    Ok(Json(json!({
        "success": true,
        "video_url": resolved.url,
        "title": resolved.title,
        "duration": resolved.duration,
    })))
}

async fn play(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let url = ctx.service.play(&id).await?;

    match HeaderValue::from_str(&url) {
        Ok(location) => Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response()),
        Err(_) => Err(ApiError(ProxyError::VideoUnresolvable(format!(
            "resolved URL for {:?} is not a valid Location header",
            id
        )))),
    }
}

async fn stream(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let resolved = ctx.service.stream(&id).await?;
    tracing::info!(
        "[Relay] Streaming {} via {} ({})",
        id,
        resolved.transport,
        resolved.content_type
    );

    let content_type = HeaderValue::from_str(&resolved.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));
    let content_length = resolved.content_length;

    let mut response = Response::new(Body::from_stream(resolved.into_body()));
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, content_type);
    if let Some(len) = content_length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    }

    Ok(response)
}

async fn formats(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let formats = ctx.service.formats(&id).await?;
    Ok(Json(json!({ "success": true, "formats": formats })))
}

async fn search(
    State(ctx): State<AppContext>,
    Query(params): Query<SearchParams>,
) -> Result<impl IntoResponse, ApiError> {
    let videos = ctx.service.search(params.q.as_deref()).await?;
    Ok(Json(json!({ "success": true, "videos": videos })))
}

async fn trending(State(ctx): State<AppContext>) -> Result<impl IntoResponse, ApiError> {
    let videos = ctx.service.trending().await?;
    Ok(Json(json!({ "success": true, "videos": videos })))
}
