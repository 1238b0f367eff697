use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tracing::error;

use crate::models::Story;
use crate::store::StoryStore;

pub const DEFAULT_LIMIT: usize = 50;
pub const MAX_LIMIT: usize = 500;

#[derive(Clone)]
pub struct AppState {
    pub store: StoryStore,
}

pub fn router(store: StoryStore) -> Router {
    let state = AppState { store };

    Router::new()
        .route("/", get(root))
        .route("/health", get(|| async { "ok" }))
        .route("/stories", get(list_stories))
        .route("/stories/{source_id}", get(get_story))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Debug)]
pub enum ApiError {
    NotFound(i64),
    InvalidLimit(i64),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(id) => (
                StatusCode::NOT_FOUND,
                format!("story with source_id {id} not found"),
            ),
            ApiError::InvalidLimit(limit) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("limit must be between 1 and {MAX_LIMIT}, got {limit}"),
            ),
            ApiError::Internal(e) => {
                error!(error = %e, "Story query failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(e)
    }
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    q: Option<String>,
    limit: Option<i64>,
}

/// Out-of-range limits are rejected rather than clamped.
fn validate_limit(limit: Option<i64>) -> Result<usize, ApiError> {
    match limit {
        None => Ok(DEFAULT_LIMIT),
        Some(n) if (1..=MAX_LIMIT as i64).contains(&n) => Ok(n as usize),
        Some(n) => Err(ApiError::InvalidLimit(n)),
    }
}

async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "message": "HN story classifier API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "stories": "/stories?q=<substring>&limit=<1..500>",
            "story_by_id": "/stories/{source_id}",
        }
    }))
}

async fn list_stories(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Story>>, ApiError> {
    let limit = validate_limit(params.limit)?;
    let stories = state.store.list(params.q.as_deref(), limit)?;
    Ok(Json(stories))
}

async fn get_story(
    State(state): State<AppState>,
    Path(source_id): Path<i64>,
) -> Result<Json<Story>, ApiError> {
    state
        .store
        .get(source_id)?
        .map(Json)
        .ok_or(ApiError::NotFound(source_id))
}
