//! Post API endpoints
//!
//! Public:
//! - GET /api/v1/posts - Paginated listing
//! - GET /api/v1/posts/{id} - Post with tags and comments
//! - POST /api/v1/posts/{id}/view - Record a view
//!
//! Admin:
//! - POST /api/v1/posts
//! - PUT /api/v1/posts/{id}
//! - DELETE /api/v1/posts/{id}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Serialize;

use crate::api::common::PaginationQuery;
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, Viewer};
use crate::models::{CreatePostInput, ListParams, PagedResult, PostDetail, PostSummary, UpdatePostInput};

/// Response for a recorded view
#[derive(Debug, Serialize)]
pub struct ViewResponse {
    /// False when the viewer is the admin
    pub counted: bool,
}

/// GET /api/v1/posts - List posts, newest first
pub async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<PagedResult<PostSummary>>, ApiError> {
    let params = ListParams::from(&query);
    let page = state.post_service.list(&params).await?;
    Ok(Json(page))
}

/// GET /api/v1/posts/{id} - Get a post with its tags and comments
pub async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<PostDetail>, ApiError> {
    Ok(Json(state.post_service.get(id).await?))
}

/// POST /api/v1/posts/{id}/view - Count a view unless the viewer is the admin
pub async fn record_view(
    State(state): State<AppState>,
    viewer: Viewer,
    Path(id): Path<i64>,
) -> Result<Json<ViewResponse>, ApiError> {
    let counted = state.post_service.record_view(id, viewer.is_admin()).await?;
    Ok(Json(ViewResponse { counted }))
}

/// POST /api/v1/posts - Create a post
pub async fn create_post(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Json(body): Json<CreatePostInput>,
) -> Result<impl IntoResponse, ApiError> {
    let post = state.post_service.create(body).await?;
    Ok((StatusCode::CREATED, Json(post)))
}

/// PUT /api/v1/posts/{id} - Edit a post
pub async fn update_post(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<UpdatePostInput>,
) -> Result<Json<PostDetail>, ApiError> {
    Ok(Json(state.post_service.update(id, body).await?))
}

/// DELETE /api/v1/posts/{id} - Delete a post
pub async fn delete_post(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.post_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
