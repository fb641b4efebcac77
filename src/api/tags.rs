//! Tag API endpoints
//!
//! - GET /api/v1/tags - Tags with post counts
//! - GET /api/v1/tags/{id}/posts - Posts carrying a tag
//! - GET /api/v1/tags/posts?ids=1,2 or ?name=x - Posts carrying any of the tags
//! - POST /api/v1/tags - Create a tag (admin)
//! - DELETE /api/v1/tags/{id} - Delete a tag (admin)

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::api::common::parse_id_list;
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{PostSummary, TagWithCount};

/// Query parameters for tag filtering
#[derive(Debug, Default, Deserialize)]
pub struct TagFilterQuery {
    /// Comma separated tag ids
    pub ids: Option<String>,
    /// A single tag name
    pub name: Option<String>,
}

/// Request body for creating a tag
#[derive(Debug, Deserialize)]
pub struct CreateTagRequest {
    pub name: String,
}

/// Response for tag list
#[derive(Debug, Serialize)]
pub struct TagListResponse {
    pub tags: Vec<TagWithCount>,
}

/// Response for a tag filter
#[derive(Debug, Serialize)]
pub struct TagPostsResponse {
    pub posts: Vec<PostSummary>,
}

/// GET /api/v1/tags - List tags
pub async fn list_tags(State(state): State<AppState>) -> Result<Json<TagListResponse>, ApiError> {
    let tags = state.tag_service.list().await?;
    Ok(Json(TagListResponse { tags }))
}

/// GET /api/v1/tags/{id}/posts - Posts with one tag
///
/// An unknown tag yields an empty list.
pub async fn get_tag_posts(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<TagPostsResponse>, ApiError> {
    let posts = state.tag_service.posts_by_tag_id(id).await?;
    Ok(Json(TagPostsResponse { posts }))
}

/// GET /api/v1/tags/posts - Posts with any of the given tags
pub async fn filter_posts(
    State(state): State<AppState>,
    Query(query): Query<TagFilterQuery>,
) -> Result<Json<TagPostsResponse>, ApiError> {
    let posts = match (query.ids.as_deref(), query.name.as_deref()) {
        (Some(ids), _) => state.tag_service.posts_by_tag_ids(&parse_id_list(ids)).await?,
        (None, Some(name)) => state.tag_service.posts_by_tag_name(name).await?,
        (None, None) => Vec::new(),
    };
    Ok(Json(TagPostsResponse { posts }))
}

/// POST /api/v1/tags - Create a tag; 409 when the name exists
pub async fn create_tag(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Json(body): Json<CreateTagRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let tag = state.tag_service.create(&body.name).await?;
    Ok((StatusCode::CREATED, Json(tag)))
}

/// DELETE /api/v1/tags/{id} - Delete a tag; its posts stay
pub async fn delete_tag(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.tag_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
