//! Message API endpoints
//!
//! - POST /api/v1/messages - Send the admin a message
//! - GET /api/v1/messages - Inbox (admin)
//! - GET /api/v1/messages/{id} - Read a message (admin)
//! - DELETE /api/v1/messages/{id} - Delete a message (admin)

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use crate::api::common::PaginationQuery;
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{CreateMessageInput, ListParams, Message, PagedResult};

pub async fn send_message(
    State(state): State<AppState>,
    Json(body): Json<CreateMessageInput>,
) -> Result<impl IntoResponse, ApiError> {
    let message = state.message_service.send(body).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn list_messages(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Query(query): Query<PaginationQuery>,
) -> Result<Json<PagedResult<Message>>, ApiError> {
    let params = ListParams::from(&query);
    Ok(Json(state.message_service.list(&params).await?))
}

/// Reading a message marks it read
pub async fn get_message(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Message>, ApiError> {
    Ok(Json(state.message_service.get(id).await?))
}

pub async fn delete_message(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.message_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
