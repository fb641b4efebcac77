//! Admin pages: dashboard, post editor, tag and inbox management.
//!
//! Every route here sits behind `require_admin_page`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    Form,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tera::Context as TeraContext;

use crate::api::common::PaginationQuery;
use crate::api::middleware::AppState;
use crate::models::{parse_tag_list, CreatePostInput, ListParams, UpdatePostInput, POST_DATE_FORMAT};
use crate::services::{PostServiceError, TagServiceError};
use crate::web::page::{Page, PageError};
use crate::web::pages::Pagination;

/// Posts listed on the dashboard
const DASHBOARD_POSTS: u32 = 100;

/// The post editor's fields, as typed
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct PostForm {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub date: String,
    /// Comma separated tag names
    #[serde(default)]
    pub tags: String,
}

impl PostForm {
    fn date(&self) -> Option<String> {
        Some(self.date.trim().to_string()).filter(|d| !d.is_empty())
    }
}

#[derive(Debug, Deserialize)]
pub struct TagForm {
    #[serde(default)]
    pub name: String,
}

/// GET /admin - Analytics dashboard
pub async fn dashboard(State(state): State<AppState>, page: Page) -> Result<Response, PageError> {
    let dashboard = state.analytics_service.dashboard().await?;
    let unread = state.message_service.unread_count().await?;
    let posts = state
        .post_service
        .list(&ListParams::new(1, DASHBOARD_POSTS))
        .await?;

    let mut context = TeraContext::new();
    context.insert("dashboard", &dashboard);
    context.insert("unread", &unread);
    context.insert("posts", &posts.items);
    Ok(page.render("admin/dashboard.html", &context)?.into_response())
}

fn post_form_context(action: &str, post_id: Option<i64>, form: &PostForm, error: Option<&str>) -> TeraContext {
    let mut context = TeraContext::new();
    context.insert("action", action);
    context.insert("post_id", &post_id);
    context.insert("form", form);
    context.insert("error", &error);
    context
}

/// GET /admin/posts/new
pub async fn new_post_form(page: Page) -> Result<Response, PageError> {
    let form = PostForm {
        date: Utc::now().date_naive().format(POST_DATE_FORMAT).to_string(),
        ..Default::default()
    };
    let context = post_form_context("/admin/posts/new", None, &form, None);
    Ok(page.render("admin/post_form.html", &context)?.into_response())
}

/// POST /admin/posts/new
pub async fn create_post(
    State(state): State<AppState>,
    page: Page,
    Form(form): Form<PostForm>,
) -> Result<Response, PageError> {
    let input = CreatePostInput {
        title: form.title.clone(),
        content: form.content.clone(),
        date: form.date(),
        tags: parse_tag_list(&form.tags),
        tag_ids: Vec::new(),
    };

    match state.post_service.create(input).await {
        Ok(post) => Ok(Redirect::to(&format!("/posts/{}", post.post.id)).into_response()),
        Err(PostServiceError::ValidationError(msg)) => {
            let context = post_form_context("/admin/posts/new", None, &form, Some(&msg));
            page.render_with_status(StatusCode::BAD_REQUEST, "admin/post_form.html", &context)
        }
        Err(e) => Err(e.into()),
    }
}

/// GET /admin/posts/{id}/edit
pub async fn edit_post_form(
    State(state): State<AppState>,
    page: Page,
    Path(id): Path<i64>,
) -> Result<Response, PageError> {
    let detail = state.post_service.get(id).await?;
    let form = PostForm {
        title: detail.post.title.clone(),
        content: detail.post.content.clone(),
        date: detail.post.date.format(POST_DATE_FORMAT).to_string(),
        tags: detail
            .tags
            .iter()
            .map(|t| t.name.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    };

    let action = format!("/admin/posts/{}/edit", id);
    let context = post_form_context(&action, Some(id), &form, None);
    Ok(page.render("admin/post_form.html", &context)?.into_response())
}

/// POST /admin/posts/{id}/edit
pub async fn update_post(
    State(state): State<AppState>,
    page: Page,
    Path(id): Path<i64>,
    Form(form): Form<PostForm>,
) -> Result<Response, PageError> {
    let input = UpdatePostInput {
        title: Some(form.title.clone()),
        content: Some(form.content.clone()),
        date: form.date(),
        tags: Some(parse_tag_list(&form.tags)),
        tag_ids: None,
    };

    match state.post_service.update(id, input).await {
        Ok(_) => Ok(Redirect::to(&format!("/posts/{}", id)).into_response()),
        Err(PostServiceError::ValidationError(msg)) => {
            let action = format!("/admin/posts/{}/edit", id);
            let context = post_form_context(&action, Some(id), &form, Some(&msg));
            page.render_with_status(StatusCode::BAD_REQUEST, "admin/post_form.html", &context)
        }
        Err(e) => Err(e.into()),
    }
}

/// POST /admin/posts/{id}/delete
pub async fn delete_post(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Redirect, PageError> {
    state.post_service.delete(id).await?;
    Ok(Redirect::to("/admin"))
}

/// POST /admin/comments/{id}/delete - Back to the post afterwards
pub async fn delete_comment(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Redirect, PageError> {
    let comment = state.comment_service.get(id).await?;
    state.comment_service.delete(id).await?;
    Ok(Redirect::to(&format!("/posts/{}", comment.post_id)))
}

async fn tags_page(state: &AppState, page: &Page, status: StatusCode, error: Option<&str>) -> Result<Response, PageError> {
    let mut context = TeraContext::new();
    context.insert("tags", &state.tag_service.list().await?);
    context.insert("error", &error);
    page.render_with_status(status, "admin/tags.html", &context)
}

/// GET /admin/tags
pub async fn tags(State(state): State<AppState>, page: Page) -> Result<Response, PageError> {
    tags_page(&state, &page, StatusCode::OK, None).await
}

/// POST /admin/tags - Create a tag
pub async fn create_tag(
    State(state): State<AppState>,
    page: Page,
    Form(form): Form<TagForm>,
) -> Result<Response, PageError> {
    match state.tag_service.create(&form.name).await {
        Ok(_) => Ok(Redirect::to("/admin/tags").into_response()),
        Err(TagServiceError::ValidationError(msg)) => {
            tags_page(&state, &page, StatusCode::BAD_REQUEST, Some(&msg)).await
        }
        Err(TagServiceError::Conflict(name)) => {
            let msg = format!("Tag '{}' already exists", name);
            tags_page(&state, &page, StatusCode::CONFLICT, Some(&msg)).await
        }
        Err(e) => Err(e.into()),
    }
}

/// POST /admin/tags/{id}/delete
pub async fn delete_tag(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Redirect, PageError> {
    state.tag_service.delete(id).await?;
    Ok(Redirect::to("/admin/tags"))
}

/// GET /admin/messages - Inbox, newest first
pub async fn messages(
    State(state): State<AppState>,
    page: Page,
    Query(query): Query<PaginationQuery>,
) -> Result<Response, PageError> {
    let result = state.message_service.list(&ListParams::from(&query)).await?;

    let mut context = TeraContext::new();
    context.insert("pagination", &Pagination::from(&result));
    context.insert("messages", &result.items);
    Ok(page.render("admin/messages.html", &context)?.into_response())
}

/// POST /admin/messages/{id}/delete
pub async fn delete_message(State(state): State<AppState>, Path(id): Path<i64>) -> Result<Redirect, PageError> {
    state.message_service.delete(id).await?;
    Ok(Redirect::to("/admin/messages"))
}
