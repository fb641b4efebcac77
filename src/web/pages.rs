//! Public pages: listing, post detail, tag pages, contact form and login

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Form,
};
use serde::{Deserialize, Serialize};
use tera::Context as TeraContext;

use crate::api::auth::attempt_login;
use crate::api::common::parse_id_list;
use crate::api::middleware::{clear_session_cookie, extract_session_token, session_cookie, AppState};
use crate::models::{CreateCommentInput, CreateMessageInput, ListParams, PagedResult, PostDetail};
use crate::services::{CommentServiceError, MessageServiceError};
use crate::web::page::{Page, PageError};

/// Page links for a paginated listing
#[derive(Debug, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub total_pages: u32,
    pub has_prev: bool,
    pub has_next: bool,
}

impl<T> From<&PagedResult<T>> for Pagination {
    fn from(result: &PagedResult<T>) -> Self {
        Self {
            page: result.page,
            total_pages: result.total_pages(),
            has_prev: result.has_prev(),
            has_next: result.has_next(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct IndexQuery {
    pub page: Option<u32>,
    /// Filter by one tag name
    pub tag: Option<String>,
    /// Filter by comma separated tag ids
    pub tags: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CommentForm {
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct MessageForm {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub contact_info: String,
}

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default)]
    pub sent: Option<u8>,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// GET / - Homepage with tag cloud; `?tag=` or `?tags=` filter it
pub async fn index(
    State(state): State<AppState>,
    page: Page,
    Query(query): Query<IndexQuery>,
) -> Result<Response, PageError> {
    let mut context = TeraContext::new();
    context.insert("tags", &state.tag_service.list().await?);

    if let Some(ids) = query.tags.as_deref() {
        let posts = state.tag_service.posts_by_tag_ids(&parse_id_list(ids)).await?;
        context.insert("posts", &posts);
        context.insert("filter", &format!("#{}", ids));
        context.insert("pagination", &Option::<Pagination>::None);
    } else if let Some(name) = query.tag.as_deref() {
        let posts = state.tag_service.posts_by_tag_name(name).await?;
        context.insert("posts", &posts);
        context.insert("filter", name);
        context.insert("pagination", &Option::<Pagination>::None);
    } else {
        let per_page = u32::try_from(state.config.blog.page_size).unwrap_or(10);
        let params = ListParams::new(query.page.unwrap_or(1), per_page);
        let result = state.post_service.list(&params).await?;
        context.insert("pagination", &Pagination::from(&result));
        context.insert("posts", &result.items);
        context.insert("filter", &Option::<String>::None);
    }

    Ok(page.render("index.html", &context)?.into_response())
}

fn post_context(post: &PostDetail, form: &CommentForm, error: Option<&str>) -> TeraContext {
    let mut context = TeraContext::new();
    context.insert("post", post);
    context.insert("form", form);
    context.insert("comment_error", &error);
    context
}

/// GET /posts/{id} - Post detail; counts a view unless the admin is reading
pub async fn show_post(
    State(state): State<AppState>,
    page: Page,
    Path(id): Path<i64>,
) -> Result<Response, PageError> {
    let mut post = state.post_service.get(id).await?;
    if state.post_service.record_view(id, page.is_admin()).await? {
        post.post.view_count += 1;
    }

    let context = post_context(&post, &CommentForm::default(), None);
    Ok(page.render("post.html", &context)?.into_response())
}

/// POST /posts/{id}/comments - Submit a comment and go back to the post
pub async fn submit_comment(
    State(state): State<AppState>,
    page: Page,
    Path(id): Path<i64>,
    Form(form): Form<CommentForm>,
) -> Result<Response, PageError> {
    let author = Some(form.author.clone()).filter(|a| !a.trim().is_empty());
    let input = CreateCommentInput::new(author, form.title.clone(), form.content.clone());

    match state.comment_service.create(id, input).await {
        Ok(comment) => {
            Ok(Redirect::to(&format!("/posts/{}#comment-{}", id, comment.id)).into_response())
        }
        Err(CommentServiceError::ValidationError(msg)) => {
            let post = state.post_service.get(id).await?;
            let context = post_context(&post, &form, Some(&msg));
            page.render_with_status(StatusCode::BAD_REQUEST, "post.html", &context)
        }
        Err(e) => Err(e.into()),
    }
}

/// GET /tags/{slug} - Posts carrying a tag
pub async fn show_tag(
    State(state): State<AppState>,
    page: Page,
    Path(slug): Path<String>,
) -> Result<Response, PageError> {
    let tag = state
        .tag_service
        .get_by_slug(&slug)
        .await?
        .ok_or_else(|| PageError::not_found(format!("No tag named '{}'", slug)))?;
    let posts = state.tag_service.posts_by_tag_id(tag.id).await?;

    let mut context = TeraContext::new();
    context.insert("tag", &tag);
    context.insert("posts", &posts);
    Ok(page.render("tag.html", &context)?.into_response())
}

fn message_context(form: &MessageForm, sent: bool, error: Option<&str>) -> TeraContext {
    let mut context = TeraContext::new();
    context.insert("form", form);
    context.insert("sent", &sent);
    context.insert("error", &error);
    context
}

/// GET /message - Contact form
pub async fn message_form(page: Page, Query(query): Query<MessageQuery>) -> Result<Response, PageError> {
    let context = message_context(&MessageForm::default(), query.sent.is_some(), None);
    Ok(page.render("message.html", &context)?.into_response())
}

/// POST /message - Send the admin a message
pub async fn submit_message(
    State(state): State<AppState>,
    page: Page,
    Form(form): Form<MessageForm>,
) -> Result<Response, PageError> {
    let mut input = CreateMessageInput::new(form.subject.clone(), form.body.clone());
    input.contact_info = Some(form.contact_info.clone());

    match state.message_service.send(input).await {
        Ok(_) => Ok(Redirect::to("/message?sent=1").into_response()),
        Err(MessageServiceError::ValidationError(msg)) => {
            let context = message_context(&form, false, Some(&msg));
            page.render_with_status(StatusCode::BAD_REQUEST, "message.html", &context)
        }
        Err(e) => Err(e.into()),
    }
}

fn login_context(username: &str, message: Option<&str>) -> TeraContext {
    let mut context = TeraContext::new();
    context.insert("username", username);
    context.insert("message", &message);
    context
}

/// GET /login - Login form
pub async fn login_form(page: Page) -> Result<Response, PageError> {
    if page.is_admin() {
        return Ok(Redirect::to("/admin").into_response());
    }
    Ok(page.render("login.html", &login_context("", None))?.into_response())
}

/// POST /login - Check credentials, set the session cookie
pub async fn submit_login(
    State(state): State<AppState>,
    page: Page,
    headers: HeaderMap,
    Form(form): Form<LoginForm>,
) -> Result<Response, PageError> {
    match attempt_login(&state, &headers, &form.username, &form.password).await {
        Ok((_, session)) => {
            let cookie = session_cookie(&session.id, state.config.auth.session_expiration_days);
            Ok(([(header::SET_COOKIE, cookie)], Redirect::to("/admin")).into_response())
        }
        Err(e) if !e.status().is_server_error() => {
            let context = login_context(&form.username, Some(&e.error.message));
            page.render_with_status(e.status(), "login.html", &context)
        }
        Err(e) => Err(e.into()),
    }
}

/// POST /logout - End the session
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, PageError> {
    if let Some(token) = extract_session_token(&headers) {
        state.user_service.logout(&token).await?;
    }
    Ok(([(header::SET_COOKIE, clear_session_cookie())], Redirect::to("/")).into_response())
}
