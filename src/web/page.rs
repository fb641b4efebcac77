//! Page rendering helpers
//!
//! `Page` gathers what every template needs (theme engine, site settings,
//! viewer, path). `PageError` is the HTML counterpart of `ApiError`: it
//! leaves a marker on the response that `render_error_pages` turns into
//! `error.html`.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{request::Parts, StatusCode},
    middleware::Next,
    response::{Html, IntoResponse, Redirect, Response},
};
use std::sync::Arc;
use tera::Context as TeraContext;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::User;
use crate::services::{
    AnalyticsServiceError, CommentServiceError, MessageServiceError, PostServiceError,
    TagServiceError, UserServiceError,
};
use crate::theme::{CurrentUser, StandardTemplateVars, ThemeEngine};

/// Everything needed to render a page for the current request
pub struct Page {
    engine: Arc<ThemeEngine>,
    vars: StandardTemplateVars,
    user: Option<User>,
}

impl Page {
    pub fn is_admin(&self) -> bool {
        self.user.as_ref().is_some_and(User::is_admin)
    }

    pub fn render(&self, template: &str, context: &TeraContext) -> Result<Html<String>, PageError> {
        let html = self
            .engine
            .render_with_standard_vars(template, context, &self.vars)
            .map_err(PageError::from)?;
        Ok(Html(html))
    }

    /// Render with a non-200 status, used to re-show a form with its error
    pub fn render_with_status(
        &self,
        status: StatusCode,
        template: &str,
        context: &TeraContext,
    ) -> Result<Response, PageError> {
        Ok((status, self.render(template, context)?).into_response())
    }
}

impl FromRequestParts<AppState> for Page {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = parts
            .extensions
            .get::<AuthenticatedUser>()
            .map(|au| au.0.clone());
        let vars = standard_vars(state, parts.uri.path(), user.as_ref());
        Ok(Page {
            engine: state.theme_engine.clone(),
            vars,
            user,
        })
    }
}

fn standard_vars(state: &AppState, path: &str, user: Option<&User>) -> StandardTemplateVars {
    StandardTemplateVars::new(
        state.config.blog.site_name.clone(),
        state.config.blog.site_description.clone(),
        path,
    )
    .with_user(user.map(CurrentUser::from))
}

/// An error shown to the reader as the error page
#[derive(Debug, Clone)]
pub struct PageError {
    pub status: StatusCode,
    pub message: String,
}

impl PageError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    fn internal(e: impl std::fmt::Display) -> Self {
        tracing::error!("Page failed: {}", e);
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong")
    }
}

impl IntoResponse for PageError {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.message.clone()).into_response();
        response.extensions_mut().insert(self);
        response
    }
}

impl From<anyhow::Error> for PageError {
    fn from(e: anyhow::Error) -> Self {
        PageError::internal(format!("{:#}", e))
    }
}

impl From<ApiError> for PageError {
    fn from(e: ApiError) -> Self {
        let status = e.status();
        if status.is_server_error() {
            return PageError::new(status, "Something went wrong");
        }
        PageError::new(status, e.error.message)
    }
}

macro_rules! page_error_from_service {
    ($($err:ty),* $(,)?) => {
        $(
            impl From<$err> for PageError {
                fn from(e: $err) -> Self {
                    ApiError::from(e).into()
                }
            }
        )*
    };
}

page_error_from_service!(
    UserServiceError,
    PostServiceError,
    TagServiceError,
    CommentServiceError,
    MessageServiceError,
    AnalyticsServiceError,
);

/// Replace bare `PageError` responses with the rendered error page
pub async fn render_error_pages(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|au| au.0.clone());
    let path = request.uri().path().to_string();

    let response = next.run(request).await;
    let Some(error) = response.extensions().get::<PageError>().cloned() else {
        return response;
    };

    let vars = standard_vars(&state, &path, user.as_ref());
    let html = state
        .theme_engine
        .render_error(error.status.as_u16(), &error.message, &vars);
    (error.status, Html(html)).into_response()
}

/// Send guests on admin pages to the login form
pub async fn require_admin_page(request: Request, next: Next) -> Response {
    let is_admin = request
        .extensions()
        .get::<AuthenticatedUser>()
        .is_some_and(|au| au.0.is_admin());
    if !is_admin {
        return Redirect::to("/login").into_response();
    }
    next.run(request).await
}

/// Fallback for unknown paths
pub async fn not_found_page() -> PageError {
    PageError::not_found("Page not found")
}
