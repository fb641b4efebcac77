//! Authentication API endpoints
//!
//! - POST /api/v1/auth/login - Admin login
//! - POST /api/v1/auth/logout - Logout
//! - GET /api/v1/auth/me - Get current user

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{
    clear_session_cookie, extract_ip_address, extract_session_token, session_cookie, ApiError,
    AppState, AuthenticatedUser,
};
use crate::models::{Session, User};

/// Request body for login
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Response for successful authentication
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub token: String,
}

/// Response for user info
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub role: String,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            role: user.role.to_string(),
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

/// Build public auth routes (no auth required)
pub fn public_router() -> Router<AppState> {
    Router::new().route("/login", post(login))
}

/// Build protected auth routes (requires auth middleware)
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/me", get(get_current_user))
}

/// Shared by the JSON and HTML login handlers.
///
/// Applies the IP and username rate limits, records failures and clears
/// the username window on success.
pub async fn attempt_login(
    state: &AppState,
    headers: &HeaderMap,
    username: &str,
    password: &str,
) -> Result<(User, Session), ApiError> {
    if let Some(ip) = extract_ip_address(headers) {
        if state.rate_limiter.is_ip_limited(ip).await {
            tracing::warn!("Login from {} rejected: IP rate limit exceeded", ip);
            return Err(ApiError::rate_limited("Too many requests, try again later", 60));
        }
        state.rate_limiter.record_ip_request(ip).await;
    }

    if state.rate_limiter.is_username_limited(username).await {
        tracing::warn!("Login for '{}' rejected: too many failed attempts", username);
        return Err(ApiError::rate_limited(
            "Too many failed attempts, try again in 15 minutes",
            900,
        ));
    }

    match state.user_service.login(username, password).await {
        Ok(result) => {
            state.rate_limiter.clear_username_attempts(username).await;
            Ok(result)
        }
        Err(e) => {
            state.rate_limiter.record_failed_attempt(username).await;
            tracing::warn!("Failed login for '{}'", username);
            Err(e.into())
        }
    }
}

/// POST /api/v1/auth/login - Login
async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (user, session) = attempt_login(&state, &headers, &body.username, &body.password).await?;

    let cookie = session_cookie(&session.id, state.config.auth.session_expiration_days);
    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&cookie).map_err(|e| ApiError::internal_error(e.to_string()))?,
    );

    Ok((
        response_headers,
        Json(AuthResponse {
            user: user.into(),
            token: session.id,
        }),
    ))
}

/// POST /api/v1/auth/logout - Logout
async fn logout(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let token = extract_session_token(&headers)
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    state.user_service.logout(&token).await?;

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&clear_session_cookie())
            .map_err(|e| ApiError::internal_error(e.to_string()))?,
    );

    Ok((StatusCode::NO_CONTENT, response_headers))
}

/// GET /api/v1/auth/me - Get current user
async fn get_current_user(user: AuthenticatedUser) -> Json<UserResponse> {
    Json(user.0.into())
}
