//! API layer - HTTP handlers and routing
//!
//! JSON endpoints live under `/api/v1`:
//! - Auth endpoints (login, logout, current user)
//! - Post endpoints
//! - Tag endpoints and tag filtering
//! - Comment endpoints
//! - Message endpoints
//! - Analytics endpoints (admin)
//!
//! `build_router` mounts them next to the HTML pages from `crate::web`.

pub mod analytics;
pub mod auth;
pub mod comments;
pub mod common;
pub mod messages;
pub mod middleware;
pub mod posts;
pub mod tags;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

pub use middleware::{ApiError, AppState, AuthenticatedUser, Viewer};

/// Build the main API router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Admin routes (need admin role)
    let admin_routes = Router::new()
        .route("/posts", post(posts::create_post))
        .route("/posts/{id}", put(posts::update_post))
        .route("/posts/{id}", delete(posts::delete_post))
        .route("/comments/{id}", delete(comments::delete_comment))
        .route("/tags", post(tags::create_tag))
        .route("/tags/{id}", delete(tags::delete_tag))
        .route("/messages", get(messages::list_messages))
        .route("/messages/{id}", get(messages::get_message))
        .route("/messages/{id}", delete(messages::delete_message))
        .route("/analytics/dashboard", get(analytics::dashboard))
        .route("/analytics/posts/{id}", get(analytics::post_stats))
        .route("/analytics/run", post(analytics::run_job))
        .route_layer(axum_middleware::from_fn(middleware::require_admin))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Protected routes (need a session)
    let protected_routes = Router::new()
        .nest("/auth", auth::protected_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Public routes; the viewer is resolved when a session is present
    Router::new()
        .route("/posts", get(posts::list_posts))
        .route("/posts/{id}", get(posts::get_post))
        .route("/posts/{id}/view", post(posts::record_view))
        .route("/posts/{id}/comments", get(comments::list_comments))
        .route("/posts/{id}/comments", post(comments::create_comment))
        .route("/tags", get(tags::list_tags))
        .route("/tags/posts", get(tags::filter_posts))
        .route("/tags/{id}/posts", get(tags::get_tag_posts))
        .route("/messages", post(messages::send_message))
        .nest("/auth", auth::public_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::optional_auth,
        ))
        .merge(admin_routes)
        .merge(protected_routes)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState) -> Router {
    let api = build_api_router(state.clone());
    let pages = crate::web::router(state.clone());

    let mut router = Router::new()
        .nest("/api/v1", api)
        .merge(pages)
        .layer(CompressionLayer::new());

    // CORS for cookie-authenticated clients on another origin
    match state.config.server.cors_origin.parse::<HeaderValue>() {
        Ok(origin) => {
            let cors = CorsLayer::new()
                .allow_origin(origin)
                .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
                .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
                .allow_credentials(true);
            router = router.layer(cors);
        }
        Err(_) => tracing::warn!(
            "Ignoring invalid server.cors_origin '{}'",
            state.config.server.cors_origin
        ),
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::{create_test_pool, migrations};
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use chrono::{NaiveDate, Utc};
    use serde_json::{json, Value};

    const ADMIN: &str = "admin";
    const PASSWORD: &str = "correct-horse";

    async fn setup() -> (TestServer, AppState) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let state = AppState::new(pool, Config::default()).unwrap();
        state.user_service.ensure_admin(ADMIN, PASSWORD).await.unwrap();

        let server = TestServer::new(build_router(state.clone())).unwrap();
        (server, state)
    }

    fn bearer(token: &str) -> HeaderValue {
        HeaderValue::from_str(&format!("Bearer {}", token)).unwrap()
    }

    async fn admin_token(server: &TestServer) -> String {
        let response = server
            .post("/api/v1/auth/login")
            .json(&json!({"username": ADMIN, "password": PASSWORD}))
            .await;
        response.assert_status_ok();
        let body: Value = response.json();
        body["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_login_returns_token_and_cookie() {
        let (server, _) = setup().await;
        let response = server
            .post("/api/v1/auth/login")
            .json(&json!({"username": ADMIN, "password": PASSWORD}))
            .await;
        response.assert_status_ok();
        let cookie = response.header(header::SET_COOKIE);
        assert!(cookie.to_str().unwrap().contains("HttpOnly"));

        let body: Value = response.json();
        assert_eq!(body["user"]["username"], ADMIN);
        assert_eq!(body["user"]["role"], "admin");

        let token = body["token"].as_str().unwrap();
        let me: Value = server
            .get("/api/v1/auth/me")
            .add_header(header::AUTHORIZATION, bearer(token))
            .await
            .json();
        assert_eq!(me["username"], ADMIN);
    }

    #[tokio::test]
    async fn test_bad_credentials_are_401() {
        let (server, _) = setup().await;
        for (username, password) in [(ADMIN, "wrong"), ("nobody", PASSWORD)] {
            let response = server
                .post("/api/v1/auth/login")
                .json(&json!({"username": username, "password": password}))
                .await;
            response.assert_status(StatusCode::UNAUTHORIZED);
            let body: Value = response.json();
            assert_eq!(body["error"]["code"], "UNAUTHORIZED");
            assert_eq!(body["error"]["message"], "Invalid username or password");
        }
    }

    #[tokio::test]
    async fn test_repeated_failures_are_rate_limited() {
        let (server, _) = setup().await;
        for _ in 0..5 {
            server
                .post("/api/v1/auth/login")
                .json(&json!({"username": ADMIN, "password": "wrong"}))
                .await
                .assert_status(StatusCode::UNAUTHORIZED);
        }

        let response = server
            .post("/api/v1/auth/login")
            .json(&json!({"username": ADMIN, "password": PASSWORD}))
            .await;
        response.assert_status(StatusCode::TOO_MANY_REQUESTS);
        let body: Value = response.json();
        assert_eq!(body["error"]["code"], "RATE_LIMITED");
    }

    #[tokio::test]
    async fn test_logout_ends_session() {
        let (server, _) = setup().await;
        let token = admin_token(&server).await;

        server
            .post("/api/v1/auth/logout")
            .add_header(header::AUTHORIZATION, bearer(&token))
            .await
            .assert_status(StatusCode::NO_CONTENT);

        server
            .get("/api/v1/auth/me")
            .add_header(header::AUTHORIZATION, bearer(&token))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_guest_post_mutations_rejected() {
        let (server, state) = setup().await;
        let post = state
            .post_service
            .create(crate::models::CreatePostInput::new("Mine", "c"))
            .await
            .unwrap();
        let path = format!("/api/v1/posts/{}", post.post.id);

        server
            .post("/api/v1/posts")
            .json(&json!({"title": "Spam", "content": "c"}))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
        server
            .put(&path)
            .json(&json!({"title": "Changed"}))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
        server.delete(&path).await.assert_status(StatusCode::UNAUTHORIZED);

        // A token that does not resolve to a session is still a guest
        server
            .delete(&path)
            .add_header(header::AUTHORIZATION, bearer("not-a-session"))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        let post = state.post_service.get(post.post.id).await.unwrap();
        assert_eq!(post.post.title, "Mine");
    }

    #[tokio::test]
    async fn test_admin_post_lifecycle() {
        let (server, _) = setup().await;
        let token = admin_token(&server).await;

        let response = server
            .post("/api/v1/posts")
            .add_header(header::AUTHORIZATION, bearer(&token))
            .json(&json!({"title": "Hello", "content": "# Hi", "tags": ["intro", "rust"]}))
            .await;
        response.assert_status(StatusCode::CREATED);
        let created: Value = response.json();
        let id = created["id"].as_i64().unwrap();
        assert_eq!(created["content_html"], "<h1>Hi</h1>\n");
        assert_eq!(created["tags"].as_array().unwrap().len(), 2);
        assert_eq!(created["date"], Utc::now().date_naive().to_string());

        let path = format!("/api/v1/posts/{}", id);
        let updated: Value = server
            .put(&path)
            .add_header(header::AUTHORIZATION, bearer(&token))
            .json(&json!({"title": "Hello again", "tags": ["intro"]}))
            .await
            .json();
        assert_eq!(updated["title"], "Hello again");
        assert_eq!(updated["tags"][0]["name"], "intro");

        let listing: Value = server.get("/api/v1/posts").await.json();
        assert_eq!(listing["total"], 1);

        server
            .delete(&path)
            .add_header(header::AUTHORIZATION, bearer(&token))
            .await
            .assert_status(StatusCode::NO_CONTENT);
        server.get(&path).await.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_post_input_is_400() {
        let (server, _) = setup().await;
        let token = admin_token(&server).await;

        for body in [
            json!({"title": "", "content": "c"}),
            json!({"title": "t", "content": "c", "date": "01/02/2024"}),
            json!({"title": "t", "content": "c", "tag_ids": [42]}),
        ] {
            let response = server
                .post("/api/v1/posts")
                .add_header(header::AUTHORIZATION, bearer(&token))
                .json(&body)
                .await;
            response.assert_status(StatusCode::BAD_REQUEST);
            let error: Value = response.json();
            assert_eq!(error["error"]["code"], "VALIDATION_ERROR");
        }
    }

    #[tokio::test]
    async fn test_comments_open_to_guests_delete_admin_only() {
        let (server, state) = setup().await;
        let post = state
            .post_service
            .create(crate::models::CreatePostInput::new("Talk", "c"))
            .await
            .unwrap();
        let path = format!("/api/v1/posts/{}/comments", post.post.id);

        let response = server
            .post(&path)
            .json(&json!({"title": "Nice", "content": "Great post"}))
            .await;
        response.assert_status(StatusCode::CREATED);
        let comment: Value = response.json();
        assert_eq!(comment["author"], "Anonymous");
        let comment_path = format!("/api/v1/comments/{}", comment["id"]);

        server.delete(&comment_path).await.assert_status(StatusCode::UNAUTHORIZED);

        let token = admin_token(&server).await;
        server
            .delete(&comment_path)
            .add_header(header::AUTHORIZATION, bearer(&token))
            .await
            .assert_status(StatusCode::NO_CONTENT);

        let comments: Value = server.get(&path).await.json();
        assert!(comments.as_array().unwrap().is_empty());

        server
            .post("/api/v1/posts/9999/comments")
            .json(&json!({"title": "t", "content": "c"}))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_tag_endpoints() {
        let (server, state) = setup().await;
        let token = admin_token(&server).await;

        let response = server
            .post("/api/v1/tags")
            .add_header(header::AUTHORIZATION, bearer(&token))
            .json(&json!({"name": "rust"}))
            .await;
        response.assert_status(StatusCode::CREATED);
        let tag: Value = response.json();

        let response = server
            .post("/api/v1/tags")
            .add_header(header::AUTHORIZATION, bearer(&token))
            .json(&json!({"name": "rust"}))
            .await;
        response.assert_status(StatusCode::CONFLICT);
        let error: Value = response.json();
        assert_eq!(error["error"]["code"], "CONFLICT");

        state
            .post_service
            .create(crate::models::CreatePostInput::new("Tagged", "c").with_tags(["rust"]))
            .await
            .unwrap();

        let by_id: Value = server
            .get(&format!("/api/v1/tags/{}/posts", tag["id"]))
            .await
            .json();
        assert_eq!(by_id["posts"][0]["title"], "Tagged");

        let by_ids: Value = server
            .get("/api/v1/tags/posts")
            .add_query_param("ids", format!("{},999", tag["id"]))
            .await
            .json();
        assert_eq!(by_ids["posts"].as_array().unwrap().len(), 1);

        let empty: Value = server
            .get("/api/v1/tags/posts")
            .add_query_param("ids", "")
            .await
            .json();
        assert!(empty["posts"].as_array().unwrap().is_empty());

        let by_name: Value = server
            .get("/api/v1/tags/posts")
            .add_query_param("name", "unknown")
            .await
            .json();
        assert!(by_name["posts"].as_array().unwrap().is_empty());

        let listing: Value = server.get("/api/v1/tags").await.json();
        assert_eq!(listing["tags"][0]["post_count"], 1);

        server
            .delete(&format!("/api/v1/tags/{}", tag["id"]))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_messages_private_to_admin() {
        let (server, _) = setup().await;
        let response = server
            .post("/api/v1/messages")
            .json(&json!({"subject": "Hello", "body": "Nice blog", "contact_info": "me@example.com"}))
            .await;
        response.assert_status(StatusCode::CREATED);
        let sent: Value = response.json();

        server.get("/api/v1/messages").await.assert_status(StatusCode::UNAUTHORIZED);

        let token = admin_token(&server).await;
        let inbox: Value = server
            .get("/api/v1/messages")
            .add_header(header::AUTHORIZATION, bearer(&token))
            .await
            .json();
        assert_eq!(inbox["total"], 1);

        let message: Value = server
            .get(&format!("/api/v1/messages/{}", sent["id"]))
            .add_header(header::AUTHORIZATION, bearer(&token))
            .await
            .json();
        assert_eq!(message["is_read"], true);

        server
            .post("/api/v1/messages")
            .json(&json!({"subject": "", "body": "x"}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_two_guest_views_reach_the_dashboard() {
        let (server, state) = setup().await;
        let token = admin_token(&server).await;

        let created: Value = server
            .post("/api/v1/posts")
            .add_header(header::AUTHORIZATION, bearer(&token))
            .json(&json!({"title": "Hello", "content": "world", "tags": ["intro"]}))
            .await
            .json();
        let id = created["id"].as_i64().unwrap();
        let view = format!("/api/v1/posts/{}/view", id);

        for _ in 0..2 {
            let counted: Value = server.post(&view).await.json();
            assert_eq!(counted["counted"], true);
        }
        let admin_view: Value = server
            .post(&view)
            .add_header(header::AUTHORIZATION, bearer(&token))
            .await
            .json();
        assert_eq!(admin_view["counted"], false);

        // Move the logged views onto a fixed past day so the run cannot
        // straddle midnight
        let day = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        sqlx::query("UPDATE post_views SET viewed_at = ?")
            .bind(day.and_hms_opt(12, 0, 0).unwrap().and_utc())
            .execute(state.pool.as_sqlite().unwrap())
            .await
            .unwrap();

        let stat_date = day.to_string();
        server
            .post("/api/v1/analytics/run")
            .add_query_param("date", &stat_date)
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        for _ in 0..2 {
            let report: Value = server
                .post("/api/v1/analytics/run")
                .add_query_param("date", &stat_date)
                .add_header(header::AUTHORIZATION, bearer(&token))
                .await
                .json();
            assert_eq!(report["views"], 2);
        }

        let stats: Value = server
            .get(&format!("/api/v1/analytics/posts/{}", id))
            .add_header(header::AUTHORIZATION, bearer(&token))
            .await
            .json();
        assert_eq!(stats.as_array().unwrap().len(), 1);
        assert_eq!(stats[0]["views"], 2);
        assert_eq!(stats[0]["stat_date"], stat_date);

        let dashboard: Value = server
            .get("/api/v1/analytics/dashboard")
            .add_header(header::AUTHORIZATION, bearer(&token))
            .await
            .json();
        assert_eq!(dashboard["top_posts"][0]["view_count"], 2);
        assert_eq!(dashboard["top_tags"][0]["name"], "intro");
    }

    #[tokio::test]
    async fn test_analytics_run_rejects_bad_dates() {
        let (server, _) = setup().await;
        let token = admin_token(&server).await;

        server
            .post("/api/v1/analytics/run")
            .add_query_param("date", "yesterday")
            .add_header(header::AUTHORIZATION, bearer(&token))
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        let tomorrow = Utc::now().date_naive().succ_opt().unwrap().to_string();
        server
            .post("/api/v1/analytics/run")
            .add_query_param("date", &tomorrow)
            .add_header(header::AUTHORIZATION, bearer(&token))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_cors_preflight_allows_configured_origin() {
        use tower::ServiceExt;

        let (_, state) = setup().await;
        let request = axum::http::Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/v1/posts")
            .header(header::ORIGIN, "http://localhost:8080")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(axum::body::Body::empty())
            .unwrap();

        let response = build_router(state).oneshot(request).await.unwrap();
        let headers = response.headers();
        assert_eq!(
            headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "http://localhost:8080"
        );
        assert_eq!(headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).unwrap(), "true");
    }
}
