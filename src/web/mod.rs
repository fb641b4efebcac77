//! Server-rendered HTML pages
//!
//! Forms post back to the server and redirect on success. Admin pages
//! redirect guests to `/login`; errors render `error.html`.

pub mod admin;
pub mod page;
pub mod pages;
pub mod static_files;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};

use crate::api::middleware::{optional_auth, AppState};

pub use page::{Page, PageError};

/// Build the HTML router
pub fn router(state: AppState) -> Router<AppState> {
    let admin_routes = Router::new()
        .route("/admin", get(admin::dashboard))
        .route("/admin/posts/new", get(admin::new_post_form).post(admin::create_post))
        .route("/admin/posts/{id}/edit", get(admin::edit_post_form).post(admin::update_post))
        .route("/admin/posts/{id}/delete", post(admin::delete_post))
        .route("/admin/comments/{id}/delete", post(admin::delete_comment))
        .route("/admin/tags", get(admin::tags).post(admin::create_tag))
        .route("/admin/tags/{id}/delete", post(admin::delete_tag))
        .route("/admin/messages", get(admin::messages))
        .route("/admin/messages/{id}/delete", post(admin::delete_message))
        .route_layer(axum_middleware::from_fn(page::require_admin_page));

    Router::new()
        .route("/", get(pages::index))
        .route("/posts/{id}", get(pages::show_post))
        .route("/posts/{id}/comments", post(pages::submit_comment))
        .route("/tags/{slug}", get(pages::show_tag))
        .route("/message", get(pages::message_form).post(pages::submit_message))
        .route("/login", get(pages::login_form).post(pages::submit_login))
        .route("/logout", post(pages::logout))
        .merge(admin_routes)
        .fallback(page::not_found_page)
        .layer(axum_middleware::from_fn_with_state(state.clone(), page::render_error_pages))
        .layer(axum_middleware::from_fn_with_state(state, optional_auth))
        .route("/static/{*path}", get(static_files::serve_static))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::{create_test_pool, migrations};
    use crate::models::CreatePostInput;
    use axum::http::{header, HeaderValue, StatusCode};
    use axum_test::TestServer;
    use serde_json::json;

    const ADMIN: &str = "admin";
    const PASSWORD: &str = "correct-horse";

    struct Fixture {
        server: TestServer,
        state: AppState,
        cookie: HeaderValue,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let state = AppState::new(pool, Config::default()).unwrap();
        state.user_service.ensure_admin(ADMIN, PASSWORD).await.unwrap();
        let (_, session) = state.user_service.login(ADMIN, PASSWORD).await.unwrap();
        let cookie = HeaderValue::from_str(&format!("session={}", session.id)).unwrap();

        let app = router(state.clone()).with_state(state.clone());
        Fixture {
            server: TestServer::new(app).unwrap(),
            state,
            cookie,
        }
    }

    #[tokio::test]
    async fn test_index_lists_posts_and_tags() {
        let fx = setup().await;
        fx.state
            .post_service
            .create(CreatePostInput::new("Hello", "first *post*").with_tags(["intro"]))
            .await
            .unwrap();

        let response = fx.server.get("/").await;
        response.assert_status_ok();
        let html = response.text();
        assert!(html.contains("Hello"));
        assert!(html.contains("/tags/intro"));
        assert!(html.contains("first post"));
    }

    #[tokio::test]
    async fn test_index_filtered_by_tag_name() {
        let fx = setup().await;
        fx.state
            .post_service
            .create(CreatePostInput::new("Tagged", "c").with_tags(["rust"]))
            .await
            .unwrap();
        fx.state
            .post_service
            .create(CreatePostInput::new("Untagged", "c"))
            .await
            .unwrap();

        let html = fx.server.get("/").add_query_param("tag", "rust").await.text();
        assert!(html.contains("Tagged"));
        assert!(!html.contains("Untagged"));
    }

    #[tokio::test]
    async fn test_post_page_counts_guest_views_only() {
        let fx = setup().await;
        let post = fx
            .state
            .post_service
            .create(CreatePostInput::new("Counted", "c"))
            .await
            .unwrap();
        let path = format!("/posts/{}", post.post.id);

        fx.server.get(&path).await.assert_status_ok();
        fx.server
            .get(&path)
            .add_header(header::COOKIE, fx.cookie.clone())
            .await
            .assert_status_ok();

        let post = fx.state.post_service.get(post.post.id).await.unwrap();
        assert_eq!(post.post.view_count, 1);
    }

    #[tokio::test]
    async fn test_missing_post_renders_error_page() {
        let fx = setup().await;
        let response = fx.server.get("/posts/999").await;
        response.assert_status(StatusCode::NOT_FOUND);
        assert!(response.text().contains("Post with ID 999 not found"));

        let response = fx.server.get("/tags/nothing-here").await;
        response.assert_status(StatusCode::NOT_FOUND);

        let response = fx.server.get("/no/such/page").await;
        response.assert_status(StatusCode::NOT_FOUND);
        assert!(response.text().contains("Error 404"));
    }

    #[tokio::test]
    async fn test_comment_form_redirects_back() {
        let fx = setup().await;
        let post = fx
            .state
            .post_service
            .create(CreatePostInput::new("Discuss", "c"))
            .await
            .unwrap();
        let path = format!("/posts/{}/comments", post.post.id);

        let response = fx
            .server
            .post(&path)
            .form(&json!({"author": "", "title": "Nice", "content": "Great post"}))
            .await;
        response.assert_status(StatusCode::SEE_OTHER);

        let comments = fx.state.comment_service.list_for_post(post.post.id).await.unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].author, "Anonymous");

        let response = fx
            .server
            .post(&path)
            .form(&json!({"title": "", "content": "no title"}))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert!(response.text().contains("no title"));
    }

    #[tokio::test]
    async fn test_message_form() {
        let fx = setup().await;
        let response = fx
            .server
            .post("/message")
            .form(&json!({"subject": "Hi", "body": "Hello admin", "contact_info": ""}))
            .await;
        response.assert_status(StatusCode::SEE_OTHER);
        assert_eq!(fx.state.message_service.unread_count().await.unwrap(), 1);

        let response = fx.server.post("/message").form(&json!({"subject": "Hi"})).await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_admin_pages_redirect_guests() {
        let fx = setup().await;
        for path in ["/admin", "/admin/tags", "/admin/messages", "/admin/posts/new"] {
            let response = fx.server.get(path).await;
            response.assert_status(StatusCode::SEE_OTHER);
            assert_eq!(response.header(header::LOCATION), "/login");
        }

        let response = fx
            .server
            .post("/admin/posts/new")
            .form(&json!({"title": "Sneaky", "content": "c"}))
            .await;
        response.assert_status(StatusCode::SEE_OTHER);
        let page = fx.state.post_service.list(&crate::models::ListParams::default()).await.unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn test_login_form_sets_cookie() {
        let fx = setup().await;
        let response = fx
            .server
            .post("/login")
            .form(&json!({"username": ADMIN, "password": PASSWORD}))
            .await;
        response.assert_status(StatusCode::SEE_OTHER);
        let cookie = response.header(header::SET_COOKIE);
        assert!(cookie.to_str().unwrap().starts_with("session="));

        let response = fx
            .server
            .post("/login")
            .form(&json!({"username": ADMIN, "password": "wrong"}))
            .await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        assert!(response.text().contains("Invalid username or password"));
    }

    #[tokio::test]
    async fn test_admin_creates_edits_and_deletes_post() {
        let fx = setup().await;
        let response = fx
            .server
            .post("/admin/posts/new")
            .add_header(header::COOKIE, fx.cookie.clone())
            .form(&json!({"title": "Draft", "content": "body", "date": "2024-05-01", "tags": "a, b"}))
            .await;
        response.assert_status(StatusCode::SEE_OTHER);

        let listing = fx.state.post_service.list(&crate::models::ListParams::default()).await.unwrap();
        let id = listing.items[0].post.id;
        assert_eq!(listing.items[0].tags.len(), 2);

        let edit = format!("/admin/posts/{}/edit", id);
        let form = fx
            .server
            .get(&edit)
            .add_header(header::COOKIE, fx.cookie.clone())
            .await;
        form.assert_status_ok();
        assert!(form.text().contains("2024-05-01"));

        fx.server
            .post(&edit)
            .add_header(header::COOKIE, fx.cookie.clone())
            .form(&json!({"title": "Final", "content": "body", "date": "2024-05-01", "tags": "a"}))
            .await
            .assert_status(StatusCode::SEE_OTHER);
        let post = fx.state.post_service.get(id).await.unwrap();
        assert_eq!(post.post.title, "Final");
        assert_eq!(post.tags.len(), 1);

        fx.server
            .post(&format!("/admin/posts/{}/delete", id))
            .add_header(header::COOKIE, fx.cookie.clone())
            .await
            .assert_status(StatusCode::SEE_OTHER);
        assert!(fx.state.post_service.get(id).await.is_err());
    }

    #[tokio::test]
    async fn test_admin_tag_conflict_shows_form() {
        let fx = setup().await;
        fx.state.tag_service.create("rust").await.unwrap();

        let response = fx
            .server
            .post("/admin/tags")
            .add_header(header::COOKIE, fx.cookie.clone())
            .form(&json!({"name": "rust"}))
            .await;
        response.assert_status(StatusCode::CONFLICT);
        assert!(response.text().contains("already exists"));
    }

    #[tokio::test]
    async fn test_dashboard_renders_for_admin() {
        let fx = setup().await;
        let response = fx
            .server
            .get("/admin")
            .add_header(header::COOKIE, fx.cookie.clone())
            .await;
        response.assert_status_ok();
        assert!(response.text().contains("Daily engagement"));
    }

    #[tokio::test]
    async fn test_stylesheet_served() {
        let fx = setup().await;
        let response = fx.server.get("/static/style.css").await;
        response.assert_status_ok();
        assert_eq!(response.header(header::CONTENT_TYPE), "text/css");
    }
}
