use super::*;

fn engine() -> ThemeEngine {
    ThemeEngine::new(MarkdownRenderer::default()).expect("templates should load")
}

fn vars() -> StandardTemplateVars {
    StandardTemplateVars::new("Codex", "notes", "/")
}

#[test]
fn test_all_pages_embedded() {
    let engine = engine();
    for name in [
        "base.html",
        "index.html",
        "post.html",
        "tag.html",
        "login.html",
        "message.html",
        "error.html",
        "admin/dashboard.html",
        "admin/post_form.html",
        "admin/tags.html",
        "admin/messages.html",
    ] {
        assert!(engine.has_template(name), "missing {}", name);
    }
}

#[test]
fn test_standard_vars_injected() {
    let engine = engine();
    let mut context = TeraContext::new();
    context.insert("message", &Option::<String>::None);
    context.insert("username", "");
    let html = engine
        .render_with_standard_vars("login.html", &context, &vars())
        .unwrap();
    assert!(html.contains("Codex"));
    assert!(html.contains(&chrono::Utc::now().year().to_string()));
}

#[test]
fn test_admin_link_only_for_admin() {
    let engine = engine();
    let mut context = TeraContext::new();
    context.insert("message", &Option::<String>::None);
    context.insert("username", "");

    let guest = engine
        .render_with_standard_vars("login.html", &context, &vars())
        .unwrap();
    assert!(!guest.contains("href=\"/admin\""));

    let admin = vars().with_user(Some(CurrentUser {
        id: 1,
        username: "root".into(),
        role: "admin".into(),
    }));
    let html = engine
        .render_with_standard_vars("login.html", &context, &admin)
        .unwrap();
    assert!(html.contains("href=\"/admin\""));
}

#[test]
fn test_render_error_page() {
    let html = engine().render_error(404, "Post with ID 9 not found", &vars());
    assert!(html.contains("404"));
    assert!(html.contains("Post with ID 9 not found"));
}

#[test]
fn test_simple_error_page_escapes() {
    let html = ThemeEngine::simple_error_page(500, "<script>");
    assert!(html.contains("&lt;script&gt;"));
    assert!(!html.contains("<script>"));
}

#[test]
fn test_render_missing_template() {
    let result = engine().render("nope.html", &TeraContext::new());
    assert!(result.is_err());
}

#[test]
fn test_excerpt_filter() {
    let mut tera = engine().tera;
    tera.add_raw_template("t.html", "{{ body | excerpt(chars=5) }}").unwrap();
    let mut context = TeraContext::new();
    context.insert("body", "# Hello world");
    let out = tera.render("t.html", &context).unwrap();
    assert!(out.starts_with("Hello"));
    assert!(!out.contains('#'));
}
