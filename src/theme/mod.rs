//! Theme engine
//!
//! Server-side rendering with Tera. Templates are compiled into the binary
//! from `templates/` with rust-embed, so the server needs no files on disk.
//! Every page receives the standard variables (site name, viewer, year).

use anyhow::Result;
use chrono::Datelike;
use rust_embed::RustEmbed;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error as StdError;
use tera::{Context as TeraContext, Tera, Value};

use crate::models::User;
use crate::services::MarkdownRenderer;

mod error;

pub use error::ThemeError;

/// Default length of the `excerpt` filter
const DEFAULT_EXCERPT_CHARS: usize = 200;

/// Embedded page templates
#[derive(RustEmbed)]
#[folder = "templates/"]
#[include = "*.html"]
struct TemplateAssets;

/// Theme engine for rendering templates
pub struct ThemeEngine {
    tera: Tera,
}

impl ThemeEngine {
    /// Load every embedded template.
    ///
    /// Registers the `excerpt` filter, which turns a post's Markdown into a
    /// plain-text preview: `{{ post.content | excerpt(chars=120) }}`.
    pub fn new(markdown: MarkdownRenderer) -> Result<Self> {
        let mut templates: Vec<(String, String)> = Vec::new();
        for name in TemplateAssets::iter() {
            let file = TemplateAssets::get(&name)
                .ok_or_else(|| ThemeError::NotFound(name.to_string()))?;
            let content = String::from_utf8(file.data.into_owned())
                .map_err(|e| ThemeError::TemplateError(format!("{} is not UTF-8: {}", name, e)))?;
            templates.push((name.to_string(), content));
        }

        let mut tera = Tera::default();
        tera.add_raw_templates(templates)
            .map_err(|e| ThemeError::TemplateError(describe(&e)))?;
        tera.register_filter(
            "excerpt",
            move |value: &Value, args: &HashMap<String, Value>| {
                let source = tera::try_get_value!("excerpt", "value", String, value);
                let chars = args
                    .get("chars")
                    .and_then(Value::as_u64)
                    .map(|n| n as usize)
                    .unwrap_or(DEFAULT_EXCERPT_CHARS);
                Ok(Value::String(markdown.plain_text(&source, chars)))
            },
        );

        tracing::debug!("Loaded {} templates", tera.get_template_names().count());
        Ok(Self { tera })
    }

    /// Render a template with context
    pub fn render(&self, template: &str, context: &TeraContext) -> Result<String> {
        self.tera
            .render(template, context)
            .map_err(|e| ThemeError::TemplateError(format!("Failed to render '{}': {}", template, describe(&e))).into())
    }

    /// Render a template with the standard variables added
    pub fn render_with_standard_vars(
        &self,
        template: &str,
        context: &TeraContext,
        standard_vars: &StandardTemplateVars,
    ) -> Result<String> {
        let mut full_context = context.clone();
        full_context.insert("site_name", &standard_vars.site_name);
        full_context.insert("site_description", &standard_vars.site_description);
        full_context.insert("request_path", &standard_vars.request_path);
        full_context.insert("year", &standard_vars.year);
        full_context.insert("current_user", &standard_vars.current_user);
        full_context.insert(
            "is_admin",
            &standard_vars.current_user.as_ref().is_some_and(|u| u.role == "admin"),
        );

        self.render(template, &full_context)
    }

    /// Render `error.html`, falling back to a bare page if that fails too.
    ///
    /// Always returns HTML.
    pub fn render_error(&self, status: u16, message: &str, standard_vars: &StandardTemplateVars) -> String {
        let mut context = TeraContext::new();
        context.insert("status", &status);
        context.insert("error_message", message);

        match self.render_with_standard_vars("error.html", &context, standard_vars) {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!("Failed to render error template: {}, returning simple HTML error page", e);
                Self::simple_error_page(status, message)
            }
        }
    }

    fn simple_error_page(status: u16, message: &str) -> String {
        format!(
            "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>Error {}</title></head>\
             <body><h1>Error {}</h1><p>{}</p><p><a href=\"/\">Home</a></p></body></html>",
            status,
            status,
            tera::escape_html(message)
        )
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.tera.get_template_names().any(|t| t == name)
    }
}

/// Flatten a Tera error and its sources into one line
fn describe(e: &tera::Error) -> String {
    let mut msg = e.to_string();
    let mut source = e.source();
    while let Some(s) = source {
        msg.push_str(&format!(": {}", s));
        source = s.source();
    }
    msg
}

/// Variables every page receives
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardTemplateVars {
    pub site_name: String,
    pub site_description: String,
    /// Logged-in user, `None` for guests
    pub current_user: Option<CurrentUser>,
    pub request_path: String,
    /// Current year (for copyright)
    pub year: i32,
}

/// Current user information for templates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
    pub role: String,
}

impl From<&User> for CurrentUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            role: user.role.to_string(),
        }
    }
}

impl StandardTemplateVars {
    pub fn new(
        site_name: impl Into<String>,
        site_description: impl Into<String>,
        request_path: impl Into<String>,
    ) -> Self {
        Self {
            site_name: site_name.into(),
            site_description: site_description.into(),
            current_user: None,
            request_path: request_path.into(),
            year: chrono::Utc::now().year(),
        }
    }

    /// Set the current user
    pub fn with_user(mut self, user: Option<CurrentUser>) -> Self {
        self.current_user = user;
        self
    }
}

#[cfg(test)]
mod tests;
