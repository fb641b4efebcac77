//! Comment model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Author name used when a guest leaves the field blank
pub const ANONYMOUS_AUTHOR: &str = "Anonymous";

/// A guest comment on a post
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub author: String,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a comment
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateCommentInput {
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
}

impl CreateCommentInput {
    pub fn new(author: Option<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            author,
            title: title.into(),
            content: content.into(),
        }
    }

    /// Trimmed author name, falling back to `Anonymous`
    pub fn author_or_anonymous(&self) -> String {
        self.author
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .unwrap_or(ANONYMOUS_AUTHOR)
            .to_string()
    }
}
