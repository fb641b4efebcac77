//! Post model
//!
//! This module provides:
//! - `Post` entity representing a blog entry
//! - `PostDetail` bundling a post with its tags and comments
//! - Input types for creating and updating posts

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{Comment, Tag};

/// Post date format accepted on input (`YYYY-MM-DD`)
pub const POST_DATE_FORMAT: &str = "%Y-%m-%d";

/// Post entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    /// Unique identifier
    pub id: i64,
    /// Post title
    pub title: String,
    /// Markdown content
    pub content: String,
    /// Rendered HTML content
    pub content_html: String,
    /// Post date shown to readers
    pub date: NaiveDate,
    /// Number of non-admin views
    #[serde(default)]
    pub view_count: i64,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last edit timestamp
    pub updated_at: DateTime<Utc>,
}

impl Post {
    /// Create a new post. The ID is assigned by the database.
    pub fn new(title: String, content: String, content_html: String, date: NaiveDate) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            title,
            content,
            content_html,
            date,
            view_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// First characters of the markdown source, for listings
    pub fn excerpt(&self, max_chars: usize) -> String {
        let text: String = self.content.chars().take(max_chars).collect();
        if self.content.chars().count() > max_chars {
            format!("{}...", text.trim_end())
        } else {
            text
        }
    }
}

/// A post together with everything its detail page shows
#[derive(Debug, Clone, Serialize)]
pub struct PostDetail {
    #[serde(flatten)]
    pub post: Post,
    pub tags: Vec<Tag>,
    pub comments: Vec<Comment>,
}

/// A post with its tags, used by listings
#[derive(Debug, Clone, Serialize)]
pub struct PostSummary {
    #[serde(flatten)]
    pub post: Post,
    pub tags: Vec<Tag>,
}

/// Input for creating a new post
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreatePostInput {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    /// `YYYY-MM-DD`; today when omitted
    #[serde(default)]
    pub date: Option<String>,
    /// Tag names; unknown names are created
    #[serde(default)]
    pub tags: Vec<String>,
    /// Existing tag ids
    #[serde(default)]
    pub tag_ids: Vec<i64>,
}

impl CreatePostInput {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }
}

/// Input for editing a post. `None` fields are left unchanged.
///
/// When either `tags` or `tag_ids` is present the post's tag set is replaced
/// by their union.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePostInput {
    pub title: Option<String>,
    pub content: Option<String>,
    pub date: Option<String>,
    pub tags: Option<Vec<String>>,
    pub tag_ids: Option<Vec<i64>>,
}

impl UpdatePostInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    /// Whether this edit replaces the tag set
    pub fn replaces_tags(&self) -> bool {
        self.tags.is_some() || self.tag_ids.is_some()
    }
}

/// Split a comma separated tag field (`"rust, web,,intro"`) into names
pub fn parse_tag_list(raw: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Parse a post date in `YYYY-MM-DD` form
pub fn parse_post_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), POST_DATE_FORMAT).ok()
}
