//! Tag model
//!
//! Tags label posts for filtering. A tag carries its own view counter which is
//! bumped whenever a guest views one of its posts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tag entity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tag {
    /// Unique identifier
    pub id: i64,
    /// URL-friendly slug
    pub slug: String,
    /// Tag name (unique)
    pub name: String,
    /// Views of posts carrying this tag
    pub view_count: i64,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Tag {
    /// Create a new Tag. The ID is assigned by the database.
    pub fn new(slug: String, name: String) -> Self {
        Self {
            id: 0,
            slug,
            name,
            view_count: 0,
            created_at: Utc::now(),
        }
    }
}

/// Tag with the number of posts carrying it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagWithCount {
    #[serde(flatten)]
    pub tag: Tag,
    pub post_count: i64,
}

impl TagWithCount {
    pub fn new(tag: Tag, post_count: i64) -> Self {
        Self { tag, post_count }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_new() {
        let tag = Tag::new("rust-programming".to_string(), "Rust Programming".to_string());

        assert_eq!(tag.id, 0);
        assert_eq!(tag.slug, "rust-programming");
        assert_eq!(tag.name, "Rust Programming");
        assert_eq!(tag.view_count, 0);
    }

    #[test]
    fn test_tag_with_count_serializes_flat() {
        let tag = Tag::new("rust".to_string(), "Rust".to_string());
        let json = serde_json::to_value(TagWithCount::new(tag, 3)).unwrap();

        assert_eq!(json["name"], "Rust");
        assert_eq!(json["post_count"], 3);
    }
}
