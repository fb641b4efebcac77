//! Tag service
//!
//! Tag management and tag-based filtering of posts:
//! - create tags, or reuse an existing one by name
//! - list tags with post and view counts
//! - fetch the posts carrying any of a set of tags

use crate::db::is_unique_violation;
use crate::db::repositories::{PostRepository, TagRepository};
use crate::models::{Post, PostSummary, Tag, TagWithCount};
use anyhow::Context;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Longest tag name the schema stores
pub const MAX_TAG_NAME_CHARS: usize = 100;

/// Inserts tried before a name that keeps colliding counts as taken
const TAG_INSERT_ATTEMPTS: usize = 3;

/// Error types for tag service operations
#[derive(Debug, thiserror::Error)]
pub enum TagServiceError {
    #[error("Tag not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// A tag with this name already exists
    #[error("Tag already exists: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Tag service for managing blog tags
pub struct TagService {
    repo: Arc<dyn TagRepository>,
    post_repo: Arc<dyn PostRepository>,
}

impl TagService {
    pub fn new(repo: Arc<dyn TagRepository>, post_repo: Arc<dyn PostRepository>) -> Self {
        Self { repo, post_repo }
    }

    /// Create a tag; a duplicate name is a `Conflict`
    pub async fn create(&self, name: &str) -> Result<Tag, TagServiceError> {
        let name = validate_name(name)?;
        match self.insert_unless_named(name).await? {
            (tag, true) => Ok(tag),
            (_, false) => Err(TagServiceError::Conflict(name.to_string())),
        }
    }

    /// Return the tag called `name`, creating it first if needed
    pub async fn create_or_get(&self, name: &str) -> Result<Tag, TagServiceError> {
        let name = validate_name(name)?;
        let (tag, _) = self.insert_unless_named(name).await?;
        Ok(tag)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<Tag>, TagServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get tag by ID")
            .map_err(Into::into)
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<Tag>, TagServiceError> {
        self.repo
            .get_by_slug(slug)
            .await
            .context("Failed to get tag by slug")
            .map_err(Into::into)
    }

    /// All tags with post counts, ordered by name
    pub async fn list(&self) -> Result<Vec<TagWithCount>, TagServiceError> {
        self.repo
            .list_with_counts()
            .await
            .context("Failed to list tags")
            .map_err(Into::into)
    }

    /// Delete a tag. Posts keep existing; only their link to the tag goes.
    pub async fn delete(&self, id: i64) -> Result<(), TagServiceError> {
        let deleted = self.repo.delete(id).await.context("Failed to delete tag")?;
        if !deleted {
            return Err(TagServiceError::NotFound(format!("Tag with ID {} not found", id)));
        }
        tracing::info!("Deleted tag {}", id);
        Ok(())
    }

    /// Posts carrying the tag. An unknown id gives an empty list.
    pub async fn posts_by_tag_id(&self, id: i64) -> Result<Vec<PostSummary>, TagServiceError> {
        self.posts_by_tag_ids(&[id]).await
    }

    /// Posts carrying the tag called `name`. An unknown name gives an empty list.
    pub async fn posts_by_tag_name(&self, name: &str) -> Result<Vec<PostSummary>, TagServiceError> {
        let tag = self
            .repo
            .get_by_name(name.trim())
            .await
            .context("Failed to get tag by name")?;
        match tag {
            Some(tag) => self.posts_by_tag_ids(&[tag.id]).await,
            None => Ok(Vec::new()),
        }
    }

    /// Posts carrying any of `ids`, each at most once, newest first
    pub async fn posts_by_tag_ids(&self, ids: &[i64]) -> Result<Vec<PostSummary>, TagServiceError> {
        let ids: Vec<i64> = ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let posts = self
            .post_repo
            .list_by_tag_ids(&ids)
            .await
            .context("Failed to list posts by tags")?;
        self.summarize(posts).await
    }

    /// Attach each post's tags
    pub async fn summarize(&self, posts: Vec<Post>) -> Result<Vec<PostSummary>, TagServiceError> {
        let mut summaries = Vec::with_capacity(posts.len());
        for post in posts {
            let tags = self
                .repo
                .get_by_post_id(post.id)
                .await
                .context("Failed to get post tags")?;
            summaries.push(PostSummary { post, tags });
        }
        Ok(summaries)
    }

    /// The tag called `name` and whether this call created it.
    ///
    /// A concurrent insert of the same name fails on the UNIQUE constraint;
    /// the name is then read back and reported as existing.
    async fn insert_unless_named(&self, name: &str) -> Result<(Tag, bool), TagServiceError> {
        for _ in 0..TAG_INSERT_ATTEMPTS {
            if let Some(existing) = self
                .repo
                .get_by_name(name)
                .await
                .context("Failed to check existing tag")?
            {
                return Ok((existing, false));
            }

            let slug = self.unique_slug(&generate_tag_slug(name)).await?;
            match self.repo.create(&Tag::new(slug, name.to_string())).await {
                Ok(created) => {
                    tracing::debug!("Created tag '{}' ({})", created.name, created.slug);
                    return Ok((created, true));
                }
                // Lost a race on the name or the slug; look again
                Err(e) if is_unique_violation(&e) => {
                    tracing::debug!("Concurrent insert of tag '{}', retrying", name);
                }
                Err(e) => return Err(e.context("Failed to create tag").into()),
            }
        }
        Err(anyhow::anyhow!("Gave up creating tag '{}' after repeated collisions", name).into())
    }

    /// `base`, or `base-2`, `base-3`... until unused
    async fn unique_slug(&self, base: &str) -> Result<String, TagServiceError> {
        let mut candidate = base.to_string();
        let mut n = 2;
        while self
            .repo
            .get_by_slug(&candidate)
            .await
            .context("Failed to check tag slug")?
            .is_some()
        {
            candidate = format!("{}-{}", base, n);
            n += 1;
        }
        Ok(candidate)
    }
}

pub(crate) fn validate_name(name: &str) -> Result<&str, TagServiceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(TagServiceError::ValidationError("Tag name cannot be empty".to_string()));
    }
    if name.chars().count() > MAX_TAG_NAME_CHARS {
        return Err(TagServiceError::ValidationError(format!(
            "Tag name cannot exceed {} characters",
            MAX_TAG_NAME_CHARS
        )));
    }
    Ok(name)
}

/// Generate a URL-friendly slug from a tag name.
///
/// Lowercases, keeps alphanumerics (non-ASCII letters included) and turns
/// every other run of characters into a single hyphen. Falls back to `tag`
/// when nothing is left.
pub fn generate_tag_slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_hyphen = false;

    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }

    if slug.is_empty() {
        "tag".to_string()
    } else {
        slug
    }
}
