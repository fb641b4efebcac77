//! Post service
//!
//! Implements business logic for posts:
//! - create, edit and delete, with Markdown rendering on save
//! - tag association (unknown names are created on the fly, in the same
//!   transaction as the post)
//! - view counting for non-admin readers
//! - pruning of tags left without posts after a delete

use crate::db::is_foreign_key_violation;
use crate::db::repositories::{CommentRepository, PostRepository, PostTags, TagRepository};
use crate::models::{
    parse_post_date, CreatePostInput, ListParams, PagedResult, Post, PostDetail, PostSummary, Tag,
    UpdatePostInput,
};
use crate::services::markdown::MarkdownRenderer;
use crate::services::tag::{generate_tag_slug, validate_name, TagService, TagServiceError};
use anyhow::Context;
use chrono::{NaiveDate, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Longest title the schema stores
pub const MAX_TITLE_CHARS: usize = 255;

/// Error types for post service operations
#[derive(Debug, thiserror::Error)]
pub enum PostServiceError {
    #[error("Post not found: {0}")]
    NotFound(String),

    /// Empty title or content, malformed date, bad tag
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<TagServiceError> for PostServiceError {
    fn from(err: TagServiceError) -> Self {
        match err {
            TagServiceError::NotFound(msg) | TagServiceError::ValidationError(msg) => {
                PostServiceError::ValidationError(msg)
            }
            TagServiceError::Conflict(name) => {
                PostServiceError::ValidationError(format!("Tag already exists: {}", name))
            }
            TagServiceError::InternalError(e) => PostServiceError::InternalError(e),
        }
    }
}

/// Post service for managing blog posts
pub struct PostService {
    repo: Arc<dyn PostRepository>,
    tag_repo: Arc<dyn TagRepository>,
    comment_repo: Arc<dyn CommentRepository>,
    tags: Arc<TagService>,
    markdown_renderer: MarkdownRenderer,
    prune_orphan_tags: bool,
}

impl PostService {
    pub fn new(
        repo: Arc<dyn PostRepository>,
        tag_repo: Arc<dyn TagRepository>,
        comment_repo: Arc<dyn CommentRepository>,
        tags: Arc<TagService>,
    ) -> Self {
        Self {
            repo,
            tag_repo,
            comment_repo,
            tags,
            markdown_renderer: MarkdownRenderer::new(),
            prune_orphan_tags: true,
        }
    }

    /// Whether deleting a post also deletes tags no other post carries
    pub fn with_orphan_tag_pruning(mut self, enabled: bool) -> Self {
        self.prune_orphan_tags = enabled;
        self
    }

    /// Create a post from validated input and attach its tags
    pub async fn create(&self, input: CreatePostInput) -> Result<PostDetail, PostServiceError> {
        let title = validate_title(&input.title)?;
        let content = validate_content(&input.content)?;
        let date = match input.date.as_deref() {
            Some(raw) if !raw.trim().is_empty() => parse_date(raw)?,
            _ => Utc::now().date_naive(),
        };

        let tags = self.resolve_tags(&input.tags, &input.tag_ids).await?;

        let html = self.markdown_renderer.render(content);
        let post = self
            .repo
            .create(&Post::new(title.to_string(), content.to_string(), html, date), &tags)
            .await
            .map_err(write_error)?;

        tracing::info!("Created post {} '{}'", post.id, post.title);
        self.detail(post).await
    }

    /// Apply an edit. A given tag set replaces the current one.
    pub async fn update(&self, id: i64, input: UpdatePostInput) -> Result<PostDetail, PostServiceError> {
        let mut post = self.require(id).await?;

        if let Some(title) = input.title.as_deref() {
            post.title = validate_title(title)?.to_string();
        }
        if let Some(content) = input.content.as_deref() {
            let content = validate_content(content)?;
            post.content_html = self.markdown_renderer.render(content);
            post.content = content.to_string();
        }
        if let Some(raw) = input.date.as_deref() {
            post.date = parse_date(raw)?;
        }

        let new_tags = if input.replaces_tags() {
            let names = input.tags.clone().unwrap_or_default();
            let ids = input.tag_ids.clone().unwrap_or_default();
            Some(self.resolve_tags(&names, &ids).await?)
        } else {
            None
        };

        let post = self
            .repo
            .update(&post, new_tags.as_ref())
            .await
            .map_err(write_error)?;

        tracing::info!("Updated post {}", post.id);
        self.detail(post).await
    }

    /// Delete a post. Comments, tag links, views and stats cascade.
    pub async fn delete(&self, id: i64) -> Result<(), PostServiceError> {
        let former_tags: Vec<i64> = self
            .tag_repo
            .get_by_post_id(id)
            .await
            .context("Failed to get post tags")?
            .into_iter()
            .map(|t| t.id)
            .collect();

        let deleted = self.repo.delete(id).await.context("Failed to delete post")?;
        if !deleted {
            return Err(PostServiceError::NotFound(format!("Post with ID {} not found", id)));
        }

        if self.prune_orphan_tags && !former_tags.is_empty() {
            let pruned = self
                .tag_repo
                .delete_orphans_among(&former_tags)
                .await
                .context("Failed to prune orphan tags")?;
            if pruned > 0 {
                tracing::info!("Pruned {} orphan tag(s) after deleting post {}", pruned, id);
            }
        }

        tracing::info!("Deleted post {}", id);
        Ok(())
    }

    /// A post with its tags and comments
    pub async fn get(&self, id: i64) -> Result<PostDetail, PostServiceError> {
        let post = self.require(id).await?;
        self.detail(post).await
    }

    /// One page of posts, newest date first
    pub async fn list(&self, params: &ListParams) -> Result<PagedResult<PostSummary>, PostServiceError> {
        let (posts, total) = self.repo.list(params).await.context("Failed to list posts")?;
        let items = self.tags.summarize(posts).await?;
        Ok(PagedResult::new(items, total, params))
    }

    /// Count one view of a post.
    ///
    /// Admin views change nothing. Returns whether the view was counted.
    pub async fn record_view(&self, id: i64, viewer_is_admin: bool) -> Result<bool, PostServiceError> {
        if viewer_is_admin {
            self.require(id).await?;
            return Ok(false);
        }

        let found = self
            .repo
            .record_view(id, Utc::now())
            .await
            .context("Failed to record view")?;
        if !found {
            return Err(PostServiceError::NotFound(format!("Post with ID {} not found", id)));
        }
        Ok(true)
    }

    async fn require(&self, id: i64) -> Result<Post, PostServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get post")?
            .ok_or_else(|| PostServiceError::NotFound(format!("Post with ID {} not found", id)))
    }

    async fn detail(&self, post: Post) -> Result<PostDetail, PostServiceError> {
        let tags = self
            .tag_repo
            .get_by_post_id(post.id)
            .await
            .context("Failed to get post tags")?;
        let comments = self
            .comment_repo
            .list_by_post(post.id)
            .await
            .context("Failed to get post comments")?;
        Ok(PostDetail { post, tags, comments })
    }

    /// The tag set for a mix of names and existing ids.
    ///
    /// Every name is validated here so a bad one fails the save before
    /// anything is written. Unknown names are created by the write itself.
    async fn resolve_tags(&self, names: &[String], ids: &[i64]) -> Result<PostTags, PostServiceError> {
        let mut by_name: Vec<Tag> = Vec::new();
        for name in names.iter().filter(|n| !n.trim().is_empty()) {
            let name = validate_name(name)?;
            if !by_name.iter().any(|t| t.name == name) {
                by_name.push(Tag::new(generate_tag_slug(name), name.to_string()));
            }
        }

        let mut known = BTreeSet::new();
        for id in ids {
            if self.tags.get_by_id(*id).await?.is_none() {
                return Err(PostServiceError::ValidationError(format!("Tag with ID {} not found", id)));
            }
            known.insert(*id);
        }

        Ok(PostTags::new(known.into_iter().collect(), by_name))
    }
}

/// A tag deleted between the check and the write surfaces as a foreign key failure
fn write_error(err: anyhow::Error) -> PostServiceError {
    if is_foreign_key_violation(&err) {
        return PostServiceError::ValidationError("A selected tag no longer exists".to_string());
    }
    PostServiceError::InternalError(err.context("Failed to save post"))
}

fn validate_title(title: &str) -> Result<&str, PostServiceError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(PostServiceError::ValidationError("Title cannot be empty".to_string()));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(PostServiceError::ValidationError(format!(
            "Title cannot exceed {} characters",
            MAX_TITLE_CHARS
        )));
    }
    Ok(title)
}

fn validate_content(content: &str) -> Result<&str, PostServiceError> {
    if content.trim().is_empty() {
        return Err(PostServiceError::ValidationError("Content cannot be empty".to_string()));
    }
    Ok(content)
}

fn parse_date(raw: &str) -> Result<NaiveDate, PostServiceError> {
    parse_post_date(raw).ok_or_else(|| {
        PostServiceError::ValidationError(format!("Invalid date '{}', expected YYYY-MM-DD", raw.trim()))
    })
}
