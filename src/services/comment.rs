//! Comment service
//!
//! Guests comment on posts; only the admin deletes comments.

use crate::db::repositories::{CommentRepository, PostRepository};
use crate::models::{Comment, CreateCommentInput};
use anyhow::Context;
use std::sync::Arc;

const MAX_AUTHOR_CHARS: usize = 100;
const MAX_TITLE_CHARS: usize = 255;
const MAX_CONTENT_CHARS: usize = 10_000;

/// Error types for comment service operations
#[derive(Debug, thiserror::Error)]
pub enum CommentServiceError {
    /// The comment, or the post it targets, does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct CommentService {
    repo: Arc<dyn CommentRepository>,
    post_repo: Arc<dyn PostRepository>,
}

impl CommentService {
    pub fn new(repo: Arc<dyn CommentRepository>, post_repo: Arc<dyn PostRepository>) -> Self {
        Self { repo, post_repo }
    }

    /// Add a comment to a post. A blank author becomes `Anonymous`.
    pub async fn create(&self, post_id: i64, input: CreateCommentInput) -> Result<Comment, CommentServiceError> {
        let author = input.author_or_anonymous();
        let title = input.title.trim();
        let content = input.content.trim();

        check_field("Title", title, MAX_TITLE_CHARS)?;
        check_field("Content", content, MAX_CONTENT_CHARS)?;
        if author.chars().count() > MAX_AUTHOR_CHARS {
            return Err(CommentServiceError::ValidationError(format!(
                "Author cannot exceed {} characters",
                MAX_AUTHOR_CHARS
            )));
        }

        self.require_post(post_id).await?;

        let comment = self
            .repo
            .create(post_id, &author, title, content)
            .await
            .context("Failed to create comment")?;

        tracing::info!("New comment {} on post {} by '{}'", comment.id, post_id, comment.author);
        Ok(comment)
    }

    /// Comments on a post, oldest first
    pub async fn list_for_post(&self, post_id: i64) -> Result<Vec<Comment>, CommentServiceError> {
        self.require_post(post_id).await?;
        let comments = self
            .repo
            .list_by_post(post_id)
            .await
            .context("Failed to list comments")?;
        Ok(comments)
    }

    pub async fn get(&self, id: i64) -> Result<Comment, CommentServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to get comment")?
            .ok_or_else(|| CommentServiceError::NotFound(format!("Comment with ID {} not found", id)))
    }

    pub async fn delete(&self, id: i64) -> Result<(), CommentServiceError> {
        let deleted = self.repo.delete(id).await.context("Failed to delete comment")?;
        if !deleted {
            return Err(CommentServiceError::NotFound(format!("Comment with ID {} not found", id)));
        }
        tracing::info!("Deleted comment {}", id);
        Ok(())
    }

    async fn require_post(&self, post_id: i64) -> Result<(), CommentServiceError> {
        self.post_repo
            .get_by_id(post_id)
            .await
            .context("Failed to get post")?
            .map(|_| ())
            .ok_or_else(|| CommentServiceError::NotFound(format!("Post with ID {} not found", post_id)))
    }
}

fn check_field(name: &str, value: &str, max_chars: usize) -> Result<(), CommentServiceError> {
    if value.is_empty() {
        return Err(CommentServiceError::ValidationError(format!("{} cannot be empty", name)));
    }
    if value.chars().count() > max_chars {
        return Err(CommentServiceError::ValidationError(format!(
            "{} cannot exceed {} characters",
            name, max_chars
        )));
    }
    Ok(())
}
