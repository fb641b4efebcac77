//! Comment repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

use crate::config::DatabaseDriver;
use crate::db::pool::{mysql, sqlite};
use crate::db::DynDatabasePool;
use crate::models::Comment;

/// Comment repository trait
#[async_trait]
pub trait CommentRepository: Send + Sync {
    /// Store a comment on `post_id`. The post must exist.
    async fn create(&self, post_id: i64, author: &str, title: &str, content: &str) -> Result<Comment>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>>;

    /// Comments on a post, oldest first
    async fn list_by_post(&self, post_id: i64) -> Result<Vec<Comment>>;

    /// Delete a comment; returns whether a row was removed
    async fn delete(&self, id: i64) -> Result<bool>;
}

pub struct SqlxCommentRepository {
    pool: DynDatabasePool,
}

impl SqlxCommentRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CommentRepository> {
        Arc::new(Self::new(pool))
    }
}

/// Column mapping shared by both backends' row types
macro_rules! row_to_comment {
    ($row:expr) => {
        Comment {
            id: $row.get("id"),
            post_id: $row.get("post_id"),
            author: $row.get("author"),
            title: $row.get("title"),
            content: $row.get("content"),
            created_at: $row.get("created_at"),
        }
    };
}

const SELECT_COMMENT: &str = "SELECT id, post_id, author, title, content, created_at FROM comments";

#[async_trait]
impl CommentRepository for SqlxCommentRepository {
    async fn create(&self, post_id: i64, author: &str, title: &str, content: &str) -> Result<Comment> {
        let sql = "INSERT INTO comments (post_id, author, title, content, created_at) VALUES (?, ?, ?, ?, ?)";
        let now = Utc::now();
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(post_id)
                .bind(author)
                .bind(title)
                .bind(content)
                .bind(now)
                .execute(sqlite(&self.pool)?)
                .await
                .context("Failed to create comment")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(post_id)
                .bind(author)
                .bind(title)
                .bind(content)
                .bind(now)
                .execute(mysql(&self.pool)?)
                .await
                .context("Failed to create comment")?
                .last_insert_id() as i64,
        };

        Ok(Comment {
            id,
            post_id,
            author: author.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            created_at: now,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Comment>> {
        let sql = format!("{} WHERE id = ?", SELECT_COMMENT);
        let comment = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(sqlite(&self.pool)?)
                .await
                .context("Failed to get comment")?
                .map(|row| row_to_comment!(row)),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(mysql(&self.pool)?)
                .await
                .context("Failed to get comment")?
                .map(|row| row_to_comment!(row)),
        };
        Ok(comment)
    }

    async fn list_by_post(&self, post_id: i64) -> Result<Vec<Comment>> {
        let sql = format!("{} WHERE post_id = ? ORDER BY created_at ASC, id ASC", SELECT_COMMENT);
        let comments = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(post_id)
                .fetch_all(sqlite(&self.pool)?)
                .await
                .context("Failed to list comments")?
                .into_iter()
                .map(|row| row_to_comment!(row))
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(post_id)
                .fetch_all(mysql(&self.pool)?)
                .await
                .context("Failed to list comments")?
                .into_iter()
                .map(|row| row_to_comment!(row))
                .collect(),
        };
        Ok(comments)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query("DELETE FROM comments WHERE id = ?")
                .bind(id)
                .execute(sqlite(&self.pool)?)
                .await
                .context("Failed to delete comment")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query("DELETE FROM comments WHERE id = ?")
                .bind(id)
                .execute(mysql(&self.pool)?)
                .await
                .context("Failed to delete comment")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup() -> (DynDatabasePool, SqlxCommentRepository, i64) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let post_id = sqlx::query(
            "INSERT INTO posts (title, content, content_html, date) VALUES ('p', 'c', 'c', '2024-01-01')",
        )
        .execute(pool.as_sqlite().unwrap())
        .await
        .unwrap()
        .last_insert_rowid();
        (pool.clone(), SqlxCommentRepository::new(pool), post_id)
    }

    #[tokio::test]
    async fn test_create_and_list_comments() {
        let (_pool, repo, post_id) = setup().await;

        let first = repo.create(post_id, "Ada", "First", "Hello").await.unwrap();
        let second = repo.create(post_id, "Anonymous", "Second", "Again").await.unwrap();

        let comments = repo.list_by_post(post_id).await.unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].id, first.id);
        assert_eq!(comments[1].id, second.id);
        assert_eq!(comments[0].author, "Ada");
    }

    #[tokio::test]
    async fn test_create_on_missing_post_fails() {
        let (_pool, repo, _post_id) = setup().await;
        assert!(repo.create(999, "a", "b", "c").await.is_err());
    }

    #[tokio::test]
    async fn test_delete_comment() {
        let (_pool, repo, post_id) = setup().await;
        let comment = repo.create(post_id, "a", "b", "c").await.unwrap();

        assert!(repo.delete(comment.id).await.unwrap());
        assert!(repo.get_by_id(comment.id).await.unwrap().is_none());
        assert!(!repo.delete(comment.id).await.unwrap());
    }
}
