//! Tag repository
//!
//! Database operations for tags. Post/tag links are written by the post
//! repository together with the post; this one only reads them.
//!
//! This module provides:
//! - `TagRepository` trait defining the interface for tag data access
//! - `SqlxTagRepository` implementing the trait for SQLite and MySQL

use crate::config::DatabaseDriver;
use crate::db::pool::{mysql, sqlite};
use crate::db::repositories::post::placeholders;
use crate::db::DynDatabasePool;
use crate::models::{Tag, TagWithCount};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Tag repository trait
#[async_trait]
pub trait TagRepository: Send + Sync {
    /// Create a new tag
    async fn create(&self, tag: &Tag) -> Result<Tag>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Tag>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Tag>>;

    async fn get_by_name(&self, name: &str) -> Result<Option<Tag>>;

    /// All tags with the number of posts carrying each, ordered by name
    async fn list_with_counts(&self) -> Result<Vec<TagWithCount>>;

    /// Delete a tag; its post links go with it by cascade
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Tags of a post, ordered by name
    async fn get_by_post_id(&self, post_id: i64) -> Result<Vec<Tag>>;

    /// Delete those of `tag_ids` that no post carries any more
    async fn delete_orphans_among(&self, tag_ids: &[i64]) -> Result<u64>;
}

/// SQLx-based tag repository implementation
pub struct SqlxTagRepository {
    pool: DynDatabasePool,
}

impl SqlxTagRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn TagRepository> {
        Arc::new(Self::new(pool))
    }

    async fn get_by_column(&self, column: &'static str, value: TagKey<'_>) -> Result<Option<Tag>> {
        let sql = format!(
            "SELECT id, slug, name, view_count, created_at FROM tags WHERE {} = ?",
            column
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let query = sqlx::query(&sql);
                let query = match value {
                    TagKey::Id(id) => query.bind(id),
                    TagKey::Text(text) => query.bind(text),
                };
                let row = query
                    .fetch_optional(sqlite(&self.pool)?)
                    .await
                    .with_context(|| format!("Failed to get tag by {}", column))?;
                Ok(row.as_ref().map(row_to_tag_sqlite))
            }
            DatabaseDriver::Mysql => {
                let query = sqlx::query(&sql);
                let query = match value {
                    TagKey::Id(id) => query.bind(id),
                    TagKey::Text(text) => query.bind(text),
                };
                let row = query
                    .fetch_optional(mysql(&self.pool)?)
                    .await
                    .with_context(|| format!("Failed to get tag by {}", column))?;
                Ok(row.as_ref().map(row_to_tag_mysql))
            }
        }
    }
}

enum TagKey<'a> {
    Id(i64),
    Text(&'a str),
}

#[async_trait]
impl TagRepository for SqlxTagRepository {
    async fn create(&self, tag: &Tag) -> Result<Tag> {
        let sql = "INSERT INTO tags (slug, name, view_count, created_at) VALUES (?, ?, 0, ?)";
        let now = Utc::now();
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(&tag.slug)
                .bind(&tag.name)
                .bind(now)
                .execute(sqlite(&self.pool)?)
                .await
                .context("Failed to create tag")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(&tag.slug)
                .bind(&tag.name)
                .bind(now)
                .execute(mysql(&self.pool)?)
                .await
                .context("Failed to create tag")?
                .last_insert_id() as i64,
        };

        Ok(Tag {
            id,
            slug: tag.slug.clone(),
            name: tag.name.clone(),
            view_count: 0,
            created_at: now,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Tag>> {
        self.get_by_column("id", TagKey::Id(id)).await
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Tag>> {
        self.get_by_column("slug", TagKey::Text(slug)).await
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Tag>> {
        self.get_by_column("name", TagKey::Text(name)).await
    }

    async fn list_with_counts(&self) -> Result<Vec<TagWithCount>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_with_counts_sqlite(sqlite(&self.pool)?).await,
            DatabaseDriver::Mysql => list_with_counts_mysql(mysql(&self.pool)?).await,
        }
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query("DELETE FROM tags WHERE id = ?")
                .bind(id)
                .execute(sqlite(&self.pool)?)
                .await
                .context("Failed to delete tag")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query("DELETE FROM tags WHERE id = ?")
                .bind(id)
                .execute(mysql(&self.pool)?)
                .await
                .context("Failed to delete tag")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn get_by_post_id(&self, post_id: i64) -> Result<Vec<Tag>> {
        let sql = r#"
            SELECT t.id, t.slug, t.name, t.view_count, t.created_at
            FROM tags t
            INNER JOIN post_tags pt ON t.id = pt.tag_id
            WHERE pt.post_id = ?
            ORDER BY t.name
        "#;
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(sql)
                    .bind(post_id)
                    .fetch_all(sqlite(&self.pool)?)
                    .await
                    .context("Failed to get tags for post")?;
                Ok(rows.iter().map(row_to_tag_sqlite).collect())
            }
            DatabaseDriver::Mysql => {
                let rows = sqlx::query(sql)
                    .bind(post_id)
                    .fetch_all(mysql(&self.pool)?)
                    .await
                    .context("Failed to get tags for post")?;
                Ok(rows.iter().map(row_to_tag_mysql).collect())
            }
        }
    }

    async fn delete_orphans_among(&self, tag_ids: &[i64]) -> Result<u64> {
        if tag_ids.is_empty() {
            return Ok(0);
        }
        let sql = format!(
            "DELETE FROM tags WHERE id IN ({}) AND NOT EXISTS (SELECT 1 FROM post_tags pt WHERE pt.tag_id = tags.id)",
            placeholders(tag_ids.len())
        );
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut query = sqlx::query(&sql);
                for id in tag_ids {
                    query = query.bind(*id);
                }
                query
                    .execute(sqlite(&self.pool)?)
                    .await
                    .context("Failed to delete orphaned tags")?
                    .rows_affected()
            }
            DatabaseDriver::Mysql => {
                let mut query = sqlx::query(&sql);
                for id in tag_ids {
                    query = query.bind(*id);
                }
                query
                    .execute(mysql(&self.pool)?)
                    .await
                    .context("Failed to delete orphaned tags")?
                    .rows_affected()
            }
        };
        Ok(affected)
    }
}

const LIST_WITH_COUNTS: &str = r#"
    SELECT t.id, t.slug, t.name, t.view_count, t.created_at, COUNT(pt.post_id) AS post_count
    FROM tags t
    LEFT JOIN post_tags pt ON t.id = pt.tag_id
    GROUP BY t.id, t.slug, t.name, t.view_count, t.created_at
    ORDER BY t.name ASC
"#;

// ============================================================================
// SQLite implementations
// ============================================================================

async fn list_with_counts_sqlite(pool: &SqlitePool) -> Result<Vec<TagWithCount>> {
    let rows = sqlx::query(LIST_WITH_COUNTS)
        .fetch_all(pool)
        .await
        .context("Failed to list tags with counts")?;

    Ok(rows
        .iter()
        .map(|row| TagWithCount::new(row_to_tag_sqlite(row), row.get("post_count")))
        .collect())
}

fn row_to_tag_sqlite(row: &sqlx::sqlite::SqliteRow) -> Tag {
    Tag {
        id: row.get("id"),
        slug: row.get("slug"),
        name: row.get("name"),
        view_count: row.get("view_count"),
        created_at: row.get("created_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn list_with_counts_mysql(pool: &MySqlPool) -> Result<Vec<TagWithCount>> {
    let rows = sqlx::query(LIST_WITH_COUNTS)
        .fetch_all(pool)
        .await
        .context("Failed to list tags with counts")?;

    Ok(rows
        .iter()
        .map(|row| TagWithCount::new(row_to_tag_mysql(row), row.get("post_count")))
        .collect())
}

fn row_to_tag_mysql(row: &sqlx::mysql::MySqlRow) -> Tag {
    Tag {
        id: row.get("id"),
        slug: row.get("slug"),
        name: row.get("name"),
        view_count: row.get("view_count"),
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, is_unique_violation, migrations};

    async fn setup_test_repo() -> (DynDatabasePool, SqlxTagRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxTagRepository::new(pool.clone());
        (pool, repo)
    }

    fn create_test_tag(slug: &str, name: &str) -> Tag {
        Tag::new(slug.to_string(), name.to_string())
    }

    /// Helper to create a post for tag association tests
    async fn create_test_post(pool: &DynDatabasePool, title: &str) -> i64 {
        sqlx::query(
            "INSERT INTO posts (title, content, content_html, date) VALUES (?, 'c', '<p>c</p>', '2024-01-01')",
        )
        .bind(title)
        .execute(pool.as_sqlite().unwrap())
        .await
        .expect("Failed to create test post")
        .last_insert_rowid()
    }

    async fn link(pool: &DynDatabasePool, tag_id: i64, post_id: i64) {
        sqlx::query("INSERT INTO post_tags (post_id, tag_id) VALUES (?, ?)")
            .bind(post_id)
            .bind(tag_id)
            .execute(pool.as_sqlite().unwrap())
            .await
            .unwrap();
    }

    async fn link_count(pool: &DynDatabasePool, post_id: i64) -> i64 {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM post_tags WHERE post_id = ?")
            .bind(post_id)
            .fetch_one(pool.as_sqlite().unwrap())
            .await
            .unwrap();
        count
    }

    #[tokio::test]
    async fn test_create_and_lookup_tag() {
        let (_pool, repo) = setup_test_repo().await;
        let created = repo.create(&create_test_tag("rust", "Rust")).await.unwrap();

        assert!(created.id > 0);
        assert_eq!(repo.get_by_id(created.id).await.unwrap().unwrap().name, "Rust");
        assert_eq!(repo.get_by_slug("rust").await.unwrap().unwrap().id, created.id);
        assert_eq!(repo.get_by_name("Rust").await.unwrap().unwrap().id, created.id);
        assert!(repo.get_by_name("Go").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create(&create_test_tag("rust", "Rust")).await.unwrap();
        let err = repo.create(&create_test_tag("rust-2", "Rust")).await.unwrap_err();
        assert!(is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_get_by_post_id_orders_by_name() {
        let (pool, repo) = setup_test_repo().await;
        let post_id = create_test_post(&pool, "p").await;
        let web = repo.create(&create_test_tag("web", "web")).await.unwrap();
        let rust = repo.create(&create_test_tag("rust", "rust")).await.unwrap();
        link(&pool, web.id, post_id).await;
        link(&pool, rust.id, post_id).await;

        let ids: Vec<i64> = repo.get_by_post_id(post_id).await.unwrap().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![rust.id, web.id]);
        assert!(repo.get_by_post_id(post_id + 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_with_counts() {
        let (pool, repo) = setup_test_repo().await;
        let p1 = create_test_post(&pool, "p1").await;
        let p2 = create_test_post(&pool, "p2").await;
        let rust = repo.create(&create_test_tag("rust", "rust")).await.unwrap();
        let go = repo.create(&create_test_tag("go", "go")).await.unwrap();
        link(&pool, rust.id, p1).await;
        link(&pool, rust.id, p2).await;

        let tags = repo.list_with_counts().await.unwrap();
        assert_eq!(tags.len(), 2);
        assert_eq!(tags[0].tag.id, go.id);
        assert_eq!(tags[0].post_count, 0);
        assert_eq!(tags[1].tag.id, rust.id);
        assert_eq!(tags[1].post_count, 2);
    }

    #[tokio::test]
    async fn test_delete_tag_cascades_to_post_tags() {
        let (pool, repo) = setup_test_repo().await;
        let post_id = create_test_post(&pool, "p").await;
        let tag = repo.create(&create_test_tag("rust", "Rust")).await.unwrap();
        link(&pool, tag.id, post_id).await;

        assert!(repo.delete(tag.id).await.unwrap());
        assert_eq!(link_count(&pool, post_id).await, 0);
        assert!(!repo.delete(tag.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_orphans_among() {
        let (pool, repo) = setup_test_repo().await;
        let post_id = create_test_post(&pool, "p").await;
        let used = repo.create(&create_test_tag("used", "used")).await.unwrap();
        let orphan = repo.create(&create_test_tag("orphan", "orphan")).await.unwrap();
        let untouched = repo.create(&create_test_tag("other", "other")).await.unwrap();
        link(&pool, used.id, post_id).await;

        let removed = repo.delete_orphans_among(&[used.id, orphan.id]).await.unwrap();

        assert_eq!(removed, 1);
        assert!(repo.get_by_id(used.id).await.unwrap().is_some());
        assert!(repo.get_by_id(orphan.id).await.unwrap().is_none());
        // Not in the candidate list, so kept even without posts
        assert!(repo.get_by_id(untouched.id).await.unwrap().is_some());
    }
}
