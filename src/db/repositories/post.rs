//! Post repository
//!
//! Database operations for posts and their raw view events. A post and its
//! tag links are always written in one transaction.
//!
//! This module provides:
//! - `PostRepository` trait defining the interface for post data access
//! - `SqlxPostRepository` implementing the trait for SQLite and MySQL

use crate::config::DatabaseDriver;
use crate::db::pool::{mysql, sqlite};
use crate::db::{sqlx_unique_violation, DynDatabasePool};
use crate::models::{ListParams, Post, Tag};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySql, MySqlPool, Row, Sqlite, SqlitePool, Transaction};
use std::sync::Arc;

/// The tag set a post write leaves behind
#[derive(Debug, Clone, Default)]
pub struct PostTags {
    /// Existing tags
    pub ids: Vec<i64>,
    /// Tags looked up by name, created with `slug` as the base slug when missing
    pub by_name: Vec<Tag>,
}

impl PostTags {
    pub fn new(ids: Vec<i64>, by_name: Vec<Tag>) -> Self {
        Self { ids, by_name }
    }
}

/// Post repository trait
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Insert a post with its tags and return it with its new ID
    async fn create(&self, post: &Post, tags: &PostTags) -> Result<Post>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>>;

    /// List posts newest first (by date, then id)
    async fn list(&self, params: &ListParams) -> Result<(Vec<Post>, i64)>;

    /// Persist title, content, rendered HTML and date of an existing post.
    /// `Some(tags)` replaces its tag set in the same transaction.
    async fn update(&self, post: &Post, tags: Option<&PostTags>) -> Result<Post>;

    /// Delete a post; comments, tag links and views go with it by cascade
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Distinct posts carrying any of `tag_ids`, newest first
    async fn list_by_tag_ids(&self, tag_ids: &[i64]) -> Result<Vec<Post>>;

    /// Count one view: bump the post and its tags and log a view event.
    /// Returns false when the post does not exist.
    async fn record_view(&self, post_id: i64, viewed_at: DateTime<Utc>) -> Result<bool>;
}

/// SQLx-based post repository implementation
pub struct SqlxPostRepository {
    pool: DynDatabasePool,
}

impl SqlxPostRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PostRepository> {
        Arc::new(Self::new(pool))
    }
}

const POST_COLUMNS: &str =
    "p.id, p.title, p.content, p.content_html, p.date, p.view_count, p.created_at, p.updated_at";

const UPDATE_POST: &str =
    "UPDATE posts SET title = ?, content = ?, content_html = ?, date = ?, updated_at = ? WHERE id = ?";

const INSERT_TAG: &str = "INSERT INTO tags (slug, name, view_count, created_at) VALUES (?, ?, 0, ?)";

/// Tries at a new tag before giving up on concurrent inserts of the same name
const TAG_INSERT_ATTEMPTS: usize = 3;

/// `?, ?, ?` for an IN list of `n` values
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

#[async_trait]
impl PostRepository for SqlxPostRepository {
    async fn create(&self, post: &Post, tags: &PostTags) -> Result<Post> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_post_sqlite(sqlite(&self.pool)?, post, tags).await,
            DatabaseDriver::Mysql => create_post_mysql(mysql(&self.pool)?, post, tags).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_post_by_id_sqlite(sqlite(&self.pool)?, id).await,
            DatabaseDriver::Mysql => get_post_by_id_mysql(mysql(&self.pool)?, id).await,
        }
    }

    async fn list(&self, params: &ListParams) -> Result<(Vec<Post>, i64)> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_posts_sqlite(sqlite(&self.pool)?, params).await,
            DatabaseDriver::Mysql => list_posts_mysql(mysql(&self.pool)?, params).await,
        }
    }

    async fn update(&self, post: &Post, tags: Option<&PostTags>) -> Result<Post> {
        let now = Utc::now();
        match self.pool.driver() {
            DatabaseDriver::Sqlite => update_post_sqlite(sqlite(&self.pool)?, post, tags, now).await?,
            DatabaseDriver::Mysql => update_post_mysql(mysql(&self.pool)?, post, tags, now).await?,
        }
        Ok(Post {
            updated_at: now,
            ..post.clone()
        })
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query("DELETE FROM posts WHERE id = ?")
                .bind(id)
                .execute(sqlite(&self.pool)?)
                .await
                .context("Failed to delete post")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query("DELETE FROM posts WHERE id = ?")
                .bind(id)
                .execute(mysql(&self.pool)?)
                .await
                .context("Failed to delete post")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn list_by_tag_ids(&self, tag_ids: &[i64]) -> Result<Vec<Post>> {
        if tag_ids.is_empty() {
            return Ok(Vec::new());
        }
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_posts_by_tags_sqlite(sqlite(&self.pool)?, tag_ids).await,
            DatabaseDriver::Mysql => list_posts_by_tags_mysql(mysql(&self.pool)?, tag_ids).await,
        }
    }

    async fn record_view(&self, post_id: i64, viewed_at: DateTime<Utc>) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                record_view_sqlite(sqlite(&self.pool)?, post_id, viewed_at).await
            }
            DatabaseDriver::Mysql => record_view_mysql(mysql(&self.pool)?, post_id, viewed_at).await,
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_post_sqlite(pool: &SqlitePool, post: &Post, tags: &PostTags) -> Result<Post> {
    let now = Utc::now();
    let mut tx = pool.begin().await.context("Failed to begin post transaction")?;

    let id = sqlx::query(
        r#"
        INSERT INTO posts (title, content, content_html, date, view_count, created_at, updated_at)
        VALUES (?, ?, ?, ?, 0, ?, ?)
        "#,
    )
    .bind(&post.title)
    .bind(&post.content)
    .bind(&post.content_html)
    .bind(post.date)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await
    .context("Failed to create post")?
    .last_insert_rowid();

    set_post_tags_sqlite(&mut tx, id, tags).await?;
    tx.commit().await.context("Failed to commit post")?;

    Ok(Post {
        id,
        view_count: 0,
        created_at: now,
        updated_at: now,
        ..post.clone()
    })
}

async fn update_post_sqlite(
    pool: &SqlitePool,
    post: &Post,
    tags: Option<&PostTags>,
    now: DateTime<Utc>,
) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin post transaction")?;

    sqlx::query(UPDATE_POST)
        .bind(&post.title)
        .bind(&post.content)
        .bind(&post.content_html)
        .bind(post.date)
        .bind(now)
        .bind(post.id)
        .execute(&mut *tx)
        .await
        .context("Failed to update post")?;

    if let Some(tags) = tags {
        set_post_tags_sqlite(&mut tx, post.id, tags).await?;
    }
    tx.commit().await.context("Failed to commit post")?;
    Ok(())
}

async fn set_post_tags_sqlite(tx: &mut Transaction<'_, Sqlite>, post_id: i64, tags: &PostTags) -> Result<()> {
    sqlx::query("DELETE FROM post_tags WHERE post_id = ?")
        .bind(post_id)
        .execute(&mut **tx)
        .await
        .context("Failed to clear post tags")?;

    let mut tag_ids = tags.ids.clone();
    for tag in &tags.by_name {
        tag_ids.push(tag_id_for_name_sqlite(tx, tag).await?);
    }

    for tag_id in tag_ids {
        sqlx::query("INSERT OR IGNORE INTO post_tags (post_id, tag_id) VALUES (?, ?)")
            .bind(post_id)
            .bind(tag_id)
            .execute(&mut **tx)
            .await
            .context("Failed to tag post")?;
    }
    Ok(())
}

/// Id of the tag called `tag.name`, inserting it when missing
async fn tag_id_for_name_sqlite(tx: &mut Transaction<'_, Sqlite>, tag: &Tag) -> Result<i64> {
    for _ in 0..TAG_INSERT_ATTEMPTS {
        let existing: Option<(i64,)> = sqlx::query_as("SELECT id FROM tags WHERE name = ?")
            .bind(&tag.name)
            .fetch_optional(&mut **tx)
            .await
            .context("Failed to look up tag")?;
        if let Some((id,)) = existing {
            return Ok(id);
        }

        let slug = free_slug_sqlite(tx, &tag.slug).await?;
        match sqlx::query(INSERT_TAG)
            .bind(&slug)
            .bind(&tag.name)
            .bind(Utc::now())
            .execute(&mut **tx)
            .await
        {
            Ok(done) => return Ok(done.last_insert_rowid()),
            // Another writer took the name or slug first
            Err(e) if sqlx_unique_violation(&e) => continue,
            Err(e) => return Err(e).context("Failed to create tag"),
        }
    }
    bail!("Failed to create tag '{}'", tag.name)
}

/// `base`, or `base-2`, `base-3`... until unused
async fn free_slug_sqlite(tx: &mut Transaction<'_, Sqlite>, base: &str) -> Result<String> {
    let mut candidate = base.to_string();
    let mut n = 2;
    loop {
        let taken: Option<(i64,)> = sqlx::query_as("SELECT id FROM tags WHERE slug = ?")
            .bind(&candidate)
            .fetch_optional(&mut **tx)
            .await
            .context("Failed to check tag slug")?;
        if taken.is_none() {
            return Ok(candidate);
        }
        candidate = format!("{}-{}", base, n);
        n += 1;
    }
}

async fn get_post_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<Post>> {
    let sql = format!("SELECT {} FROM posts p WHERE p.id = ?", POST_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get post by ID")?;

    Ok(row.as_ref().map(row_to_post_sqlite))
}

async fn list_posts_sqlite(pool: &SqlitePool, params: &ListParams) -> Result<(Vec<Post>, i64)> {
    let sql = format!(
        "SELECT {} FROM posts p ORDER BY p.date DESC, p.id DESC LIMIT ? OFFSET ?",
        POST_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list posts")?;

    let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts")
        .fetch_one(pool)
        .await
        .context("Failed to count posts")?;

    Ok((rows.iter().map(row_to_post_sqlite).collect(), total.0))
}

async fn list_posts_by_tags_sqlite(pool: &SqlitePool, tag_ids: &[i64]) -> Result<Vec<Post>> {
    let sql = format!(
        r#"
        SELECT {} FROM posts p
        WHERE p.id IN (SELECT pt.post_id FROM post_tags pt WHERE pt.tag_id IN ({}))
        ORDER BY p.date DESC, p.id DESC
        "#,
        POST_COLUMNS,
        placeholders(tag_ids.len())
    );
    let mut query = sqlx::query(&sql);
    for id in tag_ids {
        query = query.bind(*id);
    }
    let rows = query
        .fetch_all(pool)
        .await
        .context("Failed to list posts by tags")?;

    Ok(rows.iter().map(row_to_post_sqlite).collect())
}

async fn record_view_sqlite(pool: &SqlitePool, post_id: i64, viewed_at: DateTime<Utc>) -> Result<bool> {
    let mut tx = pool.begin().await.context("Failed to begin view transaction")?;

    let updated = sqlx::query("UPDATE posts SET view_count = view_count + 1 WHERE id = ?")
        .bind(post_id)
        .execute(&mut *tx)
        .await
        .context("Failed to bump post view count")?
        .rows_affected();
    if updated == 0 {
        return Ok(false);
    }

    sqlx::query(
        "UPDATE tags SET view_count = view_count + 1 WHERE id IN (SELECT tag_id FROM post_tags WHERE post_id = ?)",
    )
    .bind(post_id)
    .execute(&mut *tx)
    .await
    .context("Failed to bump tag view counts")?;

    sqlx::query("INSERT INTO post_views (post_id, viewed_at) VALUES (?, ?)")
        .bind(post_id)
        .bind(viewed_at)
        .execute(&mut *tx)
        .await
        .context("Failed to record view event")?;

    tx.commit().await.context("Failed to commit view")?;
    Ok(true)
}

fn row_to_post_sqlite(row: &sqlx::sqlite::SqliteRow) -> Post {
    Post {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        content_html: row.get("content_html"),
        date: row.get("date"),
        view_count: row.get("view_count"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn create_post_mysql(pool: &MySqlPool, post: &Post, tags: &PostTags) -> Result<Post> {
    let now = Utc::now();
    let mut tx = pool.begin().await.context("Failed to begin post transaction")?;

    let id = sqlx::query(
        r#"
        INSERT INTO posts (title, content, content_html, date, view_count, created_at, updated_at)
        VALUES (?, ?, ?, ?, 0, ?, ?)
        "#,
    )
    .bind(&post.title)
    .bind(&post.content)
    .bind(&post.content_html)
    .bind(post.date)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await
    .context("Failed to create post")?
    .last_insert_id() as i64;

    set_post_tags_mysql(&mut tx, id, tags).await?;
    tx.commit().await.context("Failed to commit post")?;

    Ok(Post {
        id,
        view_count: 0,
        created_at: now,
        updated_at: now,
        ..post.clone()
    })
}

async fn update_post_mysql(
    pool: &MySqlPool,
    post: &Post,
    tags: Option<&PostTags>,
    now: DateTime<Utc>,
) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin post transaction")?;

    sqlx::query(UPDATE_POST)
        .bind(&post.title)
        .bind(&post.content)
        .bind(&post.content_html)
        .bind(post.date)
        .bind(now)
        .bind(post.id)
        .execute(&mut *tx)
        .await
        .context("Failed to update post")?;

    if let Some(tags) = tags {
        set_post_tags_mysql(&mut tx, post.id, tags).await?;
    }
    tx.commit().await.context("Failed to commit post")?;
    Ok(())
}

async fn set_post_tags_mysql(tx: &mut Transaction<'_, MySql>, post_id: i64, tags: &PostTags) -> Result<()> {
    sqlx::query("DELETE FROM post_tags WHERE post_id = ?")
        .bind(post_id)
        .execute(&mut **tx)
        .await
        .context("Failed to clear post tags")?;

    let mut tag_ids = tags.ids.clone();
    for tag in &tags.by_name {
        tag_ids.push(tag_id_for_name_mysql(tx, tag).await?);
    }

    for tag_id in tag_ids {
        sqlx::query("INSERT IGNORE INTO post_tags (post_id, tag_id) VALUES (?, ?)")
            .bind(post_id)
            .bind(tag_id)
            .execute(&mut **tx)
            .await
            .context("Failed to tag post")?;
    }
    Ok(())
}

async fn tag_id_for_name_mysql(tx: &mut Transaction<'_, MySql>, tag: &Tag) -> Result<i64> {
    for _ in 0..TAG_INSERT_ATTEMPTS {
        let existing: Option<(i64,)> = sqlx::query_as("SELECT id FROM tags WHERE name = ?")
            .bind(&tag.name)
            .fetch_optional(&mut **tx)
            .await
            .context("Failed to look up tag")?;
        if let Some((id,)) = existing {
            return Ok(id);
        }

        let slug = free_slug_mysql(tx, &tag.slug).await?;
        match sqlx::query(INSERT_TAG)
            .bind(&slug)
            .bind(&tag.name)
            .bind(Utc::now())
            .execute(&mut **tx)
            .await
        {
            Ok(done) => return Ok(done.last_insert_id() as i64),
            Err(e) if sqlx_unique_violation(&e) => continue,
            Err(e) => return Err(e).context("Failed to create tag"),
        }
    }
    bail!("Failed to create tag '{}'", tag.name)
}

async fn free_slug_mysql(tx: &mut Transaction<'_, MySql>, base: &str) -> Result<String> {
    let mut candidate = base.to_string();
    let mut n = 2;
    loop {
        let taken: Option<(i64,)> = sqlx::query_as("SELECT id FROM tags WHERE slug = ?")
            .bind(&candidate)
            .fetch_optional(&mut **tx)
            .await
            .context("Failed to check tag slug")?;
        if taken.is_none() {
            return Ok(candidate);
        }
        candidate = format!("{}-{}", base, n);
        n += 1;
    }
}

async fn get_post_by_id_mysql(pool: &MySqlPool, id: i64) -> Result<Option<Post>> {
    let sql = format!("SELECT {} FROM posts p WHERE p.id = ?", POST_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get post by ID")?;

    Ok(row.as_ref().map(row_to_post_mysql))
}

async fn list_posts_mysql(pool: &MySqlPool, params: &ListParams) -> Result<(Vec<Post>, i64)> {
    let sql = format!(
        "SELECT {} FROM posts p ORDER BY p.date DESC, p.id DESC LIMIT ? OFFSET ?",
        POST_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(pool)
        .await
        .context("Failed to list posts")?;

    let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts")
        .fetch_one(pool)
        .await
        .context("Failed to count posts")?;

    Ok((rows.iter().map(row_to_post_mysql).collect(), total.0))
}

async fn list_posts_by_tags_mysql(pool: &MySqlPool, tag_ids: &[i64]) -> Result<Vec<Post>> {
    let sql = format!(
        r#"
        SELECT {} FROM posts p
        WHERE p.id IN (SELECT pt.post_id FROM post_tags pt WHERE pt.tag_id IN ({}))
        ORDER BY p.date DESC, p.id DESC
        "#,
        POST_COLUMNS,
        placeholders(tag_ids.len())
    );
    let mut query = sqlx::query(&sql);
    for id in tag_ids {
        query = query.bind(*id);
    }
    let rows = query
        .fetch_all(pool)
        .await
        .context("Failed to list posts by tags")?;

    Ok(rows.iter().map(row_to_post_mysql).collect())
}

async fn record_view_mysql(pool: &MySqlPool, post_id: i64, viewed_at: DateTime<Utc>) -> Result<bool> {
    let mut tx = pool.begin().await.context("Failed to begin view transaction")?;

    let updated = sqlx::query("UPDATE posts SET view_count = view_count + 1 WHERE id = ?")
        .bind(post_id)
        .execute(&mut *tx)
        .await
        .context("Failed to bump post view count")?
        .rows_affected();
    if updated == 0 {
        return Ok(false);
    }

    sqlx::query(
        "UPDATE tags SET view_count = view_count + 1 WHERE id IN (SELECT tag_id FROM post_tags WHERE post_id = ?)",
    )
    .bind(post_id)
    .execute(&mut *tx)
    .await
    .context("Failed to bump tag view counts")?;

    sqlx::query("INSERT INTO post_views (post_id, viewed_at) VALUES (?, ?)")
        .bind(post_id)
        .bind(viewed_at)
        .execute(&mut *tx)
        .await
        .context("Failed to record view event")?;

    tx.commit().await.context("Failed to commit view")?;
    Ok(true)
}

fn row_to_post_mysql(row: &sqlx::mysql::MySqlRow) -> Post {
    Post {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        content_html: row.get("content_html"),
        date: row.get("date"),
        view_count: row.get("view_count"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, is_foreign_key_violation, migrations};
    use chrono::NaiveDate;
    use proptest::prelude::*;

    async fn setup_test_repo() -> (DynDatabasePool, SqlxPostRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxPostRepository::new(pool.clone());
        (pool, repo)
    }

    fn test_post(title: &str, y: i32, m: u32, d: u32) -> Post {
        Post::new(
            title.to_string(),
            format!("Content of {}", title),
            format!("<p>Content of {}</p>", title),
            NaiveDate::from_ymd_opt(y, m, d).unwrap(),
        )
    }

    async fn tag_post(pool: &DynDatabasePool, post_id: i64, name: &str) -> i64 {
        let sqlite_pool = pool.as_sqlite().unwrap();
        sqlx::query("INSERT OR IGNORE INTO tags (slug, name) VALUES (?, ?)")
            .bind(name)
            .bind(name)
            .execute(sqlite_pool)
            .await
            .unwrap();
        let (tag_id,): (i64,) = sqlx::query_as("SELECT id FROM tags WHERE name = ?")
            .bind(name)
            .fetch_one(sqlite_pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO post_tags (post_id, tag_id) VALUES (?, ?)")
            .bind(post_id)
            .bind(tag_id)
            .execute(sqlite_pool)
            .await
            .unwrap();
        tag_id
    }

    #[tokio::test]
    async fn test_create_and_get_post() {
        let (_pool, repo) = setup_test_repo().await;
        let created = repo.create(&test_post("Hello", 2024, 1, 2), &PostTags::default()).await.unwrap();

        assert!(created.id > 0);
        let found = repo.get_by_id(created.id).await.unwrap().expect("Post should exist");
        assert_eq!(found.title, "Hello");
        assert_eq!(found.date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert_eq!(found.view_count, 0);
    }

    #[tokio::test]
    async fn test_list_orders_by_date_desc() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create(&test_post("old", 2023, 5, 1), &PostTags::default()).await.unwrap();
        repo.create(&test_post("new", 2024, 5, 1), &PostTags::default()).await.unwrap();
        repo.create(&test_post("mid", 2023, 12, 1), &PostTags::default()).await.unwrap();

        let (posts, total) = repo.list(&ListParams::new(1, 10)).await.unwrap();
        let titles: Vec<_> = posts.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["new", "mid", "old"]);
        assert_eq!(total, 3);

        let (page2, _) = repo.list(&ListParams::new(2, 2)).await.unwrap();
        assert_eq!(page2.len(), 1);
        assert_eq!(page2[0].title, "old");
    }

    #[tokio::test]
    async fn test_update_post() {
        let (_pool, repo) = setup_test_repo().await;
        let mut post = repo.create(&test_post("Draft", 2024, 1, 1), &PostTags::default()).await.unwrap();

        post.title = "Final".to_string();
        post.date = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        repo.update(&post, None).await.unwrap();

        let found = repo.get_by_id(post.id).await.unwrap().unwrap();
        assert_eq!(found.title, "Final");
        assert_eq!(found.date, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
    }

    #[tokio::test]
    async fn test_delete_missing_post_returns_false() {
        let (_pool, repo) = setup_test_repo().await;
        assert!(!repo.delete(42).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_by_tag_ids_is_distinct() {
        let (pool, repo) = setup_test_repo().await;
        let a = repo.create(&test_post("a", 2024, 1, 1), &PostTags::default()).await.unwrap();
        let b = repo.create(&test_post("b", 2024, 1, 2), &PostTags::default()).await.unwrap();
        let _c = repo.create(&test_post("c", 2024, 1, 3), &PostTags::default()).await.unwrap();

        let rust = tag_post(&pool, a.id, "rust").await;
        let web = tag_post(&pool, a.id, "web").await;
        tag_post(&pool, b.id, "web").await;

        let posts = repo.list_by_tag_ids(&[rust, web]).await.unwrap();
        let ids: Vec<i64> = posts.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![b.id, a.id]);

        assert!(repo.list_by_tag_ids(&[]).await.unwrap().is_empty());
        assert!(repo.list_by_tag_ids(&[999]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_record_view_bumps_post_and_tags() {
        let (pool, repo) = setup_test_repo().await;
        let post = repo.create(&test_post("viewed", 2024, 1, 1), &PostTags::default()).await.unwrap();
        let tag_id = tag_post(&pool, post.id, "intro").await;

        assert!(repo.record_view(post.id, Utc::now()).await.unwrap());
        assert!(repo.record_view(post.id, Utc::now()).await.unwrap());

        let found = repo.get_by_id(post.id).await.unwrap().unwrap();
        assert_eq!(found.view_count, 2);

        let sqlite_pool = pool.as_sqlite().unwrap();
        let (tag_views,): (i64,) = sqlx::query_as("SELECT view_count FROM tags WHERE id = ?")
            .bind(tag_id)
            .fetch_one(sqlite_pool)
            .await
            .unwrap();
        assert_eq!(tag_views, 2);

        let (events,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM post_views WHERE post_id = ?")
            .bind(post.id)
            .fetch_one(sqlite_pool)
            .await
            .unwrap();
        assert_eq!(events, 2);
    }

    #[tokio::test]
    async fn test_record_view_missing_post() {
        let (_pool, repo) = setup_test_repo().await;
        assert!(!repo.record_view(7, Utc::now()).await.unwrap());
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(1), "?");
        assert_eq!(placeholders(3), "?, ?, ?");
    }

    async fn count(pool: &DynDatabasePool, sql: &str) -> i64 {
        let (n,): (i64,) = sqlx::query_as(sql)
            .fetch_one(pool.as_sqlite().unwrap())
            .await
            .unwrap();
        n
    }

    async fn insert_tag(pool: &DynDatabasePool, slug: &str, name: &str) -> i64 {
        sqlx::query("INSERT INTO tags (slug, name) VALUES (?, ?)")
            .bind(slug)
            .bind(name)
            .execute(pool.as_sqlite().unwrap())
            .await
            .unwrap()
            .last_insert_rowid()
    }

    async fn tag_ids_of(pool: &DynDatabasePool, post_id: i64) -> Vec<i64> {
        let rows: Vec<(i64,)> = sqlx::query_as("SELECT tag_id FROM post_tags WHERE post_id = ? ORDER BY tag_id")
            .bind(post_id)
            .fetch_all(pool.as_sqlite().unwrap())
            .await
            .unwrap();
        rows.into_iter().map(|(id,)| id).collect()
    }

    fn named(name: &str) -> Tag {
        Tag::new(name.to_string(), name.to_string())
    }

    #[tokio::test]
    async fn test_create_reuses_and_creates_named_tags() {
        let (pool, repo) = setup_test_repo().await;
        let rust = insert_tag(&pool, "rust", "rust").await;

        let tags = PostTags::new(vec![rust], vec![named("rust"), named("web")]);
        let post = repo.create(&test_post("tagged", 2024, 1, 1), &tags).await.unwrap();

        assert_eq!(tag_ids_of(&pool, post.id).await.len(), 2);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM tags").await, 2);
    }

    #[tokio::test]
    async fn test_new_tag_takes_free_slug() {
        let (pool, repo) = setup_test_repo().await;
        insert_tag(&pool, "c", "C").await;

        let tags = PostTags::new(Vec::new(), vec![Tag::new("c".into(), "c!".into())]);
        repo.create(&test_post("p", 2024, 1, 1), &tags).await.unwrap();

        let (slug,): (String,) = sqlx::query_as("SELECT slug FROM tags WHERE name = 'c!'")
            .fetch_one(pool.as_sqlite().unwrap())
            .await
            .unwrap();
        assert_eq!(slug, "c-2");
    }

    #[tokio::test]
    async fn test_failed_tagging_rolls_back_create() {
        let (pool, repo) = setup_test_repo().await;

        let tags = PostTags::new(vec![999], vec![named("fresh")]);
        let err = repo
            .create(&test_post("doomed", 2024, 1, 1), &tags)
            .await
            .unwrap_err();

        assert!(is_foreign_key_violation(&err));
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM posts").await, 0);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM tags").await, 0);
    }

    #[tokio::test]
    async fn test_failed_retag_keeps_previous_post() {
        let (pool, repo) = setup_test_repo().await;
        let a = insert_tag(&pool, "a", "a").await;
        let mut post = repo
            .create(&test_post("Draft", 2024, 1, 1), &PostTags::new(vec![a], Vec::new()))
            .await
            .unwrap();

        post.title = "Final".to_string();
        let result = repo
            .update(&post, Some(&PostTags::new(vec![999], vec![named("b")])))
            .await;
        assert!(result.is_err());

        assert_eq!(repo.get_by_id(post.id).await.unwrap().unwrap().title, "Draft");
        assert_eq!(tag_ids_of(&pool, post.id).await, vec![a]);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM tags").await, 1);
    }

    #[tokio::test]
    async fn test_update_without_tags_keeps_links() {
        let (pool, repo) = setup_test_repo().await;
        let a = insert_tag(&pool, "a", "a").await;
        let post = repo
            .create(&test_post("p", 2024, 1, 1), &PostTags::new(vec![a], Vec::new()))
            .await
            .unwrap();

        repo.update(&post, None).await.unwrap();
        assert_eq!(tag_ids_of(&pool, post.id).await, vec![a]);

        repo.update(&post, Some(&PostTags::default())).await.unwrap();
        assert!(tag_ids_of(&pool, post.id).await.is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        /// Whatever sets were applied before, the last one given is the
        /// post's exact tag set. Dropping a tag and adding it back matches
        /// never dropping it.
        #[test]
        fn last_tag_set_wins(
            history in proptest::collection::vec(proptest::collection::vec(0usize..3, 0..5), 0..8),
            last in proptest::collection::vec(0usize..3, 0..5),
        ) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let (pool, repo) = setup_test_repo().await;
                let mut ids = Vec::new();
                for name in ["a", "b", "c"] {
                    ids.push(insert_tag(&pool, name, name).await);
                }
                let pick = |idx: &[usize]| PostTags::new(idx.iter().map(|i| ids[*i]).collect(), Vec::new());

                let post = repo
                    .create(&test_post("p", 2024, 1, 1), &PostTags::default())
                    .await
                    .unwrap();
                for set in &history {
                    repo.update(&post, Some(&pick(set.as_slice()))).await.unwrap();
                }
                repo.update(&post, Some(&pick(last.as_slice()))).await.unwrap();

                let mut expected: Vec<i64> = last.iter().map(|i| ids[*i]).collect();
                expected.sort();
                expected.dedup();
                assert_eq!(tag_ids_of(&pool, post.id).await, expected);
            });
        }
    }
}
