//! Analytics repository
//!
//! Writes the per-day aggregates computed from raw `post_views` events and
//! serves the dashboard reads. `run_for_date` replaces a day's rows inside a
//! single transaction, so a re-run yields the same rows as the first run.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

use crate::config::DatabaseDriver;
use crate::db::pool::{mysql, sqlite};
use crate::db::DynDatabasePool;
use crate::models::{DailyStat, PostRanking, PostViewStat, TagRanking};

/// What one run of the daily aggregation wrote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayTotals {
    pub posts: u64,
    pub tags: u64,
    pub views: i64,
    pub comments: i64,
}

#[async_trait]
pub trait AnalyticsRepository: Send + Sync {
    /// Recompute and overwrite every aggregate for `date`
    async fn run_for_date(&self, date: NaiveDate, computed_at: DateTime<Utc>) -> Result<DayTotals>;

    /// Posts with the most lifetime views
    async fn top_posts(&self, limit: i64) -> Result<Vec<PostRanking>>;

    /// Tags with the most lifetime views
    async fn top_tags(&self, limit: i64) -> Result<Vec<TagRanking>>;

    /// The most recent `days` daily rows, oldest first
    async fn recent_daily(&self, days: i64) -> Result<Vec<DailyStat>>;

    /// Per-day views of one post, oldest first
    async fn post_stats(&self, post_id: i64) -> Result<Vec<PostViewStat>>;
}

pub struct SqlxAnalyticsRepository {
    pool: DynDatabasePool,
}

impl SqlxAnalyticsRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn AnalyticsRepository> {
        Arc::new(Self::new(pool))
    }
}

/// `[date 00:00, date+1 00:00)` in UTC
pub(crate) fn day_window(date: NaiveDate) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let next = date
        .checked_add_days(Days::new(1))
        .with_context(|| format!("Date out of range: {}", date))?;
    Ok((
        date.and_time(NaiveTime::MIN).and_utc(),
        next.and_time(NaiveTime::MIN).and_utc(),
    ))
}

const DELETE_POST_STATS: &str = "DELETE FROM post_view_stats WHERE stat_date = ?";
const INSERT_POST_STATS: &str = r#"
    INSERT INTO post_view_stats (stat_date, post_id, views, computed_at)
    SELECT ?, post_id, COUNT(*), ?
    FROM post_views
    WHERE viewed_at >= ? AND viewed_at < ?
    GROUP BY post_id
"#;
const DELETE_TAG_STATS: &str = "DELETE FROM tag_view_stats WHERE stat_date = ?";
const INSERT_TAG_STATS: &str = r#"
    INSERT INTO tag_view_stats (stat_date, tag_id, views, computed_at)
    SELECT ?, pt.tag_id, COUNT(*), ?
    FROM post_views v
    INNER JOIN post_tags pt ON pt.post_id = v.post_id
    WHERE v.viewed_at >= ? AND v.viewed_at < ?
    GROUP BY pt.tag_id
"#;
const COUNT_VIEWS: &str = "SELECT COUNT(*) FROM post_views WHERE viewed_at >= ? AND viewed_at < ?";
const COUNT_COMMENTS: &str = "SELECT COUNT(*) FROM comments WHERE created_at >= ? AND created_at < ?";
const PREVIOUS_TOTALS: &str = r#"
    SELECT cumulative_views, cumulative_comments FROM daily_stats
    WHERE stat_date < ? ORDER BY stat_date DESC LIMIT 1
"#;
const DELETE_DAILY: &str = "DELETE FROM daily_stats WHERE stat_date = ?";
const INSERT_DAILY: &str = r#"
    INSERT INTO daily_stats (stat_date, views, comments, cumulative_views, cumulative_comments, computed_at)
    VALUES (?, ?, ?, ?, ?, ?)
"#;

const SELECT_TOP_POSTS: &str =
    "SELECT id, title, view_count FROM posts ORDER BY view_count DESC, id ASC LIMIT ?";
const SELECT_TOP_TAGS: &str =
    "SELECT id, name, view_count FROM tags ORDER BY view_count DESC, name ASC LIMIT ?";
const DAILY_COLUMNS: &str =
    "stat_date, views, comments, cumulative_views, cumulative_comments";

#[async_trait]
impl AnalyticsRepository for SqlxAnalyticsRepository {
    async fn run_for_date(&self, date: NaiveDate, computed_at: DateTime<Utc>) -> Result<DayTotals> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => run_for_date_sqlite(sqlite(&self.pool)?, date, computed_at).await,
            DatabaseDriver::Mysql => run_for_date_mysql(mysql(&self.pool)?, date, computed_at).await,
        }
    }

    async fn top_posts(&self, limit: i64) -> Result<Vec<PostRanking>> {
        let rankings = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(SELECT_TOP_POSTS)
                .bind(limit)
                .fetch_all(sqlite(&self.pool)?)
                .await
                .context("Failed to rank posts")?
                .into_iter()
                .map(|row| PostRanking {
                    post_id: row.get("id"),
                    title: row.get("title"),
                    view_count: row.get("view_count"),
                })
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(SELECT_TOP_POSTS)
                .bind(limit)
                .fetch_all(mysql(&self.pool)?)
                .await
                .context("Failed to rank posts")?
                .into_iter()
                .map(|row| PostRanking {
                    post_id: row.get("id"),
                    title: row.get("title"),
                    view_count: row.get("view_count"),
                })
                .collect(),
        };
        Ok(rankings)
    }

    async fn top_tags(&self, limit: i64) -> Result<Vec<TagRanking>> {
        let rankings = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(SELECT_TOP_TAGS)
                .bind(limit)
                .fetch_all(sqlite(&self.pool)?)
                .await
                .context("Failed to rank tags")?
                .into_iter()
                .map(|row| TagRanking {
                    tag_id: row.get("id"),
                    name: row.get("name"),
                    view_count: row.get("view_count"),
                })
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(SELECT_TOP_TAGS)
                .bind(limit)
                .fetch_all(mysql(&self.pool)?)
                .await
                .context("Failed to rank tags")?
                .into_iter()
                .map(|row| TagRanking {
                    tag_id: row.get("id"),
                    name: row.get("name"),
                    view_count: row.get("view_count"),
                })
                .collect(),
        };
        Ok(rankings)
    }

    async fn recent_daily(&self, days: i64) -> Result<Vec<DailyStat>> {
        let sql = format!(
            "SELECT {} FROM daily_stats ORDER BY stat_date DESC LIMIT ?",
            DAILY_COLUMNS
        );
        let mut rows: Vec<DailyStat> = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(days)
                .fetch_all(sqlite(&self.pool)?)
                .await
                .context("Failed to list daily stats")?
                .iter()
                .map(row_to_daily_sqlite)
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(days)
                .fetch_all(mysql(&self.pool)?)
                .await
                .context("Failed to list daily stats")?
                .iter()
                .map(row_to_daily_mysql)
                .collect(),
        };
        rows.reverse();
        Ok(rows)
    }

    async fn post_stats(&self, post_id: i64) -> Result<Vec<PostViewStat>> {
        let sql = "SELECT stat_date, post_id, views FROM post_view_stats WHERE post_id = ? ORDER BY stat_date ASC";
        let stats = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(post_id)
                .fetch_all(sqlite(&self.pool)?)
                .await
                .context("Failed to get post stats")?
                .into_iter()
                .map(|row| PostViewStat {
                    stat_date: row.get("stat_date"),
                    post_id: row.get("post_id"),
                    views: row.get("views"),
                })
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(post_id)
                .fetch_all(mysql(&self.pool)?)
                .await
                .context("Failed to get post stats")?
                .into_iter()
                .map(|row| PostViewStat {
                    stat_date: row.get("stat_date"),
                    post_id: row.get("post_id"),
                    views: row.get("views"),
                })
                .collect(),
        };
        Ok(stats)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn run_for_date_sqlite(
    pool: &SqlitePool,
    date: NaiveDate,
    computed_at: DateTime<Utc>,
) -> Result<DayTotals> {
    let (start, end) = day_window(date)?;
    let mut tx = pool.begin().await.context("Failed to begin analytics transaction")?;

    sqlx::query(DELETE_POST_STATS)
        .bind(date)
        .execute(&mut *tx)
        .await
        .context("Failed to clear post stats")?;
    let posts = sqlx::query(INSERT_POST_STATS)
        .bind(date)
        .bind(computed_at)
        .bind(start)
        .bind(end)
        .execute(&mut *tx)
        .await
        .context("Failed to aggregate post views")?
        .rows_affected();

    sqlx::query(DELETE_TAG_STATS)
        .bind(date)
        .execute(&mut *tx)
        .await
        .context("Failed to clear tag stats")?;
    let tags = sqlx::query(INSERT_TAG_STATS)
        .bind(date)
        .bind(computed_at)
        .bind(start)
        .bind(end)
        .execute(&mut *tx)
        .await
        .context("Failed to aggregate tag views")?
        .rows_affected();

    let (views,): (i64,) = sqlx::query_as(COUNT_VIEWS)
        .bind(start)
        .bind(end)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to count views")?;
    let (comments,): (i64,) = sqlx::query_as(COUNT_COMMENTS)
        .bind(start)
        .bind(end)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to count comments")?;
    let (prev_views, prev_comments): (i64, i64) = sqlx::query_as(PREVIOUS_TOTALS)
        .bind(date)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to read previous totals")?
        .unwrap_or((0, 0));

    sqlx::query(DELETE_DAILY)
        .bind(date)
        .execute(&mut *tx)
        .await
        .context("Failed to clear daily stats")?;
    sqlx::query(INSERT_DAILY)
        .bind(date)
        .bind(views)
        .bind(comments)
        .bind(prev_views + views)
        .bind(prev_comments + comments)
        .bind(computed_at)
        .execute(&mut *tx)
        .await
        .context("Failed to write daily stats")?;

    tx.commit().await.context("Failed to commit analytics transaction")?;

    Ok(DayTotals { posts, tags, views, comments })
}

fn row_to_daily_sqlite(row: &sqlx::sqlite::SqliteRow) -> DailyStat {
    DailyStat {
        stat_date: row.get("stat_date"),
        views: row.get("views"),
        comments: row.get("comments"),
        cumulative_views: row.get("cumulative_views"),
        cumulative_comments: row.get("cumulative_comments"),
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn run_for_date_mysql(
    pool: &MySqlPool,
    date: NaiveDate,
    computed_at: DateTime<Utc>,
) -> Result<DayTotals> {
    let (start, end) = day_window(date)?;
    let mut tx = pool.begin().await.context("Failed to begin analytics transaction")?;

    sqlx::query(DELETE_POST_STATS)
        .bind(date)
        .execute(&mut *tx)
        .await
        .context("Failed to clear post stats")?;
    let posts = sqlx::query(INSERT_POST_STATS)
        .bind(date)
        .bind(computed_at)
        .bind(start)
        .bind(end)
        .execute(&mut *tx)
        .await
        .context("Failed to aggregate post views")?
        .rows_affected();

    sqlx::query(DELETE_TAG_STATS)
        .bind(date)
        .execute(&mut *tx)
        .await
        .context("Failed to clear tag stats")?;
    let tags = sqlx::query(INSERT_TAG_STATS)
        .bind(date)
        .bind(computed_at)
        .bind(start)
        .bind(end)
        .execute(&mut *tx)
        .await
        .context("Failed to aggregate tag views")?
        .rows_affected();

    let (views,): (i64,) = sqlx::query_as(COUNT_VIEWS)
        .bind(start)
        .bind(end)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to count views")?;
    let (comments,): (i64,) = sqlx::query_as(COUNT_COMMENTS)
        .bind(start)
        .bind(end)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to count comments")?;
    let (prev_views, prev_comments): (i64, i64) = sqlx::query_as(PREVIOUS_TOTALS)
        .bind(date)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to read previous totals")?
        .unwrap_or((0, 0));

    sqlx::query(DELETE_DAILY)
        .bind(date)
        .execute(&mut *tx)
        .await
        .context("Failed to clear daily stats")?;
    sqlx::query(INSERT_DAILY)
        .bind(date)
        .bind(views)
        .bind(comments)
        .bind(prev_views + views)
        .bind(prev_comments + comments)
        .bind(computed_at)
        .execute(&mut *tx)
        .await
        .context("Failed to write daily stats")?;

    tx.commit().await.context("Failed to commit analytics transaction")?;

    Ok(DayTotals { posts, tags, views, comments })
}

fn row_to_daily_mysql(row: &sqlx::mysql::MySqlRow) -> DailyStat {
    DailyStat {
        stat_date: row.get("stat_date"),
        views: row.get("views"),
        comments: row.get("comments"),
        cumulative_views: row.get("cumulative_views"),
        cumulative_comments: row.get("cumulative_comments"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};
    use chrono::{Duration, TimeZone};

    async fn setup() -> (DynDatabasePool, SqlxAnalyticsRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        (pool.clone(), SqlxAnalyticsRepository::new(pool))
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn at(d: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, d, hour, 0, 0).unwrap()
    }

    async fn insert_post(pool: &DynDatabasePool, title: &str) -> i64 {
        sqlx::query(
            "INSERT INTO posts (title, content, content_html, date) VALUES (?, 'c', 'c', '2024-03-01')",
        )
        .bind(title)
        .execute(pool.as_sqlite().unwrap())
        .await
        .unwrap()
        .last_insert_rowid()
    }

    async fn insert_tag(pool: &DynDatabasePool, post_id: i64, name: &str) -> i64 {
        let tag_id = sqlx::query("INSERT INTO tags (slug, name) VALUES (?, ?)")
            .bind(name)
            .bind(name)
            .execute(pool.as_sqlite().unwrap())
            .await
            .unwrap()
            .last_insert_rowid();
        sqlx::query("INSERT INTO post_tags (post_id, tag_id) VALUES (?, ?)")
            .bind(post_id)
            .bind(tag_id)
            .execute(pool.as_sqlite().unwrap())
            .await
            .unwrap();
        tag_id
    }

    async fn insert_view(pool: &DynDatabasePool, post_id: i64, viewed_at: DateTime<Utc>) {
        sqlx::query("INSERT INTO post_views (post_id, viewed_at) VALUES (?, ?)")
            .bind(post_id)
            .bind(viewed_at)
            .execute(pool.as_sqlite().unwrap())
            .await
            .unwrap();
    }

    #[test]
    fn test_day_window_spans_one_utc_day() {
        let (start, end) = day_window(day(31)).unwrap();
        assert_eq!(start, at(31, 0));
        assert_eq!(end - start, Duration::days(1));
    }

    #[tokio::test]
    async fn test_run_counts_views_inside_window_only() {
        let (pool, repo) = setup().await;
        let post = insert_post(&pool, "Hello").await;
        insert_view(&pool, post, at(4, 23)).await;
        insert_view(&pool, post, at(5, 0)).await;
        insert_view(&pool, post, at(5, 12)).await;
        insert_view(&pool, post, at(6, 0)).await;

        let totals = repo.run_for_date(day(5), Utc::now()).await.unwrap();
        assert_eq!(totals.posts, 1);
        assert_eq!(totals.views, 2);

        let stats = repo.post_stats(post).await.unwrap();
        assert_eq!(stats, vec![PostViewStat { stat_date: day(5), post_id: post, views: 2 }]);
    }

    #[tokio::test]
    async fn test_rerun_replaces_rows() {
        let (pool, repo) = setup().await;
        let post = insert_post(&pool, "Hello").await;
        let tag = insert_tag(&pool, post, "intro").await;
        insert_view(&pool, post, at(5, 9)).await;
        insert_view(&pool, post, at(5, 10)).await;

        let first = repo.run_for_date(day(5), Utc::now()).await.unwrap();
        let second = repo.run_for_date(day(5), Utc::now()).await.unwrap();
        assert_eq!(first, second);

        assert_eq!(repo.post_stats(post).await.unwrap()[0].views, 2);
        let tags: Vec<(i64, i64)> =
            sqlx::query_as("SELECT tag_id, views FROM tag_view_stats WHERE stat_date = ?")
                .bind(day(5))
                .fetch_all(pool.as_sqlite().unwrap())
                .await
                .unwrap();
        assert_eq!(tags, vec![(tag, 2)]);

        let daily = repo.recent_daily(30).await.unwrap();
        assert_eq!(daily.len(), 1);
        assert_eq!(daily[0].views, 2);
        assert_eq!(daily[0].cumulative_views, 2);
    }

    #[tokio::test]
    async fn test_cumulative_totals_build_on_previous_day() {
        let (pool, repo) = setup().await;
        let post = insert_post(&pool, "Hello").await;
        insert_view(&pool, post, at(5, 9)).await;
        insert_view(&pool, post, at(6, 9)).await;
        insert_view(&pool, post, at(6, 10)).await;
        sqlx::query("INSERT INTO comments (post_id, author, title, content, created_at) VALUES (?, 'a', 't', 'c', ?)")
            .bind(post)
            .bind(at(6, 11))
            .execute(pool.as_sqlite().unwrap())
            .await
            .unwrap();

        repo.run_for_date(day(5), Utc::now()).await.unwrap();
        repo.run_for_date(day(6), Utc::now()).await.unwrap();

        let daily = repo.recent_daily(30).await.unwrap();
        assert_eq!(daily.len(), 2);
        assert_eq!(daily[0].stat_date, day(5));
        assert_eq!(daily[1].views, 2);
        assert_eq!(daily[1].comments, 1);
        assert_eq!(daily[1].cumulative_views, 3);
        assert_eq!(daily[1].cumulative_comments, 1);
    }

    #[tokio::test]
    async fn test_run_for_empty_day_writes_zero_row() {
        let (_pool, repo) = setup().await;
        let totals = repo.run_for_date(day(1), Utc::now()).await.unwrap();
        assert_eq!(totals, DayTotals { posts: 0, tags: 0, views: 0, comments: 0 });
        let daily = repo.recent_daily(30).await.unwrap();
        assert_eq!(daily.len(), 1);
        assert_eq!(daily[0].stat_date, day(1));
        assert_eq!(daily[0].views, 0);
    }

    #[tokio::test]
    async fn test_top_posts_and_tags() {
        let (pool, repo) = setup().await;
        let quiet = insert_post(&pool, "Quiet").await;
        let busy = insert_post(&pool, "Busy").await;
        insert_tag(&pool, busy, "rust").await;
        sqlx::query("UPDATE posts SET view_count = 9 WHERE id = ?")
            .bind(busy)
            .execute(pool.as_sqlite().unwrap())
            .await
            .unwrap();
        sqlx::query("UPDATE tags SET view_count = 9")
            .execute(pool.as_sqlite().unwrap())
            .await
            .unwrap();

        let posts = repo.top_posts(5).await.unwrap();
        assert_eq!(posts[0].post_id, busy);
        assert_eq!(posts[1].post_id, quiet);

        let tags = repo.top_tags(5).await.unwrap();
        assert_eq!(tags[0].name, "rust");
        assert_eq!(tags[0].view_count, 9);
    }
}
