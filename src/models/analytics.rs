//! Analytics records
//!
//! `PostViewStat` is the per-(date, post) aggregate written by the daily job.
//! The other types are dashboard read models.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::TagWithCount;

/// Views of one post on one day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostViewStat {
    pub stat_date: NaiveDate,
    pub post_id: i64,
    pub views: i64,
}

/// Site-wide engagement for one day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStat {
    pub stat_date: NaiveDate,
    pub views: i64,
    pub comments: i64,
    pub cumulative_views: i64,
    pub cumulative_comments: i64,
}

/// Outcome of one run of the daily job
#[derive(Debug, Clone, Serialize)]
pub struct DailyRunReport {
    pub date: NaiveDate,
    /// Posts with at least one view that day
    pub posts: usize,
    /// Tags with at least one view that day
    pub tags: usize,
    pub views: i64,
    pub comments: i64,
    pub finished_at: DateTime<Utc>,
}

/// A post ranked by lifetime views
#[derive(Debug, Clone, Serialize)]
pub struct PostRanking {
    pub post_id: i64,
    pub title: String,
    pub view_count: i64,
}

/// A tag ranked by lifetime views
#[derive(Debug, Clone, Serialize)]
pub struct TagRanking {
    pub tag_id: i64,
    pub name: String,
    pub view_count: i64,
}

/// Everything the admin dashboard shows
#[derive(Debug, Clone, Serialize)]
pub struct Dashboard {
    pub top_posts: Vec<PostRanking>,
    pub top_tags: Vec<TagRanking>,
    /// Tags by number of posts
    pub tag_popularity: Vec<TagWithCount>,
    /// Oldest first
    pub daily: Vec<DailyStat>,
}
