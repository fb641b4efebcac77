//! Analytics service
//!
//! Runs the daily aggregation and assembles the admin dashboard. The job
//! recomputes a day from raw view events, so running it twice for the same
//! date leaves the same rows behind.

use crate::db::repositories::{AnalyticsRepository, PostRepository, TagRepository};
use crate::models::{DailyRunReport, Dashboard, PostViewStat};
use anyhow::Context;
use chrono::{Days, NaiveDate, Utc};
use std::sync::Arc;

/// How many posts and tags the dashboard ranks
pub const DASHBOARD_TOP_N: i64 = 5;

/// Default number of daily rows on the dashboard
const DEFAULT_DASHBOARD_DAYS: i64 = 30;

#[derive(Debug, thiserror::Error)]
pub enum AnalyticsServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct AnalyticsService {
    repo: Arc<dyn AnalyticsRepository>,
    post_repo: Arc<dyn PostRepository>,
    tag_repo: Arc<dyn TagRepository>,
    dashboard_days: i64,
}

impl AnalyticsService {
    pub fn new(
        repo: Arc<dyn AnalyticsRepository>,
        post_repo: Arc<dyn PostRepository>,
        tag_repo: Arc<dyn TagRepository>,
    ) -> Self {
        Self {
            repo,
            post_repo,
            tag_repo,
            dashboard_days: DEFAULT_DASHBOARD_DAYS,
        }
    }

    pub fn with_dashboard_days(mut self, days: i64) -> Self {
        self.dashboard_days = days.max(1);
        self
    }

    /// Aggregate one UTC day.
    ///
    /// Everything is written in one transaction; on failure nothing is
    /// written and the error is logged and returned.
    pub async fn run_for_date(&self, date: NaiveDate) -> Result<DailyRunReport, AnalyticsServiceError> {
        let today = Utc::now().date_naive();
        if date > today {
            return Err(AnalyticsServiceError::ValidationError(format!(
                "Cannot aggregate a future date: {}",
                date
            )));
        }

        let finished_at = Utc::now();
        let totals = match self.repo.run_for_date(date, finished_at).await {
            Ok(totals) => totals,
            Err(e) => {
                tracing::error!("Daily analytics for {} failed: {:#}", date, e);
                return Err(AnalyticsServiceError::InternalError(e));
            }
        };

        tracing::info!(
            "Daily analytics for {}: {} view(s) over {} post(s) and {} tag(s), {} comment(s)",
            date,
            totals.views,
            totals.posts,
            totals.tags,
            totals.comments
        );

        Ok(DailyRunReport {
            date,
            posts: totals.posts as usize,
            tags: totals.tags as usize,
            views: totals.views,
            comments: totals.comments,
            finished_at,
        })
    }

    /// Aggregate the UTC day before today
    pub async fn run_for_yesterday(&self) -> Result<DailyRunReport, AnalyticsServiceError> {
        self.run_for_date(yesterday()?).await
    }

    pub async fn dashboard(&self) -> Result<Dashboard, AnalyticsServiceError> {
        let top_posts = self
            .repo
            .top_posts(DASHBOARD_TOP_N)
            .await
            .context("Failed to rank posts")?;
        let top_tags = self
            .repo
            .top_tags(DASHBOARD_TOP_N)
            .await
            .context("Failed to rank tags")?;

        let mut tag_popularity = self
            .tag_repo
            .list_with_counts()
            .await
            .context("Failed to count posts per tag")?;
        tag_popularity.sort_by(|a, b| {
            b.post_count
                .cmp(&a.post_count)
                .then_with(|| a.tag.name.cmp(&b.tag.name))
        });

        let daily = self
            .repo
            .recent_daily(self.dashboard_days)
            .await
            .context("Failed to load daily stats")?;

        Ok(Dashboard {
            top_posts,
            top_tags,
            tag_popularity,
            daily,
        })
    }

    /// Per-day views of one post, oldest first
    pub async fn post_stats(&self, post_id: i64) -> Result<Vec<PostViewStat>, AnalyticsServiceError> {
        if self
            .post_repo
            .get_by_id(post_id)
            .await
            .context("Failed to get post")?
            .is_none()
        {
            return Err(AnalyticsServiceError::NotFound(format!("Post with ID {} not found", post_id)));
        }

        let stats = self
            .repo
            .post_stats(post_id)
            .await
            .context("Failed to get post stats")?;
        Ok(stats)
    }
}

/// The UTC date before today
pub fn yesterday() -> anyhow::Result<NaiveDate> {
    Utc::now()
        .date_naive()
        .checked_sub_days(Days::new(1))
        .context("Date out of range")
}
