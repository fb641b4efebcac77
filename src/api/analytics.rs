//! Analytics API endpoints (admin)
//!
//! - GET /api/v1/analytics/dashboard - Rankings and the daily series
//! - GET /api/v1/analytics/posts/{id} - Per-day views of one post
//! - POST /api/v1/analytics/run?date=YYYY-MM-DD - Run the daily job now

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::models::{parse_post_date, DailyRunReport, Dashboard, PostViewStat};

/// Query parameters for a manual run
#[derive(Debug, Deserialize)]
pub struct RunQuery {
    /// Day to aggregate; yesterday when omitted
    pub date: Option<String>,
}

pub async fn dashboard(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
) -> Result<Json<Dashboard>, ApiError> {
    Ok(Json(state.analytics_service.dashboard().await?))
}

pub async fn post_stats(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<Json<Vec<PostViewStat>>, ApiError> {
    Ok(Json(state.analytics_service.post_stats(id).await?))
}

pub async fn run_job(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Query(query): Query<RunQuery>,
) -> Result<Json<DailyRunReport>, ApiError> {
    let report = match query.date.as_deref() {
        Some(raw) => {
            let date = parse_post_date(raw).ok_or_else(|| {
                ApiError::validation_error(format!("Invalid date '{}', expected YYYY-MM-DD", raw))
            })?;
            tracing::info!("Daily analytics for {} triggered by '{}'", date, user.0.username);
            state.analytics_service.run_for_date(date).await?
        }
        None => state.analytics_service.run_for_yesterday().await?,
    };
    Ok(Json(report))
}
