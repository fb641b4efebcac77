//! Cron-style scheduler for the daily analytics job (tokio-cron-scheduler).

use std::sync::Arc;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::services::AnalyticsService;

/// In-process job scheduler
pub struct Scheduler {
    inner: JobScheduler,
}

impl Scheduler {
    pub async fn new() -> Result<Self, JobSchedulerError> {
        let inner = JobScheduler::new().await?;
        Ok(Self { inner })
    }

    /// Register the daily analytics job.
    ///
    /// `schedule` is a six-field cron expression (seconds first), e.g.
    /// `0 5 0 * * *` for 00:05:00 UTC. Each run aggregates yesterday.
    /// Failures are logged by the service; the next tick runs normally.
    pub async fn add_daily_analytics(
        &self,
        schedule: &str,
        analytics: Arc<AnalyticsService>,
    ) -> Result<uuid::Uuid, JobSchedulerError> {
        let job = Job::new_async(schedule, move |_uuid, _lock| {
            let analytics = analytics.clone();
            Box::pin(async move {
                if let Ok(report) = analytics.run_for_yesterday().await {
                    tracing::info!(
                        date = %report.date,
                        views = report.views,
                        "Scheduled daily analytics finished"
                    );
                }
            })
        })?;

        let id = self.inner.add(job).await?;
        tracing::info!(schedule = %schedule, job_id = %id, "Daily analytics job registered");
        Ok(id)
    }

    pub async fn start(&self) -> Result<(), JobSchedulerError> {
        self.inner.start().await?;
        tracing::info!("Scheduler started");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), JobSchedulerError> {
        self.inner.shutdown().await?;
        tracing::info!("Scheduler stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxAnalyticsRepository, SqlxPostRepository, SqlxTagRepository};
    use crate::db::{create_test_pool, migrations};

    async fn analytics() -> Arc<AnalyticsService> {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        Arc::new(AnalyticsService::new(
            SqlxAnalyticsRepository::boxed(pool.clone()),
            SqlxPostRepository::boxed(pool.clone()),
            SqlxTagRepository::boxed(pool),
        ))
    }

    #[tokio::test]
    async fn test_register_daily_job() {
        let scheduler = Scheduler::new().await.unwrap();
        tokio_test::assert_ok!(scheduler.add_daily_analytics("0 5 0 * * *", analytics().await).await);
    }

    #[tokio::test]
    async fn test_invalid_schedule_rejected() {
        let scheduler = Scheduler::new().await.unwrap();
        assert!(scheduler
            .add_daily_analytics("every day please", analytics().await)
            .await
            .is_err());
    }
}
