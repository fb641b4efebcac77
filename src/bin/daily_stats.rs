//! Daily analytics batch job.
//!
//! Aggregates one UTC day of post views into the daily tables. Meant to be
//! run from cron shortly after midnight:
//!
//! ```text
//! 5 0 * * * daily-stats
//! daily-stats --date 2024-05-01
//! ```
//!
//! Re-running a date replaces that date's rows.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Result};
use chrono::{NaiveDate, Utc};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use codex::config::Config;
use codex::db::{self, repositories::{SqlxAnalyticsRepository, SqlxPostRepository, SqlxTagRepository}};
use codex::models::parse_post_date;
use codex::services::{analytics::yesterday, AnalyticsService};

#[derive(Parser, Debug)]
#[command(name = "daily-stats", version, about = "Aggregate one day of blog analytics", long_about = None)]
struct Cli {
    /// Day to aggregate (YYYY-MM-DD); defaults to yesterday in UTC
    #[arg(long)]
    date: Option<String>,

    /// Path to the configuration file
    #[arg(long, env = "CODEX_CONFIG")]
    config: Option<PathBuf>,
}

fn target_date(raw: Option<&str>) -> Result<NaiveDate> {
    let date = match raw {
        Some(raw) => match parse_post_date(raw) {
            Some(date) => date,
            None => bail!("Invalid date '{}', expected YYYY-MM-DD", raw),
        },
        None => yesterday()?,
    };
    if date > Utc::now().date_naive() {
        bail!("Cannot aggregate {}: the date is in the future", date);
    }
    Ok(date)
}

async fn run(cli: Cli) -> Result<()> {
    let date = target_date(cli.date.as_deref())?;

    let config_path = cli.config.unwrap_or_else(Config::default_path);
    let config = Config::load_with_env(&config_path)?;

    let pool = db::create_pool(&config.database).await?;
    db::migrations::run_migrations(&pool).await?;

    let analytics = AnalyticsService::new(
        SqlxAnalyticsRepository::boxed(pool.clone()),
        SqlxPostRepository::boxed(pool.clone()),
        SqlxTagRepository::boxed(pool.clone()),
    );

    let report = analytics.run_for_date(date).await;
    pool.close().await;
    let report = report?;
    tracing::info!(
        date = %report.date,
        posts = report.posts,
        tags = report.tags,
        views = report.views,
        comments = report.comments,
        "Daily analytics finished"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "codex=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("daily-stats failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
