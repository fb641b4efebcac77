//! Manage the admin account from the shell.
//!
//! ```text
//! admin create --username me --password 's3cret'
//! admin remove --username me
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use codex::config::Config;
use codex::db::{self, repositories::{SqlxSessionRepository, SqlxUserRepository}};
use codex::services::UserService;

#[derive(Parser, Debug)]
#[command(name = "admin", version, about = "Codex admin account management", long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, env = "CODEX_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the admin, or reset its password if it exists
    Create {
        #[arg(long)]
        username: String,
        /// Read from the environment when omitted
        #[arg(long, env = "CODEX_ADMIN_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Delete an account and its sessions
    Remove {
        #[arg(long)]
        username: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "codex=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(Config::default_path);
    let config = Config::load_with_env(&config_path)?;

    let pool = db::create_pool(&config.database).await?;
    db::migrations::run_migrations(&pool).await?;

    let users = UserService::new(
        SqlxUserRepository::boxed(pool.clone()),
        SqlxSessionRepository::boxed(pool.clone()),
    );

    let outcome = match cli.command {
        Command::Create { username, password } => users
            .ensure_admin(&username, &password)
            .await
            .map(|user| println!("Admin '{}' ready (id {})", user.username, user.id)),
        Command::Remove { username } => users
            .remove_user(&username)
            .await
            .map(|()| println!("Removed '{}'", username)),
    };
    pool.close().await;

    outcome?;
    Ok(())
}
