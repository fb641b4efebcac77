//! Database layer
//!
//! Supports SQLite (the default, a single file next to the binary) and MySQL.
//! The driver is picked from `database.driver` in the configuration.
//!
//! # Usage
//!
//! ```ignore
//! use codex::config::DatabaseConfig;
//! use codex::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
};

/// The database error behind `err`, if any
fn database_error(err: &anyhow::Error) -> Option<&(dyn sqlx::error::DatabaseError + 'static)> {
    err.chain().find_map(|cause| match cause.downcast_ref::<sqlx::Error>() {
        Some(sqlx::Error::Database(db)) => Some(&**db),
        _ => None,
    })
}

/// Whether a UNIQUE constraint rejected the statement
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    database_error(err).is_some_and(|db| db.is_unique_violation())
}

/// Whether a FOREIGN KEY constraint rejected the statement
pub fn is_foreign_key_violation(err: &anyhow::Error) -> bool {
    database_error(err).is_some_and(|db| db.is_foreign_key_violation())
}

pub(crate) fn sqlx_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[tokio::test]
    async fn test_constraint_violations_are_recognised() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let sqlite = pool.as_sqlite().unwrap();

        sqlx::query("INSERT INTO tags (slug, name) VALUES ('a', 'a')")
            .execute(sqlite)
            .await
            .unwrap();
        let duplicate = sqlx::query("INSERT INTO tags (slug, name) VALUES ('b', 'a')")
            .execute(sqlite)
            .await
            .context("Failed to create tag")
            .unwrap_err();
        assert!(is_unique_violation(&duplicate));
        assert!(!is_foreign_key_violation(&duplicate));

        let dangling = sqlx::query("INSERT INTO post_tags (post_id, tag_id) VALUES (999, 999)")
            .execute(sqlite)
            .await
            .context("Failed to tag post")
            .unwrap_err();
        assert!(is_foreign_key_violation(&dangling));
        assert!(!is_unique_violation(&dangling));

        assert!(!is_unique_violation(&anyhow::anyhow!("plain")));
    }
}
