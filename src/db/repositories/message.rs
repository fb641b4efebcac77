//! Message repository
//!
//! Storage for private guest-to-admin messages.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;

use crate::config::DatabaseDriver;
use crate::db::pool::{mysql, sqlite};
use crate::db::DynDatabasePool;
use crate::models::{ListParams, Message};

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn create(&self, subject: &str, body: &str, contact_info: Option<&str>) -> Result<Message>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Message>>;

    /// Newest first, with the total count
    async fn list(&self, params: &ListParams) -> Result<(Vec<Message>, i64)>;

    async fn mark_read(&self, id: i64) -> Result<()>;

    async fn delete(&self, id: i64) -> Result<bool>;

    async fn count_unread(&self) -> Result<i64>;
}

pub struct SqlxMessageRepository {
    pool: DynDatabasePool,
}

impl SqlxMessageRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn MessageRepository> {
        Arc::new(Self::new(pool))
    }

    async fn execute_by_id(&self, sql: &str, id: i64, what: &'static str) -> Result<u64> {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(id)
                .execute(sqlite(&self.pool)?)
                .await
                .context(what)?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(id)
                .execute(mysql(&self.pool)?)
                .await
                .context(what)?
                .rows_affected(),
        };
        Ok(affected)
    }

    async fn count(&self, sql: &str) -> Result<i64> {
        let (count,): (i64,) = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query_as(sql)
                .fetch_one(sqlite(&self.pool)?)
                .await
                .context("Failed to count messages")?,
            DatabaseDriver::Mysql => sqlx::query_as(sql)
                .fetch_one(mysql(&self.pool)?)
                .await
                .context("Failed to count messages")?,
        };
        Ok(count)
    }
}

macro_rules! row_to_message {
    ($row:expr) => {
        Message {
            id: $row.get("id"),
            subject: $row.get("subject"),
            body: $row.get("body"),
            contact_info: $row.get("contact_info"),
            is_read: $row.get("is_read"),
            created_at: $row.get("created_at"),
        }
    };
}

const SELECT_MESSAGE: &str =
    "SELECT id, subject, body, contact_info, is_read, created_at FROM messages";

#[async_trait]
impl MessageRepository for SqlxMessageRepository {
    async fn create(&self, subject: &str, body: &str, contact_info: Option<&str>) -> Result<Message> {
        let sql = "INSERT INTO messages (subject, body, contact_info, is_read, created_at) VALUES (?, ?, ?, FALSE, ?)";
        let now = Utc::now();
        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(subject)
                .bind(body)
                .bind(contact_info)
                .bind(now)
                .execute(sqlite(&self.pool)?)
                .await
                .context("Failed to create message")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(subject)
                .bind(body)
                .bind(contact_info)
                .bind(now)
                .execute(mysql(&self.pool)?)
                .await
                .context("Failed to create message")?
                .last_insert_id() as i64,
        };

        Ok(Message {
            id,
            subject: subject.to_string(),
            body: body.to_string(),
            contact_info: contact_info.map(str::to_string),
            is_read: false,
            created_at: now,
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Message>> {
        let sql = format!("{} WHERE id = ?", SELECT_MESSAGE);
        let message = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(sqlite(&self.pool)?)
                .await
                .context("Failed to get message")?
                .map(|row| row_to_message!(row)),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(id)
                .fetch_optional(mysql(&self.pool)?)
                .await
                .context("Failed to get message")?
                .map(|row| row_to_message!(row)),
        };
        Ok(message)
    }

    async fn list(&self, params: &ListParams) -> Result<(Vec<Message>, i64)> {
        let sql = format!(
            "{} ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
            SELECT_MESSAGE
        );
        let messages = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(params.limit())
                .bind(params.offset())
                .fetch_all(sqlite(&self.pool)?)
                .await
                .context("Failed to list messages")?
                .into_iter()
                .map(|row| row_to_message!(row))
                .collect(),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(params.limit())
                .bind(params.offset())
                .fetch_all(mysql(&self.pool)?)
                .await
                .context("Failed to list messages")?
                .into_iter()
                .map(|row| row_to_message!(row))
                .collect(),
        };
        let total = self.count("SELECT COUNT(*) FROM messages").await?;
        Ok((messages, total))
    }

    async fn mark_read(&self, id: i64) -> Result<()> {
        self.execute_by_id(
            "UPDATE messages SET is_read = TRUE WHERE id = ?",
            id,
            "Failed to mark message read",
        )
        .await?;
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = self
            .execute_by_id("DELETE FROM messages WHERE id = ?", id, "Failed to delete message")
            .await?;
        Ok(affected > 0)
    }

    async fn count_unread(&self) -> Result<i64> {
        self.count("SELECT COUNT(*) FROM messages WHERE is_read = FALSE").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> SqlxMessageRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxMessageRepository::new(pool)
    }

    #[tokio::test]
    async fn test_create_and_get_message() {
        let repo = setup_test_repo().await;
        let created = repo
            .create("Hi", "Loved the post", Some("ada@example.com"))
            .await
            .unwrap();

        let found = repo.get_by_id(created.id).await.unwrap().expect("Message should exist");
        assert_eq!(found.subject, "Hi");
        assert_eq!(found.contact_info.as_deref(), Some("ada@example.com"));
        assert!(!found.is_read);
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let repo = setup_test_repo().await;
        let first = repo.create("one", "1", None).await.unwrap();
        let second = repo.create("two", "2", None).await.unwrap();

        let (messages, total) = repo.list(&ListParams::new(1, 10)).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(messages[0].id, second.id);
        assert_eq!(messages[1].id, first.id);
    }

    #[tokio::test]
    async fn test_mark_read_and_unread_count() {
        let repo = setup_test_repo().await;
        let message = repo.create("s", "b", None).await.unwrap();
        repo.create("s2", "b2", None).await.unwrap();
        assert_eq!(repo.count_unread().await.unwrap(), 2);

        repo.mark_read(message.id).await.unwrap();
        assert_eq!(repo.count_unread().await.unwrap(), 1);
        assert!(repo.get_by_id(message.id).await.unwrap().unwrap().is_read);
    }

    #[tokio::test]
    async fn test_delete_message() {
        let repo = setup_test_repo().await;
        let message = repo.create("s", "b", None).await.unwrap();

        assert!(repo.delete(message.id).await.unwrap());
        assert!(!repo.delete(message.id).await.unwrap());
        assert!(repo.get_by_id(message.id).await.unwrap().is_none());
    }
}
