//! Message service
//!
//! Private messages from guests to the admin. Sending is open to everyone;
//! reading and deleting are admin operations, enforced at the routing layer.

use crate::db::repositories::MessageRepository;
use crate::models::{CreateMessageInput, ListParams, Message, PagedResult};
use anyhow::Context;
use std::sync::Arc;

const MAX_SUBJECT_CHARS: usize = 255;
const MAX_BODY_CHARS: usize = 10_000;
const MAX_CONTACT_CHARS: usize = 255;

#[derive(Debug, thiserror::Error)]
pub enum MessageServiceError {
    #[error("Message not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct MessageService {
    repo: Arc<dyn MessageRepository>,
}

impl MessageService {
    pub fn new(repo: Arc<dyn MessageRepository>) -> Self {
        Self { repo }
    }

    /// Store a guest's message. Subject and body are required.
    pub async fn send(&self, input: CreateMessageInput) -> Result<Message, MessageServiceError> {
        let subject = input.subject.trim();
        let body = input.body.trim();
        let contact = input
            .contact_info
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());

        if subject.is_empty() {
            return Err(MessageServiceError::ValidationError("Subject cannot be empty".to_string()));
        }
        if body.is_empty() {
            return Err(MessageServiceError::ValidationError("Body cannot be empty".to_string()));
        }
        if subject.chars().count() > MAX_SUBJECT_CHARS
            || body.chars().count() > MAX_BODY_CHARS
            || contact.is_some_and(|c| c.chars().count() > MAX_CONTACT_CHARS)
        {
            return Err(MessageServiceError::ValidationError("Message is too long".to_string()));
        }

        let message = self
            .repo
            .create(subject, body, contact)
            .await
            .context("Failed to store message")?;

        tracing::info!("Received message {}", message.id);
        Ok(message)
    }

    /// One page of the inbox, newest first
    pub async fn list(&self, params: &ListParams) -> Result<PagedResult<Message>, MessageServiceError> {
        let (items, total) = self.repo.list(params).await.context("Failed to list messages")?;
        Ok(PagedResult::new(items, total, params))
    }

    /// Fetch a message and mark it read
    pub async fn get(&self, id: i64) -> Result<Message, MessageServiceError> {
        let mut message = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get message")?
            .ok_or_else(|| MessageServiceError::NotFound(format!("Message with ID {} not found", id)))?;

        if !message.is_read {
            self.repo.mark_read(id).await.context("Failed to mark message read")?;
            message.is_read = true;
        }
        Ok(message)
    }

    pub async fn delete(&self, id: i64) -> Result<(), MessageServiceError> {
        let deleted = self.repo.delete(id).await.context("Failed to delete message")?;
        if !deleted {
            return Err(MessageServiceError::NotFound(format!("Message with ID {} not found", id)));
        }
        Ok(())
    }

    pub async fn unread_count(&self) -> Result<i64, MessageServiceError> {
        let count = self.repo.count_unread().await.context("Failed to count unread messages")?;
        Ok(count)
    }
}
