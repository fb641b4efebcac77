//! Private message model
//!
//! Messages go from a guest to the admin and are never shown publicly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub subject: String,
    pub body: String,
    /// How the sender would like to be reached, if at all
    pub contact_info: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for sending a message
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateMessageInput {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub contact_info: Option<String>,
}

impl CreateMessageInput {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            contact_info: None,
        }
    }

    pub fn with_contact(mut self, contact: impl Into<String>) -> Self {
        self.contact_info = Some(contact.into());
        self
    }
}
