//! Conversation domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

/// One turn in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: MessageRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationMessage {
    pub fn new(role: MessageRole, content: &str) -> Self {
        Self {
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn system(content: &str) -> Self {
        Self::new(MessageRole::System, content)
    }

    pub fn user(content: &str) -> Self {
        Self::new(MessageRole::User, content)
    }

    pub fn assistant(content: &str) -> Self {
        Self::new(MessageRole::Assistant, content)
    }
}

/// Attachment details carried alongside a Genie answer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttachmentInfo {
    /// Narrative text, if the answer had a text attachment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Generated SQL, if the answer had a query attachment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Statement execution id for the generated SQL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statement_id: Option<String>,
}

impl AttachmentInfo {
    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.query.is_none() && self.statement_id.is_none()
    }
}

/// A completed Genie answer.
///
/// Serializable so it can travel through the request queue as an opaque
/// JSON value and be decoded on the other side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationResponse {
    /// Rendered answer: narrative text, generated SQL, and query results.
    pub message: String,
    /// Server-side conversation identifier; reuse it to keep context.
    pub conversation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<AttachmentInfo>>,
    pub timestamp: DateTime<Utc>,
}

/// An accessible Genie space.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpaceInfo {
    pub space_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}
