//! # GenQ Client
//!
//! Databricks Genie conversation API client.
//!
//! Speaks the Genie REST endpoints (spaces, conversations, messages) and
//! the SQL statement execution API for query attachments. Rate-limit
//! responses (HTTP 429) surface as [`ClientError::RateLimited`] with the
//! server's `Retry-After` hint. Retrying is the caller's concern: the
//! queue layer owns that policy, this client never retries on its own.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use genq_client::GenieClient;
//!
//! let client = GenieClient::from_env()?;
//! let response = client.send_message(None, "What was revenue last quarter?").await?;
//! println!("{}", response.message);
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod genie;
pub mod types;

pub use client::ConversationClient;
pub use config::GenieConfig;
pub use error::ClientError;
pub use genie::GenieClient;
pub use types::{
    AttachmentInfo, ConversationMessage, ConversationResponse, MessageRole, SpaceInfo,
};
