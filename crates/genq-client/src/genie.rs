//! Databricks Genie REST client

use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::client::ConversationClient;
use crate::config::GenieConfig;
use crate::error::ClientError;
use crate::types::{AttachmentInfo, ConversationResponse, SpaceInfo};

/// Client for the Genie conversation API and its SQL statement sibling.
pub struct GenieClient {
    config: GenieConfig,
    http: reqwest::Client,
    /// Space resolved on first use when none was configured.
    resolved_space: OnceCell<String>,
}

// --- wire types -----------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SpaceListWire {
    spaces: Option<Vec<SpaceWire>>,
}

#[derive(Debug, Deserialize)]
struct SpaceWire {
    space_id: String,
    title: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StartConversationWire {
    conversation_id: String,
    message_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub(crate) enum MessageStatusWire {
    Submitted,
    FilteringContext,
    AskingAi,
    PendingWarehouse,
    ExecutingQuery,
    Completed,
    Failed,
    QueryResultExpired,
    Cancelled,
    #[serde(other)]
    Unknown,
}

impl MessageStatusWire {
    fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::QueryResultExpired | Self::Cancelled
        )
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessageWire {
    #[serde(alias = "message_id")]
    pub(crate) id: String,
    pub(crate) status: Option<MessageStatusWire>,
    pub(crate) attachments: Option<Vec<AttachmentWire>>,
    pub(crate) error: Option<MessageErrorWire>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessageErrorWire {
    pub(crate) error: Option<String>,
    #[serde(rename = "type")]
    pub(crate) error_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AttachmentWire {
    pub(crate) text: Option<TextAttachmentWire>,
    pub(crate) query: Option<QueryAttachmentWire>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TextAttachmentWire {
    pub(crate) content: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QueryAttachmentWire {
    pub(crate) query: String,
    pub(crate) statement_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatementWire {
    pub(crate) manifest: Option<StatementManifestWire>,
    pub(crate) result: Option<StatementResultWire>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatementManifestWire {
    pub(crate) schema: Option<StatementSchemaWire>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatementSchemaWire {
    pub(crate) columns: Option<Vec<StatementColumnWire>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatementColumnWire {
    pub(crate) name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatementResultWire {
    pub(crate) data_array: Option<Vec<Vec<Option<String>>>>,
}

// --- client ---------------------------------------------------------------

impl GenieClient {
    pub fn new(config: GenieConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            resolved_space: OnceCell::new(),
        }
    }

    pub fn from_env() -> Result<Self, ClientError> {
        Ok(Self::new(GenieConfig::from_env()?))
    }

    /// The configured space, or the first accessible one (resolved once).
    pub async fn default_space_id(&self) -> Result<String, ClientError> {
        if let Some(space_id) = &self.config.space_id {
            return Ok(space_id.clone());
        }

        self.resolved_space
            .get_or_try_init(|| async {
                let spaces = self.list_spaces_inner().await?;
                let first = spaces.first().ok_or(ClientError::NoSpaces)?;
                info!(
                    space_id = %first.space_id,
                    title = %first.title,
                    "using default Genie space"
                );
                Ok(first.space_id.clone())
            })
            .await
            .cloned()
    }

    async fn list_spaces_inner(&self) -> Result<Vec<SpaceInfo>, ClientError> {
        let url = format!("{}/api/2.0/genie/spaces", self.config.host);
        let response = self.http.get(&url).bearer_auth(&self.config.token).send().await?;
        let listing: SpaceListWire = check(response).await?.json().await?;

        Ok(listing
            .spaces
            .unwrap_or_default()
            .into_iter()
            .map(|space| SpaceInfo {
                space_id: space.space_id,
                title: space.title,
                description: space.description,
            })
            .collect())
    }

    /// Send one message, then wait for Genie to finish answering it.
    ///
    /// Passing a `conversation_id` continues that server-side conversation;
    /// Genie carries the context, nothing is resent.
    pub async fn send(
        &self,
        conversation_id: Option<&str>,
        message: &str,
    ) -> Result<ConversationResponse, ClientError> {
        let space_id = self.default_space_id().await?;

        let (conversation_id, message_id) = match conversation_id {
            Some(existing) => {
                let url = format!(
                    "{}/api/2.0/genie/spaces/{space_id}/conversations/{existing}/messages",
                    self.config.host
                );
                let response = self
                    .http
                    .post(&url)
                    .bearer_auth(&self.config.token)
                    .json(&json!({ "content": message }))
                    .send()
                    .await?;
                let created: MessageWire = check(response).await?.json().await?;
                (existing.to_string(), created.id)
            }
            None => {
                let url = format!(
                    "{}/api/2.0/genie/spaces/{space_id}/start-conversation",
                    self.config.host
                );
                let response = self
                    .http
                    .post(&url)
                    .bearer_auth(&self.config.token)
                    .json(&json!({ "content": message }))
                    .send()
                    .await?;
                let started: StartConversationWire = check(response).await?.json().await?;
                (started.conversation_id, started.message_id)
            }
        };

        debug!(%conversation_id, %message_id, "message accepted, polling for completion");
        let completed = self
            .poll_message(&space_id, &conversation_id, &message_id)
            .await?;

        let (text, attachments) = self.render_attachments(&completed).await;
        Ok(ConversationResponse {
            message: text.trim().to_string(),
            conversation_id,
            attachments: (!attachments.is_empty()).then_some(attachments),
            timestamp: chrono::Utc::now(),
        })
    }

    /// Poll a message until it reaches a terminal Genie status.
    async fn poll_message(
        &self,
        space_id: &str,
        conversation_id: &str,
        message_id: &str,
    ) -> Result<MessageWire, ClientError> {
        let url = format!(
            "{}/api/2.0/genie/spaces/{space_id}/conversations/{conversation_id}/messages/{message_id}",
            self.config.host
        );
        let deadline = Instant::now() + self.config.wait_timeout;

        loop {
            let response = self.http.get(&url).bearer_auth(&self.config.token).send().await?;
            let message: MessageWire = check(response).await?.json().await?;

            match message.status {
                Some(MessageStatusWire::Completed) => return Ok(message),
                Some(status) if status.is_terminal() => {
                    let description = message
                        .error
                        .and_then(|e| {
                            let kind = e.error_type.unwrap_or_default();
                            e.error.map(|msg| format!("{kind}: {msg}"))
                        })
                        .unwrap_or_else(|| format!("{status:?}"));
                    return Err(ClientError::MessageFailed(description));
                }
                _ => {
                    if Instant::now() >= deadline {
                        return Err(ClientError::PollTimeout(self.config.wait_timeout));
                    }
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }
        }
    }

    /// Fetch an executed statement via the SQL statement execution API.
    async fn get_statement(&self, statement_id: &str) -> Result<StatementWire, ClientError> {
        let url = format!("{}/api/2.0/sql/statements/{statement_id}", self.config.host);
        let response = self.http.get(&url).bearer_auth(&self.config.token).send().await?;
        Ok(check(response).await?.json().await?)
    }

    /// Flatten a completed message's attachments into display text plus
    /// structured details, fetching query results where available.
    async fn render_attachments(&self, message: &MessageWire) -> (String, Vec<AttachmentInfo>) {
        let mut text = String::new();
        let mut infos = Vec::new();

        for attachment in message.attachments.iter().flatten() {
            let mut info = AttachmentInfo::default();

            if let Some(text_part) = &attachment.text {
                let _ = writeln!(text, "{}", text_part.content);
                info.text = Some(text_part.content.clone());
            }

            if let Some(query) = &attachment.query {
                let _ = writeln!(text, "Generated SQL: {}", query.query);
                info.query = Some(query.query.clone());
                info.statement_id = query.statement_id.clone();

                if let Some(statement_id) = &query.statement_id {
                    match self.get_statement(statement_id).await {
                        Ok(statement) => {
                            if let Some(table) = render_result_table(&statement) {
                                let _ = writeln!(text, "\nQuery Results:\n{table}");
                            }
                        }
                        Err(fetch_error) => {
                            warn!(%statement_id, error = %fetch_error, "failed to fetch query results");
                            let _ = writeln!(text, "(unable to fetch results: {fetch_error})");
                        }
                    }
                }
            }

            if !info.is_empty() {
                infos.push(info);
            }
        }

        (text, infos)
    }
}

#[async_trait]
impl ConversationClient for GenieClient {
    async fn send_message(
        &self,
        conversation_id: Option<&str>,
        message: &str,
    ) -> Result<ConversationResponse, ClientError> {
        self.send(conversation_id, message).await
    }

    async fn list_spaces(&self) -> Result<Vec<SpaceInfo>, ClientError> {
        self.list_spaces_inner().await
    }
}

/// Map non-success statuses to errors; 429 becomes `RateLimited` with the
/// parsed `Retry-After` hint.
async fn check(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let message = response.text().await.unwrap_or_default();
        return Err(ClientError::RateLimited {
            message,
            retry_after,
        });
    }

    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(ClientError::Api {
            status: status.as_u16(),
            message,
        });
    }

    Ok(response)
}

/// Render statement output as an aligned text table, or `None` when the
/// statement produced no rows.
pub(crate) fn render_result_table(statement: &StatementWire) -> Option<String> {
    let columns: Vec<&str> = statement
        .manifest
        .as_ref()
        .and_then(|m| m.schema.as_ref())
        .and_then(|s| s.columns.as_ref())
        .map(|cols| cols.iter().map(|c| c.name.as_str()).collect())
        .unwrap_or_default();

    let rows = statement
        .result
        .as_ref()
        .and_then(|r| r.data_array.as_ref())?;
    if rows.is_empty() {
        return None;
    }

    let width = columns.len().max(rows.iter().map(Vec::len).max().unwrap_or(0));
    let mut widths = vec![0usize; width];
    for (i, name) in columns.iter().enumerate() {
        widths[i] = name.len();
    }
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            let len = cell.as_deref().unwrap_or("NULL").len();
            if len > widths[i] {
                widths[i] = len;
            }
        }
    }

    let mut table = String::new();
    if !columns.is_empty() {
        let header: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, name)| format!("{name:<width$}", width = widths[i]))
            .collect();
        table.push_str(&header.join(" | "));
        table.push('\n');
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        table.push_str(&rule.join("-|-"));
        table.push('\n');
    }
    for row in rows {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                format!(
                    "{value:<width$}",
                    value = cell.as_deref().unwrap_or("NULL"),
                    width = widths[i]
                )
            })
            .collect();
        table.push_str(&cells.join(" | "));
        table.push('\n');
    }

    Some(table)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statement(columns: &[&str], rows: Vec<Vec<Option<&str>>>) -> StatementWire {
        StatementWire {
            manifest: Some(StatementManifestWire {
                schema: Some(StatementSchemaWire {
                    columns: Some(
                        columns
                            .iter()
                            .map(|name| StatementColumnWire {
                                name: name.to_string(),
                            })
                            .collect(),
                    ),
                }),
            }),
            result: Some(StatementResultWire {
                data_array: Some(
                    rows.into_iter()
                        .map(|row| row.into_iter().map(|c| c.map(String::from)).collect())
                        .collect(),
                ),
            }),
        }
    }

    #[test]
    fn renders_aligned_table_with_header() {
        let wire = statement(
            &["region", "revenue"],
            vec![
                vec![Some("EMEA"), Some("1200")],
                vec![Some("US"), Some("980")],
            ],
        );
        let table = render_result_table(&wire).unwrap();
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "region | revenue");
        assert!(lines[1].starts_with("------"));
        assert_eq!(lines[2], "EMEA   | 1200   ");
        assert_eq!(lines[3], "US     | 980    ");
    }

    #[test]
    fn null_cells_render_as_null() {
        let wire = statement(&["value"], vec![vec![None]]);
        let table = render_result_table(&wire).unwrap();
        assert!(table.contains("NULL"));
    }

    #[test]
    fn empty_result_renders_nothing() {
        let wire = statement(&["value"], vec![]);
        assert!(render_result_table(&wire).is_none());

        let no_result = StatementWire {
            manifest: None,
            result: None,
        };
        assert!(render_result_table(&no_result).is_none());
    }

    #[test]
    fn message_status_parses_genie_strings() {
        let status: MessageStatusWire = serde_json::from_str("\"EXECUTING_QUERY\"").unwrap();
        assert_eq!(status, MessageStatusWire::ExecutingQuery);
        assert!(!status.is_terminal());

        let done: MessageStatusWire = serde_json::from_str("\"COMPLETED\"").unwrap();
        assert!(done.is_terminal());

        // Forward compatibility: unknown states do not fail parsing.
        let future: MessageStatusWire = serde_json::from_str("\"SOMETHING_NEW\"").unwrap();
        assert_eq!(future, MessageStatusWire::Unknown);
    }

    #[test]
    fn message_wire_accepts_id_aliases() {
        let by_id: MessageWire =
            serde_json::from_value(serde_json::json!({ "id": "m-1" })).unwrap();
        assert_eq!(by_id.id, "m-1");

        let by_message_id: MessageWire =
            serde_json::from_value(serde_json::json!({ "message_id": "m-2" })).unwrap();
        assert_eq!(by_message_id.id, "m-2");
    }
}
