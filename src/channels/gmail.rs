//! Gmail REST mail source.
//!
//! Lists matching messages one at a time (`maxResults=1`) and reads bodies
//! with `format=full`. Authentication is a bearer access token supplied by
//! the environment; obtaining or refreshing it is out of scope.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use crate::channels::mime::{self, MessagePart};
use crate::channels::source::{CursorToken, FetchPage, MailSource, MessageSummary};
use crate::error::ChannelError;

const DEFAULT_API_BASE: &str = "https://gmail.googleapis.com";
const DEFAULT_QUERY: &str = "in:inbox category:primary is:unread newer_than:2d";

/// Gmail connection settings.
#[derive(Debug, Clone)]
pub struct GmailConfig {
    pub access_token: SecretString,
    /// Mailbox to read; `me` is the token's own account.
    pub user_id: String,
    /// Gmail search query selecting the messages to ingest.
    pub query: String,
    pub api_base: String,
}

impl GmailConfig {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: SecretString::from(access_token.into()),
            user_id: "me".into(),
            query: DEFAULT_QUERY.into(),
            api_base: DEFAULT_API_BASE.into(),
        }
    }

    /// Build config from environment variables.
    ///
    /// Returns `None` when `GMAIL_ACCESS_TOKEN` is unset, which disables
    /// ingestion.
    pub fn from_env() -> Option<Self> {
        let token = std::env::var("GMAIL_ACCESS_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty())?;
        let mut config = Self::new(token);
        if let Ok(user_id) = std::env::var("GMAIL_USER_ID") {
            config.user_id = user_id;
        }
        if let Ok(query) = std::env::var("GMAIL_QUERY") {
            config.query = query;
        }
        if let Ok(base) = std::env::var("GMAIL_API_BASE") {
            config.api_base = base;
        }
        Some(config)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct FullMessage {
    #[serde(default)]
    payload: Option<MessagePart>,
}

/// `MailSource` over the Gmail REST API.
pub struct GmailSource {
    config: GmailConfig,
    client: reqwest::Client,
}

impl GmailSource {
    pub fn new(config: GmailConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/gmail/v1/users/{}/messages",
            self.config.api_base.trim_end_matches('/'),
            self.config.user_id
        )
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ChannelError> {
        let resp = self
            .client
            .get(url)
            .bearer_auth(self.config.access_token.expose_secret())
            .query(query)
            .send()
            .await
            .map_err(|e| ChannelError::Http(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ChannelError::AuthFailed {
                name: "gmail".into(),
            });
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ChannelError::RateLimited {
                name: "gmail".into(),
            });
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ChannelError::Http(format!("{status}: {body}")));
        }

        resp.json::<T>()
            .await
            .map_err(|e| ChannelError::InvalidMessage(e.to_string()))
    }
}

#[async_trait]
impl MailSource for GmailSource {
    fn name(&self) -> &str {
        "gmail"
    }

    async fn fetch_page(&self, token: Option<&CursorToken>) -> Result<FetchPage, ChannelError> {
        let mut query = vec![
            ("maxResults", "1"),
            ("q", self.config.query.as_str()),
            ("includeSpamTrash", "false"),
        ];
        if let Some(token) = token {
            query.push(("pageToken", token.as_str()));
        }

        let list: ListResponse = self.get_json(&self.messages_url(), &query).await?;
        let page = FetchPage {
            summary: list
                .messages
                .into_iter()
                .next()
                .map(|m| MessageSummary::new(m.id)),
            next_token: list
                .next_page_token
                .filter(|t| !t.is_empty())
                .map(CursorToken::new),
        };
        debug!(
            message_id = ?page.summary.as_ref().map(|s| s.id.as_str()),
            has_next = page.next_token.is_some(),
            "Gmail page fetched"
        );
        Ok(page)
    }

    async fn read_body(&self, id: &str) -> Result<Option<String>, ChannelError> {
        let url = format!("{}/{id}", self.messages_url());
        let message: FullMessage = self.get_json(&url, &[("format", "full")]).await?;
        match message.payload {
            Some(payload) => mime::extract_text(&payload),
            None => Ok(None),
        }
    }
}
