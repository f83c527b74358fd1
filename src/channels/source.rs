//! Mail source abstraction used by the cursor fetcher and the read stage.

use std::fmt;

use async_trait::async_trait;

use crate::error::ChannelError;

/// Opaque reference to one message in the source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageSummary {
    pub id: String,
}

impl MessageSummary {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl fmt::Display for MessageSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id)
    }
}

/// Continuation marker handed back by the source for the next page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorToken(String);

impl CursorToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One page of a size-one listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchPage {
    pub summary: Option<MessageSummary>,
    pub next_token: Option<CursorToken>,
}

/// A paginated source of messages.
#[async_trait]
pub trait MailSource: Send + Sync {
    /// Short identifier used in logs and errors.
    fn name(&self) -> &str;

    /// Fetch the page after `token` (the first page when `None`).
    async fn fetch_page(&self, token: Option<&CursorToken>) -> Result<FetchPage, ChannelError>;

    /// Plain-text body of a message, or `None` when it has no readable text.
    async fn read_body(&self, id: &str) -> Result<Option<String>, ChannelError>;
}
