//! Cursor fetcher — walks the mail source one item at a time.

use std::sync::Arc;

use tracing::debug;

use crate::channels::{CursorToken, MailSource, MessageSummary};
use crate::error::ChannelError;

/// Result of one `next()` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchStep {
    Item(MessageSummary),
    Exhausted,
}

/// Sequential actor over a paginated `MailSource`.
///
/// Owns the continuation token; `next()` takes `&mut self`, so at most one
/// source call is ever in flight.
pub struct CursorFetcher {
    source: Arc<dyn MailSource>,
    token: Option<CursorToken>,
    finished: bool,
    pages: u64,
}

impl CursorFetcher {
    pub fn new(source: Arc<dyn MailSource>) -> Self {
        Self {
            source,
            token: None,
            finished: false,
            pages: 0,
        }
    }

    /// Pages requested from the source so far.
    pub fn pages_fetched(&self) -> u64 {
        self.pages
    }

    /// Fetch the next item.
    ///
    /// Pages without an item are skipped while the source keeps handing out
    /// tokens. Once the source stops returning a token, every further call
    /// reports `Exhausted` without touching the source.
    pub async fn next(&mut self) -> Result<FetchStep, ChannelError> {
        loop {
            if self.finished {
                return Ok(FetchStep::Exhausted);
            }

            let page = self.source.fetch_page(self.token.as_ref()).await?;
            self.pages += 1;

            match page.next_token {
                Some(token) => self.token = Some(token),
                None => self.finished = true,
            }

            match page.summary {
                Some(summary) => {
                    debug!(id = %summary, page = self.pages, "Fetched item");
                    return Ok(FetchStep::Item(summary));
                }
                None if self.finished => return Ok(FetchStep::Exhausted),
                None => debug!(page = self.pages, "Empty page with continuation, skipping"),
            }
        }
    }
}
