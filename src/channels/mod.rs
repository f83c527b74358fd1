//! Mail sources feeding the ingestion pipeline.

pub mod gmail;
pub mod mime;
pub mod source;

pub use gmail::{GmailConfig, GmailSource};
pub use source::{CursorToken, FetchPage, MailSource, MessageSummary};
