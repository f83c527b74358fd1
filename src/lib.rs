//! jobqueue — tracks job applications by classifying incoming mail.

pub mod channels;
pub mod config;
pub mod error;
pub mod jobs;
pub mod llm;
pub mod pipeline;
pub mod store;
