//! Email classifier backed by a rig-core completion model.

use async_trait::async_trait;
use rig::agent::Agent;
use rig::completion::{CompletionModel, Prompt};

use crate::error::LlmError;

/// Largest number of characters of email content sent to the model.
pub const MAX_CONTENT_CHARS: usize = 4000;

/// Instructions sent as the system preamble of every classification call.
pub const CLASSIFY_PREAMBLE: &str = "\
You sort emails from a job search into one of three categories: Interview, Rejected, Waiting.

Rules:
1. Look for words and phrases that clearly point to one category.
2. Rejected: the application was turned down, e.g. 'we will not be moving forward', \
'your application was not successful', 'we are unable to offer you'.
3. Interview: the sender invites you to an interview or wants to schedule one, e.g. \
'we would like to schedule an interview', 'available times for an interview'.
4. Waiting: the application is still being considered or the sender will follow up later \
without inviting or rejecting, e.g. 'your application is under review', 'we will be in touch'.
5. If the email is not about a job application at all, reply with exactly: null
6. Otherwise reply with exactly one line in the form 'Company Name: Category', where \
Company Name is the company that sent the email.
7. Category must be exactly one of: INTERVIEW, REJECTED, WAITING.";

/// Remote classification call. Returns the model's raw reply.
#[async_trait]
pub trait Classifier: Send + Sync {
    fn model_name(&self) -> &str;

    async fn classify(&self, content: &str) -> Result<String, LlmError>;
}

/// `Classifier` over any rig completion model.
pub struct RigClassifier<M: CompletionModel> {
    agent: Agent<M>,
    provider: &'static str,
    model_name: String,
}

impl<M: CompletionModel> RigClassifier<M> {
    pub fn new(agent: Agent<M>, provider: &'static str, model_name: impl Into<String>) -> Self {
        Self {
            agent,
            provider,
            model_name: model_name.into(),
        }
    }
}

#[async_trait]
impl<M> Classifier for RigClassifier<M>
where
    M: CompletionModel + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn classify(&self, content: &str) -> Result<String, LlmError> {
        let prompt = format!("Email content:\n{}", truncate_chars(content, MAX_CONTENT_CHARS));
        let reply = self
            .agent
            .prompt(prompt)
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: self.provider.to_string(),
                reason: e.to_string(),
            })?;
        tracing::debug!(model = %self.model_name, reply = %reply.trim(), "Classifier replied");
        Ok(reply)
    }
}

/// Cut `text` to at most `max` characters, on a char boundary.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_short_text_untouched() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("", 10), "");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo wörld", 4), "héll");
        let long = "é".repeat(MAX_CONTENT_CHARS + 10);
        assert_eq!(
            truncate_chars(&long, MAX_CONTENT_CHARS).chars().count(),
            MAX_CONTENT_CHARS
        );
    }

    #[test]
    fn preamble_names_every_category_and_ignore_marker() {
        for word in ["INTERVIEW", "REJECTED", "WAITING", "null", "Company Name: Category"] {
            assert!(CLASSIFY_PREAMBLE.contains(word), "missing {word}");
        }
    }
}
