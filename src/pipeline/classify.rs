//! Parsing of classifier replies.

use crate::jobs::model::JobStatus;
use crate::pipeline::types::ClassificationResult;

/// Reply the classifier uses for emails unrelated to a job search.
pub const IGNORE_MARKER: &str = "null";

/// Interpretation of one classifier reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedReply {
    Classified(ClassificationResult),
    /// The classifier answered with the ignore marker.
    NotJobRelated,
    /// The reply did not follow `Company: Status`.
    Malformed(String),
}

/// Parse a `Company Name: Status` reply.
///
/// Only the first non-empty line counts. Surrounding quotes and backticks are
/// dropped, the line is split on its first colon and the status phrase is
/// normalized with [`JobStatus::from_phrase`].
pub fn parse_reply(reply: &str) -> ParsedReply {
    let line = reply
        .lines()
        .map(unquote)
        .find(|l| !l.is_empty())
        .unwrap_or("");

    if line.is_empty() {
        return ParsedReply::Malformed("empty reply".into());
    }
    if line.eq_ignore_ascii_case(IGNORE_MARKER) {
        return ParsedReply::NotJobRelated;
    }

    let Some((company, phrase)) = line.split_once(':') else {
        return ParsedReply::Malformed(format!("no separator in {line:?}"));
    };
    let company = unquote(company);
    if company.is_empty() {
        return ParsedReply::Malformed(format!("no company in {line:?}"));
    }
    let phrase = unquote(phrase);
    match JobStatus::from_phrase(phrase) {
        Some(status) => ParsedReply::Classified(ClassificationResult {
            company: company.to_string(),
            status,
        }),
        None => ParsedReply::Malformed(format!("unrecognized status {phrase:?}")),
    }
}

/// Trim whitespace and any surrounding quotes or backticks.
fn unquote(s: &str) -> &str {
    s.trim()
        .trim_matches(|c| matches!(c, '"' | '\'' | '`'))
        .trim()
}
