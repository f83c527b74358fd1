//! Job application records and their status.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a job application stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Interview,
    Rejected,
    Waiting,
}

impl JobStatus {
    /// Canonical uppercase name, as stored and served.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Interview => "INTERVIEW",
            Self::Rejected => "REJECTED",
            Self::Waiting => "WAITING",
        }
    }

    /// Map a free-form status phrase from the classifier onto a status.
    ///
    /// The phrase is uppercased and searched for `REJECT`, `INTERVIEW` and
    /// `WAIT`, in that order.
    pub fn from_phrase(phrase: &str) -> Option<Self> {
        let upper = phrase.to_uppercase();
        if upper.contains("REJECT") {
            Some(Self::Rejected)
        } else if upper.contains("INTERVIEW") {
            Some(Self::Interview)
        } else if upper.contains("WAIT") {
            Some(Self::Waiting)
        } else {
            None
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Strict parse: the canonical name, case-insensitive.
impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INTERVIEW" => Ok(Self::Interview),
            "REJECTED" => Ok(Self::Rejected),
            "WAITING" => Ok(Self::Waiting),
            other => Err(format!(
                "unknown job status '{other}' (expected INTERVIEW, REJECTED or WAITING)"
            )),
        }
    }
}

/// A tracked job application, one per company name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Store-assigned id; `None` until the record is first saved.
    pub id: Option<i64>,
    pub name: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// A record that has not been saved yet.
    pub fn new(name: impl Into<String>, status: JobStatus) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            name: name.into(),
            status,
            created_at: now,
            updated_at: now,
        }
    }
}
