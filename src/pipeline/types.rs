//! Shared types for the ingestion pipeline.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use uuid::Uuid;

use crate::jobs::model::JobStatus;

// ── Per-item results ────────────────────────────────────────────────

/// A classifier verdict that names a company and a status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationResult {
    pub company: String,
    pub status: JobStatus,
}

/// Final result of one item's pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    Created,
    Updated,
    /// Nothing to persist: no content, not job related, or unusable reply.
    Ignored,
    Failed(String),
}

impl PipelineOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Ignored => "ignored",
            Self::Failed(_) => "failed",
        }
    }
}

// ── Run accounting ──────────────────────────────────────────────────

/// Live counters for one run, updated as pipelines finish.
#[derive(Debug, Default)]
pub struct RunStats {
    dispatched: AtomicU64,
    created: AtomicU64,
    updated: AtomicU64,
    ignored: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
}

impl RunStats {
    pub fn record_dispatch(&self) -> u64 {
        self.dispatched.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn record(&self, outcome: &PipelineOutcome) {
        let counter = match outcome {
            PipelineOutcome::Created => &self.created,
            PipelineOutcome::Updated => &self.updated,
            PipelineOutcome::Ignored => &self.ignored,
            PipelineOutcome::Failed(_) => &self.failed,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_cancelled(&self, count: u64) {
        self.cancelled.fetch_add(count, Ordering::SeqCst);
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            dispatched: self.dispatched.load(Ordering::SeqCst),
            created: self.created.load(Ordering::SeqCst),
            updated: self.updated.load(Ordering::SeqCst),
            ignored: self.ignored.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            cancelled: self.cancelled.load(Ordering::SeqCst),
        }
    }
}

/// Point-in-time copy of `RunStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub dispatched: u64,
    pub created: u64,
    pub updated: u64,
    pub ignored: u64,
    pub failed: u64,
    pub cancelled: u64,
}

impl StatsSnapshot {
    /// Pipelines that reached an outcome or were cancelled.
    pub fn finished(&self) -> u64 {
        self.created + self.updated + self.ignored + self.failed + self.cancelled
    }
}

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Idle,
    Running,
    /// No new dispatch; in-flight pipelines are finishing.
    Draining,
    Stopped,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Why a run stopped scheduling new items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum StopReason {
    /// The source had no more items.
    Exhausted,
    /// The per-run safety bound was reached.
    BoundReached,
    /// `stop()` was called.
    Stopped,
    /// Fetching the next item failed.
    FetchFailed(String),
}

/// Final account of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub stop_reason: StopReason,
    pub stats: StatsSnapshot,
}
