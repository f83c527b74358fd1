//! Ingestion pipeline.
//!
//! A single run task walks the mail source through the `CursorFetcher` and
//! hands every item to an `ItemPipeline` on a bounded pool:
//! 1. ReadContent — body text from the source
//! 2. Classify — rate-limited classifier call, reply parsed to company + status
//! 3. Persist — create-or-update the job record by company name
//!
//! `RunHandle::stop()` stops dispatch and drains the pool within a grace period.

pub mod classify;
pub mod fetcher;
pub mod orchestrator;
pub mod processor;
pub mod rate_limiter;
pub mod shutdown;
pub mod types;

pub use fetcher::{CursorFetcher, FetchStep};
pub use orchestrator::Ingestor;
pub use processor::ItemPipeline;
pub use rate_limiter::RateLimiter;
pub use shutdown::{RunHandle, RunMonitor};
pub use types::{
    ClassificationResult, PipelineOutcome, RunReport, RunState, RunStats, StatsSnapshot,
    StopReason,
};
