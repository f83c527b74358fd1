//! Per-item pipeline: read content, classify, persist.
//!
//! Each stage only runs when the previous one produced something usable.
//! A failing stage ends that item's pipeline and nothing else.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::channels::{MailSource, MessageSummary};
use crate::error::PipelineError;
use crate::jobs::service::{JobService, UpsertKind};
use crate::llm::Classifier;
use crate::pipeline::classify::{ParsedReply, parse_reply};
use crate::pipeline::rate_limiter::RateLimiter;
use crate::pipeline::types::{ClassificationResult, PipelineOutcome};

/// Runs the three stages for one dispatched item.
pub struct ItemPipeline {
    source: Arc<dyn MailSource>,
    classifier: Arc<dyn Classifier>,
    jobs: Arc<JobService>,
    limiter: Arc<RateLimiter>,
}

impl ItemPipeline {
    pub fn new(
        source: Arc<dyn MailSource>,
        classifier: Arc<dyn Classifier>,
        jobs: Arc<JobService>,
        limiter: Arc<RateLimiter>,
    ) -> Self {
        Self {
            source,
            classifier,
            jobs,
            limiter,
        }
    }

    /// Process one item. Never fails: errors become `PipelineOutcome::Failed`.
    pub async fn run(&self, summary: &MessageSummary) -> PipelineOutcome {
        let outcome = match self.run_stages(summary).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(id = %summary, error = %e, "Item pipeline failed");
                PipelineOutcome::Failed(e.to_string())
            }
        };
        info!(id = %summary, outcome = outcome.label(), "Item processed");
        outcome
    }

    /// The stages in order, short-circuiting on absent output.
    pub async fn run_stages(
        &self,
        summary: &MessageSummary,
    ) -> Result<PipelineOutcome, PipelineError> {
        let Some(content) = self.read_content(summary).await? else {
            debug!(id = %summary, "No readable content");
            return Ok(PipelineOutcome::Ignored);
        };

        let Some(result) = self.classify(summary, &content).await? else {
            return Ok(PipelineOutcome::Ignored);
        };

        self.persist(result).await
    }

    async fn read_content(
        &self,
        summary: &MessageSummary,
    ) -> Result<Option<String>, PipelineError> {
        let body = self
            .source
            .read_body(&summary.id)
            .await
            .map_err(PipelineError::ContentRead)?;
        Ok(body.filter(|text| !text.trim().is_empty()))
    }

    async fn classify(
        &self,
        summary: &MessageSummary,
        content: &str,
    ) -> Result<Option<ClassificationResult>, PipelineError> {
        self.limiter.acquire().await;
        let reply = self.classifier.classify(content).await?;

        match parse_reply(&reply) {
            ParsedReply::Classified(result) => {
                debug!(
                    id = %summary,
                    company = %result.company,
                    status = %result.status,
                    "Classified"
                );
                Ok(Some(result))
            }
            ParsedReply::NotJobRelated => {
                debug!(id = %summary, "Not job related");
                Ok(None)
            }
            ParsedReply::Malformed(reason) => {
                warn!(id = %summary, %reason, reply = %reply.trim(), "Unusable classifier reply");
                Ok(None)
            }
        }
    }

    async fn persist(
        &self,
        result: ClassificationResult,
    ) -> Result<PipelineOutcome, PipelineError> {
        let (_, kind) = self
            .jobs
            .create_or_update(&result.company, result.status)
            .await?;
        Ok(match kind {
            UpsertKind::Created => PipelineOutcome::Created,
            UpsertKind::Updated => PipelineOutcome::Updated,
        })
    }
}
