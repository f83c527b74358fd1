//! Orchestrator — drives the fetch loop and fans items out to pipelines.

use std::sync::{Arc, Mutex};

use tokio::sync::{Semaphore, watch};
use tokio::task::{JoinError, JoinSet};
use tracing::{Instrument, debug, error, info, warn};
use uuid::Uuid;

use crate::channels::MailSource;
use crate::config::IngestConfig;
use crate::error::{ChannelError, PipelineError};
use crate::jobs::JobService;
use crate::llm::{LlmConfig, create_classifier};
use crate::pipeline::fetcher::{CursorFetcher, FetchStep};
use crate::pipeline::processor::ItemPipeline;
use crate::pipeline::rate_limiter::RateLimiter;
use crate::pipeline::shutdown::{RunControl, RunHandle, RunMonitor};
use crate::pipeline::types::{PipelineOutcome, RunReport, RunState, RunStats, StopReason};

/// One ingestion run, not yet started.
pub struct Ingestor {
    config: IngestConfig,
    source: Arc<dyn MailSource>,
    pipeline: Arc<ItemPipeline>,
    state_tx: watch::Sender<RunState>,
}

impl Ingestor {
    pub fn new(
        config: IngestConfig,
        source: Arc<dyn MailSource>,
        pipeline: Arc<ItemPipeline>,
    ) -> Self {
        let (state_tx, _) = watch::channel(RunState::Idle);
        Self {
            config,
            source,
            pipeline,
            state_tx,
        }
    }

    /// Wire a run from configuration: validate `config`, build the classifier
    /// for `llm` and a pipeline rate-limited by the classify settings.
    pub fn build(
        config: IngestConfig,
        source: Arc<dyn MailSource>,
        llm: &LlmConfig,
        jobs: Arc<JobService>,
    ) -> crate::error::Result<Self> {
        config.validate()?;
        let classifier = create_classifier(llm)?;
        let limiter = Arc::new(RateLimiter::new(
            config.classify_permits,
            config.classify_window,
            config.classify_burst,
        ));
        let pipeline = Arc::new(ItemPipeline::new(
            Arc::clone(&source),
            classifier,
            jobs,
            limiter,
        ));
        Ok(Self::new(config, source, pipeline))
    }

    pub fn state(&self) -> RunState {
        *self.state_tx.borrow()
    }

    /// Spawn the run task and return its handle.
    pub fn start(self) -> RunHandle {
        let run_id = Uuid::new_v4();
        let stats = Arc::new(RunStats::default());
        let report = Arc::new(Mutex::new(None));
        let control = RunControl::new();
        let grace = self.config.shutdown_grace;

        self.state_tx.send_replace(RunState::Running);
        let monitor = RunMonitor::new(
            run_id,
            Arc::clone(&stats),
            self.state_tx.subscribe(),
            Arc::clone(&report),
        );

        let run = RunTask {
            run_id,
            config: self.config,
            source: self.source,
            pipeline: self.pipeline,
            stats,
            control: control.clone(),
            state_tx: self.state_tx,
            report,
        };
        let span = tracing::info_span!("ingest_run", run_id = %run_id);
        let task = tokio::spawn(run.run().instrument(span));

        RunHandle::new(monitor, control, grace, task)
    }
}

struct RunTask {
    run_id: Uuid,
    config: IngestConfig,
    source: Arc<dyn MailSource>,
    pipeline: Arc<ItemPipeline>,
    stats: Arc<RunStats>,
    control: RunControl,
    state_tx: watch::Sender<RunState>,
    report: Arc<Mutex<Option<RunReport>>>,
}

impl RunTask {
    async fn run(self) -> Result<RunReport, PipelineError> {
        info!(
            source = self.source.name(),
            max_items = self.config.max_items_per_run,
            workers = self.config.worker_pool_size,
            "Ingestion run started"
        );

        let mut tasks: JoinSet<PipelineOutcome> = JoinSet::new();
        let (stop_reason, fetch_error) = self.dispatch_loop(&mut tasks).await;

        self.state_tx.send_replace(RunState::Draining);
        debug!(in_flight = tasks.len(), reason = ?stop_reason, "Dispatch stopped, draining");
        self.drain(&mut tasks).await;

        let report = RunReport {
            run_id: self.run_id,
            stop_reason,
            stats: self.stats.snapshot(),
        };
        info!(
            reason = ?report.stop_reason,
            dispatched = report.stats.dispatched,
            created = report.stats.created,
            updated = report.stats.updated,
            ignored = report.stats.ignored,
            failed = report.stats.failed,
            cancelled = report.stats.cancelled,
            "Ingestion run stopped"
        );

        *self
            .report
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(report.clone());
        self.state_tx.send_replace(RunState::Stopped);

        match fetch_error {
            Some(e) if report.stats.dispatched == 0 => Err(PipelineError::Fetch(e)),
            _ => Ok(report),
        }
    }

    /// Fetch and dispatch until exhaustion, the bound, a fetch error or stop.
    async fn dispatch_loop(
        &self,
        tasks: &mut JoinSet<PipelineOutcome>,
    ) -> (StopReason, Option<ChannelError>) {
        let slots = Arc::new(Semaphore::new(self.config.worker_pool_size));
        let mut fetcher = CursorFetcher::new(Arc::clone(&self.source));
        let bound = self.config.max_items_per_run as u64;
        let cancel = &self.control.dispatch;

        loop {
            while let Some(joined) = tasks.try_join_next() {
                self.record(joined);
            }

            if cancel.is_cancelled() {
                return (StopReason::Stopped, None);
            }
            if self.stats.dispatched() >= bound {
                info!(bound, "Safety bound reached");
                return (StopReason::BoundReached, None);
            }

            let step = tokio::select! {
                biased;
                _ = cancel.cancelled() => return (StopReason::Stopped, None),
                step = fetcher.next() => step,
            };

            let summary = match step {
                Ok(FetchStep::Item(summary)) => summary,
                Ok(FetchStep::Exhausted) => {
                    info!(pages = fetcher.pages_fetched(), "Source exhausted");
                    return (StopReason::Exhausted, None);
                }
                Err(e) => {
                    error!(error = %e, "Fetch failed, no further items will be dispatched");
                    return (StopReason::FetchFailed(e.to_string()), Some(e));
                }
            };

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => return (StopReason::Stopped, None),
                permit = Arc::clone(&slots).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return (StopReason::Stopped, None),
                },
            };

            let n = self.stats.record_dispatch();
            debug!(id = %summary, n, "Dispatching item");
            let pipeline = Arc::clone(&self.pipeline);
            tasks.spawn(
                async move {
                    let _permit = permit;
                    pipeline.run(&summary).await
                }
                .in_current_span(),
            );
        }
    }

    /// Wait for in-flight pipelines; abort them once `force` is cancelled.
    async fn drain(&self, tasks: &mut JoinSet<PipelineOutcome>) {
        loop {
            tokio::select! {
                biased;
                _ = self.control.force.cancelled() => {
                    let aborted = tasks.len();
                    if aborted > 0 {
                        warn!(aborted, "Aborting in-flight pipelines");
                    }
                    tasks.abort_all();
                    while let Some(joined) = tasks.join_next().await {
                        self.record(joined);
                    }
                    return;
                }
                joined = tasks.join_next() => match joined {
                    Some(joined) => self.record(joined),
                    None => return,
                },
            }
        }
    }

    fn record(&self, joined: Result<PipelineOutcome, JoinError>) {
        match joined {
            Ok(outcome) => self.stats.record(&outcome),
            Err(e) if e.is_cancelled() => self.stats.record_cancelled(1),
            Err(e) => {
                error!(error = %e, "Item pipeline panicked");
                self.stats
                    .record(&PipelineOutcome::Failed(format!("panicked: {e}")));
            }
        }
    }
}
