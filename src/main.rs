use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use jobqueue::channels::{GmailConfig, GmailSource, MailSource};
use jobqueue::config::{IngestConfig, ServerConfig};
use jobqueue::jobs::{AppState, JobService, jobs_routes};
use jobqueue::llm::LlmConfig;
use jobqueue::pipeline::{Ingestor, RunHandle};
use jobqueue::store::{InMemoryJobStore, JobStore, LibSqlJobStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let server_config = ServerConfig::from_env()?;
    let ingest_config = IngestConfig::from_env()?;

    let store: Arc<dyn JobStore> = match &server_config.db_path {
        Some(path) => Arc::new(
            LibSqlJobStore::new_local(path)
                .await
                .with_context(|| format!("opening job database at {}", path.display()))?,
        ),
        None => {
            tracing::warn!("JOBQUEUE_DB_PATH not set, job records are kept in memory");
            Arc::new(InMemoryJobStore::new())
        }
    };
    let jobs = Arc::new(JobService::new(store));

    let run = match GmailConfig::from_env() {
        Some(gmail) => Some(start_ingestion(gmail, ingest_config, Arc::clone(&jobs))?),
        None => {
            tracing::info!("GMAIL_ACCESS_TOKEN not set, ingestion disabled");
            None
        }
    };

    let app = jobs_routes(AppState {
        jobs,
        run: run.as_ref().map(RunHandle::monitor),
    });
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", server_config.http_port))
        .await
        .with_context(|| format!("binding HTTP port {}", server_config.http_port))?;
    tracing::info!(port = server_config.http_port, "HTTP server started");

    let server_shutdown = CancellationToken::new();
    let server = tokio::spawn(
        axum::serve(listener, app)
            .with_graceful_shutdown(server_shutdown.clone().cancelled_owned())
            .into_future(),
    );

    let mut interrupted = false;
    if let Some(handle) = run {
        tokio::select! {
            _ = handle.stopped() => {}
            _ = tokio::signal::ctrl_c() => {
                interrupted = true;
                handle.stop().await;
            }
        }
        match handle.wait().await {
            Ok(report) => tracing::info!(
                run_id = %report.run_id,
                reason = ?report.stop_reason,
                created = report.stats.created,
                updated = report.stats.updated,
                failed = report.stats.failed,
                "Ingestion finished"
            ),
            Err(e) => tracing::error!(error = %e, "Ingestion failed"),
        }
    }

    if !interrupted {
        tracing::info!("Serving job records until Ctrl-C");
        tokio::signal::ctrl_c().await?;
    }
    server_shutdown.cancel();
    server.await??;
    Ok(())
}

fn start_ingestion(
    gmail: GmailConfig,
    config: IngestConfig,
    jobs: Arc<JobService>,
) -> anyhow::Result<RunHandle> {
    let llm_config = LlmConfig::from_env()?;
    let source: Arc<dyn MailSource> = Arc::new(GmailSource::new(gmail));
    let ingestor = Ingestor::build(config, source, &llm_config, jobs)?;
    Ok(ingestor.start())
}
