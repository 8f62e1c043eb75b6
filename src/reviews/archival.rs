//! Archival job: moves stale `sent`/`auto` reviews to `archived`

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

use crate::config::ArchivalConfig;
use crate::store::{Store, StoreError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ArchiveReport {
    pub archived: u64,
    pub batches: u64,
}

/// A batch failed; `archived` rows from earlier batches stay committed
#[derive(Error, Debug)]
#[error("Archival stopped after {archived} archived: {source}")]
pub struct ArchivalError {
    pub archived: u64,
    pub source: StoreError,
}

#[derive(Clone)]
pub struct Archiver {
    store: Arc<dyn Store>,
    config: ArchivalConfig,
}

impl Archiver {
    pub fn new(store: Arc<dyn Store>, config: ArchivalConfig) -> Self {
        Self { store, config }
    }

    pub async fn run(&self) -> Result<ArchiveReport, ArchivalError> {
        let cutoff = Utc::now() - Duration::days(self.config.age_days);
        let mut report = ArchiveReport::default();

        loop {
            let fail = |source, archived| ArchivalError { archived, source };

            let ids = self
                .store
                .archive_candidates(cutoff, self.config.batch_size)
                .await
                .map_err(|e| fail(e, report.archived))?;
            if ids.is_empty() {
                break;
            }

            let archived = self
                .store
                .archive_batch(&ids, cutoff)
                .await
                .map_err(|e| fail(e, report.archived))?;

            report.archived += archived;
            report.batches += 1;

            // Every candidate raced away; re-selecting would return the same ids
            if archived == 0 {
                break;
            }
        }

        tracing::info!(
            archived = report.archived,
            batches = report.batches,
            cutoff = %cutoff,
            "Archival run finished"
        );

        Ok(report)
    }
}

/// Register the archival job on its cron schedule and start the scheduler
pub async fn start_scheduler(archiver: Archiver) -> Result<JobScheduler, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;
    let schedule = archiver.config.schedule.clone();

    let job = Job::new_async(schedule.as_str(), move |_uuid, _lock| {
        let archiver = archiver.clone();
        Box::pin(async move {
            if let Err(e) = archiver.run().await {
                tracing::error!(archived = e.archived, error = %e.source, "Archival run failed");
            }
        })
    })?;

    scheduler.add(job).await?;
    scheduler.start().await?;

    tracing::info!(schedule = %schedule, "Archival job scheduled");
    Ok(scheduler)
}
