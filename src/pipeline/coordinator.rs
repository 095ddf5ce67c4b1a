//! Polls every submitted job concurrently and downloads each one as it completes.

use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::download::{DownloadPool, DownloadReport};
use super::poller::{JobPoller, PollOutcome};
use crate::model::JobHandle;

/// What happened to one job.
#[derive(Debug)]
pub struct JobReport {
    pub job_id: String,
    pub outcome: PollOutcome,
    /// Present only for completed jobs.
    pub downloads: Option<DownloadReport>,
}

pub struct PollCoordinator {
    poller: Arc<JobPoller>,
    downloads: Arc<DownloadPool>,
}

impl PollCoordinator {
    pub fn new(poller: JobPoller, downloads: DownloadPool) -> Self {
        Self {
            poller: Arc::new(poller),
            downloads: Arc::new(downloads),
        }
    }

    /// Runs one poller task per job and waits for all of them.
    ///
    /// Jobs are independent: a failed job never affects its siblings.
    pub async fn run(&self, jobs: Vec<JobHandle>) -> Vec<JobReport> {
        let mut set = JoinSet::new();

        for job in jobs {
            let poller = Arc::clone(&self.poller);
            let downloads = Arc::clone(&self.downloads);
            set.spawn(async move {
                let outcome = poller.poll(&job).await;
                let downloads = match &outcome {
                    PollOutcome::Completed(status) => {
                        info!(job_id = %job.job_id, "Downloading recordings from batch");
                        Some(downloads.download_job(status).await)
                    }
                    other => {
                        warn!(job_id = %job.job_id, outcome = other.label(), "No results available in batch job");
                        None
                    }
                };
                JobReport {
                    job_id: job.job_id,
                    outcome,
                    downloads,
                }
            });
        }

        let mut reports = Vec::with_capacity(set.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(err) => error!("Job task terminated abnormally: {}", err),
            }
        }
        reports
    }
}
