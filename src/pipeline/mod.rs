//! Recording export pipeline.
//!
//! Phases run in order, each handing its full output to the next:
//! search → metadata resolution → batch submission → polling → download.
//! Failures are absorbed per item, chunk or job; the run only aborts when a
//! whole phase produces nothing.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::client::{ClientError, RecordingService};
use crate::query::{self, ConversationQuery};
use crate::storage::ArtifactStore;

pub mod batch;
pub mod coordinator;
pub mod download;
pub mod metadata;
pub mod poller;
pub mod pool;

#[cfg(test)]
pub(crate) mod test_support;

pub use batch::{chunk_references, BatchSubmitter, SubmissionReport, MAX_BATCH_SIZE};
pub use coordinator::{JobReport, PollCoordinator};
pub use download::{DownloadError, DownloadPool, DownloadReport, DownloadedArtifact};
pub use metadata::{MetadataResolver, RetryPolicy};
pub use poller::{JobPoller, PollOutcome, PollSettings};

/// Conditions that abort the whole run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("conversation search failed on page {page}: {source}")]
    Search {
        page: u32,
        #[source]
        source: ClientError,
    },
    #[error("no conversations matched the query")]
    NoConversations,
    #[error("no recordings could be resolved from {conversations} conversation(s)")]
    NoRecordings { conversations: usize },
    #[error("no batch requests were successfully sent ({chunks} chunk(s) attempted)")]
    NoJobsSubmitted { chunks: usize },
    #[error("run cancelled")]
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub search_page_size: u32,
    pub metadata_workers: usize,
    pub metadata_retry: RetryPolicy,
    pub max_batch_size: usize,
    pub poll: PollSettings,
    pub download_workers: usize,
    pub output_dir: PathBuf,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            search_page_size: 100,
            metadata_workers: 5,
            metadata_retry: RetryPolicy::default(),
            max_batch_size: MAX_BATCH_SIZE,
            poll: PollSettings::default(),
            download_workers: 10,
            output_dir: PathBuf::from("./recordings"),
        }
    }
}

/// Counts gathered over one run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub conversations: usize,
    pub references: usize,
    pub jobs_submitted: usize,
    pub chunks_failed: usize,
    pub jobs_completed: usize,
    pub jobs_stalled: usize,
    pub jobs_timed_out: usize,
    pub jobs_errored: usize,
    pub jobs_cancelled: usize,
    pub downloaded: usize,
    pub skipped: usize,
    pub download_failures: usize,
    pub elapsed: Duration,
}

impl RunSummary {
    fn record_jobs(&mut self, reports: &[JobReport]) {
        for report in reports {
            match report.outcome {
                PollOutcome::Completed(_) => self.jobs_completed += 1,
                PollOutcome::Stalled { .. } => self.jobs_stalled += 1,
                PollOutcome::TimedOut { .. } => self.jobs_timed_out += 1,
                PollOutcome::Error { .. } => self.jobs_errored += 1,
                PollOutcome::Cancelled { .. } => self.jobs_cancelled += 1,
            }
            if let Some(downloads) = &report.downloads {
                self.downloaded += downloads.downloaded.len();
                self.skipped += downloads.skipped;
                self.download_failures += downloads.failed;
            }
        }
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Process completed in {:.1?}", self.elapsed)?;
        writeln!(
            f,
            "  conversations: {}, recordings: {}",
            self.conversations, self.references
        )?;
        writeln!(
            f,
            "  jobs: {} submitted, {} chunk(s) rejected, {} completed, {} stalled, {} timed out, {} failed, {} cancelled",
            self.jobs_submitted,
            self.chunks_failed,
            self.jobs_completed,
            self.jobs_stalled,
            self.jobs_timed_out,
            self.jobs_errored,
            self.jobs_cancelled
        )?;
        write!(
            f,
            "  files: {} downloaded, {} skipped, {} failed",
            self.downloaded, self.skipped, self.download_failures
        )
    }
}

pub struct Pipeline {
    service: Arc<dyn RecordingService>,
    settings: PipelineSettings,
    cancel: CancellationToken,
}

impl Pipeline {
    pub fn new(service: Arc<dyn RecordingService>, settings: PipelineSettings) -> Self {
        Self {
            service,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    /// Uses `cancel` to abort sleeps and stop workers from taking new items.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Searches for conversations matching `query` and downloads their recordings.
    pub async fn run(&self, query: &ConversationQuery) -> Result<RunSummary, PipelineError> {
        info!("Starting paginated query");
        let ids = query::collect_conversation_ids(
            self.service.as_ref(),
            query,
            self.settings.search_page_size,
        )
        .await?;
        self.run_for_conversations(ids).await
    }

    /// Runs every phase after the search for the given conversations.
    pub async fn run_for_conversations(
        &self,
        conversation_ids: Vec<String>,
    ) -> Result<RunSummary, PipelineError> {
        let start = Instant::now();
        let mut summary = RunSummary {
            conversations: conversation_ids.len(),
            ..Default::default()
        };

        if conversation_ids.is_empty() {
            return Err(PipelineError::NoConversations);
        }

        let resolver = MetadataResolver::new(
            Arc::clone(&self.service),
            self.settings.metadata_workers,
            self.settings.metadata_retry,
            self.cancel.clone(),
        );
        let references = resolver.resolve(conversation_ids).await?;
        summary.references = references.len();
        self.check_cancelled()?;

        let submitter = BatchSubmitter::new(Arc::clone(&self.service), self.settings.max_batch_size);
        let submission = submitter.submit_all(&references).await?;
        summary.jobs_submitted = submission.handles.len();
        summary.chunks_failed = submission.failed_chunks;
        self.check_cancelled()?;

        let coordinator = PollCoordinator::new(
            JobPoller::new(
                Arc::clone(&self.service),
                self.settings.poll,
                self.cancel.clone(),
            ),
            DownloadPool::new(
                Arc::clone(&self.service),
                ArtifactStore::new(&self.settings.output_dir),
                self.settings.download_workers,
                self.cancel.clone(),
            ),
        );
        let reports = coordinator.run(submission.handles).await;
        summary.record_jobs(&reports);

        summary.elapsed = start.elapsed();
        Ok(summary)
    }

    fn check_cancelled(&self) -> Result<(), PipelineError> {
        if self.cancel.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }
}
