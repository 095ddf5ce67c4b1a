//! Resolves conversation IDs to recording references.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{pool, PipelineError};
use crate::client::{ClientError, RecordingService};
use crate::model::RecordingReference;

/// Linear backoff: the wait after failed attempt `n` is `delay * n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.delay * attempt
    }
}

/// A conversation whose metadata could not be fetched.
#[derive(Debug)]
pub struct ResolveFailure {
    pub conversation_id: String,
    pub attempts: u32,
    pub last_error: Option<ClientError>,
}

pub struct MetadataResolver {
    service: Arc<dyn RecordingService>,
    workers: usize,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl MetadataResolver {
    pub fn new(
        service: Arc<dyn RecordingService>,
        workers: usize,
        retry: RetryPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            service,
            workers,
            retry,
            cancel,
        }
    }

    /// Resolves every conversation concurrently.
    ///
    /// Individual failures are logged and dropped; the call only fails when
    /// nothing at all was resolved.
    pub async fn resolve(
        &self,
        conversation_ids: Vec<String>,
    ) -> Result<Vec<RecordingReference>, PipelineError> {
        let conversations = conversation_ids.len();
        let service = Arc::clone(&self.service);
        let retry = self.retry;
        let cancel = self.cancel.clone();

        let report = pool::run(conversation_ids, self.workers, &self.cancel, move |worker_id, id| {
            let service = Arc::clone(&service);
            let cancel = cancel.clone();
            async move {
                debug!(worker_id, conversation_id = %id, "Worker fetching metadata");
                fetch_with_retry(service.as_ref(), &id, retry, &cancel).await
            }
        })
        .await;

        for failure in &report.failed {
            match &failure.last_error {
                Some(err) => error!(
                    conversation_id = %failure.conversation_id,
                    attempts = failure.attempts,
                    "Failed to fetch metadata after retries: {}",
                    err
                ),
                None => warn!(
                    conversation_id = %failure.conversation_id,
                    "Metadata fetch cancelled"
                ),
            }
        }

        let references: Vec<RecordingReference> = report.succeeded.into_iter().flatten().collect();

        if references.is_empty() {
            if self.cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            warn!("No recordings found to include in the batch");
            return Err(PipelineError::NoRecordings { conversations });
        }

        info!(
            total_recordings = references.len(),
            failed_conversations = report.failed.len(),
            "Batch ready"
        );
        Ok(references)
    }
}

/// Fetches one conversation's metadata with linear backoff between attempts.
///
/// Malformed entries (missing either identifier) are dropped.
pub async fn fetch_with_retry(
    service: &dyn RecordingService,
    conversation_id: &str,
    retry: RetryPolicy,
    cancel: &CancellationToken,
) -> Result<Vec<RecordingReference>, ResolveFailure> {
    let max_attempts = retry.max_attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=max_attempts {
        match service.fetch_recording_metadata(conversation_id).await {
            Ok(entries) => {
                let references: Vec<RecordingReference> = entries
                    .into_iter()
                    .filter_map(|entry| entry.into_reference())
                    .collect();
                for reference in &references {
                    debug!(
                        conversation_id = %reference.conversation_id,
                        recording_id = %reference.recording_id,
                        "Added recording"
                    );
                }
                return Ok(references);
            }
            Err(err) => {
                warn!(
                    conversation_id,
                    attempt,
                    "Retrying metadata fetch: {}",
                    err
                );
                last_error = Some(err);
            }
        }

        if attempt < max_attempts {
            tokio::select! {
                _ = tokio::time::sleep(retry.backoff(attempt)) => {}
                _ = cancel.cancelled() => {
                    return Err(ResolveFailure {
                        conversation_id: conversation_id.to_string(),
                        attempts: attempt,
                        last_error: None,
                    });
                }
            }
        }
    }

    Err(ResolveFailure {
        conversation_id: conversation_id.to_string(),
        attempts: max_attempts,
        last_error,
    })
}
