//! Downloads the ready artifacts of a completed job and persists them.

use chrono::Local;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::pool;
use crate::client::RecordingService;
use crate::model::{DownloadOutcome, JobStatus};
use crate::storage::{
    extension_for, is_safe_component, ArtifactMetadata, ArtifactStore, WriteError,
};

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("missing {0}, skipping item")]
    Missing(&'static str),
    #[error("{field} {value:?} is not a valid file name, skipping item")]
    UnsafeId { field: &'static str, value: String },
    #[error("failed to download recording {recording_id}: {source}")]
    Failed {
        recording_id: String,
        #[source]
        source: WriteError,
    },
}

/// A persisted recording.
#[derive(Debug, Clone)]
pub struct DownloadedArtifact {
    pub recording_id: String,
    pub conversation_id: String,
    pub path: PathBuf,
    /// `None` when the metadata record could not be written.
    pub metadata_path: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct DownloadReport {
    pub downloaded: Vec<DownloadedArtifact>,
    pub skipped: usize,
    pub failed: usize,
    pub abandoned: usize,
}

pub struct DownloadPool {
    service: Arc<dyn RecordingService>,
    store: ArtifactStore,
    workers: usize,
    cancel: CancellationToken,
}

impl DownloadPool {
    pub fn new(
        service: Arc<dyn RecordingService>,
        store: ArtifactStore,
        workers: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            service,
            store,
            workers,
            cancel,
        }
    }

    /// Downloads every item of `status` that carries a result URL.
    ///
    /// Items sharing a result URL are fetched once.
    pub async fn download_job(&self, status: &JobStatus) -> DownloadReport {
        let start = Instant::now();
        let mut seen = HashSet::new();
        let items: Vec<DownloadOutcome> = status
            .results
            .iter()
            .filter(|item| match item.result_url.as_deref() {
                Some(url) if !url.is_empty() => seen.insert(url.to_string()),
                _ => true,
            })
            .cloned()
            .collect();

        let total = items.len();
        let service = Arc::clone(&self.service);
        let store = self.store.clone();

        let report = pool::run(items, self.workers, &self.cancel, move |worker_id, item| {
            let service = Arc::clone(&service);
            let store = store.clone();
            async move {
                let artifact = download_item(service.as_ref(), &store, item).await?;
                info!(file = %artifact.path.display(), worker = worker_id, "Downloaded recording");
                Ok::<_, DownloadError>(artifact)
            }
        })
        .await;

        let mut summary = DownloadReport {
            downloaded: report.succeeded,
            abandoned: report.abandoned,
            ..Default::default()
        };
        for err in report.failed {
            match err {
                DownloadError::Missing(_) | DownloadError::UnsafeId { .. } => {
                    warn!(job_id = %status.job_id, "{}", err);
                    summary.skipped += 1;
                }
                DownloadError::Failed { .. } => {
                    error!(job_id = %status.job_id, "{}", err);
                    summary.failed += 1;
                }
            }
        }

        info!(
            job_id = %status.job_id,
            total_files = total,
            downloaded = summary.downloaded.len(),
            skipped = summary.skipped,
            failed = summary.failed,
            workers = self.workers,
            duration = ?start.elapsed(),
            "All downloads completed"
        );
        summary
    }
}

async fn download_item(
    service: &dyn RecordingService,
    store: &ArtifactStore,
    item: DownloadOutcome,
) -> Result<DownloadedArtifact, DownloadError> {
    let url = item
        .result_url
        .filter(|v| !v.is_empty())
        .ok_or(DownloadError::Missing("result URL"))?;
    let recording_id = item
        .recording_id
        .filter(|v| !v.is_empty())
        .ok_or(DownloadError::Missing("recording ID"))?;
    let conversation_id = item
        .conversation_id
        .filter(|v| !v.is_empty())
        .ok_or(DownloadError::Missing("conversation ID"))?;
    let ids = [
        ("recording ID", &recording_id),
        ("conversation ID", &conversation_id),
    ];
    for (field, value) in ids {
        if !is_safe_component(value) {
            return Err(DownloadError::UnsafeId {
                field,
                value: value.clone(),
            });
        }
    }

    let failed = |source: WriteError| DownloadError::Failed {
        recording_id: recording_id.clone(),
        source,
    };

    let dir = store
        .conversation_dir(Local::now().date_naive(), &conversation_id)
        .await
        .map_err(failed)?;
    let body = service
        .fetch_bytes(&url)
        .await
        .map_err(|err| failed(err.into()))?;
    let path = store
        .write_artifact(&dir, &recording_id, extension_for(item.content_type.as_deref()), body)
        .await
        .map_err(failed)?;

    let metadata = ArtifactMetadata {
        recording_id: recording_id.clone(),
        conversation_id: conversation_id.clone(),
        content_type: item.content_type,
        result_url: url,
        downloaded_at: Local::now(),
    };
    let metadata_path = match store.write_metadata(&dir, &metadata).await {
        Ok(path) => Some(path),
        Err(err) => {
            error!(recording_id = %recording_id, "Failed to write metadata: {}", err);
            None
        }
    };

    Ok(DownloadedArtifact {
        recording_id,
        conversation_id,
        path,
        metadata_path,
    })
}
