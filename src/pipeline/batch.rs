//! Splits references into submission chunks and submits each as a job.

use std::sync::Arc;
use tracing::{error, info, warn};

use super::PipelineError;
use crate::client::RecordingService;
use crate::model::{JobHandle, RecordingReference, SubmissionChunk};

pub const MAX_BATCH_SIZE: usize = 100;

/// Splits `references` positionally into chunks of at most `max_size`.
pub fn chunk_references(references: &[RecordingReference], max_size: usize) -> Vec<SubmissionChunk> {
    references
        .chunks(max_size.max(1))
        .enumerate()
        .map(|(index, chunk)| SubmissionChunk {
            index,
            references: chunk.to_vec(),
        })
        .collect()
}

#[derive(Debug, Default)]
pub struct SubmissionReport {
    pub handles: Vec<JobHandle>,
    pub failed_chunks: usize,
}

pub struct BatchSubmitter {
    service: Arc<dyn RecordingService>,
    max_batch_size: usize,
}

impl BatchSubmitter {
    pub fn new(service: Arc<dyn RecordingService>, max_batch_size: usize) -> Self {
        Self {
            service,
            max_batch_size,
        }
    }

    /// Submits every chunk in order, one call each.
    ///
    /// A rejected chunk is logged and skipped without retry. Fails only when
    /// no chunk was accepted.
    pub async fn submit_all(
        &self,
        references: &[RecordingReference],
    ) -> Result<SubmissionReport, PipelineError> {
        if references.is_empty() {
            warn!("Empty batch request, no recordings to submit");
            return Err(PipelineError::NoJobsSubmitted { chunks: 0 });
        }

        let chunks = chunk_references(references, self.max_batch_size);
        let total = chunks.len();
        let mut report = SubmissionReport::default();

        for chunk in &chunks {
            let start = chunk.index * self.max_batch_size.max(1);
            let end = start + chunk.len();

            match self.service.submit_batch(chunk).await {
                Ok(handle) => {
                    info!(job_id = %handle.job_id, count = chunk.len(), "Partial batch sent");
                    report.handles.push(handle);
                }
                Err(err) => {
                    error!(start, end, "Error sending partial batch request: {}", err);
                    report.failed_chunks += 1;
                }
            }
        }

        if report.handles.is_empty() {
            return Err(PipelineError::NoJobsSubmitted { chunks: total });
        }

        Ok(report)
    }
}
