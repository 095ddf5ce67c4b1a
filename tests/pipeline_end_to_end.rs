//! End-to-end run of the pipeline against an in-memory recording service.

use async_trait::async_trait;
use bytes::Bytes;
use recfetch::client::{ByteStream, ClientError, RecordingService};
use recfetch::model::{
    ConversationRecord, DownloadOutcome, JobHandle, JobStatus, RecordingMetadata, SubmissionChunk,
};
use recfetch::pipeline::{Pipeline, PipelineSettings, PollSettings};
use recfetch::query::{ConversationQuery, Paging};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::tempdir;

/// One recording per conversation; every job reports half progress on the
/// first poll and completes on the second.
#[derive(Default)]
struct InMemoryService {
    submitted: Mutex<Vec<SubmissionChunk>>,
    polls: Mutex<HashMap<String, u32>>,
}

#[async_trait]
impl RecordingService for InMemoryService {
    async fn search_conversations(
        &self,
        _query: &ConversationQuery,
        _paging: Paging,
    ) -> Result<Vec<ConversationRecord>, ClientError> {
        Ok(Vec::new())
    }

    async fn fetch_recording_metadata(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<RecordingMetadata>, ClientError> {
        Ok(vec![RecordingMetadata {
            id: Some(format!("rec-{conversation_id}")),
            conversation_id: Some(conversation_id.to_string()),
        }])
    }

    async fn submit_batch(&self, chunk: &SubmissionChunk) -> Result<JobHandle, ClientError> {
        self.submitted.lock().unwrap().push(chunk.clone());
        Ok(JobHandle {
            job_id: format!("job-{}", chunk.index),
            reference_count: chunk.len(),
        })
    }

    async fn poll_job(&self, job: &JobHandle) -> Result<JobStatus, ClientError> {
        let poll = {
            let mut polls = self.polls.lock().unwrap();
            let count = polls.entry(job.job_id.clone()).or_default();
            *count += 1;
            *count
        };

        let index: usize = job.job_id.trim_start_matches("job-").parse().unwrap();
        let chunk = self
            .submitted
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.index == index)
            .cloned()
            .unwrap();
        let expected = chunk.len() as u32;

        if poll == 1 {
            return Ok(JobStatus {
                job_id: job.job_id.clone(),
                result_count: expected / 2,
                expected_count: expected,
                results: Vec::new(),
            });
        }

        let results = chunk
            .references
            .iter()
            .map(|r| DownloadOutcome {
                recording_id: Some(r.recording_id.clone()),
                conversation_id: Some(r.conversation_id.clone()),
                content_type: Some("audio/mpeg".to_string()),
                result_url: Some(format!("https://files.test/{}", r.recording_id)),
                error_message: None,
            })
            .collect();
        Ok(JobStatus {
            job_id: job.job_id.clone(),
            result_count: expected,
            expected_count: expected,
            results,
        })
    }

    async fn fetch_bytes(&self, url: &str) -> Result<ByteStream, ClientError> {
        let body = Bytes::from(url.to_string());
        Ok(Box::pin(futures::stream::iter(vec![Ok::<_, ClientError>(body)])))
    }
}

#[tokio::test(start_paused = true)]
async fn test_250_references_end_to_end() {
    let temp = tempdir().unwrap();
    let service = Arc::new(InMemoryService::default());
    let settings = PipelineSettings {
        output_dir: temp.path().to_path_buf(),
        download_workers: 8,
        poll: PollSettings {
            max_attempts: 50,
            max_stalled: 30,
            interval: Duration::from_secs(25),
        },
        ..Default::default()
    };
    let pipeline = Pipeline::new(service.clone(), settings);
    let conversations: Vec<String> = (0..250).map(|i| format!("conv-{i:03}")).collect();

    let summary = pipeline.run_for_conversations(conversations).await.unwrap();

    let mut sizes: Vec<usize> = service
        .submitted
        .lock()
        .unwrap()
        .iter()
        .map(|c| c.len())
        .collect();
    sizes.sort_unstable();
    assert_eq!(sizes, vec![50, 100, 100]);

    assert_eq!(summary.references, 250);
    assert_eq!(summary.jobs_submitted, 3);
    assert_eq!(summary.jobs_completed, 3);
    assert_eq!(summary.downloaded, 250);
    assert_eq!(summary.skipped + summary.download_failures, 0);

    let dirs: Vec<_> = std::fs::read_dir(temp.path())
        .unwrap()
        .map(|e| e.unwrap())
        .collect();
    assert_eq!(dirs.len(), 250);

    for dir in dirs {
        let name = dir.file_name().to_string_lossy().to_string();
        let (date, conversation_id) = name.split_at(6);
        assert!(date.chars().all(|c| c.is_ascii_digit()), "bad dir {name}");
        let conversation_id = conversation_id.trim_start_matches('-');

        let mut files: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        files.sort_unstable();
        assert_eq!(
            files,
            vec!["metadata.txt".to_string(), format!("rec-{conversation_id}.mp3")]
        );
    }
}
