//! Scripted in-memory recording service for pipeline tests.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::client::{ByteStream, ClientError, RecordingService};
use crate::model::{
    ConversationRecord, DownloadOutcome, JobHandle, JobStatus, RecordingMetadata,
    SubmissionChunk,
};
use crate::query::{ConversationQuery, Paging};

pub(crate) fn unavailable(endpoint: &str) -> ClientError {
    ClientError::Status {
        endpoint: endpoint.to_string(),
        status: 503,
        body: "service unavailable".to_string(),
    }
}

pub(crate) fn metadata(conversation_id: &str, recording_id: &str) -> RecordingMetadata {
    RecordingMetadata {
        id: Some(recording_id.to_string()),
        conversation_id: Some(conversation_id.to_string()),
    }
}

pub(crate) fn ready_item(conversation_id: &str, recording_id: &str) -> DownloadOutcome {
    DownloadOutcome {
        recording_id: Some(recording_id.to_string()),
        conversation_id: Some(conversation_id.to_string()),
        content_type: Some("audio/mpeg".to_string()),
        result_url: Some(format!("https://files.test/{recording_id}")),
        error_message: None,
    }
}

pub(crate) fn status(job_id: &str, result_count: u32, expected_count: u32) -> JobStatus {
    JobStatus {
        job_id: job_id.to_string(),
        result_count,
        expected_count,
        results: Vec::new(),
    }
}

type Script<T> = VecDeque<Result<T, ()>>;

/// Jobs without a poll script complete on the first poll with a ready item
/// for every submitted reference.
#[derive(Default)]
pub(crate) struct FakeService {
    search_pages: Vec<usize>,
    unidentified_per_page: usize,
    search_calls: AtomicUsize,
    metadata_scripts: Mutex<HashMap<String, Script<Vec<RecordingMetadata>>>>,
    metadata_calls: Mutex<HashMap<String, u32>>,
    failing_chunks: HashSet<usize>,
    submitted: Mutex<Vec<SubmissionChunk>>,
    poll_scripts: Mutex<HashMap<String, Script<JobStatus>>>,
    poll_calls: Mutex<HashMap<String, u32>>,
    failing_urls: HashSet<String>,
    fetch_delay: Option<Duration>,
    fetches: AtomicUsize,
    fetches_in_flight: AtomicUsize,
    peak_fetches: AtomicUsize,
}

impl FakeService {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Page sizes returned by successive search calls; later pages are empty.
    pub(crate) fn with_search_pages(mut self, pages: Vec<usize>) -> Self {
        self.search_pages = pages;
        self
    }

    /// The first `count` records of every page carry no conversation ID.
    pub(crate) fn with_unidentified_records(mut self, count: usize) -> Self {
        self.unidentified_per_page = count;
        self
    }

    pub(crate) fn with_recordings(self, conversation_id: &str, recording_ids: &[&str]) -> Self {
        let entries = recording_ids
            .iter()
            .map(|id| metadata(conversation_id, id))
            .collect();
        self.with_metadata_script(conversation_id, vec![Ok(entries)])
    }

    /// Successive metadata responses; the last one repeats.
    pub(crate) fn with_metadata_script(
        self,
        conversation_id: &str,
        script: Vec<Result<Vec<RecordingMetadata>, ()>>,
    ) -> Self {
        self.metadata_scripts
            .lock()
            .unwrap()
            .insert(conversation_id.to_string(), script.into());
        self
    }

    pub(crate) fn with_failing_chunks(mut self, indices: &[usize]) -> Self {
        self.failing_chunks = indices.iter().copied().collect();
        self
    }

    /// Successive poll responses for a job; the last one repeats.
    pub(crate) fn with_poll_script(self, job_id: &str, script: Vec<Result<JobStatus, ()>>) -> Self {
        self.poll_scripts
            .lock()
            .unwrap()
            .insert(job_id.to_string(), script.into());
        self
    }

    pub(crate) fn with_failing_url(mut self, url: &str) -> Self {
        self.failing_urls.insert(url.to_string());
        self
    }

    pub(crate) fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    pub(crate) fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn metadata_calls(&self, conversation_id: &str) -> u32 {
        self.metadata_calls
            .lock()
            .unwrap()
            .get(conversation_id)
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn poll_calls(&self, job_id: &str) -> u32 {
        self.poll_calls
            .lock()
            .unwrap()
            .get(job_id)
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn submitted(&self) -> Vec<SubmissionChunk> {
        self.submitted.lock().unwrap().clone()
    }

    pub(crate) fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub(crate) fn peak_fetches(&self) -> usize {
        self.peak_fetches.load(Ordering::SeqCst)
    }

    fn next_from<T: Clone>(script: &mut Script<T>) -> Option<Result<T, ()>> {
        if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        }
    }

    fn completed_status(&self, job_id: &str) -> Option<JobStatus> {
        let submitted = self.submitted.lock().unwrap();
        let index: usize = job_id.strip_prefix("job-")?.parse().ok()?;
        let chunk = submitted.iter().find(|c| c.index == index)?;
        let results: Vec<DownloadOutcome> = chunk
            .references
            .iter()
            .map(|r| ready_item(&r.conversation_id, &r.recording_id))
            .collect();
        let count = results.len() as u32;
        Some(JobStatus {
            job_id: job_id.to_string(),
            result_count: count,
            expected_count: count,
            results,
        })
    }
}

#[async_trait]
impl RecordingService for FakeService {
    async fn search_conversations(
        &self,
        _query: &ConversationQuery,
        paging: Paging,
    ) -> Result<Vec<ConversationRecord>, ClientError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        let page = paging.page_number as usize;
        let size = self.search_pages.get(page - 1).copied().unwrap_or(0);
        Ok((0..size)
            .map(|i| ConversationRecord {
                conversation_id: (i >= self.unidentified_per_page)
                    .then(|| format!("conv-{page}-{i}")),
            })
            .collect())
    }

    async fn fetch_recording_metadata(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<RecordingMetadata>, ClientError> {
        *self
            .metadata_calls
            .lock()
            .unwrap()
            .entry(conversation_id.to_string())
            .or_default() += 1;

        let next = self
            .metadata_scripts
            .lock()
            .unwrap()
            .get_mut(conversation_id)
            .and_then(Self::next_from);

        match next {
            Some(Ok(entries)) => Ok(entries),
            Some(Err(())) => Err(unavailable("recordingmetadata")),
            None => Ok(Vec::new()),
        }
    }

    async fn submit_batch(&self, chunk: &SubmissionChunk) -> Result<JobHandle, ClientError> {
        if self.failing_chunks.contains(&chunk.index) {
            return Err(unavailable("batchrequests"));
        }
        self.submitted.lock().unwrap().push(chunk.clone());
        Ok(JobHandle {
            job_id: format!("job-{}", chunk.index),
            reference_count: chunk.len(),
        })
    }

    async fn poll_job(&self, job: &JobHandle) -> Result<JobStatus, ClientError> {
        *self
            .poll_calls
            .lock()
            .unwrap()
            .entry(job.job_id.clone())
            .or_default() += 1;

        let next = self
            .poll_scripts
            .lock()
            .unwrap()
            .get_mut(&job.job_id)
            .and_then(Self::next_from);

        match next {
            Some(Ok(status)) => Ok(status),
            Some(Err(())) => Err(unavailable("batchrequests/{id}")),
            None => self
                .completed_status(&job.job_id)
                .ok_or_else(|| unavailable("batchrequests/{id}")),
        }
    }

    async fn fetch_bytes(&self, url: &str) -> Result<ByteStream, ClientError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let now = self.fetches_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_fetches.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }
        self.fetches_in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing_urls.contains(url) {
            return Err(ClientError::Status {
                endpoint: url.to_string(),
                status: 404,
                body: String::new(),
            });
        }

        let body = Bytes::from(format!("audio from {url}"));
        Ok(Box::pin(futures::stream::iter(vec![Ok::<_, ClientError>(body)])))
    }
}
