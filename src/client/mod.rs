//! Remote recording service seam.
//!
//! The pipeline talks to the service only through [`RecordingService`], so
//! the HTTP implementation can be swapped for an in-memory one in tests.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use thiserror::Error;

use crate::model::{ConversationRecord, JobHandle, JobStatus, RecordingMetadata, SubmissionChunk};
use crate::query::{ConversationQuery, Paging};

pub mod http;

pub use http::{HttpRecordingService, ServiceCredentials};

/// Body of a fetched artifact, yielded chunk by chunk.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ClientError>> + Send>>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{endpoint} returned {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },
    #[error("failed to parse {endpoint} response: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("authorization failed: {0}")]
    Auth(String),
    #[error("invalid service URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

#[async_trait]
pub trait RecordingService: Send + Sync {
    /// One page of the conversation search.
    async fn search_conversations(
        &self,
        query: &ConversationQuery,
        paging: Paging,
    ) -> Result<Vec<ConversationRecord>, ClientError>;

    async fn fetch_recording_metadata(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<RecordingMetadata>, ClientError>;

    /// Submits one chunk as a batch export job.
    async fn submit_batch(&self, chunk: &SubmissionChunk) -> Result<JobHandle, ClientError>;

    async fn poll_job(&self, job: &JobHandle) -> Result<JobStatus, ClientError>;

    /// Opens the artifact behind a result URL.
    async fn fetch_bytes(&self, url: &str) -> Result<ByteStream, ClientError>;
}
