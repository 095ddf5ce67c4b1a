//! Data model shared by the pipeline phases and the remote service client.
//!
//! Wire-facing types use the remote service's camelCase field names.

use serde::{Deserialize, Serialize};

/// One downloadable artifact: a recording inside a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingReference {
    pub conversation_id: String,
    pub recording_id: String,
}

impl RecordingReference {
    pub fn new(conversation_id: impl Into<String>, recording_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            recording_id: recording_id.into(),
        }
    }
}

/// A single row of a conversation search page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationRecord {
    pub conversation_id: Option<String>,
}

/// Recording metadata as returned for one conversation.
///
/// Either identifier may be absent on malformed entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingMetadata {
    pub id: Option<String>,
    pub conversation_id: Option<String>,
}

impl RecordingMetadata {
    /// Converts to a reference when both identifiers are present and non-empty.
    pub fn into_reference(self) -> Option<RecordingReference> {
        match (self.conversation_id, self.id) {
            (Some(conversation_id), Some(recording_id))
                if !conversation_id.is_empty() && !recording_id.is_empty() =>
            {
                Some(RecordingReference {
                    conversation_id,
                    recording_id,
                })
            }
            _ => None,
        }
    }
}

/// Ordered group of references sent in one batch submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionChunk {
    /// Position of the chunk in the flattened reference list.
    pub index: usize,
    pub references: Vec<RecordingReference>,
}

impl SubmissionChunk {
    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }
}

/// Identifier of an accepted batch export job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobHandle {
    pub job_id: String,
    /// Number of references submitted with the job.
    pub reference_count: usize,
}

/// Snapshot of a batch job, replaced wholesale on every poll.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    #[serde(rename = "id")]
    pub job_id: String,
    #[serde(default)]
    pub result_count: u32,
    #[serde(rename = "expectedResultCount", default)]
    pub expected_count: u32,
    #[serde(default)]
    pub results: Vec<DownloadOutcome>,
}

impl JobStatus {
    pub fn is_complete(&self) -> bool {
        self.expected_count > 0 && self.result_count == self.expected_count
    }

    /// Items whose artifact can be fetched.
    pub fn ready(&self) -> impl Iterator<Item = &DownloadOutcome> {
        self.results
            .iter()
            .filter(|item| matches!(item.state(), OutcomeState::Ready(_)))
    }
}

/// Per-recording result of a batch job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadOutcome {
    pub recording_id: Option<String>,
    pub conversation_id: Option<String>,
    pub content_type: Option<String>,
    pub result_url: Option<String>,
    #[serde(rename = "errorMsg")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeState<'a> {
    Ready(&'a str),
    Failed(&'a str),
    Pending,
}

impl DownloadOutcome {
    pub fn state(&self) -> OutcomeState<'_> {
        if let Some(url) = self.result_url.as_deref().filter(|u| !u.is_empty()) {
            return OutcomeState::Ready(url);
        }
        if let Some(msg) = self.error_message.as_deref().filter(|m| !m.is_empty()) {
            return OutcomeState::Failed(msg);
        }
        OutcomeState::Pending
    }
}
