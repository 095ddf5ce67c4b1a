//! HTTP client for the recording service REST API.
//!
//! Authorizes once with client credentials, then sends bearer-authenticated
//! requests for search, recording metadata and batch export jobs.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{ByteStream, ClientError, RecordingService};
use crate::model::{
    ConversationRecord, JobHandle, JobStatus, RecordingMetadata, RecordingReference,
    SubmissionChunk,
};
use crate::query::{ConversationQuery, Paging};

const SEARCH_PATH: &str = "/api/v2/analytics/conversations/details/query";
const BATCH_PATH: &str = "/api/v2/recording/batchrequests";
const CONVERSATIONS_PATH: &str = "/api/v2/conversations";
const TOKEN_PATH: &str = "/oauth/token";

/// Where and as whom to authorize.
#[derive(Debug, Clone)]
pub struct ServiceCredentials {
    pub api_base_url: String,
    pub login_base_url: String,
    pub client_id: String,
    pub client_secret: String,
}

impl ServiceCredentials {
    /// Derives the API and login hosts from a region domain such as `mypurecloud.com`.
    pub fn for_environment(environment: &str, client_id: &str, client_secret: &str) -> Self {
        let environment = environment.trim().trim_matches('/');
        Self {
            api_base_url: format!("https://api.{environment}"),
            login_base_url: format!("https://login.{environment}"),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Serialize)]
struct SearchBody<'a> {
    #[serde(flatten)]
    query: &'a ConversationQuery,
    paging: Paging,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    conversations: Option<Vec<ConversationRecord>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchSubmission<'a> {
    batch_download_request_list: &'a [RecordingReference],
}

#[derive(Debug, Deserialize)]
struct BatchSubmissionResult {
    id: String,
}

pub struct HttpRecordingService {
    client: reqwest::Client,
    api_base_url: String,
    token: String,
}

impl HttpRecordingService {
    /// Authorizes with the client-credentials grant and returns a ready client.
    pub async fn connect(credentials: &ServiceCredentials) -> Result<Self, ClientError> {
        let client = reqwest::Client::new();
        let endpoint = format!(
            "{}{}",
            credentials.login_base_url.trim_end_matches('/'),
            TOKEN_PATH
        );

        let response = client
            .post(&endpoint)
            .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|source| ClientError::Transport {
                endpoint: endpoint.clone(),
                source,
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| ClientError::Transport {
                endpoint: endpoint.clone(),
                source,
            })?;

        if !status.is_success() {
            return Err(ClientError::Auth(format!("{status}: {body}")));
        }

        let token: TokenResponse = serde_json::from_str(&body).map_err(|source| {
            ClientError::Decode {
                endpoint: endpoint.clone(),
                source,
            }
        })?;

        info!("Authorized client credentials against {}", credentials.login_base_url);
        Ok(Self::with_token(&credentials.api_base_url, token.access_token))
    }

    /// Builds a client around an already issued access token.
    pub fn with_token(api_base_url: &str, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url, path)
    }

    /// Appends `segments` to `path`, percent-encoding each one.
    fn url_with_segments(&self, path: &str, segments: &[&str]) -> Result<Url, ClientError> {
        let raw = self.url(path);
        let invalid = |reason: String| ClientError::InvalidUrl {
            url: raw.clone(),
            reason,
        };
        let mut url = Url::parse(&raw).map_err(|err| invalid(err.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| invalid("cannot be a base URL".to_string()))?
            .extend(segments);
        Ok(url)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        endpoint: &str,
    ) -> Result<T, ClientError> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|source| ClientError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|source| ClientError::Transport {
                endpoint: endpoint.to_string(),
                source,
            })?;

        if !status.is_success() {
            return Err(ClientError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|source| ClientError::Decode {
            endpoint: endpoint.to_string(),
            source,
        })
    }
}

#[async_trait]
impl RecordingService for HttpRecordingService {
    async fn search_conversations(
        &self,
        query: &ConversationQuery,
        paging: Paging,
    ) -> Result<Vec<ConversationRecord>, ClientError> {
        let body = SearchBody { query, paging };
        let request = self.client.post(self.url(SEARCH_PATH)).json(&body);
        let response: SearchResponse = self.send_json(request, SEARCH_PATH).await?;
        Ok(response.conversations.unwrap_or_default())
    }

    async fn fetch_recording_metadata(
        &self,
        conversation_id: &str,
    ) -> Result<Vec<RecordingMetadata>, ClientError> {
        let url =
            self.url_with_segments(CONVERSATIONS_PATH, &[conversation_id, "recordingmetadata"])?;
        let endpoint = url.path().to_string();
        self.send_json(self.client.get(url), &endpoint).await
    }

    async fn submit_batch(&self, chunk: &SubmissionChunk) -> Result<JobHandle, ClientError> {
        let body = BatchSubmission {
            batch_download_request_list: &chunk.references,
        };
        let request = self.client.post(self.url(BATCH_PATH)).json(&body);
        let result: BatchSubmissionResult = self.send_json(request, BATCH_PATH).await?;
        Ok(JobHandle {
            job_id: result.id,
            reference_count: chunk.len(),
        })
    }

    async fn poll_job(&self, job: &JobHandle) -> Result<JobStatus, ClientError> {
        let url = self.url_with_segments(BATCH_PATH, &[job.job_id.as_str()])?;
        let endpoint = url.path().to_string();
        self.send_json(self.client.get(url), &endpoint).await
    }

    async fn fetch_bytes(&self, url: &str) -> Result<ByteStream, ClientError> {
        debug!("Fetching artifact from {}", url);

        // Result URLs are pre-signed; they must not carry the bearer token.
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| ClientError::Transport {
                endpoint: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                endpoint: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let endpoint = url.to_string();
        let stream = response.bytes_stream().map(move |chunk| {
            chunk.map_err(|source| ClientError::Transport {
                endpoint: endpoint.clone(),
                source,
            })
        });
        Ok(Box::pin(stream))
    }
}
