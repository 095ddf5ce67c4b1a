//! Local layout for downloaded recordings.
//!
//! ```text
//! <root>/<YYMMDD>-<conversationId>/
//!     <recordingId>.<ext>
//!     metadata.txt
//! ```

use chrono::{DateTime, Local, NaiveDate};
use futures::StreamExt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::client::{ByteStream, ClientError};

pub const METADATA_FILE: &str = "metadata.txt";
const RECORD_START: &str = "Recording ID: ";
const DEFAULT_EXTENSION: &str = "mp3";

/// Why writing an artifact failed.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error(transparent)]
    Fetch(#[from] ClientError),
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Metadata record stored next to each artifact.
#[derive(Debug, Clone)]
pub struct ArtifactMetadata {
    pub recording_id: String,
    pub conversation_id: String,
    pub content_type: Option<String>,
    pub result_url: String,
    pub downloaded_at: DateTime<Local>,
}

impl ArtifactMetadata {
    pub fn render(&self) -> String {
        format!(
            "{RECORD_START}{}\nConversation ID: {}\nContent Type: {}\nResult URL: {}\nFecha de descarga: {}\n",
            self.recording_id,
            self.conversation_id,
            self.content_type.as_deref().unwrap_or("N/A"),
            self.result_url,
            self.downloaded_at.format("%Y-%m-%d %H:%M:%S"),
        )
    }
}

/// Directory name for a conversation downloaded on `date`.
pub fn folder_name(date: NaiveDate, conversation_id: &str) -> String {
    format!("{}-{}", date.format("%y%m%d"), conversation_id)
}

/// Whether `id` can be used as a single path component under the output root.
pub fn is_safe_component(id: &str) -> bool {
    !id.is_empty()
        && id != "."
        && id != ".."
        && !id.contains(['/', '\\', '\0'])
}

/// File extension for a recording content type.
pub fn extension_for(content_type: Option<&str>) -> &'static str {
    let Some(content_type) = content_type else {
        return DEFAULT_EXTENSION;
    };
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/ogg" => "ogg",
        "audio/opus" => "opus",
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        "audio/webm" => "webm",
        _ => DEFAULT_EXTENSION,
    }
}

/// Writes artifacts and their metadata under a fixed output root.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    // Serializes read-modify-write of metadata files across workers.
    metadata_lock: Arc<Mutex<()>>,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            metadata_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Creates (if needed) the directory for a conversation on `date`.
    pub async fn conversation_dir(
        &self,
        date: NaiveDate,
        conversation_id: &str,
    ) -> Result<PathBuf, WriteError> {
        let dir = self.root.join(folder_name(date, conversation_id));
        fs::create_dir_all(&dir)
            .await
            .map_err(|source| WriteError::Io {
                path: dir.clone(),
                source,
            })?;
        Ok(dir)
    }

    /// Streams an artifact body to `<dir>/<recording_id>.<extension>`.
    ///
    /// A partially written file is removed when the stream fails.
    pub async fn write_artifact(
        &self,
        dir: &Path,
        recording_id: &str,
        extension: &str,
        mut body: ByteStream,
    ) -> Result<PathBuf, WriteError> {
        let path = dir.join(format!("{recording_id}.{extension}"));
        let io_err = |source| WriteError::Io {
            path: path.clone(),
            source,
        };

        let mut file = fs::File::create(&path).await.map_err(io_err)?;

        if let Err(err) = copy_body(&mut body, &mut file, &path).await {
            drop(file);
            let _ = fs::remove_file(&path).await;
            return Err(err);
        }

        Ok(path)
    }

    /// Writes the metadata record for one artifact into the conversation's
    /// metadata file.
    ///
    /// Several recordings of one conversation share the file. A record for the
    /// same recording ID left by an earlier run is replaced, so the file holds
    /// one record per artifact.
    pub async fn write_metadata(
        &self,
        dir: &Path,
        metadata: &ArtifactMetadata,
    ) -> Result<PathBuf, WriteError> {
        let path = dir.join(METADATA_FILE);
        let io_err = |source| WriteError::Io {
            path: path.clone(),
            source,
        };

        let _guard = self.metadata_lock.lock().await;
        let existing = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => String::new(),
            Err(err) => return Err(io_err(err)),
        };

        let mut content = without_record(&existing, &metadata.recording_id);
        content.push_str(&metadata.render());
        fs::write(&path, content).await.map_err(io_err)?;
        Ok(path)
    }
}

/// Drops the record whose first line names `recording_id`.
fn without_record(content: &str, recording_id: &str) -> String {
    let header = format!("{RECORD_START}{recording_id}");
    let mut kept = String::with_capacity(content.len());
    let mut skipping = false;
    for line in content.lines() {
        if line.starts_with(RECORD_START) {
            skipping = line == header;
        }
        if !skipping {
            kept.push_str(line);
            kept.push('\n');
        }
    }
    kept
}

async fn copy_body(
    body: &mut ByteStream,
    file: &mut fs::File,
    path: &Path,
) -> Result<(), WriteError> {
    let io_err = |source| WriteError::Io {
        path: path.to_path_buf(),
        source,
    };
    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await.map_err(io_err)?;
    }
    file.flush().await.map_err(io_err)
}
