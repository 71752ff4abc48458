//! Collaborator seams
//!
//! The pipeline only talks to object storage, the transcription service and
//! the PII detector through these traits. Production implementations live in
//! [`crate::storage`] and [`crate::aws`]; tests plug in in-memory fakes.

use crate::types::{PiiSpan, RemoteStatus, SubmitRequest};
use async_trait::async_trait;
use scribe_common::Result;
use std::fmt;
use std::sync::Arc;

/// Flat key/value object storage, one instance per bucket
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// All object keys, in listing order.
    async fn list_keys(&self) -> Result<Vec<String>>;

    /// Object body, or `None` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<()>;

    /// Human readable location for logs, e.g. `s3://bucket/prefix`.
    fn location(&self) -> String;
}

/// Asynchronous speech-to-text jobs
///
/// On completion the service writes `<job_id>.json` into the transcription
/// store the pipeline reads from.
#[async_trait]
pub trait TranscriptionService: Send + Sync {
    /// Start a job. Returns the job name the service accepted.
    async fn submit(&self, request: &SubmitRequest) -> Result<String>;

    async fn status(&self, job_id: &str) -> Result<RemoteStatus>;
}

/// PII entity detection over plain text
#[async_trait]
pub trait PiiDetector: Send + Sync {
    /// Entity spans in character offsets of `text`.
    async fn detect(&self, text: &str, language: &str) -> Result<Vec<PiiSpan>>;
}

/// Everything a pipeline run talks to
#[derive(Clone)]
pub struct Services {
    pub input: Arc<dyn ObjectStore>,
    pub transcripts: Arc<dyn ObjectStore>,
    pub redacted: Arc<dyn ObjectStore>,
    pub transcriber: Arc<dyn TranscriptionService>,
    pub detector: Arc<dyn PiiDetector>,
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("input", &self.input.location())
            .field("transcripts", &self.transcripts.location())
            .field("redacted", &self.redacted.location())
            .finish_non_exhaustive()
    }
}
