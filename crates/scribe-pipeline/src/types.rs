//! Core types shared by the pipeline stages

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Media container formats accepted by the transcription service.
pub const SUPPORTED_MEDIA_FORMATS: &[&str] =
    &["mp3", "mp4", "wav", "flac", "ogg", "amr", "webm", "m4a"];

/// Storage key naming one input audio object
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourceItem(String);

impl SourceItem {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn key(&self) -> &str {
        &self.0
    }

    /// Media format implied by the key's extension, if it is one we can submit.
    pub fn media_format(&self) -> Option<&'static str> {
        let (_, ext) = self.0.rsplit_once('.')?;
        let ext = ext.to_ascii_lowercase();
        SUPPORTED_MEDIA_FORMATS.iter().copied().find(|f| *f == ext)
    }
}

impl fmt::Display for SourceItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a transcription job as tracked by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Submitted,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Submitted => "submitted",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One asynchronous transcription job
///
/// Created by the submitter once the service accepts it; only the status
/// poller changes its status afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub source: SourceItem,
    status: JobStatus,
    failure_reason: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

impl Job {
    /// Fresh job name, unique for the run and valid as a Transcribe job name.
    pub fn new_id() -> String {
        format!("job-{}", Uuid::new_v4().simple())
    }

    pub fn submitted(id: impl Into<String>, source: SourceItem) -> Self {
        Self {
            id: id.into(),
            source,
            status: JobStatus::Submitted,
            failure_reason: None,
            submitted_at: Utc::now(),
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    /// Move to `next`. Terminal jobs never change; returns whether the
    /// status was updated.
    pub fn transition(&mut self, next: JobStatus) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = next;
        true
    }

    pub fn fail(&mut self, reason: impl Into<String>) -> bool {
        let updated = self.transition(JobStatus::Failed);
        if updated {
            self.failure_reason = Some(reason.into());
        }
        updated
    }

    /// Whole seconds the job has existed at `now`.
    pub fn seconds_since_submit(&self, now: DateTime<Utc>) -> i64 {
        (now - self.submitted_at).num_seconds()
    }

    /// Key of the service-written result document in the transcription bucket.
    pub fn result_key(&self) -> String {
        format!("{}.json", self.id)
    }

    /// Key of the redacted transcript in the redaction bucket.
    pub fn redacted_key(&self) -> String {
        format!("redacted_{}.json", self.id)
    }
}

/// Everything the transcription service needs to start one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    pub job_id: String,
    pub source: SourceItem,
    /// Candidate language codes, e.g. `en-IN`, `hi-IN`
    pub language_options: Vec<String>,
    pub media_format: String,
    pub max_speaker_labels: i32,
}

/// Job state as reported by the transcription service
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteStatus {
    Queued,
    InProgress,
    Completed,
    Failed { reason: Option<String> },
}

/// Entity span returned by PII detection, in character offsets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PiiSpan {
    pub start: usize,
    pub end: usize,
    pub entity_type: String,
}

impl PiiSpan {
    pub fn new(start: usize, end: usize, entity_type: impl Into<String>) -> Self {
        Self {
            start,
            end,
            entity_type: entity_type.into(),
        }
    }

    /// Same span moved `offset` characters to the right.
    pub fn shifted(self, offset: usize) -> Self {
        Self {
            start: self.start + offset,
            end: self.end + offset,
            ..self
        }
    }
}
