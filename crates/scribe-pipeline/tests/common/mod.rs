//! In-memory collaborators for pipeline integration tests
//!
//! - [`MemoryStore`]: object store backed by a map
//! - [`FakeTranscriber`]: scripted transcription jobs that write their result
//!   document into a [`MemoryStore`] once they complete
//! - [`FakeDetector`]: reports every occurrence of known words as PII
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::TestBed;
//!
//! #[tokio::test(start_paused = true)]
//! async fn test_run() {
//!     let bed = TestBed::new(&["a.mp3"]);
//!     let report = bed.pipeline(2).run().await.unwrap();
//!     assert_eq!(report.counters.redacted, 1);
//! }
//! ```

#![allow(dead_code)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use scribe_common::{Result, ScribeError};
use scribe_pipeline::config::{PipelineConfig, PipelineSettings};
use scribe_pipeline::types::{PiiSpan, RemoteStatus, SubmitRequest};
use scribe_pipeline::{ObjectStore, PiiDetector, Pipeline, Services, TranscriptionService};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

// ============================================================================
// Object storage
// ============================================================================

#[derive(Debug, Default)]
pub struct MemoryStore {
    name: String,
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    fail_listing: bool,
}

impl MemoryStore {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn with_keys(name: &str, keys: &[&str]) -> Self {
        let store = Self::new(name);
        for key in keys {
            store.insert(key, b"audio".to_vec());
        }
        store
    }

    pub fn failing_listing(name: &str) -> Self {
        Self {
            fail_listing: true,
            ..Self::new(name)
        }
    }

    pub fn insert(&self, key: &str, body: Vec<u8>) {
        self.objects.lock().unwrap().insert(key.to_string(), body);
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn json(&self, key: &str) -> Option<serde_json::Value> {
        let objects = self.objects.lock().unwrap();
        objects
            .get(key)
            .map(|body| serde_json::from_slice(body).expect("stored object is JSON"))
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_keys(&self) -> Result<Vec<String>> {
        if self.fail_listing {
            return Err(ScribeError::Storage(format!("{} is unreachable", self.name)));
        }
        Ok(self.keys())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.objects.lock().unwrap().get(key).cloned())
    }

    async fn put(&self, key: &str, body: Vec<u8>, _content_type: &str) -> Result<()> {
        self.insert(key, body);
        Ok(())
    }

    fn location(&self) -> String {
        format!("memory://{}", self.name)
    }
}

// ============================================================================
// Transcription
// ============================================================================

/// How a scripted job ends
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Completes and writes a result document with these words
    Complete {
        words: Vec<(&'static str, f64, f64, &'static str)>,
        language: Option<&'static str>,
    },
    /// Completes but never writes a result document
    CompleteWithoutResult,
    /// Completes with a result document that is not valid JSON
    CompleteWithGarbage,
    Fail(&'static str),
    /// Submission is rejected
    RejectSubmit,
    /// Every status call errors
    StatusUnavailable,
}

#[derive(Debug, Clone)]
pub struct Script {
    pub outcome: Outcome,
    /// Status calls answered with InProgress before the outcome
    pub polls_before_done: u32,
}

impl Script {
    pub fn complete(words: Vec<(&'static str, f64, f64, &'static str)>) -> Self {
        Self {
            outcome: Outcome::Complete {
                words,
                language: None,
            },
            polls_before_done: 0,
        }
    }

    pub fn outcome(outcome: Outcome) -> Self {
        Self {
            outcome,
            polls_before_done: 0,
        }
    }

    pub fn after_polls(mut self, polls: u32) -> Self {
        self.polls_before_done = polls;
        self
    }
}

#[derive(Debug)]
struct FakeJob {
    source: String,
    remaining: u32,
    outcome: Outcome,
    reported: bool,
}

#[derive(Debug, Default)]
struct TranscriberState {
    jobs: HashMap<String, FakeJob>,
    submissions: Vec<SubmitRequest>,
    status_calls: HashMap<String, u32>,
    active: usize,
    max_active: usize,
}

/// Scripted transcription service
///
/// Sources without a script complete after `default_polls` status calls with a
/// one-word transcript.
pub struct FakeTranscriber {
    transcripts: Arc<MemoryStore>,
    scripts: HashMap<String, Script>,
    default_polls: u32,
    state: Mutex<TranscriberState>,
}

impl FakeTranscriber {
    pub fn new(transcripts: Arc<MemoryStore>) -> Self {
        Self {
            transcripts,
            scripts: HashMap::new(),
            default_polls: 1,
            state: Mutex::new(TranscriberState::default()),
        }
    }

    pub fn script(mut self, source: &str, script: Script) -> Self {
        self.scripts.insert(source.to_string(), script);
        self
    }

    pub fn default_polls(mut self, polls: u32) -> Self {
        self.default_polls = polls;
        self
    }

    /// Every request passed to `submit`, including rejected ones.
    pub fn submissions(&self) -> Vec<SubmitRequest> {
        self.state.lock().unwrap().submissions.clone()
    }

    /// Job id accepted for `source`.
    pub fn job_for(&self, source: &str) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .jobs
            .iter()
            .find(|(_, job)| job.source == source)
            .map(|(id, _)| id.clone())
    }

    /// Largest number of jobs accepted but not yet reported terminal at once.
    pub fn max_active(&self) -> usize {
        self.state.lock().unwrap().max_active
    }

    pub fn status_calls(&self, job_id: &str) -> u32 {
        self.state
            .lock()
            .unwrap()
            .status_calls
            .get(job_id)
            .copied()
            .unwrap_or(0)
    }

    fn script_for(&self, source: &str) -> Script {
        self.scripts.get(source).cloned().unwrap_or_else(|| Script {
            outcome: Outcome::Complete {
                words: vec![("hello", 0.0, 0.5, "spk_0"), ("there", 0.5, 1.0, "spk_0")],
                language: Some("en-US"),
            },
            polls_before_done: self.default_polls,
        })
    }
}

#[async_trait]
impl TranscriptionService for FakeTranscriber {
    async fn submit(&self, request: &SubmitRequest) -> Result<String> {
        let script = self.script_for(request.source.key());
        let mut state = self.state.lock().unwrap();
        state.submissions.push(request.clone());

        if matches!(script.outcome, Outcome::RejectSubmit) {
            return Err(ScribeError::Transcription(format!(
                "media {} rejected",
                request.source
            )));
        }

        state.jobs.insert(
            request.job_id.clone(),
            FakeJob {
                source: request.source.key().to_string(),
                remaining: script.polls_before_done,
                outcome: script.outcome,
                reported: false,
            },
        );
        state.active += 1;
        state.max_active = state.max_active.max(state.active);

        Ok(request.job_id.clone())
    }

    async fn status(&self, job_id: &str) -> Result<RemoteStatus> {
        let mut state = self.state.lock().unwrap();
        *state.status_calls.entry(job_id.to_string()).or_default() += 1;

        let job = state
            .jobs
            .get_mut(job_id)
            .ok_or_else(|| ScribeError::Transcription(format!("unknown job {}", job_id)))?;

        if matches!(job.outcome, Outcome::StatusUnavailable) {
            return Err(ScribeError::Transcription("service unavailable".to_string()));
        }
        if job.remaining > 0 {
            job.remaining -= 1;
            return Ok(RemoteStatus::InProgress);
        }

        let first_report = !job.reported;
        job.reported = true;
        let outcome = job.outcome.clone();
        if first_report {
            state.active -= 1;
        }
        drop(state);

        Ok(match outcome {
            Outcome::Complete { words, language } => {
                if first_report {
                    self.transcripts
                        .insert(&format!("{}.json", job_id), result_document(&words, language));
                }
                RemoteStatus::Completed
            }
            Outcome::CompleteWithGarbage => {
                if first_report {
                    self.transcripts
                        .insert(&format!("{}.json", job_id), b"{\"results\": [".to_vec());
                }
                RemoteStatus::Completed
            }
            Outcome::CompleteWithoutResult => RemoteStatus::Completed,
            Outcome::Fail(reason) => RemoteStatus::Failed {
                reason: Some(reason.to_string()),
            },
            Outcome::RejectSubmit | Outcome::StatusUnavailable => {
                unreachable!("handled above")
            }
        })
    }
}

/// Result document in the transcription service's JSON layout.
pub fn result_document(
    words: &[(&str, f64, f64, &str)],
    language: Option<&str>,
) -> Vec<u8> {
    let items: Vec<serde_json::Value> = words
        .iter()
        .map(|(text, start, end, speaker)| {
            serde_json::json!({
                "start_time": start.to_string(),
                "end_time": end.to_string(),
                "speaker_label": speaker,
                "alternatives": [{"confidence": "0.99", "content": text}],
                "type": "pronunciation",
            })
        })
        .collect();

    let mut results = serde_json::json!({ "items": items });
    if let Some(code) = language {
        results["language_code"] = serde_json::json!(code);
    }
    serde_json::to_vec(&serde_json::json!({ "results": results, "status": "COMPLETED" })).unwrap()
}

// ============================================================================
// PII detection
// ============================================================================

/// Marks every occurrence of a known word with its entity type
#[derive(Default)]
pub struct FakeDetector {
    words: Vec<(&'static str, &'static str)>,
    languages: Mutex<Vec<String>>,
}

impl FakeDetector {
    pub fn new(words: &[(&'static str, &'static str)]) -> Self {
        Self {
            words: words.to_vec(),
            languages: Mutex::new(Vec::new()),
        }
    }

    /// Language of every detection call, in order.
    pub fn languages(&self) -> Vec<String> {
        self.languages.lock().unwrap().clone()
    }
}

#[async_trait]
impl PiiDetector for FakeDetector {
    async fn detect(&self, text: &str, language: &str) -> Result<Vec<PiiSpan>> {
        self.languages.lock().unwrap().push(language.to_string());

        let chars: Vec<char> = text.chars().collect();
        let mut spans = Vec::new();
        for (word, entity_type) in &self.words {
            let needle: Vec<char> = word.chars().collect();
            for (start, window) in chars.windows(needle.len()).enumerate() {
                if window == needle.as_slice() {
                    spans.push(PiiSpan::new(start, start + needle.len(), *entity_type));
                }
            }
        }
        Ok(spans)
    }
}

// ============================================================================
// Wiring
// ============================================================================

/// Fast timings for paused-clock tests.
pub fn settings(max_parallel_jobs: usize) -> PipelineSettings {
    PipelineSettings {
        pipeline: PipelineConfig {
            status_workers: 2,
            redaction_workers: 2,
            max_parallel_jobs,
            poll_interval_secs: 1,
            dequeue_timeout_secs: 1,
            idle_backoff_secs: 1,
            max_status_errors: 3,
            max_poll_duration_secs: 600,
        },
        ..PipelineSettings::default()
    }
}

/// A complete set of fakes plus handles to inspect them afterwards
pub struct TestBed {
    pub input: Arc<MemoryStore>,
    pub transcripts: Arc<MemoryStore>,
    pub redacted: Arc<MemoryStore>,
    pub transcriber: Arc<FakeTranscriber>,
    pub detector: Arc<FakeDetector>,
}

impl TestBed {
    pub fn new(sources: &[&str]) -> Self {
        Self::with(sources, |t| t, FakeDetector::default())
    }

    /// Build with a customised transcriber and detector.
    pub fn with<F>(sources: &[&str], configure: F, detector: FakeDetector) -> Self
    where
        F: FnOnce(FakeTranscriber) -> FakeTranscriber,
    {
        let transcripts = Arc::new(MemoryStore::new("transcripts"));
        Self {
            input: Arc::new(MemoryStore::with_keys("input", sources)),
            transcriber: Arc::new(configure(FakeTranscriber::new(transcripts.clone()))),
            transcripts,
            redacted: Arc::new(MemoryStore::new("redacted")),
            detector: Arc::new(detector),
        }
    }

    pub fn services(&self) -> Services {
        Services {
            input: self.input.clone(),
            transcripts: self.transcripts.clone(),
            redacted: self.redacted.clone(),
            transcriber: self.transcriber.clone(),
            detector: self.detector.clone(),
        }
    }

    pub fn pipeline(&self, max_parallel_jobs: usize) -> Pipeline {
        Pipeline::new(self.services(), settings(max_parallel_jobs))
    }
}
