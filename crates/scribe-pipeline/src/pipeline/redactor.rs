//! Redaction stage
//!
//! Fetches the result document of every completed job, masks PII and writes
//! `redacted_<job>.json` to the redaction store. A failure affects only the
//! job at hand; the worker moves on to the next one.

use super::counters::{EventSink, StageEvent};
use super::queue::{StageSignal, WorkQueue};
use crate::redaction::{normalize_spans, redact_timeline, LanguagePolicy, TextLayout};
use crate::services::{ObjectStore, PiiDetector};
use crate::transcript::Timeline;
use crate::types::{Job, PiiSpan};
use scribe_common::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

const CONTENT_TYPE_JSON: &str = "application/json";

/// What happened to one job in this stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedactionOutcome {
    Redacted { entities: usize },
    Skipped { reason: &'static str },
}

pub(crate) struct Redactor {
    pub worker: usize,
    pub transcripts: Arc<dyn ObjectStore>,
    pub redacted: Arc<dyn ObjectStore>,
    pub detector: Arc<dyn PiiDetector>,
    pub redaction: WorkQueue<Job>,
    pub polling_complete: StageSignal,
    pub redaction_complete: StageSignal,
    pub events: EventSink,
    pub policy: LanguagePolicy,
    pub max_detect_bytes: usize,
    pub dequeue_timeout: Duration,
}

impl Redactor {
    pub async fn run(self) {
        debug!(worker = self.worker, "Redactor started");

        loop {
            let lease = tokio::select! {
                lease = self.redaction.pop_timeout(self.dequeue_timeout) => lease,
                _ = self.redaction_complete.wait() => None,
            };

            match lease {
                Some(lease) => {
                    let (job, token) = lease.into_parts();
                    self.handle(&job).await;
                    drop(token);
                }
                None => {
                    if self.redaction_complete.is_set()
                        || (self.polling_complete.is_set() && self.redaction.outstanding() == 0)
                    {
                        break;
                    }
                }
            }
        }

        debug!(worker = self.worker, "Redactor finished");
    }

    async fn handle(&self, job: &Job) {
        let job_id = job.id.clone();
        match self.redact(job).await {
            Ok(RedactionOutcome::Redacted { entities }) => {
                info!(
                    job_id = %job_id,
                    entities,
                    key = %job.redacted_key(),
                    "Redacted transcript stored"
                );
                self.events.emit(StageEvent::Redacted { job_id });
            }
            Ok(RedactionOutcome::Skipped { reason }) => {
                warn!(job_id = %job_id, reason, "Redaction skipped");
                self.events.emit(StageEvent::Skipped { job_id });
            }
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Redaction failed");
                self.events.emit(StageEvent::RedactionFailed { job_id });
            }
        }
    }

    async fn redact(&self, job: &Job) -> Result<RedactionOutcome> {
        let Some(raw) = self.transcripts.get(&job.result_key()).await? else {
            return Ok(RedactionOutcome::Skipped {
                reason: "result document not found",
            });
        };

        let timeline = Timeline::from_slice(&raw)?;
        if timeline.is_empty() {
            return Ok(RedactionOutcome::Skipped {
                reason: "transcript has no segments",
            });
        }

        let language = self.policy.resolve(timeline.language_code.as_deref());
        let layout = TextLayout::new(&timeline.segments);
        let spans = detect_spans(
            self.detector.as_ref(),
            &layout,
            &language,
            self.max_detect_bytes,
        )
        .await?;
        let spans = normalize_spans(spans, layout.char_len());

        debug!(
            job_id = %job.id,
            language = %language,
            segments = timeline.len(),
            entities = spans.len(),
            "Masking transcript"
        );

        let redacted = redact_timeline(&timeline, &layout, &spans);
        self.redacted
            .put(&job.redacted_key(), redacted.to_json()?, CONTENT_TYPE_JSON)
            .await?;

        Ok(RedactionOutcome::Redacted {
            entities: spans.len(),
        })
    }
}

/// Run detection over `layout` one window at a time and return spans in
/// offsets of the whole joined text.
pub async fn detect_spans(
    detector: &dyn PiiDetector,
    layout: &TextLayout,
    language: &str,
    max_bytes: usize,
) -> Result<Vec<PiiSpan>> {
    let mut spans = Vec::new();
    for window in layout.windows(max_bytes) {
        let found = detector.detect(window.text, language).await?;
        spans.extend(found.into_iter().map(|s| s.shifted(window.char_offset)));
    }
    Ok(spans)
}
