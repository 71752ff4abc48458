//! Stage events and the run tally folded from them
//!
//! Stages never share a mutable counter. Each outcome is sent as a
//! [`StageEvent`] and the controller folds the stream into [`RunCounters`]
//! after all workers have exited.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;

/// One outcome reported by a stage worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageEvent {
    Submitted { job_id: String },
    SubmitFailed { source: String },
    /// Never submitted because the run was cancelled
    Abandoned { source: String },
    Completed { job_id: String },
    Failed { job_id: String },
    Redacted { job_id: String },
    Skipped { job_id: String },
    RedactionFailed { job_id: String },
}

impl StageEvent {
    pub fn as_str(&self) -> &str {
        match self {
            StageEvent::Submitted { .. } => "submitted",
            StageEvent::SubmitFailed { .. } => "submit_failed",
            StageEvent::Abandoned { .. } => "abandoned",
            StageEvent::Completed { .. } => "completed",
            StageEvent::Failed { .. } => "failed",
            StageEvent::Redacted { .. } => "redacted",
            StageEvent::Skipped { .. } => "skipped",
            StageEvent::RedactionFailed { .. } => "redaction_failed",
        }
    }
}

/// Sending half handed to every worker
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<StageEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<StageEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: StageEvent) {
        if let Err(e) = self.tx.send(event) {
            warn!(event = e.0.as_str(), "Event receiver closed, outcome not counted");
        }
    }
}

/// Final tally of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunCounters {
    pub sources: u64,
    pub submitted: u64,
    pub submit_failed: u64,
    pub abandoned: u64,
    pub polled_done: u64,
    pub completed: u64,
    pub failed: u64,
    pub redacted: u64,
    pub skipped: u64,
    pub redaction_failed: u64,
}

impl RunCounters {
    pub fn with_sources(sources: u64) -> Self {
        Self {
            sources,
            ..Self::default()
        }
    }

    pub fn record(&mut self, event: &StageEvent) {
        match event {
            StageEvent::Submitted { .. } => self.submitted += 1,
            StageEvent::SubmitFailed { .. } => self.submit_failed += 1,
            StageEvent::Abandoned { .. } => self.abandoned += 1,
            StageEvent::Completed { .. } => {
                self.polled_done += 1;
                self.completed += 1;
            }
            StageEvent::Failed { .. } => {
                self.polled_done += 1;
                self.failed += 1;
            }
            StageEvent::Redacted { .. } => self.redacted += 1,
            StageEvent::Skipped { .. } => self.skipped += 1,
            StageEvent::RedactionFailed { .. } => self.redaction_failed += 1,
        }
    }

    /// Every source and every submitted job is accounted for exactly once.
    pub fn is_balanced(&self) -> bool {
        self.sources == self.submitted + self.submit_failed + self.abandoned
            && self.submitted == self.polled_done
            && self.polled_done == self.completed + self.failed
            && self.completed == self.redacted + self.skipped + self.redaction_failed
    }
}

/// Result of one pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub counters: RunCounters,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn duration_secs(&self) -> i64 {
        (self.finished_at - self.started_at).num_seconds()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn job(id: &str) -> String {
        id.to_string()
    }

    #[test]
    fn test_fold_balanced_run() {
        let events = vec![
            StageEvent::Submitted { job_id: job("1") },
            StageEvent::Submitted { job_id: job("2") },
            StageEvent::SubmitFailed { source: "c.mp3".into() },
            StageEvent::Completed { job_id: job("1") },
            StageEvent::Failed { job_id: job("2") },
            StageEvent::Redacted { job_id: job("1") },
        ];
        let mut counters = RunCounters::with_sources(3);
        events.iter().for_each(|e| counters.record(e));

        assert_eq!(counters.submitted, 2);
        assert_eq!(counters.polled_done, 2);
        assert_eq!(counters.completed, 1);
        assert_eq!(counters.failed, 1);
        assert_eq!(counters.redacted, 1);
        assert!(counters.is_balanced());
    }

    #[test]
    fn test_unbalanced_when_outcome_missing() {
        let mut counters = RunCounters::with_sources(1);
        counters.record(&StageEvent::Submitted { job_id: job("1") });
        counters.record(&StageEvent::Completed { job_id: job("1") });
        assert!(!counters.is_balanced());

        counters.record(&StageEvent::Skipped { job_id: job("1") });
        assert!(counters.is_balanced());
    }

    #[tokio::test]
    async fn test_sink_delivers_events() {
        let (sink, mut rx) = EventSink::channel();
        sink.clone().emit(StageEvent::Abandoned { source: "a.mp3".into() });
        drop(sink);

        assert_eq!(rx.recv().await, Some(StageEvent::Abandoned { source: "a.mp3".into() }));
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn test_emit_after_receiver_dropped_does_not_panic() {
        let (sink, rx) = EventSink::channel();
        drop(rx);
        sink.emit(StageEvent::Redacted { job_id: job("1") });
    }
}
