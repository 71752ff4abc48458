//! Pipeline controller
//!
//! Enumerates the input, starts every stage worker and walks the shutdown
//! barriers in order: submission drained, polling drained, redaction drained.
//! Each barrier waits until every item pushed onto that queue has been
//! dequeued and released, so in-flight work is never cut short.

use super::counters::{EventSink, RunCounters, RunReport};
use super::poller::StatusPoller;
use super::queue::{StageSignal, WorkQueue};
use super::redactor::Redactor;
use super::submitter::JobSubmitter;
use crate::config::PipelineSettings;
use crate::services::Services;
use crate::types::{Job, SourceItem};
use chrono::Utc;
use futures::future::join_all;
use scribe_common::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};

/// One batch run over every object in the input store
pub struct Pipeline {
    services: Services,
    settings: PipelineSettings,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("services", &self.services)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    pub fn new(services: Services, settings: PipelineSettings) -> Self {
        Self {
            services,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    /// Use `token` to stop admitting new sources. Jobs already submitted are
    /// still polled and redacted.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Process every source key and return the tally.
    ///
    /// Fails only when the input cannot be listed. Per-item problems are
    /// logged and counted.
    pub async fn run(&self) -> Result<RunReport> {
        let started_at = Utc::now();
        let pipeline = &self.settings.pipeline;

        let keys = self.services.input.list_keys().await?;
        info!(
            sources = keys.len(),
            input = %self.services.input.location(),
            status_workers = pipeline.status_workers,
            redaction_workers = pipeline.redaction_workers,
            "Starting pipeline run"
        );

        let submission: WorkQueue<SourceItem> = WorkQueue::new("submission");
        let polling: WorkQueue<Job> = WorkQueue::new("polling");
        let redaction: WorkQueue<Job> = WorkQueue::new("redaction");

        let sealed = StageSignal::new("sealed");
        let submission_complete = StageSignal::new("submission_complete");
        let polling_complete = StageSignal::new("polling_complete");
        let redaction_complete = StageSignal::new("redaction_complete");

        for key in &keys {
            submission.push(SourceItem::new(key.as_str()));
        }
        sealed.set();

        let (events, mut outcomes) = EventSink::channel();
        let mut handles: Vec<(String, JoinHandle<()>)> = Vec::new();

        let submitter = JobSubmitter {
            transcriber: self.services.transcriber.clone(),
            submission: submission.clone(),
            polling: polling.clone(),
            sealed: sealed.clone(),
            events: events.clone(),
            cancel: self.cancel.clone(),
            max_parallel_jobs: pipeline.max_parallel_jobs,
            idle_backoff: pipeline.idle_backoff(),
            transcription: self.settings.transcription.clone(),
        };
        handles.push((
            "submitter".to_string(),
            tokio::spawn(submitter.run().instrument(info_span!("submitter"))),
        ));

        for worker in 0..pipeline.status_workers {
            let poller = StatusPoller {
                worker,
                transcriber: self.services.transcriber.clone(),
                polling: polling.clone(),
                redaction: redaction.clone(),
                submission_complete: submission_complete.clone(),
                polling_complete: polling_complete.clone(),
                events: events.clone(),
                settings: pipeline.clone(),
            };
            handles.push((
                format!("poller-{}", worker),
                tokio::spawn(poller.run().instrument(info_span!("poller", worker))),
            ));
        }

        for worker in 0..pipeline.redaction_workers {
            let redactor = Redactor {
                worker,
                transcripts: self.services.transcripts.clone(),
                redacted: self.services.redacted.clone(),
                detector: self.services.detector.clone(),
                redaction: redaction.clone(),
                polling_complete: polling_complete.clone(),
                redaction_complete: redaction_complete.clone(),
                events: events.clone(),
                policy: self.settings.redaction.language_policy(),
                max_detect_bytes: self.settings.redaction.max_detect_bytes,
                dequeue_timeout: pipeline.dequeue_timeout(),
            };
            handles.push((
                format!("redactor-{}", worker),
                tokio::spawn(redactor.run().instrument(info_span!("redactor", worker))),
            ));
        }
        // workers hold the remaining senders; the stream ends when they exit
        drop(events);

        submission.wait_drained().await;
        submission_complete.set();
        info!("Submission stage drained");

        polling.wait_drained().await;
        polling_complete.set();
        info!("Polling stage drained");

        redaction.wait_drained().await;
        redaction_complete.set();
        info!("Redaction stage drained");

        let results = join_all(
            handles
                .into_iter()
                .map(|(name, handle)| async move { (name, handle.await) }),
        )
        .await;
        for (name, result) in results {
            if let Err(e) = result {
                error!(task = %name, error = %e, "Pipeline task ended abnormally");
            }
        }

        let mut counters = RunCounters::with_sources(keys.len() as u64);
        while let Some(event) = outcomes.recv().await {
            counters.record(&event);
        }

        let report = RunReport {
            counters,
            started_at,
            finished_at: Utc::now(),
        };

        info!(
            sources = counters.sources,
            submitted = counters.submitted,
            submit_failed = counters.submit_failed,
            abandoned = counters.abandoned,
            completed = counters.completed,
            failed = counters.failed,
            redacted = counters.redacted,
            skipped = counters.skipped,
            redaction_failed = counters.redaction_failed,
            duration_secs = report.duration_secs(),
            "Pipeline run finished"
        );

        Ok(report)
    }
}
