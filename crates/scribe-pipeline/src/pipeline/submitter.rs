//! Submission stage
//!
//! A single submitter moves source keys into transcription jobs, holding back
//! whenever the polling stage already has `max_parallel_jobs` jobs queued or
//! in flight.

use super::counters::{EventSink, StageEvent};
use super::queue::{StageSignal, WorkQueue};
use crate::config::TranscriptionConfig;
use crate::services::TranscriptionService;
use crate::types::{Job, SourceItem, SubmitRequest};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub(crate) struct JobSubmitter {
    pub transcriber: Arc<dyn TranscriptionService>,
    pub submission: WorkQueue<SourceItem>,
    pub polling: WorkQueue<Job>,
    /// Set once every source key has been enqueued
    pub sealed: StageSignal,
    pub events: EventSink,
    pub cancel: CancellationToken,
    pub max_parallel_jobs: usize,
    pub idle_backoff: Duration,
    pub transcription: TranscriptionConfig,
}

impl JobSubmitter {
    pub async fn run(self) {
        info!(max_parallel_jobs = self.max_parallel_jobs, "Submitter started");

        loop {
            if self.cancel.is_cancelled() {
                self.abandon_remaining();
                break;
            }

            tokio::select! {
                _ = self.cancel.cancelled() => continue,
                _ = self.polling.wait_below(self.max_parallel_jobs) => {}
            }

            let Some(lease) = self.submission.try_pop() else {
                if self.sealed.is_set() {
                    break;
                }
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.idle_backoff) => {}
                }
                continue;
            };

            let (source, token) = lease.into_parts();
            self.submit(source).await;
            // released only after the job, if any, is on the polling queue
            drop(token);
        }

        info!("Submitter finished");
    }

    async fn submit(&self, source: SourceItem) {
        let request = SubmitRequest {
            job_id: Job::new_id(),
            media_format: source
                .media_format()
                .map(str::to_string)
                .unwrap_or_else(|| self.transcription.default_media_format.clone()),
            language_options: self.transcription.language_options.clone(),
            max_speaker_labels: self.transcription.max_speaker_labels,
            source,
        };

        match self.transcriber.submit(&request).await {
            Ok(job_id) => {
                info!(job_id = %job_id, source = %request.source, "Submitted transcription job");
                self.polling.push(Job::submitted(job_id.clone(), request.source));
                self.events.emit(StageEvent::Submitted { job_id });
            }
            Err(e) => {
                error!(
                    job_id = %request.job_id,
                    source = %request.source,
                    error = %e,
                    "Failed to submit transcription job"
                );
                self.events.emit(StageEvent::SubmitFailed {
                    source: request.source.key().to_string(),
                });
            }
        }
    }

    fn abandon_remaining(&self) {
        let mut abandoned = 0usize;
        while let Some(lease) = self.submission.try_pop() {
            debug!(source = lease.key(), "Abandoning source after cancellation");
            self.events.emit(StageEvent::Abandoned {
                source: lease.key().to_string(),
            });
            abandoned += 1;
        }
        if abandoned > 0 {
            warn!(abandoned, "Run cancelled, remaining sources were not submitted");
        }
    }
}
