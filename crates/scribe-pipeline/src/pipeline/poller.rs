//! Status polling stage
//!
//! Each worker owns one job at a time and checks it on a fixed interval until
//! the service reports a terminal status. Completed jobs move on to redaction.

use super::counters::{EventSink, StageEvent};
use super::queue::{StageSignal, WorkQueue};
use crate::config::PipelineConfig;
use crate::services::TranscriptionService;
use crate::types::{Job, JobStatus, RemoteStatus};
use chrono::Utc;
use std::sync::Arc;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

pub(crate) struct StatusPoller {
    pub worker: usize,
    pub transcriber: Arc<dyn TranscriptionService>,
    pub polling: WorkQueue<Job>,
    pub redaction: WorkQueue<Job>,
    pub submission_complete: StageSignal,
    pub polling_complete: StageSignal,
    pub events: EventSink,
    pub settings: PipelineConfig,
}

impl StatusPoller {
    pub async fn run(self) {
        debug!(worker = self.worker, "Status poller started");

        loop {
            let lease = tokio::select! {
                lease = self.polling.pop_timeout(self.settings.dequeue_timeout()) => lease,
                _ = self.polling_complete.wait() => None,
            };

            match lease {
                Some(lease) => {
                    let (job, token) = lease.into_parts();
                    self.track(job).await;
                    drop(token);
                }
                None => {
                    if self.polling_complete.is_set()
                        || (self.submission_complete.is_set() && self.polling.outstanding() == 0)
                    {
                        break;
                    }
                }
            }
        }

        debug!(worker = self.worker, "Status poller finished");
    }

    /// Poll `job` until it is terminal, then hand it on and report the outcome.
    async fn track(&self, mut job: Job) {
        let started = Instant::now();
        let mut ticker = interval(self.settings.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut consecutive_errors = 0u32;

        while !job.status().is_terminal() {
            ticker.tick().await;

            if started.elapsed() >= self.settings.max_poll_duration() {
                job.fail(format!(
                    "still not finished after {}s",
                    self.settings.max_poll_duration_secs
                ));
                break;
            }

            match self.transcriber.status(&job.id).await {
                Ok(RemoteStatus::Completed) => {
                    job.transition(JobStatus::Completed);
                }
                Ok(RemoteStatus::Failed { reason }) => {
                    job.fail(reason.unwrap_or_else(|| "no failure reason given".to_string()));
                }
                Ok(RemoteStatus::InProgress) => {
                    consecutive_errors = 0;
                    job.transition(JobStatus::InProgress);
                    debug!(job_id = %job.id, status = %job.status(), "Transcription in progress");
                }
                Ok(RemoteStatus::Queued) => {
                    consecutive_errors = 0;
                    debug!(job_id = %job.id, "Transcription queued");
                }
                Err(e) => {
                    consecutive_errors += 1;
                    warn!(
                        job_id = %job.id,
                        attempt = consecutive_errors,
                        max_attempts = self.settings.max_status_errors,
                        error = %e,
                        "Status check failed"
                    );
                    if consecutive_errors >= self.settings.max_status_errors {
                        job.fail(format!("status unavailable: {}", e));
                    }
                }
            }
        }

        let job_id = job.id.clone();
        let since_submit_secs = job.seconds_since_submit(Utc::now());
        if job.status() == JobStatus::Completed {
            info!(
                job_id = %job_id,
                source = %job.source,
                polled_secs = started.elapsed().as_secs(),
                since_submit_secs,
                "Transcription completed"
            );
            self.redaction.push(job);
            self.events.emit(StageEvent::Completed { job_id });
        } else {
            warn!(
                job_id = %job_id,
                source = %job.source,
                reason = job.failure_reason().unwrap_or("unknown"),
                since_submit_secs,
                "Transcription failed"
            );
            self.events.emit(StageEvent::Failed { job_id });
        }
    }
}
