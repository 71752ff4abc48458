//! The three-stage transcription pipeline
//!
//! ```text
//! input keys -> [submission] -> JobSubmitter -> [polling] -> StatusPoller xN
//!            -> [redaction] -> Redactor xM -> redacted store
//! ```
//!
//! Stages communicate only through [`WorkQueue`]s and report outcomes as
//! [`StageEvent`]s that the [`Pipeline`] folds into [`RunCounters`].

mod controller;
pub mod counters;
mod poller;
pub mod queue;
mod redactor;
mod submitter;

pub use controller::Pipeline;
pub use counters::{RunCounters, RunReport, StageEvent};
pub use queue::{CompletionToken, Lease, StageSignal, WorkQueue};
pub use redactor::{detect_spans, RedactionOutcome};
