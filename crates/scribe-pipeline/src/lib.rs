//! Scribe Pipeline Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Batch transcription with PII redaction.
//!
//! # Overview
//!
//! For every audio object in an input bucket the pipeline:
//!
//! 1. submits an asynchronous transcription job (bounded by an admission cap),
//! 2. polls the job until the service reports it finished,
//! 3. masks PII in the resulting transcript and stores `redacted_<job>.json`.
//!
//! The stages run concurrently as tokio tasks connected by [`pipeline::WorkQueue`]s.
//! A run ends when all three queues have drained in order; the outcome of every
//! source is counted in the returned [`pipeline::RunReport`].
//!
//! # Collaborators
//!
//! Storage, transcription and PII detection are reached through the traits in
//! [`services`]. [`storage::Storage`] and the [`aws`] module implement them on
//! S3, Amazon Transcribe and Amazon Comprehend.
//!
//! # Example
//!
//! ```no_run
//! use scribe_pipeline::{aws, config::Config, pipeline::Pipeline};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let services = aws::build_services(&config).await;
//!     let report = Pipeline::new(services, config.settings()).run().await?;
//!     println!("redacted {} transcripts", report.counters.redacted);
//!     Ok(())
//! }
//! ```

pub mod aws;
pub mod config;
pub mod pipeline;
pub mod redaction;
pub mod services;
pub mod storage;
pub mod transcript;
pub mod types;

pub use config::{Config, PipelineSettings};
pub use pipeline::{Pipeline, RunCounters, RunReport};
pub use services::{ObjectStore, PiiDetector, Services, TranscriptionService};
