//! Configuration management
//!
//! Everything is read from environment variables (optionally seeded from a
//! `.env` file by the binary). Malformed values are rejected rather than
//! silently replaced by defaults.

use crate::redaction::LanguagePolicy;
use crate::types::SUPPORTED_MEDIA_FORMATS;
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// Pipeline Configuration Constants
// ============================================================================

/// Default worker pool size, split between pollers and redactors.
pub const DEFAULT_THREAD_COUNT: usize = 4;

/// Default cap on jobs waiting in or being polled by the status stage.
pub const DEFAULT_MAX_PARALLEL_JOBS: usize = 5;

/// Default delay between two status checks of one job, in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;

/// Default time a worker waits for an item before checking for shutdown.
pub const DEFAULT_DEQUEUE_TIMEOUT_SECS: u64 = 5;

/// Default submitter sleep when its queue is empty but not sealed.
pub const DEFAULT_IDLE_BACKOFF_SECS: u64 = 5;

/// Default consecutive status errors tolerated before a job is failed.
pub const DEFAULT_MAX_STATUS_ERRORS: u32 = 5;

/// Default maximum time a single job is polled (4 hours).
pub const DEFAULT_MAX_POLL_DURATION_SECS: u64 = 14_400;

/// Default candidate languages for transcription.
pub const DEFAULT_LANGUAGE_SUPPORT: &str = "en-IN,hi-IN";

/// Default maximum number of distinct speakers.
pub const DEFAULT_MAX_SPEAKER_LABELS: i32 = 2;

/// Default media format for keys without a recognised extension.
pub const DEFAULT_MEDIA_FORMAT: &str = "mp3";

/// Default languages the PII detector accepts.
pub const DEFAULT_PII_LANGUAGES: &str = "en,es";

/// Default detection language when the transcript's language is unsupported.
pub const DEFAULT_PII_LANGUAGE: &str = "en";

/// Default maximum bytes per detection call (service limit is 100 KB).
pub const DEFAULT_MAX_DETECT_BYTES: usize = 99_000;

/// Full application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub buckets: BucketConfig,
    pub aws: AwsConfig,
    pub pipeline: PipelineConfig,
    pub transcription: TranscriptionConfig,
    pub redaction: RedactionConfig,
}

/// Buckets the pipeline reads from and writes to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BucketConfig {
    pub input_bucket: String,
    /// Only keys under this prefix are processed
    pub input_prefix: String,
    pub transcription_bucket: String,
    pub redaction_bucket: String,
}

/// AWS client overrides; unset values fall back to the SDK's own resolution
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AwsConfig {
    pub region: Option<String>,
    /// Custom endpoint, e.g. a local S3-compatible server
    pub endpoint_url: Option<String>,
    pub force_path_style: bool,
}

/// Worker pools, admission and timing
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PipelineConfig {
    pub status_workers: usize,
    pub redaction_workers: usize,
    pub max_parallel_jobs: usize,
    pub poll_interval_secs: u64,
    pub dequeue_timeout_secs: u64,
    pub idle_backoff_secs: u64,
    pub max_status_errors: u32,
    pub max_poll_duration_secs: u64,
}

/// Per-job transcription settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TranscriptionConfig {
    pub language_options: Vec<String>,
    pub max_speaker_labels: i32,
    pub default_media_format: String,
}

/// PII detection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RedactionConfig {
    /// Fixed detection language, ignoring what the transcript reports
    pub language_override: Option<String>,
    pub pii_languages: Vec<String>,
    pub default_language: String,
    pub max_detect_bytes: usize,
}

/// The part of [`Config`] the pipeline stages need
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineSettings {
    pub pipeline: PipelineConfig,
    pub transcription: TranscriptionConfig,
    pub redaction: RedactionConfig,
}

impl Config {
    /// Load configuration from the process environment and validate it.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its
    /// value.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let thread_count: usize = parse_or(&lookup, "THREAD_COUNT", DEFAULT_THREAD_COUNT)?;
        let half = (thread_count / 2).max(1);

        let config = Self {
            buckets: BucketConfig {
                input_bucket: required(&lookup, "AUDIO_INPUT_BUCKET")?,
                input_prefix: lookup("AUDIO_INPUT_PREFIX").unwrap_or_default(),
                transcription_bucket: required(&lookup, "AUDIO_TRANSCRIPTION_BUCKET")?,
                redaction_bucket: required(&lookup, "AUDIO_TRANSCRIPTION_REDACTION_BUCKET")?,
            },
            aws: AwsConfig {
                region: non_empty(lookup("AWS_REGION")),
                endpoint_url: non_empty(lookup("AWS_ENDPOINT_URL")),
                force_path_style: parse_or(&lookup, "AWS_S3_FORCE_PATH_STYLE", false)?,
            },
            pipeline: PipelineConfig {
                status_workers: parse_or(&lookup, "STATUS_WORKERS", half)?,
                redaction_workers: parse_or(&lookup, "REDACTION_WORKERS", half)?,
                max_parallel_jobs: parse_or(
                    &lookup,
                    "MAX_PARALLEL_JOBS",
                    DEFAULT_MAX_PARALLEL_JOBS,
                )?,
                poll_interval_secs: parse_or(
                    &lookup,
                    "POLL_INTERVAL_SECS",
                    DEFAULT_POLL_INTERVAL_SECS,
                )?,
                dequeue_timeout_secs: parse_or(
                    &lookup,
                    "DEQUEUE_TIMEOUT_SECS",
                    DEFAULT_DEQUEUE_TIMEOUT_SECS,
                )?,
                idle_backoff_secs: parse_or(
                    &lookup,
                    "IDLE_BACKOFF_SECS",
                    DEFAULT_IDLE_BACKOFF_SECS,
                )?,
                max_status_errors: parse_or(
                    &lookup,
                    "MAX_STATUS_ERRORS",
                    DEFAULT_MAX_STATUS_ERRORS,
                )?,
                max_poll_duration_secs: parse_or(
                    &lookup,
                    "MAX_POLL_DURATION_SECS",
                    DEFAULT_MAX_POLL_DURATION_SECS,
                )?,
            },
            transcription: TranscriptionConfig {
                language_options: split_list(
                    &lookup("AUDIO_LANGUAGE_SUPPORT")
                        .unwrap_or_else(|| DEFAULT_LANGUAGE_SUPPORT.to_string()),
                ),
                max_speaker_labels: parse_or(
                    &lookup,
                    "MAX_SPEAKER_LABELS",
                    DEFAULT_MAX_SPEAKER_LABELS,
                )?,
                default_media_format: lookup("DEFAULT_MEDIA_FORMAT")
                    .unwrap_or_else(|| DEFAULT_MEDIA_FORMAT.to_string())
                    .to_ascii_lowercase(),
            },
            redaction: RedactionConfig {
                language_override: non_empty(lookup("REDACTION_LANGUAGE")),
                pii_languages: split_list(
                    &lookup("PII_LANGUAGES").unwrap_or_else(|| DEFAULT_PII_LANGUAGES.to_string()),
                ),
                default_language: lookup("PII_DEFAULT_LANGUAGE")
                    .unwrap_or_else(|| DEFAULT_PII_LANGUAGE.to_string()),
                max_detect_bytes: parse_or(&lookup, "MAX_DETECT_BYTES", DEFAULT_MAX_DETECT_BYTES)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        self.buckets.validate()?;
        self.pipeline.validate()?;
        self.transcription.validate()?;
        self.redaction.validate()?;
        Ok(())
    }

    pub fn settings(&self) -> PipelineSettings {
        PipelineSettings {
            pipeline: self.pipeline.clone(),
            transcription: self.transcription.clone(),
            redaction: self.redaction.clone(),
        }
    }
}

impl BucketConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.input_bucket.trim().is_empty() {
            bail!("AUDIO_INPUT_BUCKET cannot be empty");
        }
        if self.transcription_bucket.trim().is_empty() {
            bail!("AUDIO_TRANSCRIPTION_BUCKET cannot be empty");
        }
        if self.redaction_bucket.trim().is_empty() {
            bail!("AUDIO_TRANSCRIPTION_REDACTION_BUCKET cannot be empty");
        }
        Ok(())
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.status_workers == 0 {
            bail!("STATUS_WORKERS must be greater than 0");
        }
        if self.redaction_workers == 0 {
            bail!("REDACTION_WORKERS must be greater than 0");
        }
        if self.max_parallel_jobs == 0 {
            bail!("MAX_PARALLEL_JOBS must be greater than 0");
        }
        if self.poll_interval_secs == 0 {
            bail!("POLL_INTERVAL_SECS must be greater than 0");
        }
        if self.dequeue_timeout_secs == 0 {
            bail!("DEQUEUE_TIMEOUT_SECS must be greater than 0");
        }
        if self.idle_backoff_secs == 0 {
            bail!("IDLE_BACKOFF_SECS must be greater than 0");
        }
        if self.max_status_errors == 0 {
            bail!("MAX_STATUS_ERRORS must be greater than 0");
        }
        if self.max_poll_duration_secs < self.poll_interval_secs {
            bail!(
                "MAX_POLL_DURATION_SECS ({}) must be at least POLL_INTERVAL_SECS ({})",
                self.max_poll_duration_secs,
                self.poll_interval_secs
            );
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn dequeue_timeout(&self) -> Duration {
        Duration::from_secs(self.dequeue_timeout_secs)
    }

    pub fn idle_backoff(&self) -> Duration {
        Duration::from_secs(self.idle_backoff_secs)
    }

    pub fn max_poll_duration(&self) -> Duration {
        Duration::from_secs(self.max_poll_duration_secs)
    }
}

impl TranscriptionConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(2..=30).contains(&self.max_speaker_labels) {
            bail!(
                "MAX_SPEAKER_LABELS must be between 2 and 30, got: {}",
                self.max_speaker_labels
            );
        }
        if !SUPPORTED_MEDIA_FORMATS.contains(&self.default_media_format.as_str()) {
            bail!(
                "DEFAULT_MEDIA_FORMAT must be one of {}, got: {}",
                SUPPORTED_MEDIA_FORMATS.join(", "),
                self.default_media_format
            );
        }
        Ok(())
    }
}

impl RedactionConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.default_language.trim().is_empty() {
            bail!("PII_DEFAULT_LANGUAGE cannot be empty");
        }
        if self.max_detect_bytes == 0 {
            bail!("MAX_DETECT_BYTES must be greater than 0");
        }
        Ok(())
    }

    pub fn language_policy(&self) -> LanguagePolicy {
        LanguagePolicy {
            override_language: self.language_override.clone(),
            supported: self.pii_languages.clone(),
            fallback: self.default_language.clone(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let half = (DEFAULT_THREAD_COUNT / 2).max(1);
        Self {
            status_workers: half,
            redaction_workers: half,
            max_parallel_jobs: DEFAULT_MAX_PARALLEL_JOBS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            dequeue_timeout_secs: DEFAULT_DEQUEUE_TIMEOUT_SECS,
            idle_backoff_secs: DEFAULT_IDLE_BACKOFF_SECS,
            max_status_errors: DEFAULT_MAX_STATUS_ERRORS,
            max_poll_duration_secs: DEFAULT_MAX_POLL_DURATION_SECS,
        }
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            language_options: split_list(DEFAULT_LANGUAGE_SUPPORT),
            max_speaker_labels: DEFAULT_MAX_SPEAKER_LABELS,
            default_media_format: DEFAULT_MEDIA_FORMAT.to_string(),
        }
    }
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            language_override: None,
            pii_languages: split_list(DEFAULT_PII_LANGUAGES),
            default_language: DEFAULT_PII_LANGUAGE.to_string(),
            max_detect_bytes: DEFAULT_MAX_DETECT_BYTES,
        }
    }
}

fn required<F>(lookup: &F, key: &str) -> anyhow::Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    match non_empty(lookup(key)) {
        Some(value) => Ok(value),
        None => bail!("{} must be set", key),
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match non_empty(lookup(key)) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("Invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
