//! AWS collaborators
//!
//! Amazon Transcribe for speech-to-text and Amazon Comprehend for PII
//! detection. Credentials come from the default provider chain.

mod comprehend;
mod transcribe;

pub use comprehend::ComprehendDetector;
pub use transcribe::TranscribeClient;

use crate::config::{AwsConfig, Config};
use crate::services::Services;
use crate::storage::Storage;
use aws_config::{BehaviorVersion, SdkConfig};
use std::sync::Arc;
use tracing::info;

/// Resolve shared SDK configuration, applying region and endpoint overrides.
pub async fn load_sdk_config(config: &AwsConfig) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());

    if let Some(region) = &config.region {
        loader = loader.region(aws_config::Region::new(region.clone()));
    }
    if let Some(endpoint) = &config.endpoint_url {
        loader = loader.endpoint_url(endpoint);
    }

    let sdk_config = loader.load().await;

    info!(
        region = ?sdk_config.region().map(|r| r.to_string()),
        endpoint = ?config.endpoint_url,
        "AWS configuration loaded"
    );

    sdk_config
}

/// Production collaborators for `config`.
pub async fn build_services(config: &Config) -> Services {
    let sdk_config = load_sdk_config(&config.aws).await;
    let path_style = config.aws.force_path_style;
    let buckets = &config.buckets;

    Services {
        input: Arc::new(Storage::new(
            &sdk_config,
            &buckets.input_bucket,
            &buckets.input_prefix,
            path_style,
        )),
        transcripts: Arc::new(Storage::new(
            &sdk_config,
            &buckets.transcription_bucket,
            "",
            path_style,
        )),
        redacted: Arc::new(Storage::new(
            &sdk_config,
            &buckets.redaction_bucket,
            "",
            path_style,
        )),
        transcriber: Arc::new(TranscribeClient::new(
            &sdk_config,
            &buckets.input_bucket,
            &buckets.transcription_bucket,
        )),
        detector: Arc::new(ComprehendDetector::new(&sdk_config)),
    }
}
