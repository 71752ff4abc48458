use crate::services::TranscriptionService;
use crate::types::{RemoteStatus, SubmitRequest};
use async_trait::async_trait;
use aws_sdk_transcribe::error::DisplayErrorContext;
use aws_sdk_transcribe::types::{LanguageCode, Media, MediaFormat, Settings, TranscriptionJobStatus};
use aws_sdk_transcribe::Client;
use scribe_common::{Result, ScribeError};
use tracing::{debug, instrument};

/// Amazon Transcribe batch jobs reading from the input bucket and writing
/// `<job>.json` into the transcription bucket
#[derive(Clone)]
pub struct TranscribeClient {
    client: Client,
    input_bucket: String,
    output_bucket: String,
}

impl std::fmt::Debug for TranscribeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscribeClient")
            .field("input_bucket", &self.input_bucket)
            .field("output_bucket", &self.output_bucket)
            .finish_non_exhaustive()
    }
}

impl TranscribeClient {
    pub fn new(
        sdk_config: &aws_config::SdkConfig,
        input_bucket: impl Into<String>,
        output_bucket: impl Into<String>,
    ) -> Self {
        Self {
            client: Client::new(sdk_config),
            input_bucket: input_bucket.into(),
            output_bucket: output_bucket.into(),
        }
    }

    fn media_uri(&self, key: &str) -> String {
        format!("s3://{}/{}", self.input_bucket, key)
    }
}

#[async_trait]
impl TranscriptionService for TranscribeClient {
    #[instrument(skip(self, request), fields(job_id = %request.job_id, source = %request.source))]
    async fn submit(&self, request: &SubmitRequest) -> Result<String> {
        let media = Media::builder()
            .media_file_uri(self.media_uri(request.source.key()))
            .build();
        let settings = Settings::builder()
            .show_speaker_labels(true)
            .max_speaker_labels(request.max_speaker_labels)
            .build();

        let mut call = self
            .client
            .start_transcription_job()
            .transcription_job_name(&request.job_id)
            .media(media)
            .media_format(MediaFormat::from(request.media_format.as_str()))
            .output_bucket_name(&self.output_bucket)
            .settings(settings);

        call = match request.language_options.as_slice() {
            [only] => call.language_code(LanguageCode::from(only.as_str())),
            options => call.identify_language(true).set_language_options(
                (!options.is_empty())
                    .then(|| options.iter().map(|o| LanguageCode::from(o.as_str())).collect()),
            ),
        };

        let output = call.send().await.map_err(|e| {
            ScribeError::Transcription(format!(
                "failed to start job {}: {}",
                request.job_id,
                DisplayErrorContext(&e)
            ))
        })?;

        let name = output
            .transcription_job()
            .and_then(|job| job.transcription_job_name())
            .unwrap_or(request.job_id.as_str())
            .to_string();

        debug!(job_name = %name, "Transcription job accepted");

        Ok(name)
    }

    #[instrument(skip(self))]
    async fn status(&self, job_id: &str) -> Result<RemoteStatus> {
        let output = self
            .client
            .get_transcription_job()
            .transcription_job_name(job_id)
            .send()
            .await
            .map_err(|e| {
                ScribeError::Transcription(format!(
                    "failed to get status of {}: {}",
                    job_id,
                    DisplayErrorContext(&e)
                ))
            })?;

        let job = output.transcription_job().ok_or_else(|| {
            ScribeError::Transcription(format!("no job description returned for {}", job_id))
        })?;

        Ok(map_status(job.transcription_job_status(), job.failure_reason()))
    }
}

fn map_status(
    status: Option<&TranscriptionJobStatus>,
    failure_reason: Option<&str>,
) -> RemoteStatus {
    match status {
        Some(TranscriptionJobStatus::Completed) => RemoteStatus::Completed,
        Some(TranscriptionJobStatus::Failed) => RemoteStatus::Failed {
            reason: failure_reason.map(str::to_string),
        },
        Some(TranscriptionJobStatus::InProgress) => RemoteStatus::InProgress,
        _ => RemoteStatus::Queued,
    }
}
