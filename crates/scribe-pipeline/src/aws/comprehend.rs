use crate::services::PiiDetector;
use crate::types::PiiSpan;
use async_trait::async_trait;
use aws_sdk_comprehend::error::DisplayErrorContext;
use aws_sdk_comprehend::types::{LanguageCode, PiiEntity};
use aws_sdk_comprehend::Client;
use scribe_common::{Result, ScribeError};
use tracing::{debug, instrument};

/// Amazon Comprehend `DetectPiiEntities`
#[derive(Clone)]
pub struct ComprehendDetector {
    client: Client,
}

impl std::fmt::Debug for ComprehendDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComprehendDetector").finish_non_exhaustive()
    }
}

impl ComprehendDetector {
    pub fn new(sdk_config: &aws_config::SdkConfig) -> Self {
        Self {
            client: Client::new(sdk_config),
        }
    }
}

#[async_trait]
impl PiiDetector for ComprehendDetector {
    #[instrument(skip(self, text), fields(chars = text.chars().count()))]
    async fn detect(&self, text: &str, language: &str) -> Result<Vec<PiiSpan>> {
        let output = self
            .client
            .detect_pii_entities()
            .text(text)
            .language_code(LanguageCode::from(language))
            .send()
            .await
            .map_err(|e| ScribeError::Detection(DisplayErrorContext(&e).to_string()))?;

        let spans: Vec<PiiSpan> = output.entities().iter().filter_map(to_span).collect();

        debug!(entities = spans.len(), "PII detection finished");

        Ok(spans)
    }
}

// Entities without offsets or type cannot be masked.
fn to_span(entity: &PiiEntity) -> Option<PiiSpan> {
    let start = usize::try_from(entity.begin_offset()?).ok()?;
    let end = usize::try_from(entity.end_offset()?).ok()?;
    let kind = entity.r#type()?;
    Some(PiiSpan::new(start, end, kind.as_str()))
}
