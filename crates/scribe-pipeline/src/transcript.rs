//! Transcription result documents
//!
//! The transcription service writes one JSON document per job. Only the parts
//! the redactor needs are modelled: the detected language and the per-item
//! word list with timing and speaker labels.

use scribe_common::{Result, ScribeError};
use serde::{Deserialize, Serialize};

const DEFAULT_SPEAKER: &str = "Speaker";

/// One word or punctuation mark with its timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub text: String,
    pub start_time: f64,
    pub end_time: f64,
    #[serde(rename = "speaker")]
    pub speaker_label: String,
}

impl TranscriptSegment {
    pub fn new(
        text: impl Into<String>,
        start_time: f64,
        end_time: f64,
        speaker_label: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            start_time,
            end_time,
            speaker_label: speaker_label.into(),
        }
    }

    /// Same timing and speaker, different text.
    pub fn with_text(&self, text: String) -> Self {
        Self {
            text,
            start_time: self.start_time,
            end_time: self.end_time,
            speaker_label: self.speaker_label.clone(),
        }
    }
}

/// Ordered segments of one completed job
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timeline {
    pub segments: Vec<TranscriptSegment>,
    /// Language the service identified, e.g. `en-IN`
    pub language_code: Option<String>,
}

impl Timeline {
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Parse a raw result document.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let document: ResultDocument = serde_json::from_slice(bytes)
            .map_err(|e| ScribeError::Parse(format!("invalid transcription result: {}", e)))?;

        let segments = document
            .results
            .items
            .into_iter()
            .filter_map(|item| {
                let text = item
                    .alternatives
                    .into_iter()
                    .find_map(|alt| alt.content.filter(|c| !c.trim().is_empty()))?;
                Some(TranscriptSegment {
                    text,
                    start_time: parse_seconds(item.start_time.as_deref()),
                    end_time: parse_seconds(item.end_time.as_deref()),
                    speaker_label: item
                        .speaker_label
                        .unwrap_or_else(|| DEFAULT_SPEAKER.to_string()),
                })
            })
            .collect();

        Ok(Self {
            segments,
            language_code: document.results.language_code.filter(|c| !c.is_empty()),
        })
    }
}

// Punctuation items carry no timing.
fn parse_seconds(raw: Option<&str>) -> f64 {
    raw.and_then(|s| s.trim().parse().ok()).unwrap_or(0.0)
}

#[derive(Debug, Deserialize)]
struct ResultDocument {
    results: Results,
}

#[derive(Debug, Deserialize)]
struct Results {
    #[serde(default)]
    language_code: Option<String>,
    #[serde(default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    #[serde(default)]
    start_time: Option<String>,
    #[serde(default)]
    end_time: Option<String>,
    #[serde(default)]
    speaker_label: Option<String>,
    #[serde(default)]
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    #[serde(default)]
    content: Option<String>,
}
