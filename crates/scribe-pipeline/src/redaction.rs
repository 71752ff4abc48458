//! PII masking over transcript timelines
//!
//! Segment texts are joined with single spaces into one blob for detection.
//! Each segment remembers the character range it owns so the masked result can
//! be split back without losing or shifting words. All offsets here are
//! character offsets, which is what the detection service reports.

use crate::transcript::{Timeline, TranscriptSegment};
use crate::types::PiiSpan;
use serde::Serialize;
use std::cmp::Reverse;
use std::ops::Range;

/// Entity type that is never masked.
pub const DATE_TIME: &str = "DATE_TIME";

pub fn placeholder(entity_type: &str) -> String {
    format!("[REDACTED:{}]", entity_type)
}

/// Transcript with PII replaced, in the shape written to the redaction bucket
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RedactedTimeline {
    pub segments: Vec<TranscriptSegment>,
}

impl RedactedTimeline {
    pub fn to_json(&self) -> scribe_common::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

/// The joined text of a timeline and the character range of every segment
#[derive(Debug, Clone)]
pub struct TextLayout {
    text: String,
    chars: Vec<Range<usize>>,
    bytes: Vec<Range<usize>>,
}

impl TextLayout {
    pub fn new(segments: &[TranscriptSegment]) -> Self {
        let mut text = String::new();
        let mut chars = Vec::with_capacity(segments.len());
        let mut bytes = Vec::with_capacity(segments.len());
        let mut char_pos = 0;

        for (i, segment) in segments.iter().enumerate() {
            if i > 0 {
                text.push(' ');
                char_pos += 1;
            }
            let byte_start = text.len();
            let len = segment.text.chars().count();
            text.push_str(&segment.text);
            chars.push(char_pos..char_pos + len);
            bytes.push(byte_start..text.len());
            char_pos += len;
        }

        Self { text, chars, bytes }
    }

    pub fn char_len(&self) -> usize {
        self.chars.last().map(|r| r.end).unwrap_or(0)
    }

    fn segment_ranges(&self) -> &[Range<usize>] {
        &self.chars
    }

    /// Split the text into detection windows of at most `max_bytes` bytes,
    /// cutting only between segments. A single segment larger than the limit
    /// gets a window of its own.
    pub fn windows(&self, max_bytes: usize) -> Vec<DetectionWindow<'_>> {
        let mut windows = Vec::new();
        let mut first = 0;

        while first < self.bytes.len() {
            let start = self.bytes[first].start;
            let mut last = first;
            while last + 1 < self.bytes.len() && self.bytes[last + 1].end - start <= max_bytes {
                last += 1;
            }
            windows.push(DetectionWindow {
                text: &self.text[start..self.bytes[last].end],
                char_offset: self.chars[first].start,
            });
            first = last + 1;
        }

        windows
    }
}

/// Slice of the joined text sent in one detection call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectionWindow<'a> {
    pub text: &'a str,
    /// Position of the window's first character in the joined text
    pub char_offset: usize,
}

/// Prepare raw detector output for masking.
///
/// DATE_TIME and empty spans are dropped, ends are clamped to `text_len`, and
/// overlapping or nested spans are merged into the one that starts first.
/// Spans that merely touch stay separate. The result is sorted by start and
/// free of overlaps.
pub fn normalize_spans(mut spans: Vec<PiiSpan>, text_len: usize) -> Vec<PiiSpan> {
    spans.retain(|s| s.entity_type != DATE_TIME);
    for span in spans.iter_mut() {
        span.end = span.end.min(text_len);
    }
    spans.retain(|s| s.start < s.end);
    spans.sort_by_key(|s| (s.start, Reverse(s.end)));

    let mut merged: Vec<PiiSpan> = Vec::with_capacity(spans.len());
    for span in spans {
        match merged.last_mut() {
            Some(last) if span.start < last.end => {
                last.end = last.end.max(span.end);
            }
            _ => merged.push(span),
        }
    }
    merged
}

// Applied from the highest start down, so offsets of replacements not yet
// applied stay valid.
fn apply_replacements(text: &str, mut replacements: Vec<(Range<usize>, String)>) -> String {
    let mut chars: Vec<char> = text.chars().collect();
    replacements.sort_by_key(|(range, _)| Reverse(range.start));
    for (range, with) in replacements {
        let end = range.end.min(chars.len());
        let start = range.start.min(end);
        chars.splice(start..end, with.chars());
    }
    chars.into_iter().collect()
}

/// Mask `timeline` with normalized `spans` given in offsets of `layout`, the
/// layout built from the same timeline.
///
/// A placeholder lands in the segment where its span starts, or the next one
/// when the span starts on a separating space. Characters of the span that run
/// into later segments are removed from those segments. Segment count, timings
/// and speakers are preserved.
pub fn redact_timeline(
    timeline: &Timeline,
    layout: &TextLayout,
    spans: &[PiiSpan],
) -> RedactedTimeline {
    let segments = timeline
        .segments
        .iter()
        .zip(layout.segment_ranges())
        .map(|(segment, owned)| {
            let local: Vec<(Range<usize>, String)> = spans
                .iter()
                .filter(|s| s.start < owned.end && s.end > owned.start)
                .map(|s| {
                    let start = s.start.max(owned.start) - owned.start;
                    let end = s.end.min(owned.end) - owned.start;
                    // separator before this segment is at owned.start - 1
                    let with = if s.start + 1 >= owned.start {
                        placeholder(&s.entity_type)
                    } else {
                        String::new()
                    };
                    (start..end, with)
                })
                .collect();

            if local.is_empty() {
                segment.clone()
            } else {
                let masked = apply_replacements(&segment.text, local);
                segment.with_text(masked.trim().to_string())
            }
        })
        .collect();

    RedactedTimeline { segments }
}

/// How the detection language is chosen for a transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguagePolicy {
    /// Always use this language when set
    pub override_language: Option<String>,
    /// Languages the detector accepts
    pub supported: Vec<String>,
    pub fallback: String,
}

impl LanguagePolicy {
    /// Pick the language for a transcript whose detected language is
    /// `detected` (e.g. `es-US`).
    pub fn resolve(&self, detected: Option<&str>) -> String {
        if let Some(fixed) = &self.override_language {
            return fixed.clone();
        }
        detected
            .and_then(|code| code.split(['-', '_']).next())
            .map(|primary| primary.to_ascii_lowercase())
            .filter(|primary| self.supported.iter().any(|s| s.eq_ignore_ascii_case(primary)))
            .unwrap_or_else(|| self.fallback.clone())
    }
}
