//! Outward stream protocol.
//!
//! A turn is delivered as JSON objects concatenated with no separators:
//!
//! ```text
//! {"type":"status","results":"Analyzing"}{"type":"status","results":" "}...
//! {"type":"articles","results":[{...},{...}]}
//! ```
//!
//! Consumers split the stream by brace balance. [`EnvelopeReader`] does that
//! incrementally, one character at a time, tracking string and escape state
//! so braces inside article text never end an envelope early. The same
//! reader is used to find JSON objects embedded in free-form model output.

use serde::{Deserialize, Serialize};

use crate::article::RetrievedArticle;

/// One self-contained, type-tagged object on the outward stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProtocolEnvelope {
    /// A narration fragment (usually one token).
    Status { results: String },

    /// The structured article payload.
    Articles {
        results: Vec<RetrievedArticle>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        note: Option<String>,
    },
}

impl ProtocolEnvelope {
    pub fn status(token: impl Into<String>) -> Self {
        Self::Status {
            results: token.into(),
        }
    }

    pub fn articles(results: Vec<RetrievedArticle>) -> Self {
        Self::Articles {
            results,
            note: None,
        }
    }

    /// Wire name of the discriminator.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Status { .. } => "status",
            Self::Articles { .. } => "articles",
        }
    }

    /// Encode as one compact JSON object.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// A piece of scanned input: free text, or one brace-balanced object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Object(String),
}

/// Incremental brace-balanced splitter.
///
/// Feed arbitrary transport chunks with [`push`](Self::push); complete
/// objects come out as soon as their closing brace arrives. Text outside
/// objects is reported as [`Segment::Text`].
#[derive(Debug, Default)]
pub struct EnvelopeReader {
    text: String,
    object: String,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

impl EnvelopeReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a chunk and return every segment it completed.
    pub fn push(&mut self, chunk: &str) -> Vec<Segment> {
        let mut out = Vec::new();

        for ch in chunk.chars() {
            if self.depth == 0 {
                if ch == '{' {
                    if !self.text.is_empty() {
                        out.push(Segment::Text(std::mem::take(&mut self.text)));
                    }
                    self.object.push(ch);
                    self.depth = 1;
                } else {
                    self.text.push(ch);
                }
                continue;
            }

            self.object.push(ch);

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if ch == '\\' {
                    self.escaped = true;
                } else if ch == '"' {
                    self.in_string = false;
                }
                continue;
            }

            match ch {
                '"' => self.in_string = true,
                '{' => self.depth += 1,
                '}' => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        out.push(Segment::Object(std::mem::take(&mut self.object)));
                    }
                }
                _ => {}
            }
        }

        if self.depth == 0 && !self.text.is_empty() {
            out.push(Segment::Text(std::mem::take(&mut self.text)));
        }

        out
    }

    /// Whether an object is open and waiting for more input.
    pub fn is_mid_object(&self) -> bool {
        self.depth > 0
    }

    /// Consume the reader, returning whatever never formed a complete object.
    ///
    /// On the outward stream this is a truncated trailing envelope and should
    /// be discarded.
    pub fn finish(self) -> Option<String> {
        let mut rest = self.text;
        rest.push_str(&self.object);
        (!rest.is_empty()).then_some(rest)
    }
}

/// Split one complete buffer into text and object segments.
///
/// Adjacent text is merged; an unterminated trailing object is returned as text.
pub fn scan_segments(buffer: &str) -> Vec<Segment> {
    let mut reader = EnvelopeReader::new();
    let mut segments = reader.push(buffer);
    if let Some(rest) = reader.finish() {
        segments.push(Segment::Text(rest));
    }

    let mut merged: Vec<Segment> = Vec::with_capacity(segments.len());
    for segment in segments {
        match (merged.last_mut(), segment) {
            (Some(Segment::Text(prev)), Segment::Text(next)) => prev.push_str(&next),
            (_, segment) => merged.push(segment),
        }
    }
    merged
}

/// A decoded turn, as a consumer would reassemble it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    /// Status fragments in arrival order.
    pub statuses: Vec<String>,
    /// Articles of the last articles envelope.
    pub articles: Vec<RetrievedArticle>,
    pub note: Option<String>,
}

impl Transcript {
    pub fn apply(&mut self, envelope: ProtocolEnvelope) {
        match envelope {
            ProtocolEnvelope::Status { results } => self.statuses.push(results),
            ProtocolEnvelope::Articles { results, note } => {
                self.articles = results;
                self.note = note;
            }
        }
    }

    /// Decode a sequence of transport chunks.
    ///
    /// A truncated trailing envelope is dropped.
    pub fn decode<'a>(
        chunks: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, serde_json::Error> {
        let mut reader = EnvelopeReader::new();
        let mut transcript = Self::default();

        for chunk in chunks {
            for segment in reader.push(chunk) {
                if let Segment::Object(raw) = segment {
                    transcript.apply(ProtocolEnvelope::from_json(&raw)?);
                }
            }
        }

        if let Some(rest) = reader.finish() {
            if !rest.trim().is_empty() {
                tracing::debug!(bytes = rest.len(), "Discarding incomplete trailing envelope");
            }
        }

        Ok(transcript)
    }

    /// All narration concatenated.
    pub fn narration(&self) -> String {
        self.statuses.concat()
    }

    /// Narration split into trimmed, non-empty lines.
    pub fn status_lines(&self) -> Vec<String> {
        self.narration()
            .split('\n')
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect()
    }

    pub fn has_articles(&self) -> bool {
        !self.articles.is_empty()
    }
}
