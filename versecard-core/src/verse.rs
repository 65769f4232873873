//! Content Source - verse supplier with a fixed default
//!
//! `fetch` never fails. A slow or broken upstream degrades the card's
//! content, it never aborts the run.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_VERSE_TEXT: &str = "For God so loved the world that he gave his one and only Son, that whoever believes in him shall not perish but have eternal life.";
pub const DEFAULT_VERSE_REFERENCE: &str = "John 3:16";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersePayload {
    pub text: String,
    pub reference: String,
}

impl VersePayload {
    pub fn new(text: impl Into<String>, reference: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            reference: reference.into(),
        }
    }

    pub fn default_verse() -> Self {
        Self::new(DEFAULT_VERSE_TEXT, DEFAULT_VERSE_REFERENCE)
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Unexpected status: {0}")]
    Status(u16),

    #[error("Malformed body: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Empty passage list")]
    Empty,
}

/// Supplier of the day's verse. Implementations must not fail.
pub trait VerseSource {
    fn fetch(&self) -> VersePayload;
}

#[derive(Debug, Deserialize)]
struct Passage {
    text: String,
    bookname: String,
    chapter: String,
    verse: String,
}

/// Random passage from the labs.bible.org API. One attempt, no retry.
pub struct BibleApiSource {
    url: String,
    timeout: Duration,
}

impl BibleApiSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
        }
    }

    fn try_fetch(&self) -> Result<(u16, String), reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()?;
        let response = client.get(&self.url).send()?;
        let status = response.status().as_u16();
        Ok((status, response.text()?))
    }
}

impl VerseSource for BibleApiSource {
    fn fetch(&self) -> VersePayload {
        match self.try_fetch() {
            Ok((status, body)) => payload_or_default(status, &body),
            Err(e) => {
                tracing::error!(error = %e, "Error fetching Bible verse, using default");
                VersePayload::default_verse()
            }
        }
    }
}

/// Interpret an upstream response. Only the first passage is read.
pub fn parse_response(status: u16, body: &str) -> Result<VersePayload, SourceError> {
    if status != 200 {
        return Err(SourceError::Status(status));
    }
    let passages: Vec<Passage> = serde_json::from_str(body)?;
    let first = passages.into_iter().next().ok_or(SourceError::Empty)?;
    Ok(VersePayload {
        text: first.text,
        reference: format!("{} {}:{}", first.bookname, first.chapter, first.verse),
    })
}

/// Same as `parse_response`, substituting the default payload on any error.
pub fn payload_or_default(status: u16, body: &str) -> VersePayload {
    parse_response(status, body).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Verse response unusable, using default");
        VersePayload::default_verse()
    })
}
