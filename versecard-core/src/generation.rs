//! Markup Generator - prompt, model call, dual-fence parse
//!
//! The model is asked for two fenced blocks: the card markup and the
//! caption. Either may be missing; that is never an error here.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::ModelSettings;
use crate::verse::VersePayload;
use crate::{CANVAS_SIZE, FOOTER_LABEL};

pub const MARKUP_FENCE: &str = "```html";
pub const CAPTION_FENCE: &str = "```json";
pub const CLOSING_FENCE: &str = "```";

pub const SALT_RANGE: std::ops::RangeInclusive<u32> = 1..=1000;

const ANTHROPIC_VERSION: &str = "2023-06-01";

const SYSTEM_PROMPT: &str = "You are an expert HTML/CSS designer specializing in creating beautiful social media graphics. You create clean, elegant designs with perfect typography and visual appeal. You also write engaging social media captions.";

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Model API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Malformed response: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Response had no text content")]
    NoText,
}

/// One model request. Built fresh per run, never reused.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    pub verse: VersePayload,
    pub salt: u32,
}

impl GenerationRequest {
    pub fn new(verse: VersePayload) -> Self {
        let salt = rand::thread_rng().gen_range(SALT_RANGE);
        Self::with_salt(verse, salt)
    }

    pub fn with_salt(verse: VersePayload, salt: u32) -> Self {
        Self { verse, salt }
    }

    pub fn prompt(&self) -> String {
        format!(
            r#"Create an HTML design for a square social media post ({size}x{size} pixels) featuring a Bible verse, and provide a short caption for the post.

Today's suggested verse is "{text}" ({reference}).
Be creative with your choice of verse. If you choose a different verse, make sure it is in the {salt}th section of the bible.
Some days maybe don't use a verse at all, and just have a nice saying or quote instead.

Requirements for the HTML design:
1. The design should have a beautiful gradient background
2. Use elegant typography with good readability
3. Add a small "{footer}" text at the bottom
4. Add a decorative quote mark at the top
5. Use only inline CSS (no external stylesheets)
6. Make sure the design is exactly {size}x{size} pixels
7. Use Google Fonts (linked in the head)
8. The design should be clean, modern, and visually appealing
9. Ensure good contrast between text and background

Requirements for the caption:
1. Write a short, engaging 1-2 sentence caption for Facebook
2. The caption should relate to the verse or quote in the image
3. Include 2-3 relevant hashtags at the end

Your goal is to maximize engagement for an older, Christian audience. Be creative and give them something that catches their eye.

Return your response in the following format exactly:

{markup_fence}
HTML CODE HERE
{closing}

{caption_fence}
CAPTION HERE
{closing}
"#,
            size = CANVAS_SIZE,
            text = self.verse.text,
            reference = self.verse.reference,
            salt = self.salt,
            footer = FOOTER_LABEL,
            markup_fence = MARKUP_FENCE,
            caption_fence = CAPTION_FENCE,
            closing = CLOSING_FENCE,
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub markup: Option<String>,
    pub caption: Option<String>,
}

impl GenerationResult {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Best-effort parse of a dual-fenced model response.
    pub fn from_response(response: &str) -> Self {
        Self {
            markup: extract_block(response, MARKUP_FENCE),
            caption: extract_block(response, CAPTION_FENCE),
        }
    }
}

/// Text strictly between the first `opening` marker and the next closing
/// fence. If no closing fence follows, the rest of the response is taken.
pub fn extract_fenced<'a>(response: &'a str, opening: &str) -> Option<&'a str> {
    let start = response.find(opening)? + opening.len();
    let rest = &response[start..];
    let end = rest.find(CLOSING_FENCE).unwrap_or(rest.len());
    Some(&rest[..end])
}

fn extract_block(response: &str, opening: &str) -> Option<String> {
    extract_fenced(response, opening)
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .map(str::to_string)
}

/// Produces card markup and a caption. Failures surface as empty fields.
pub trait MarkupGenerator {
    fn generate(&self, request: &GenerationRequest) -> GenerationResult;
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    system: &'a str,
    messages: Vec<Message>,
}

#[derive(Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Anthropic Messages API client. One call per run, no retry.
pub struct AnthropicGenerator {
    api_key: String,
    endpoint: String,
    settings: ModelSettings,
    timeout: Duration,
}

impl AnthropicGenerator {
    pub fn new(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        settings: ModelSettings,
        timeout: Duration,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: endpoint.into(),
            settings,
            timeout,
        }
    }

    fn request_text(&self, prompt: String) -> Result<String, GenerationError> {
        let body = MessagesRequest {
            model: &self.settings.model,
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            system: SYSTEM_PROMPT,
            messages: vec![Message { role: "user", content: prompt }],
        };

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()?;
        let response = client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()?;

        let status = response.status().as_u16();
        let body = response.text()?;
        response_text(status, &body)
    }
}

/// First text block of a Messages API reply.
pub fn response_text(status: u16, body: &str) -> Result<String, GenerationError> {
    if !(200..300).contains(&status) {
        return Err(GenerationError::Api { status, body: body.to_string() });
    }
    let parsed: MessagesResponse = serde_json::from_str(body)?;
    parsed
        .content
        .into_iter()
        .find(|block| block.kind == "text")
        .and_then(|block| block.text)
        .ok_or(GenerationError::NoText)
}

impl MarkupGenerator for AnthropicGenerator {
    fn generate(&self, request: &GenerationRequest) -> GenerationResult {
        tracing::info!(salt = request.salt, "Generating HTML design with model");

        let text = match self.request_text(request.prompt()) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "Error generating HTML with model");
                return GenerationResult::empty();
            }
        };
        tracing::info!(length = text.len(), "Model response received");

        let result = GenerationResult::from_response(&text);
        if result.markup.is_none() {
            tracing::warn!("Failed to extract HTML content");
        }
        if result.caption.is_none() {
            tracing::warn!("Failed to extract caption");
        }
        result
    }
}
