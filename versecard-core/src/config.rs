//! Runtime settings, built once at startup and handed to the pipeline.

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_VERSE_API_URL: &str = "https://labs.bible.org/api/?passage=random&type=json";
pub const DEFAULT_ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
pub const DEFAULT_GRAPH_URL: &str = "https://graph.facebook.com";
pub const DEFAULT_GRAPH_VERSION: &str = "v3.1";
pub const DEFAULT_MODEL: &str = "claude-3-7-sonnet-20250219";

/// Secrets required by the pipeline. Blank values count as missing.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub page_access_token: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub page_id: Option<String>,
}

impl Credentials {
    pub fn page_access_token(&self) -> Option<&str> {
        non_blank(&self.page_access_token)
    }

    pub fn anthropic_api_key(&self) -> Option<&str> {
        non_blank(&self.anthropic_api_key)
    }

    pub fn page_id(&self) -> Option<&str> {
        non_blank(&self.page_id)
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 4000,
            temperature: 1.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Endpoints {
    pub verse_api: String,
    pub anthropic: String,
    pub graph: String,
    pub graph_version: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            verse_api: DEFAULT_VERSE_API_URL.to_string(),
            anthropic: DEFAULT_ANTHROPIC_URL.to_string(),
            graph: DEFAULT_GRAPH_URL.to_string(),
            graph_version: DEFAULT_GRAPH_VERSION.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub credentials: Credentials,
    pub output_dir: PathBuf,
    pub model: ModelSettings,
    pub endpoints: Endpoints,
    pub http_timeout: Duration,
    pub render_timeout: Duration,
    /// Skip the publish step. The page token is not required in this mode.
    pub dry_run: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            credentials: Credentials::default(),
            output_dir: PathBuf::from("images"),
            model: ModelSettings::default(),
            endpoints: Endpoints::default(),
            http_timeout: Duration::from_secs(30),
            render_timeout: Duration::from_secs(30),
            dry_run: false,
        }
    }
}
