//! VerseCard Core - Daily Verse Card Pipeline
//!
//! # The Five Rules
//! 1. Every Run Produces A Card Or Stops Cleanly
//! 2. Suppliers Degrade, They Never Abort
//! 3. Fallbacks Are Deterministic
//! 4. No File, No Post
//! 5. Agents Suggest, Engine Renders

pub mod config;
pub mod verse;
pub mod generation;
pub mod templates;
pub mod caption;
pub mod render;
pub mod validation;
pub mod hashing;
pub mod publish;
pub mod pipeline;
pub mod telemetry;

pub use config::{Settings, Credentials};
pub use verse::{VersePayload, VerseSource, BibleApiSource};
pub use generation::{GenerationRequest, GenerationResult, MarkupGenerator, AnthropicGenerator};
pub use templates::FallbackTemplate;
pub use caption::resolve_caption;
pub use render::{Renderer, BrowserEngine, ChromeEngine, Viewport, RenderError};
pub use validation::{ValidationResult, ValidationRule, ValidationViolation, ViolationSeverity};
pub use hashing::{sha256_hex, canonical_json, compute_report_hash};
pub use publish::{Publisher, GraphPublisher, PublishReceipt, PublishError};
pub use pipeline::{PublishPipeline, RenderedArtifact, RunReport, RunOutcome, PipelineError};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Square canvas edge, in pixels.
pub const CANVAS_SIZE: u32 = 1080;

/// Label printed at the bottom of every card.
pub const FOOTER_LABEL: &str = "Daily Devotions";
