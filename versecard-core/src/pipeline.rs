//! Publish Pipeline - Single Entry Point
//!
//! Linear sequence: preconditions, verse, generation, render, validation,
//! publish. Suppliers degrade to fallbacks; a missing image is the one
//! stop inside a normal run. `run` always returns a report.

use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::caption::resolve_caption;
use crate::config::{Credentials, Settings};
use crate::generation::{AnthropicGenerator, GenerationRequest, MarkupGenerator};
use crate::hashing::{compute_report_hash, sha256_hex};
use crate::publish::{GraphPublisher, PublishError, PublishReceipt, Publisher};
use crate::render::Renderer;
use crate::templates::FallbackTemplate;
use crate::validation::{ArtifactInput, ValidationResult, Validator, ViolationSeverity};
use crate::verse::{BibleApiSource, VerseSource};
use crate::ENGINE_VERSION;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0} is not set")]
    MissingCredential(&'static str),

    #[error("Image not found at {0}")]
    ImageMissing(PathBuf),

    #[error("Artifact rejected: {0}")]
    ArtifactRejected(String),

    #[error("Failed to read image: {0}")]
    ImageRead(#[from] std::io::Error),

    #[error("Publish failed: {0}")]
    Publish(#[from] PublishError),
}

impl PipelineError {
    pub fn category(&self) -> &'static str {
        match self {
            Self::MissingCredential(_) => "precondition",
            Self::ImageMissing(_) => "image_missing",
            Self::ArtifactRejected(_) => "validation",
            Self::ImageRead(_) => "io",
            Self::Publish(_) => "publish",
        }
    }
}

/// Where a piece of card content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentOrigin {
    Generated,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Published,
    /// Card rendered and validated, publish skipped.
    DryRun,
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedArtifact {
    pub image_path: PathBuf,
    pub caption: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub engine_version: String,
    pub started_at: DateTime<Utc>,
    pub outcome: RunOutcome,
    pub reference: Option<String>,
    pub salt: Option<u32>,
    pub markup_origin: Option<ContentOrigin>,
    pub caption_origin: Option<ContentOrigin>,
    pub image_path: Option<PathBuf>,
    pub image_sha256: Option<String>,
    pub caption: Option<String>,
    pub validation: Option<ValidationResult>,
    pub receipt: Option<PublishReceipt>,
    pub error_category: Option<String>,
    pub error: Option<String>,
    pub report_hash: String,
}

impl RunReport {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            engine_version: ENGINE_VERSION.to_string(),
            started_at: Utc::now(),
            outcome: RunOutcome::Aborted,
            reference: None,
            salt: None,
            markup_origin: None,
            caption_origin: None,
            image_path: None,
            image_sha256: None,
            caption: None,
            validation: None,
            receipt: None,
            error_category: None,
            error: None,
            report_hash: String::new(),
        }
    }

    /// Report for a run that ended without reaching the pipeline's own
    /// error handling.
    pub fn aborted(category: &str, message: impl Into<String>) -> Self {
        let mut report = Self::new();
        report.error_category = Some(category.to_string());
        report.error = Some(message.into());
        report.seal();
        report
    }

    fn seal(&mut self) {
        match compute_report_hash(self) {
            Ok(hash) => self.report_hash = hash,
            Err(e) => tracing::warn!(error = %e, "Could not hash run report"),
        }
    }
}

pub struct PublishPipeline {
    credentials: Credentials,
    dry_run: bool,
    source: Box<dyn VerseSource>,
    generator: Box<dyn MarkupGenerator>,
    renderer: Renderer,
    publisher: Box<dyn Publisher>,
    fallback: FallbackTemplate,
    validator: Validator,
}

impl PublishPipeline {
    pub fn new(
        credentials: Credentials,
        source: Box<dyn VerseSource>,
        generator: Box<dyn MarkupGenerator>,
        renderer: Renderer,
        publisher: Box<dyn Publisher>,
    ) -> Self {
        Self {
            credentials,
            dry_run: false,
            source,
            generator,
            renderer,
            publisher,
            fallback: FallbackTemplate::default(),
            validator: Validator::new(),
        }
    }

    /// Wire the production collaborators from settings.
    pub fn from_settings(settings: &Settings) -> Self {
        let creds = &settings.credentials;
        let endpoints = &settings.endpoints;

        let source = BibleApiSource::new(&endpoints.verse_api, settings.http_timeout);
        let generator = AnthropicGenerator::new(
            creds.anthropic_api_key().unwrap_or_default(),
            &endpoints.anthropic,
            settings.model.clone(),
            settings.http_timeout,
        );
        let renderer = Renderer::from_settings(settings);
        let publisher = GraphPublisher::new(
            creds.page_access_token().unwrap_or_default(),
            creds.page_id().map(str::to_string),
            &endpoints.graph,
            &endpoints.graph_version,
            settings.http_timeout,
        );

        Self::new(
            creds.clone(),
            Box::new(source),
            Box::new(generator),
            renderer,
            Box::new(publisher),
        )
        .with_dry_run(settings.dry_run)
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Run once. Never panics on collaborator failure; the outcome is in
    /// the returned report.
    pub fn run(&self) -> RunReport {
        let mut report = RunReport::new();
        let _span = tracing::info_span!("verse_run", run_id = %report.run_id).entered();
        tracing::info!(dry_run = self.dry_run, "Starting verse card run");

        let result = self.check_preconditions().and_then(|()| self.execute(&mut report));
        match result {
            Ok(receipt) => {
                report.outcome = if receipt.is_some() {
                    RunOutcome::Published
                } else {
                    RunOutcome::DryRun
                };
                report.receipt = receipt;
                tracing::info!(outcome = ?report.outcome, "Verse card run completed");
            }
            Err(e) => {
                tracing::error!(category = e.category(), error = %e, "Verse card run aborted");
                report.outcome = RunOutcome::Aborted;
                report.error_category = Some(e.category().to_string());
                report.error = Some(e.to_string());
            }
        }

        report.seal();
        report
    }

    /// `run`, with a panic anywhere in the run reported as an aborted outcome.
    pub fn run_guarded(&self) -> RunReport {
        panic::catch_unwind(AssertUnwindSafe(|| self.run())).unwrap_or_else(|payload| {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(error = %message, "Verse card run panicked");
            RunReport::aborted("panic", message)
        })
    }

    fn check_preconditions(&self) -> Result<(), PipelineError> {
        if !self.dry_run && self.credentials.page_access_token().is_none() {
            return Err(PipelineError::MissingCredential("PAGE_ACCESS_TOKEN"));
        }
        if self.credentials.anthropic_api_key().is_none() {
            return Err(PipelineError::MissingCredential("ANTHROPIC_API_KEY"));
        }
        Ok(())
    }

    /// Verse, generation, fallbacks and render. Always yields an artifact,
    /// though its image may be the placeholder.
    pub fn produce(&self, report: &mut RunReport) -> RenderedArtifact {
        let verse = self.source.fetch();
        tracing::info!(reference = %verse.reference, "Creating image for verse");
        report.reference = Some(verse.reference.clone());

        let request = GenerationRequest::new(verse);
        report.salt = Some(request.salt);
        let generated = self.generator.generate(&request);

        let markup = match generated.markup {
            Some(markup) => {
                report.markup_origin = Some(ContentOrigin::Generated);
                markup
            }
            None => {
                tracing::warn!("Using fallback HTML template");
                report.markup_origin = Some(ContentOrigin::Fallback);
                self.fallback.build(&request.verse.text, &request.verse.reference)
            }
        };

        report.caption_origin = Some(match generated.caption.as_deref() {
            Some(c) if !c.trim().is_empty() => ContentOrigin::Generated,
            _ => ContentOrigin::Fallback,
        });
        let caption = resolve_caption(generated.caption.as_deref(), &request.verse.reference);

        let image_path = self.renderer.render(&markup);
        report.image_path = Some(image_path.clone());
        report.caption = Some(caption.clone());

        RenderedArtifact { image_path, caption }
    }

    fn execute(&self, report: &mut RunReport) -> Result<Option<PublishReceipt>, PipelineError> {
        let artifact = self.produce(report);

        let validation = self.validator.validate(&ArtifactInput {
            image_path: &artifact.image_path,
            caption: &artifact.caption,
            canvas: self.renderer.viewport(),
        });
        for warning in validation.violations.iter().filter(|v| v.severity == ViolationSeverity::Warning) {
            tracing::warn!(rule = %warning.rule, "{}", warning.message);
        }
        report.validation = Some(validation.clone());

        if !artifact.image_path.is_file() {
            return Err(PipelineError::ImageMissing(artifact.image_path));
        }
        if !validation.valid {
            return Err(PipelineError::ArtifactRejected(validation.error_summary()));
        }

        let image = fs::read(&artifact.image_path)?;
        report.image_sha256 = Some(sha256_hex(&image));

        if self.dry_run {
            tracing::info!(path = %artifact.image_path.display(), "Dry run, skipping publish");
            return Ok(None);
        }

        let file_name = artifact
            .image_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "verse.png".to_string());

        tracing::info!(caption = %artifact.caption, "Posting to Facebook");
        let receipt = self.publisher.publish(&image, &file_name, &artifact.caption)?;
        tracing::info!(id = %receipt.id, "Successfully posted to Facebook");
        Ok(Some(receipt))
    }
}
