//! Artifact Validation - Rule/Policy Separation
//!
//! Rules produce structured violations.
//! Policy: errors block publishing, warnings are recorded.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::render::Viewport;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationViolation {
    pub rule: String,
    pub severity: ViolationSeverity,
    pub message: String,
    pub expected: Option<String>,
    pub actual: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub violations: Vec<ValidationViolation>,
}

impl ValidationResult {
    pub fn errors(&self) -> impl Iterator<Item = &ValidationViolation> {
        self.violations.iter().filter(|v| v.severity == ViolationSeverity::Error)
    }

    /// `rule: message` for every error, joined with `; `.
    pub fn error_summary(&self) -> String {
        self.errors()
            .map(|v| format!("{}: {}", v.rule, v.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// What gets checked right before publishing.
#[derive(Debug, Clone)]
pub struct ArtifactInput<'a> {
    pub image_path: &'a Path,
    pub caption: &'a str,
    pub canvas: Viewport,
}

pub trait ValidationRule {
    fn name(&self) -> &'static str;
    fn validate(&self, input: &ArtifactInput<'_>) -> Vec<ValidationViolation>;
}

// --- Concrete Rules ---

pub struct ImageExistsRule;

impl ValidationRule for ImageExistsRule {
    fn name(&self) -> &'static str { "image_exists" }

    fn validate(&self, input: &ArtifactInput<'_>) -> Vec<ValidationViolation> {
        if input.image_path.is_file() {
            return vec![];
        }
        vec![ValidationViolation {
            rule: self.name().to_string(),
            severity: ViolationSeverity::Error,
            message: format!("Image not found at {}", input.image_path.display()),
            expected: Some("readable image file".to_string()),
            actual: None,
        }]
    }
}

pub struct CanvasDimensionsRule;

impl ValidationRule for CanvasDimensionsRule {
    fn name(&self) -> &'static str { "canvas_dimensions" }

    fn validate(&self, input: &ArtifactInput<'_>) -> Vec<ValidationViolation> {
        // A missing file is reported by ImageExistsRule.
        if !input.image_path.is_file() {
            return vec![];
        }

        let expected = format!("{}x{}", input.canvas.width, input.canvas.height);
        match image::image_dimensions(input.image_path) {
            Ok((w, h)) if w == input.canvas.width && h == input.canvas.height => vec![],
            Ok((w, h)) => vec![ValidationViolation {
                rule: self.name().to_string(),
                severity: ViolationSeverity::Warning,
                message: "Image does not match canvas size".to_string(),
                expected: Some(expected),
                actual: Some(format!("{}x{}", w, h)),
            }],
            Err(e) => vec![ValidationViolation {
                rule: self.name().to_string(),
                severity: ViolationSeverity::Warning,
                message: format!("Could not read image dimensions: {}", e),
                expected: Some(expected),
                actual: None,
            }],
        }
    }
}

pub struct CaptionRule;

impl ValidationRule for CaptionRule {
    fn name(&self) -> &'static str { "caption" }

    fn validate(&self, input: &ArtifactInput<'_>) -> Vec<ValidationViolation> {
        if !input.caption.trim().is_empty() {
            return vec![];
        }
        vec![ValidationViolation {
            rule: self.name().to_string(),
            severity: ViolationSeverity::Error,
            message: "Caption is empty".to_string(),
            expected: Some("non-empty caption".to_string()),
            actual: Some(String::new()),
        }]
    }
}

/// Runs every rule and applies the blocking policy.
pub struct Validator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(ImageExistsRule),
                Box::new(CanvasDimensionsRule),
                Box::new(CaptionRule),
            ],
        }
    }

    pub fn validate(&self, input: &ArtifactInput<'_>) -> ValidationResult {
        let violations: Vec<_> = self.rules.iter()
            .flat_map(|rule| rule.validate(input))
            .collect();

        let valid = !violations.iter().any(|v| v.severity == ViolationSeverity::Error);
        ValidationResult { valid, violations }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}
