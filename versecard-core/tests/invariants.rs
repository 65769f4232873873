//! Contract Invariant Tests
//!
//! End-to-end pipeline runs against in-process collaborators.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use image::{Rgba, RgbaImage};
use url::Url;

use versecard_core::{
    pipeline::ContentOrigin,
    render::RenderError,
    BrowserEngine, Credentials, GenerationRequest, GenerationResult, MarkupGenerator,
    PublishError, PublishPipeline, PublishReceipt, Publisher, Renderer, RunOutcome,
    VersePayload, VerseSource, Viewport,
};

#[derive(Default)]
struct Calls {
    fetches: usize,
    generations: Vec<GenerationRequest>,
    renders: Vec<String>,
    publishes: Vec<(usize, String, String)>,
}

type Log = Rc<RefCell<Calls>>;

struct FixedSource {
    log: Log,
    verse: VersePayload,
}

impl VerseSource for FixedSource {
    fn fetch(&self) -> VersePayload {
        self.log.borrow_mut().fetches += 1;
        self.verse.clone()
    }
}

struct ScriptedGenerator {
    log: Log,
    response: Option<String>,
}

impl MarkupGenerator for ScriptedGenerator {
    fn generate(&self, request: &GenerationRequest) -> GenerationResult {
        self.log.borrow_mut().generations.push(request.clone());
        match &self.response {
            Some(text) => GenerationResult::from_response(text),
            // transport failure
            None => GenerationResult::empty(),
        }
    }
}

struct FakeEngine {
    log: Log,
    fail: bool,
}

impl BrowserEngine for FakeEngine {
    fn capture(&self, document: &Url, viewport: Viewport, output: &Path) -> Result<(), RenderError> {
        let path = document.to_file_path().map_err(|_| RenderError::Browser("bad url".into()))?;
        self.log.borrow_mut().renders.push(std::fs::read_to_string(path)?);
        if self.fail {
            return Err(RenderError::Browser("browser crashed".into()));
        }
        RgbaImage::from_pixel(viewport.width, viewport.height, Rgba([240, 230, 200, 255])).save(output)?;
        Ok(())
    }
}

struct RecordingPublisher {
    log: Log,
}

impl Publisher for RecordingPublisher {
    fn publish(&self, image: &[u8], file_name: &str, caption: &str) -> Result<PublishReceipt, PublishError> {
        self.log
            .borrow_mut()
            .publishes
            .push((image.len(), file_name.to_string(), caption.to_string()));
        Ok(PublishReceipt { id: "photo-1".to_string(), post_id: Some("page_photo-1".to_string()) })
    }
}

fn credentials() -> Credentials {
    Credentials {
        page_access_token: Some("page-token".to_string()),
        anthropic_api_key: Some("sk-test".to_string()),
        page_id: None,
    }
}

fn test_verse() -> VersePayload {
    VersePayload::new("Test verse", "Test 1:1")
}

const MODEL_RESPONSE: &str = "Here is your design.\n\n```html\n<html><body><h1>Test verse</h1></body></html>\n```\n\n```json\nStart your day in His word. #Faith #Hope\n```\n";

fn pipeline(
    creds: Credentials,
    response: Option<&str>,
    fail_render: bool,
    output_dir: &Path,
) -> (PublishPipeline, Log) {
    let log: Log = Default::default();
    let pipeline = PublishPipeline::new(
        creds,
        Box::new(FixedSource { log: log.clone(), verse: test_verse() }),
        Box::new(ScriptedGenerator { log: log.clone(), response: response.map(str::to_string) }),
        Renderer::new(Box::new(FakeEngine { log: log.clone(), fail: fail_render }), output_dir),
        Box::new(RecordingPublisher { log: log.clone() }),
    );
    (pipeline, log)
}

fn is_timestamped_card(path: &Path, dir: &Path) -> bool {
    let name = path.file_name().unwrap().to_string_lossy().to_string();
    let Some(stamp) = name.strip_prefix("verse_").and_then(|s| s.strip_suffix(".png")) else {
        return false;
    };
    let (date, time) = match stamp.split_once('_') {
        Some(parts) => parts,
        None => return false,
    };
    path.parent() == Some(dir)
        && date.len() == 8
        && time.len() == 6
        && date.chars().chain(time.chars()).all(|c| c.is_ascii_digit())
}

#[test]
fn invariant_generated_card_is_published() {
    let dir = tempfile::tempdir().unwrap();
    let (pipeline, log) = pipeline(credentials(), Some(MODEL_RESPONSE), false, dir.path());

    let report = pipeline.run();

    assert_eq!(report.outcome, RunOutcome::Published);
    let image_path: PathBuf = report.image_path.clone().unwrap();
    assert!(image_path.exists());
    assert!(is_timestamped_card(&image_path, dir.path()));

    let calls = log.borrow();
    assert_eq!(calls.renders, vec!["<html><body><h1>Test verse</h1></body></html>".to_string()]);
    assert_eq!(calls.publishes.len(), 1);
    let (bytes, file_name, caption) = &calls.publishes[0];
    assert_eq!(*bytes as u64, std::fs::metadata(&image_path).unwrap().len());
    assert_eq!(file_name, &image_path.file_name().unwrap().to_string_lossy());
    assert_eq!(caption, "Start your day in His word. #Faith #Hope");

    assert_eq!(report.markup_origin, Some(ContentOrigin::Generated));
    assert_eq!(report.caption_origin, Some(ContentOrigin::Generated));
    assert_eq!(report.receipt.as_ref().unwrap().id, "photo-1");
    assert_eq!(report.image_sha256.as_ref().unwrap().len(), 64);
}

#[test]
fn invariant_model_failure_falls_back() {
    let dir = tempfile::tempdir().unwrap();
    let (pipeline, log) = pipeline(credentials(), None, false, dir.path());

    let report = pipeline.run();

    assert_eq!(report.outcome, RunOutcome::Published);
    assert_eq!(report.markup_origin, Some(ContentOrigin::Fallback));
    assert_eq!(report.caption_origin, Some(ContentOrigin::Fallback));
    assert!(report.image_path.as_ref().unwrap().exists());

    let calls = log.borrow();
    let rendered = &calls.renders[0];
    assert!(rendered.contains(r#"<div class="verse">Test verse</div>"#));
    assert!(rendered.contains("Daily Devotions"));

    let caption = &calls.publishes[0].2;
    assert!(caption.contains("Test 1:1"));
    assert!(caption.contains('#'));
}

#[test]
fn invariant_render_failure_never_publishes() {
    let dir = tempfile::tempdir().unwrap();
    let (pipeline, log) = pipeline(credentials(), Some(MODEL_RESPONSE), true, dir.path());

    let report = pipeline.run();

    assert_eq!(report.outcome, RunOutcome::Aborted);
    assert_eq!(report.error_category.as_deref(), Some("image_missing"));
    assert_eq!(report.image_path, Some(dir.path().join("placeholder.jpg")));
    assert_eq!(log.borrow().renders.len(), 1);
    assert!(log.borrow().publishes.is_empty());
}

#[test]
fn invariant_missing_page_token_does_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let creds = Credentials { page_access_token: None, ..credentials() };
    let (pipeline, log) = pipeline(creds, Some(MODEL_RESPONSE), false, dir.path());

    let report = pipeline.run();

    assert_eq!(report.outcome, RunOutcome::Aborted);
    assert_eq!(report.error_category.as_deref(), Some("precondition"));
    assert!(report.error.as_deref().unwrap().contains("PAGE_ACCESS_TOKEN"));

    let calls = log.borrow();
    assert_eq!(calls.fetches, 0);
    assert!(calls.generations.is_empty());
    assert!(calls.renders.is_empty());
    assert!(calls.publishes.is_empty());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn invariant_missing_model_key_does_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let creds = Credentials { anthropic_api_key: Some(String::new()), ..credentials() };
    let (pipeline, log) = pipeline(creds, Some(MODEL_RESPONSE), false, dir.path());

    let report = pipeline.run();

    assert_eq!(report.outcome, RunOutcome::Aborted);
    assert!(report.error.as_deref().unwrap().contains("ANTHROPIC_API_KEY"));
    let calls = log.borrow();
    assert_eq!(calls.fetches, 0);
    assert!(calls.generations.is_empty());
    assert!(calls.renders.is_empty());
    assert!(calls.publishes.is_empty());
}

#[test]
fn invariant_dry_run_skips_publish_only() {
    let dir = tempfile::tempdir().unwrap();
    let creds = Credentials { page_access_token: None, ..credentials() };
    let (pipeline, log) = pipeline(creds, Some(MODEL_RESPONSE), false, dir.path());
    let pipeline = pipeline.with_dry_run(true);

    let report = pipeline.run();

    assert_eq!(report.outcome, RunOutcome::DryRun);
    assert!(report.image_path.as_ref().unwrap().exists());
    assert!(report.validation.as_ref().unwrap().valid);
    assert_eq!(log.borrow().renders.len(), 1);
    assert!(log.borrow().publishes.is_empty());
}

#[test]
fn invariant_generation_request_carries_verse_and_salt() {
    let dir = tempfile::tempdir().unwrap();
    let (pipeline, log) = pipeline(credentials(), Some(MODEL_RESPONSE), false, dir.path());

    let report = pipeline.run();

    let calls = log.borrow();
    assert_eq!(calls.fetches, 1);
    assert_eq!(calls.generations.len(), 1);
    let request = &calls.generations[0];
    assert_eq!(request.verse, test_verse());
    assert!((1..=1000).contains(&request.salt));
    assert_eq!(report.salt, Some(request.salt));
    assert_eq!(report.reference.as_deref(), Some("Test 1:1"));
}

#[test]
fn invariant_report_hash_matches_contents() {
    let dir = tempfile::tempdir().unwrap();
    let (pipeline, _log) = pipeline(credentials(), Some(MODEL_RESPONSE), false, dir.path());

    let report = pipeline.run();

    let recomputed = versecard_core::compute_report_hash(&report).unwrap();
    assert_eq!(report.report_hash, recomputed);
}

struct PanickingSource;

impl VerseSource for PanickingSource {
    fn fetch(&self) -> VersePayload {
        panic!("verse source blew up");
    }
}

#[test]
fn invariant_panic_becomes_aborted_report() {
    let dir = tempfile::tempdir().unwrap();
    let log: Log = Default::default();
    let pipeline = PublishPipeline::new(
        credentials(),
        Box::new(PanickingSource),
        Box::new(ScriptedGenerator { log: log.clone(), response: Some(MODEL_RESPONSE.to_string()) }),
        Renderer::new(Box::new(FakeEngine { log: log.clone(), fail: false }), dir.path()),
        Box::new(RecordingPublisher { log: log.clone() }),
    );

    let report = pipeline.run_guarded();

    assert_eq!(report.outcome, RunOutcome::Aborted);
    assert_eq!(report.error_category.as_deref(), Some("panic"));
    assert_eq!(report.error.as_deref(), Some("verse source blew up"));
    assert!(log.borrow().publishes.is_empty());
}
