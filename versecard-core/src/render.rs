//! Renderer - markup to a fixed-size raster card
//!
//! The markup is written to a scoped temporary document, loaded by a
//! headless browser at a square viewport, captured once the network is
//! idle, then re-encoded. `render` never fails: on error it hands back
//! the placeholder path, which may not exist.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Local};
use headless_chrome::protocol::cdp::types::Event;
use headless_chrome::protocol::cdp::Page;
use headless_chrome::{Browser, LaunchOptions, Tab};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{DynamicImage, ImageFormat};
use tempfile::NamedTempFile;
use thiserror::Error;
use url::Url;

use crate::config::Settings;
use crate::CANVAS_SIZE;

/// Quality used by the optimization pass.
pub const OPTIMIZE_QUALITY: u8 = 90;

pub const PLACEHOLDER_FILE: &str = "placeholder.jpg";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Network did not go idle within {0:?}")]
    NetworkIdleTimeout(Duration),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Cannot address document at {0}")]
    DocumentPath(PathBuf),
}

fn browser_error(e: impl std::fmt::Display) -> RenderError {
    RenderError::Browser(e.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub fn square(size: u32) -> Self {
        Self { width: size, height: size }
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::square(CANVAS_SIZE)
    }
}

/// Loads a document and writes a screenshot of the viewport to `output`.
pub trait BrowserEngine {
    fn capture(&self, document: &Url, viewport: Viewport, output: &Path) -> Result<(), RenderError>;
}

/// Headless Chromium over the DevTools protocol.
pub struct ChromeEngine {
    timeout: Duration,
}

impl ChromeEngine {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn watch_network_idle(tab: &Tab, watch: Arc<Mutex<IdleWatch>>) -> Result<mpsc::Receiver<()>, RenderError> {
        tab.call_method(Page::SetLifecycleEventsEnabled { enabled: true })
            .map_err(browser_error)?;

        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        tab.add_event_listener(Arc::new(move |event: &Event| {
            if let Event::PageLifecycleEvent(lifecycle) = event {
                let idle = watch
                    .lock()
                    .map(|mut w| w.observe(&lifecycle.params.name, &lifecycle.params.loader_id))
                    .unwrap_or(false);
                if idle {
                    if let Ok(tx) = tx.lock() {
                        let _ = tx.send(());
                    }
                }
            }
        }))
        .map_err(browser_error)?;
        Ok(rx)
    }
}

impl BrowserEngine for ChromeEngine {
    fn capture(&self, document: &Url, viewport: Viewport, output: &Path) -> Result<(), RenderError> {
        let options = LaunchOptions::default_builder()
            .headless(true)
            .window_size(Some((viewport.width, viewport.height)))
            .build()
            .map_err(browser_error)?;
        let browser = Browser::new(options).map_err(browser_error)?;
        let tab = browser.new_tab().map_err(browser_error)?;
        tab.set_default_timeout(self.timeout);

        let watch = Arc::new(Mutex::new(IdleWatch::default()));
        let idle = Self::watch_network_idle(&tab, Arc::clone(&watch))?;
        if let Ok(mut w) = watch.lock() {
            w.arm();
        }

        tab.navigate_to(document.as_str())
            .map_err(browser_error)?
            .wait_until_navigated()
            .map_err(browser_error)?;
        idle.recv_timeout(self.timeout)
            .map_err(|_| RenderError::NetworkIdleTimeout(self.timeout))?;

        let clip = Page::Viewport {
            x: 0.0,
            y: 0.0,
            width: f64::from(viewport.width),
            height: f64::from(viewport.height),
            scale: 1.0,
        };
        let png = tab
            .capture_screenshot(Page::CaptureScreenshotFormatOption::Png, None, Some(clip), true)
            .map_err(browser_error)?;
        fs::write(output, png)?;
        Ok(())
    }
}

/// Page lifecycle tracking for one navigation. Only a `networkIdle` from
/// the loader that reported `init` after arming counts; anything left
/// over from about:blank is ignored.
#[derive(Debug, Default)]
struct IdleWatch {
    armed: bool,
    loader: Option<String>,
}

impl IdleWatch {
    fn arm(&mut self) {
        self.armed = true;
        self.loader = None;
    }

    /// True when `event` is the navigated document going network-idle.
    fn observe(&mut self, event: &str, loader_id: &str) -> bool {
        if !self.armed {
            return false;
        }
        match event {
            "init" => {
                self.loader = Some(loader_id.to_string());
                false
            }
            "networkIdle" => self.loader.as_deref() == Some(loader_id),
            _ => false,
        }
    }
}

pub struct Renderer {
    engine: Box<dyn BrowserEngine>,
    output_dir: PathBuf,
    viewport: Viewport,
}

impl Renderer {
    pub fn new(engine: Box<dyn BrowserEngine>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            engine,
            output_dir: output_dir.into(),
            viewport: Viewport::default(),
        }
    }

    /// Headless Chromium writing into the configured output directory.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            Box::new(ChromeEngine::new(settings.render_timeout)),
            &settings.output_dir,
        )
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn placeholder_path(&self) -> PathBuf {
        self.output_dir.join(PLACEHOLDER_FILE)
    }

    /// `verse_<YYYYMMDD_HHMMSS>.png` under the output directory.
    /// Two renders within the same second share a name.
    pub fn output_path_at(&self, at: DateTime<Local>) -> PathBuf {
        self.output_dir.join(at.format("verse_%Y%m%d_%H%M%S.png").to_string())
    }

    /// Render `markup`, falling back to the placeholder path on any error.
    pub fn render(&self, markup: &str) -> PathBuf {
        match self.try_render(markup) {
            Ok(path) => {
                tracing::info!(path = %path.display(), "Image generated successfully");
                path
            }
            Err(e) => {
                tracing::error!(error = %e, "Error generating image");
                self.placeholder_path()
            }
        }
    }

    pub fn try_render(&self, markup: &str) -> Result<PathBuf, RenderError> {
        fs::create_dir_all(&self.output_dir)?;
        let output = self.output_path_at(Local::now());

        let document = write_document(markup)?;
        let result = self.capture_and_optimize(document.path(), &output);
        if let Err(e) = document.close() {
            tracing::warn!(error = %e, "Failed to delete temporary HTML file");
        }
        result.map(|_| output)
    }

    fn capture_and_optimize(&self, document: &Path, output: &Path) -> Result<(), RenderError> {
        let url = Url::from_file_path(document)
            .map_err(|_| RenderError::DocumentPath(document.to_path_buf()))?;
        self.engine.capture(&url, self.viewport, output)?;
        optimize(output)
    }
}

fn write_document(markup: &str) -> Result<NamedTempFile, RenderError> {
    let mut file = tempfile::Builder::new()
        .prefix("versecard-")
        .suffix(".html")
        .tempfile()?;
    file.write_all(markup.as_bytes())?;
    file.flush()?;
    Ok(file)
}

/// Re-encode the image in place. JPEG at `OPTIMIZE_QUALITY`, everything
/// else as PNG with maximum compression.
pub fn optimize(path: &Path) -> Result<(), RenderError> {
    let img = image::open(path)?;
    let format = ImageFormat::from_path(path)?;
    let writer = BufWriter::new(File::create(path)?);

    match format {
        ImageFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(writer, OPTIMIZE_QUALITY);
            DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder)?;
        }
        _ => {
            let encoder = PngEncoder::new_with_quality(writer, CompressionType::Best, FilterType::Adaptive);
            img.write_with_encoder(encoder)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use image::{Rgba, RgbaImage};
    use std::cell::RefCell;
    use std::rc::Rc;

    struct SolidEngine {
        seen: Rc<RefCell<Vec<(Url, String)>>>,
    }

    impl BrowserEngine for SolidEngine {
        fn capture(&self, document: &Url, viewport: Viewport, output: &Path) -> Result<(), RenderError> {
            let path = document.to_file_path().map_err(|_| RenderError::Browser("bad url".into()))?;
            let markup = fs::read_to_string(path)?;
            self.seen.borrow_mut().push((document.clone(), markup));
            let img = RgbaImage::from_pixel(viewport.width, viewport.height, Rgba([200, 210, 230, 255]));
            img.save(output)?;
            Ok(())
        }
    }

    struct FailingEngine {
        seen: Rc<RefCell<Vec<Url>>>,
    }

    impl BrowserEngine for FailingEngine {
        fn capture(&self, document: &Url, _viewport: Viewport, _output: &Path) -> Result<(), RenderError> {
            self.seen.borrow_mut().push(document.clone());
            Err(RenderError::Browser("chromium crashed".into()))
        }
    }

    #[test]
    fn test_idle_ignored_before_arming() {
        let mut watch = IdleWatch::default();
        assert!(!watch.observe("init", "blank"));
        assert!(!watch.observe("networkIdle", "blank"));
    }

    #[test]
    fn test_stale_idle_from_previous_loader_ignored() {
        let mut watch = IdleWatch::default();
        watch.arm();
        // late event from about:blank, before the card document starts
        assert!(!watch.observe("networkIdle", "blank"));
        assert!(!watch.observe("init", "card"));
        assert!(!watch.observe("networkIdle", "blank"));
        assert!(!watch.observe("DOMContentLoaded", "card"));
        assert!(watch.observe("networkIdle", "card"));
    }

    #[test]
    fn test_placeholder_follows_settings_output_dir() {
        let settings = Settings { output_dir: PathBuf::from("cards"), ..Settings::default() };
        let renderer = Renderer::from_settings(&settings);
        assert_eq!(renderer.placeholder_path(), PathBuf::from("cards/placeholder.jpg"));
        assert_eq!(renderer.viewport(), Viewport::square(CANVAS_SIZE));
    }

    #[test]
    fn test_output_name_from_timestamp() {
        let renderer = Renderer::new(Box::new(FailingEngine { seen: Default::default() }), "images");
        let at = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(renderer.output_path_at(at), PathBuf::from("images/verse_20240309_070501.png"));
    }

    #[test]
    fn test_render_produces_canvas_sized_png() {
        let dir = tempfile::tempdir().unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let renderer = Renderer::new(Box::new(SolidEngine { seen: seen.clone() }), dir.path());

        let path = renderer.render("<html><body>hi</body></html>");

        assert!(path.exists());
        assert_eq!(path.extension().unwrap(), "png");
        let img = image::open(&path).unwrap();
        assert_eq!((img.width(), img.height()), (CANVAS_SIZE, CANVAS_SIZE));
        assert_eq!(seen.borrow()[0].1, "<html><body>hi</body></html>");
    }

    #[test]
    fn test_temp_document_removed_after_success() {
        let dir = tempfile::tempdir().unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let renderer = Renderer::new(Box::new(SolidEngine { seen: seen.clone() }), dir.path());

        renderer.render("<p>x</p>");

        let doc = seen.borrow()[0].0.to_file_path().unwrap();
        assert!(doc.to_string_lossy().ends_with(".html"));
        assert!(!doc.exists());
    }

    #[test]
    fn test_failure_returns_placeholder_and_removes_document() {
        let dir = tempfile::tempdir().unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let renderer = Renderer::new(Box::new(FailingEngine { seen: seen.clone() }), dir.path());

        let path = renderer.render("<p>x</p>");

        assert_eq!(path, dir.path().join(PLACEHOLDER_FILE));
        assert!(!path.exists());
        let doc = seen.borrow()[0].to_file_path().unwrap();
        assert!(!doc.exists());
    }

    #[test]
    fn test_optimize_rejects_non_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("verse_broken.png");
        fs::write(&path, b"not a png").unwrap();
        assert!(matches!(optimize(&path), Err(RenderError::Image(_))));
    }

    #[test]
    fn test_optimize_jpeg_drops_alpha() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("card.jpg");
        DynamicImage::ImageRgb8(image::RgbImage::from_pixel(8, 8, image::Rgb([10, 20, 30])))
            .save(&path)
            .unwrap();
        optimize(&path).unwrap();
        assert_eq!(ImageFormat::from_path(&path).unwrap(), ImageFormat::Jpeg);
        assert_eq!(image::open(&path).unwrap().width(), 8);
    }
}
