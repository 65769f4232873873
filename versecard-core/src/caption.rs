//! Caption resolution: generated caption, else a fixed template.

pub const FALLBACK_HASHTAGS: &str = "#DailyDevotion #Faith #BibleVerse";

pub fn resolve_caption(generated: Option<&str>, reference: &str) -> String {
    match generated {
        Some(caption) if !caption.trim().is_empty() => caption.to_string(),
        _ => {
            tracing::warn!("Using fallback caption");
            format!("Daily Bible Verse: {} 🙏 {}", reference, FALLBACK_HASHTAGS)
        }
    }
}
