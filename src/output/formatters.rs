use crate::transcribe::{TranscriptBody, TranscriptDocument, TranscriptSegment};
use crate::utils::format_timestamp;

/// A run of text covering one time bucket
#[derive(Debug, Clone, PartialEq)]
pub struct Paragraph {
    /// Bucket start in seconds
    pub start: f64,
    pub text: String,
}

/// Group segments into paragraphs at fixed `window_seconds` boundaries of video time.
///
/// Segments are taken in order; a paragraph closes when a segment starts in a later bucket.
pub fn group_paragraphs(segments: &[TranscriptSegment], window_seconds: f64) -> Vec<Paragraph> {
    let window = if window_seconds > 0.0 { window_seconds } else { f64::INFINITY };
    let mut paragraphs: Vec<Paragraph> = Vec::new();
    let mut current_bucket: Option<u64> = None;
    let mut texts: Vec<&str> = Vec::new();

    for segment in segments {
        let text = segment.text.trim();
        if text.is_empty() {
            continue;
        }
        let bucket = (segment.start.max(0.0) / window).floor() as u64;
        match current_bucket {
            Some(open) if bucket > open && !texts.is_empty() => {
                paragraphs.push(Paragraph { start: open as f64 * window, text: texts.join(" ") });
                texts.clear();
                current_bucket = Some(bucket);
            }
            None => current_bucket = Some(bucket),
            _ => {}
        }
        texts.push(text);
    }

    if let (Some(open), false) = (current_bucket, texts.is_empty()) {
        let start = if window.is_finite() { open as f64 * window } else { 0.0 };
        paragraphs.push(Paragraph { start, text: texts.join(" ") });
    }

    paragraphs
}

/// Render a document as Markdown
pub fn render_markdown(doc: &TranscriptDocument, paragraph_minutes: u32, timestamps: bool) -> String {
    let mut md = Vec::new();

    md.push(format!("# {}", doc.title));
    md.push(String::new());
    md.push(format!("- URL: {}", doc.identifier.watch_url()));
    md.push(format!("- Video ID: {}", doc.identifier));
    md.push(format!("- Language: {}", doc.language));
    md.push(format!("- Auto-generated: {}", if doc.is_auto_generated { "yes" } else { "no" }));
    match &doc.provenance.detail {
        Some(detail) => md.push(format!("- Acquired via: {} ({})", doc.provenance.strategy, detail)),
        None => md.push(format!("- Acquired via: {}", doc.provenance.strategy)),
    }
    if doc.is_synthetic() {
        md.push("- Synthetic: yes (placeholder audio, the text does not reflect the video)".to_string());
    }
    md.push(String::new());

    md.push("## Transcript".to_string());
    md.push(String::new());

    match &doc.body {
        TranscriptBody::Segments(segments) => {
            let window = f64::from(paragraph_minutes) * 60.0;
            for paragraph in group_paragraphs(segments, window) {
                if timestamps {
                    md.push(format!("[{}] {}", format_timestamp(paragraph.start), paragraph.text));
                } else {
                    md.push(paragraph.text);
                }
                md.push(String::new());
            }
        }
        TranscriptBody::PlainText(text) => {
            md.push(text.trim().to_string());
            md.push(String::new());
        }
    }

    md.push("---".to_string());
    md.push(format!(
        "*Generated on {}*",
        doc.acquired_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    md.push(String::new());

    md.join("\n")
}

/// Full-fidelity JSON of a document
pub fn render_json(doc: &TranscriptDocument) -> serde_json::Result<String> {
    serde_json::to_string_pretty(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::VideoIdentifier;
    use crate::transcribe::{Provenance, Transcript};

    fn seg(start: f64, text: &str) -> TranscriptSegment {
        TranscriptSegment::new(start, 2.0, text)
    }

    fn document(body: TranscriptBody, synthetic: bool) -> TranscriptDocument {
        TranscriptDocument::new(
            VideoIdentifier::parse("abc12345678").unwrap(),
            "T",
            Transcript {
                language: "ja".into(),
                is_auto_generated: false,
                body,
                provenance: Provenance {
                    strategy: "captions".into(),
                    detail: Some("track t1".into()),
                    synthetic,
                },
            },
        )
    }

    #[test]
    fn test_group_paragraphs_by_window() {
        let segments = vec![
            seg(0.0, "a"),
            seg(120.0, "b"),
            seg(299.0, " "),
            seg(301.0, "c"),
            seg(1000.0, "d"),
        ];
        let paragraphs = group_paragraphs(&segments, 300.0);
        assert_eq!(
            paragraphs,
            vec![
                Paragraph { start: 0.0, text: "a b".into() },
                Paragraph { start: 300.0, text: "c".into() },
                Paragraph { start: 900.0, text: "d".into() },
            ]
        );
    }

    #[test]
    fn test_group_paragraphs_empty() {
        assert!(group_paragraphs(&[], 300.0).is_empty());
        assert!(group_paragraphs(&[seg(0.0, "  ")], 300.0).is_empty());
    }

    #[test]
    fn test_render_markdown_segments() {
        let doc = document(TranscriptBody::Segments(vec![seg(0.0, "hello"), seg(1.0, "world"), seg(400.0, "later")]), false);
        let md = render_markdown(&doc, 5, true);

        assert!(md.starts_with("# T\n"));
        assert!(md.contains("- URL: https://www.youtube.com/watch?v=abc12345678"));
        assert!(md.contains("- Acquired via: captions (track t1)"));
        assert!(md.contains("[00:00:00] hello world"));
        assert!(md.contains("[00:05:00] later"));
        assert!(!md.contains("Synthetic"));
    }

    #[test]
    fn test_render_markdown_plain_and_synthetic() {
        let doc = document(TranscriptBody::PlainText("hello world".into()), true);
        let md = render_markdown(&doc, 5, true);
        assert!(md.contains("## Transcript\n\nhello world\n"));
        assert!(md.contains("- Synthetic: yes"));
    }

    #[test]
    fn test_render_without_timestamps() {
        let doc = document(TranscriptBody::Segments(vec![seg(0.0, "hello")]), false);
        let md = render_markdown(&doc, 5, false);
        assert!(md.contains("## Transcript\n\nhello\n"));
    }
}
