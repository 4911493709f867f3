use regex::Regex;
use std::sync::LazyLock;

use super::{TranscriptBody, TranscriptSegment};
use crate::extractors::SpeechToTextResponse;

static CUE_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("cue tag pattern is valid"));

/// Parse `HH:MM:SS,mmm`, `HH:MM:SS.mmm` or `MM:SS.mmm` into seconds
pub fn parse_timestamp(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    let (clock, fraction) = match raw.split_once([',', '.']) {
        Some((clock, fraction)) => (clock, fraction),
        None => (raw, "0"),
    };

    if fraction.is_empty() || !fraction.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let fraction: f64 = format!("0.{fraction}").parse().ok()?;

    let parts = clock
        .split(':')
        .map(|p| p.parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;

    // out-of-range clocks yield None so the cue is dropped
    let seconds = match parts.as_slice() {
        [h, m, s] if *m < 60 && *s < 60 => h.checked_mul(3600)?.checked_add(m * 60 + s)?,
        [m, s] if *s < 60 => m.checked_mul(60)?.checked_add(*s)?,
        _ => return None,
    };

    Some(seconds as f64 + fraction)
}

/// Parse a `start --> end [settings]` timing line
fn parse_timing_line(line: &str) -> Option<(f64, f64)> {
    let (start, rest) = line.split_once("-->")?;
    let end = rest.split_whitespace().next()?;
    Some((parse_timestamp(start)?, parse_timestamp(end)?))
}

fn clean_cue_text(line: &str) -> String {
    let stripped = CUE_TAG.replace_all(line, "");
    stripped
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a WebVTT document into timed segments.
///
/// Lines repeated from the previous cue (rolling automatic captions) are dropped.
pub fn parse_vtt(vtt: &str) -> Vec<TranscriptSegment> {
    let mut segments = Vec::new();
    let mut previous_lines: Vec<String> = Vec::new();
    let mut current: Option<((f64, f64), Vec<String>)> = None;
    let mut in_note = false;

    let mut finish = |current: &mut Option<((f64, f64), Vec<String>)>, previous: &mut Vec<String>| {
        if let Some(((start, end), lines)) = current.take() {
            let fresh: Vec<&String> = lines.iter().filter(|l| !previous.contains(*l)).collect();
            if !fresh.is_empty() {
                let text = fresh.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(" ");
                segments.push(TranscriptSegment::new(start, end - start, text));
            }
            if !lines.is_empty() {
                *previous = lines;
            }
        }
    };

    for line in vtt.lines().map(|l| l.trim_end_matches('\r').trim()) {
        if line.is_empty() {
            in_note = false;
            finish(&mut current, &mut previous_lines);
            continue;
        }
        if in_note {
            continue;
        }
        if line.starts_with("WEBVTT") || line.starts_with("NOTE") || line.starts_with("STYLE") {
            in_note = !line.starts_with("WEBVTT");
            continue;
        }
        if line.contains("-->") {
            finish(&mut current, &mut previous_lines);
            current = parse_timing_line(line).map(|timing| (timing, Vec::new()));
            continue;
        }
        if let Some((_, lines)) = current.as_mut() {
            let cleaned = clean_cue_text(line);
            if !cleaned.is_empty() {
                lines.push(cleaned);
            }
        }
    }
    finish(&mut current, &mut previous_lines);

    segments
}

/// Convert a speech-to-text response into a transcript body
pub fn body_from_speech(response: &SpeechToTextResponse) -> TranscriptBody {
    match response.segments.as_deref() {
        Some(segments) if !segments.is_empty() => TranscriptBody::Segments(
            segments
                .iter()
                .map(|s| TranscriptSegment::new(s.start, s.end - s.start, s.text.trim()))
                .filter(|s| !s.text.is_empty())
                .collect(),
        ),
        _ => TranscriptBody::PlainText(response.text.trim().to_string()),
    }
}
