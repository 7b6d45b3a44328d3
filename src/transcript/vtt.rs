//! WebVTT caption parsing.
//!
//! Only what yt-dlp emits for YouTube captions is handled: a header block,
//! optional cue identifiers, `start --> end [settings]` lines and cue text
//! that may carry inline `<c>` / `<00:00:01.000>` tags.

use super::TranscriptSegment;
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid tag regex"))
}

/// Parse a cue time (`HH:MM:SS.mmm` or `MM:SS.mmm`) into seconds.
pub fn parse_cue_time(raw: &str) -> Option<f64> {
    let raw = raw.trim().replace(',', ".");
    let parts: Vec<&str> = raw.split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [h, m, s] => (h.parse::<f64>().ok()?, m.parse::<f64>().ok()?, s.parse::<f64>().ok()?),
        [m, s] => (0.0, m.parse::<f64>().ok()?, s.parse::<f64>().ok()?),
        _ => return None,
    };
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Parse WebVTT content into transcript segments.
///
/// Blocks without a timing line or without text are skipped. Rolling
/// auto-captions repeat the previous line at the top of each cue; such
/// repeats are dropped so each spoken line appears once.
pub fn parse_vtt(content: &str) -> Vec<TranscriptSegment> {
    let normalized = content.replace("\r\n", "\n");
    let mut segments = Vec::new();
    let mut last_line: Option<String> = None;

    for block in normalized.split("\n\n") {
        let lines: Vec<&str> = block.lines().map(str::trim).filter(|l| !l.is_empty()).collect();

        let Some(timing_idx) = lines.iter().position(|l| l.contains("-->")) else {
            continue;
        };

        let mut times = lines[timing_idx].split("-->");
        let start = times.next().and_then(parse_cue_time);
        let end = times
            .next()
            .and_then(|rest| rest.split_whitespace().next())
            .and_then(parse_cue_time);
        let (Some(start), Some(end)) = (start, end) else {
            continue;
        };

        let mut text_lines = Vec::new();
        for line in &lines[timing_idx + 1..] {
            let clean = tag_regex().replace_all(line, "").trim().to_string();
            if clean.is_empty() || last_line.as_deref() == Some(clean.as_str()) {
                continue;
            }
            last_line = Some(clean.clone());
            text_lines.push(clean);
        }

        if text_lines.is_empty() || end <= start {
            continue;
        }

        segments.push(TranscriptSegment::new(start, end, text_lines.join(" ")));
    }

    debug!("Parsed {} caption segments", segments.len());
    segments
}
