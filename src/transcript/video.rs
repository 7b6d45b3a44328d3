//! Video identifiers derived from user input.

use regex::Regex;
use std::sync::OnceLock;

fn video_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Matches various YouTube URL formats
        Regex::new(
            r"(?x)
            (?:https?://)?
            (?:www\.|m\.)?
            (?:youtube\.com/watch\?(?:.*&)?v=|youtu\.be/|youtube\.com/embed/|youtube\.com/v/|youtube\.com/shorts/|youtube\.com/live/)
            ([a-zA-Z0-9_-]{11})
        ",
        )
        .expect("Invalid regex")
    })
}

/// Whether bare input reads as a video ID rather than a short title.
///
/// IDs are 11 characters of `[A-Za-z0-9_-]`. Words like `hello_world` share
/// that shape, so a bare ID must also carry a digit or at least two
/// uppercase letters. Other IDs still resolve through a URL.
fn looks_like_bare_id(input: &str) -> bool {
    if input.len() != 11
        || !input
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return false;
    }
    input.chars().any(|c| c.is_ascii_digit())
        || input.chars().filter(|c| c.is_ascii_uppercase()).count() >= 2
}

/// Extract the 11-character YouTube video ID from a URL or bare ID.
pub fn youtube_video_id(input: &str) -> Option<String> {
    let input = input.trim();
    if let Some(caps) = video_id_regex().captures(input) {
        return caps.get(1).map(|m| m.as_str().to_string());
    }
    looks_like_bare_id(input).then(|| input.to_string())
}

/// Derive a stable cache key for any input.
///
/// YouTube inputs map to their video ID. Anything else (another site's URL or
/// a title) becomes a lowercase slug of host and path, so the same input
/// always lands in the same cache directory.
pub fn derive_video_id(input: &str) -> String {
    if let Some(id) = youtube_video_id(input) {
        return id;
    }

    let basis = match url::Url::parse(input.trim()) {
        Ok(parsed) => format!(
            "{}{}",
            parsed.host_str().unwrap_or_default(),
            parsed.path()
        ),
        Err(_) => input.trim().to_string(),
    };

    let mut slug = String::with_capacity(basis.len());
    for ch in basis.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }

    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug.chars().take(80).collect()
    }
}

/// A video as understood by the rest of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoRef {
    /// Stable cache key.
    pub id: String,
    /// URL handed to the transcript source.
    pub url: String,
}

impl VideoRef {
    /// Resolve user input (URL or bare ID) into a video reference.
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        match youtube_video_id(input) {
            Some(id) => Self {
                url: format!("https://www.youtube.com/watch?v={}", id),
                id,
            },
            None => Self {
                id: derive_video_id(input),
                url: input.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_youtube_video_id() {
        assert_eq!(
            youtube_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            youtube_video_id("https://www.youtube.com/watch?list=PL1&v=dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            youtube_video_id("https://youtu.be/dQw4w9WgXcQ?t=42"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(youtube_video_id("dQw4w9WgXcQ"), Some("dQw4w9WgXcQ".to_string()));
        assert_eq!(youtube_video_id("not-a-video-id"), None);
        assert_eq!(youtube_video_id("hello_world"), None);
        assert_eq!(youtube_video_id("hello-world"), None);
        assert_eq!(youtube_video_id("Hello_world"), None);
        assert_eq!(youtube_video_id("jNQXAC9IVRw"), Some("jNQXAC9IVRw".to_string()));
        assert_eq!(youtube_video_id(""), None);
    }

    #[test]
    fn test_derive_video_id_is_stable_slug() {
        assert_eq!(derive_video_id("https://youtu.be/dQw4w9WgXcQ"), "dQw4w9WgXcQ");
        assert_eq!(
            derive_video_id("https://vimeo.com/channels/staff/12345"),
            "vimeo-com-channels-staff-12345"
        );
        assert_eq!(derive_video_id("  My Talk: Part 2 "), "my-talk-part-2");
        assert_eq!(derive_video_id("???"), "untitled");
        assert_eq!(derive_video_id("hello_world"), "hello-world");
    }

    #[test]
    fn test_video_ref_parse() {
        let video = VideoRef::parse("https://youtu.be/dQw4w9WgXcQ");
        assert_eq!(video.id, "dQw4w9WgXcQ");
        assert_eq!(video.url, "https://www.youtube.com/watch?v=dQw4w9WgXcQ");

        let title = VideoRef::parse("hello_world");
        assert_eq!(title.id, "hello-world");
        assert_eq!(title.url, "hello_world");
    }
}
