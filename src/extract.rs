//! Timestamp extraction from model answers.
//!
//! Grammar for a candidate: a maximal run of `digits(:digits)+` with an
//! optional `.fraction`. A candidate is kept when it is `H:MM:SS`,
//! `HH:MM:SS`, `M:SS` or `MM:SS` with minutes and seconds in `0..=59`.
//! Fractions are dropped and two-part forms get a `00` hour.

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::sync::OnceLock;

/// A validated video position, rendered as `HH:MM:SS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Timestamp {
    hours: u8,
    minutes: u8,
    seconds: u8,
}

impl Timestamp {
    /// Build a timestamp, rejecting out-of-range minutes or seconds.
    pub fn new(hours: u8, minutes: u8, seconds: u8) -> Option<Self> {
        if hours > 99 || minutes > 59 || seconds > 59 {
            return None;
        }
        Some(Self { hours, minutes, seconds })
    }

    /// Convert a position in seconds, truncating fractions.
    pub fn from_seconds(seconds: f64) -> Self {
        let total = seconds.max(0.0) as u32;
        let hours = (total / 3600).min(99) as u8;
        Self {
            hours,
            minutes: ((total % 3600) / 60) as u8,
            seconds: (total % 60) as u8,
        }
    }

    /// Position in seconds.
    pub fn as_seconds(&self) -> f64 {
        f64::from(self.hours) * 3600.0 + f64::from(self.minutes) * 60.0 + f64::from(self.seconds)
    }

    /// Parse one candidate token such as `1:02:03`, `07:45` or `00:01:02.500`.
    pub fn parse_candidate(token: &str) -> Option<Self> {
        let clock = token.split('.').next()?;
        let parts: Vec<&str> = clock.split(':').collect();

        let (hours, minutes, seconds) = match parts.as_slice() {
            [h, m, s] => (*h, *m, *s),
            [m, s] => ("0", *m, *s),
            _ => return None,
        };

        if !(1..=2).contains(&hours.len())
            || !(1..=2).contains(&minutes.len())
            || seconds.len() != 2
        {
            return None;
        }

        Self::new(hours.parse().ok()?, minutes.parse().ok()?, seconds.parse().ok()?)
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hours, self.minutes, self.seconds)
    }
}

impl std::str::FromStr for Timestamp {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse_candidate(s.trim()).ok_or_else(|| format!("Invalid timestamp: {}", s))
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Answer text together with the timestamps it cites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// The model output, unmodified.
    pub answer_text: String,
    /// Valid timestamps in order of first appearance, without duplicates.
    pub timestamps: Vec<Timestamp>,
}

fn candidate_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+(?::\d+)+(?:\.\d+)?").expect("valid timestamp regex"))
}

/// Extract timestamp references from raw model output.
pub fn extract(raw_text: &str) -> Extraction {
    let mut seen = HashSet::new();
    let timestamps = candidate_regex()
        .find_iter(raw_text)
        .filter_map(|m| Timestamp::parse_candidate(m.as_str()))
        .filter(|ts| seen.insert(*ts))
        .collect();

    Extraction {
        answer_text: raw_text.to_string(),
        timestamps,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(ts: &[Timestamp]) -> Vec<String> {
        ts.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_duplicates_kept_once() {
        let raw = "First at [01:02:03], and again at [01:02:03] later.";
        let extraction = extract(raw);
        assert_eq!(strings(&extraction.timestamps), vec!["01:02:03"]);
        assert_eq!(extraction.answer_text, raw);
    }

    #[test]
    fn test_no_timestamps() {
        let extraction = extract("no time info here");
        assert!(extraction.timestamps.is_empty());
        assert_eq!(extraction.answer_text, "no time info here");
    }

    #[test]
    fn test_first_appearance_order_not_value_order() {
        let extraction = extract("Later [00:10:00], earlier [00:02:00], then [00:10:00].");
        assert_eq!(strings(&extraction.timestamps), vec!["00:10:00", "00:02:00"]);
    }

    #[test]
    fn test_tolerant_variants_are_normalized() {
        let extraction = extract("See 07:45, 1:02:03 and the cue 00:00:05.500.");
        assert_eq!(
            strings(&extraction.timestamps),
            vec!["00:07:45", "01:02:03", "00:00:05"]
        );
    }

    #[test]
    fn test_malformed_candidates_discarded() {
        let extraction = extract("Bad: 00:61:00, 00:10:75, 1:2:3, 01:02:03:04, 10:5. Good: [00:59:59]");
        assert_eq!(strings(&extraction.timestamps), vec!["00:59:59"]);
    }

    #[test]
    fn test_ranges_yield_both_ends() {
        let extraction = extract("Covered in [00:01:00 - 00:02:30].");
        assert_eq!(strings(&extraction.timestamps), vec!["00:01:00", "00:02:30"]);
    }

    #[test]
    fn test_serde_as_string() {
        let ts = Timestamp::new(1, 2, 3).unwrap();
        let json = serde_json::to_string(&vec![ts]).unwrap();
        assert_eq!(json, "[\"01:02:03\"]");
        let back: Vec<Timestamp> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vec![ts]);
    }

    #[test]
    fn test_from_seconds() {
        assert_eq!(Timestamp::from_seconds(3665.9).to_string(), "01:01:05");
        assert_eq!(Timestamp::from_seconds(0.0).as_seconds(), 0.0);
    }
}
