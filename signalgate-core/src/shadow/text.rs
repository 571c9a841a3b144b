//! Text cue helpers shared by the shadow phases.
//!
//! All matching is case-insensitive. Cues that start or end with a word
//! character must sit on a word boundary ("day" does not match "today");
//! symbol cues such as `<` or `100%` match anywhere.

use regex::{Regex, RegexSet};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// A configured list of text cues, compiled into one `RegexSet` on first use.
///
/// Serializes as a plain list of strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct CueList {
    cues: Vec<String>,
    matcher: OnceLock<Option<RegexSet>>,
}

impl CueList {
    pub fn new(cues: &[&str]) -> Self {
        Self::from(cues.iter().map(|s| s.to_string()).collect::<Vec<_>>())
    }

    pub fn cues(&self) -> &[String] {
        &self.cues
    }

    /// Build the matcher. Blank cues are ignored.
    pub fn compile(&self) -> Result<RegexSet, regex::Error> {
        RegexSet::new(
            self.cues
                .iter()
                .map(|c| c.trim())
                .filter(|c| !c.is_empty())
                .map(cue_pattern),
        )
    }

    fn matcher(&self) -> Option<&RegexSet> {
        self.matcher
            .get_or_init(|| match self.compile() {
                Ok(set) => Some(set),
                Err(e) => {
                    tracing::warn!(error = %e, "cue list does not compile, matching nothing");
                    None
                }
            })
            .as_ref()
    }

    /// Number of distinct cues present in `haystack`.
    pub fn count(&self, haystack: &str) -> usize {
        self.matcher()
            .map_or(0, |set| set.matches(haystack).iter().count())
    }

    pub fn any(&self, haystack: &str) -> bool {
        self.matcher().is_some_and(|set| set.is_match(haystack))
    }
}

impl PartialEq for CueList {
    fn eq(&self, other: &Self) -> bool {
        self.cues == other.cues
    }
}

impl From<Vec<String>> for CueList {
    fn from(cues: Vec<String>) -> Self {
        Self {
            cues,
            matcher: OnceLock::new(),
        }
    }
}

impl From<CueList> for Vec<String> {
    fn from(list: CueList) -> Self {
        list.cues
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn cue_pattern(cue: &str) -> String {
    let left = if cue.starts_with(is_word_char) { r"\b" } else { "" };
    let right = if cue.ends_with(is_word_char) { r"\b" } else { "" };
    format!("(?i){left}{}{right}", regex::escape(cue))
}

/// Lowercased concatenation of several text fields.
pub fn joined_lower(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Number of distinct cues from `cues` present in `haystack`.
pub fn count_cues(haystack: &str, cues: &CueList) -> usize {
    cues.count(haystack)
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Share of non-whitespace characters that are alphabetic. 0.0 for blank text.
pub fn alpha_ratio(text: &str) -> f64 {
    let (alpha, visible) = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .fold((0usize, 0usize), |(a, v), c| (a + usize::from(c.is_alphabetic()), v + 1));
    if visible == 0 {
        0.0
    } else {
        alpha as f64 / visible as f64
    }
}

pub fn has_numeric_token(text: &str) -> bool {
    text.chars().any(|c| c.is_ascii_digit())
}

fn re_percentage() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([0-9]+(?:\.[0-9]+)?)\s*%").ok())
        .as_ref()
}

/// Every number written as a percentage (`2%`, `1.5 %`).
pub fn percentages(text: &str) -> Vec<f64> {
    let Some(re) = re_percentage() else {
        return Vec::new();
    };
    re.captures_iter(text)
        .filter_map(|caps| caps.get(1)?.as_str().parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_cues_respect_boundaries() {
        assert!(CueList::new(&["day"]).any("within one day"));
        assert!(!CueList::new(&["day"]).any("today only"));
        assert!(CueList::new(&["leads to"]).any("leads to a drop"));
    }

    #[test]
    fn symbol_cues_match_anywhere() {
        assert!(CueList::new(&["<"]).any("rsi<30"));
        assert!(CueList::new(&["100%"]).any("win rate 100% of the time"));
        assert!(CueList::new(&["risk-free"]).any("a risk-free carry"));
    }

    #[test]
    fn counts_distinct_cues() {
        let text = joined_lower(&["Price ALWAYS rises", "and never falls, never"]);
        assert_eq!(count_cues(&text, &CueList::new(&["always", "never", "guaranteed"])), 2);
    }

    #[test]
    fn overlapping_cues_count_separately() {
        let cues = CueList::new(&["hour", "hours"]);
        assert_eq!(cues.count("within 4 hours and one hour"), 2);
        assert_eq!(cues.count("within 4 hours"), 1);
    }

    #[test]
    fn matching_ignores_case() {
        assert!(CueList::new(&["Order Flow"]).any("ORDER FLOW turns"));
    }

    #[test]
    fn blank_and_empty_lists_match_nothing() {
        assert_eq!(CueList::new(&["", "  "]).count("anything at all"), 0);
        assert!(!CueList::default().any("anything"));
    }

    #[test]
    fn serializes_as_a_plain_list() {
        let cues = CueList::new(&["always", "never"]);
        let json = serde_json::to_string(&cues).unwrap();
        assert_eq!(json, r#"["always","never"]"#);
        let back: CueList = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cues);
        assert!(back.any("it never fails"));
    }

    #[test]
    fn alpha_ratio_of_blank_is_zero() {
        assert_eq!(alpha_ratio("   "), 0.0);
        assert!((alpha_ratio("ab12") - 0.5).abs() < 1e-12);
    }

    #[test]
    fn extracts_percentages() {
        assert_eq!(percentages("target 2.5% and stop 1 %, not 30 bps"), vec![2.5, 1.0]);
        assert!(percentages("no numbers here").is_empty());
    }
}
