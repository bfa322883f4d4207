//! Escalation phrases: wording that means the draft itself defers to a human.
//!
//! The same set is rendered into the composer and evaluator prompts and is
//! used locally to re-check drafts, so a draft that promises follow-up can
//! never be auto-sent even if the model forgot to flag it.

use std::collections::BTreeSet;

/// Phrases in their normalized (lowercase, single-spaced, ASCII apostrophe) form.
const DEFAULT_PHRASES: &[&str] = &[
    "pass this to",
    "forward this to",
    "i'll need to check",
    "i'll need to look into",
    "look into this for you",
    "look into it for you",
    "have our team check",
    "our team will",
    "reaches out to you",
    "have someone reach out",
    "specialist will contact",
];

/// Deterministic lookup over normalized substrings.
#[derive(Debug, Clone)]
pub struct EscalationPhrases {
    phrases: BTreeSet<String>,
}

impl Default for EscalationPhrases {
    fn default() -> Self {
        Self::new(DEFAULT_PHRASES.iter().copied())
    }
}

impl EscalationPhrases {
    pub fn new<'a>(phrases: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            phrases: phrases
                .into_iter()
                .map(normalize)
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// First phrase (in sorted order) found in `text`.
    pub fn find_in(&self, text: &str) -> Option<&str> {
        let haystack = normalize(text);
        self.phrases
            .iter()
            .find(|p| haystack.contains(p.as_str()))
            .map(String::as_str)
    }

    pub fn matches(&self, text: &str) -> bool {
        self.find_in(text).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.phrases.iter().map(String::as_str)
    }

    /// Bulleted list for embedding in a prompt.
    pub fn prompt_list(&self) -> String {
        self.phrases
            .iter()
            .map(|p| format!("- \"{p}\""))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn normalize(text: &str) -> String {
    text.replace(['\u{2019}', '\u{2018}'], "'")
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
