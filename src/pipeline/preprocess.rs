//! Deterministic email preprocessing: whitespace cleanup, order-number
//! extraction and urgency scoring. Pure string work, no LLM calls.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::pipeline::types::{PreprocessedEmail, RawEmail, UrgencyLevel};

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

static ORDER_PATTERNS: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        Regex::new(r"#(\d{5,})").unwrap(),
        Regex::new(r"(?i)order[:\s]+#?(\d{5,})").unwrap(),
    ]
});

/// Substrings that signal an impatient or upset customer.
pub const URGENCY_KEYWORDS: &[&str] = &[
    "urgent",
    "asap",
    "immediately",
    "emergency",
    "angry",
    "unacceptable",
    "furious",
    "disappointed",
    "third time",
    "still waiting",
    "never received",
];

/// Uppercase share of letters above which an email counts as shouting.
const SHOUTING_RATIO: f64 = 0.3;

/// Clean an email and extract routing features.
pub fn preprocess(email: &RawEmail) -> PreprocessedEmail {
    let full_text = format!("{}. {}", email.subject, email.body);
    let cleaned_text = collapse_whitespace(&full_text);

    PreprocessedEmail {
        subject: email.subject.clone(),
        body: email.body.clone(),
        order_numbers: extract_order_numbers(&cleaned_text),
        urgency_level: detect_urgency(&cleaned_text),
        length: cleaned_text.chars().count(),
        cleaned_text,
    }
}

/// Replace every whitespace run with a single space and trim.
pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

/// Order numbers written as `#12345` or `order: 12345` / `Order #12345`.
pub fn extract_order_numbers(text: &str) -> BTreeSet<String> {
    ORDER_PATTERNS
        .iter()
        .flat_map(|re| re.captures_iter(text))
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Number of distinct urgency keywords present.
pub fn urgency_keyword_hits(text: &str) -> usize {
    let lower = text.to_lowercase();
    URGENCY_KEYWORDS
        .iter()
        .filter(|keyword| lower.contains(*keyword))
        .count()
}

/// Fraction of uppercase letters among all letters; 0 when there are none.
pub fn uppercase_ratio(text: &str) -> f64 {
    let (letters, upper) = text
        .chars()
        .filter(|c| c.is_alphabetic())
        .fold((0usize, 0usize), |(letters, upper), c| {
            (letters + 1, upper + usize::from(c.is_uppercase()))
        });
    if letters == 0 {
        0.0
    } else {
        upper as f64 / letters as f64
    }
}

pub fn detect_urgency(text: &str) -> UrgencyLevel {
    let hits = urgency_keyword_hits(text);

    if hits >= 2 || uppercase_ratio(text) > SHOUTING_RATIO || text.contains("!!!") {
        UrgencyLevel::High
    } else if hits == 1 {
        UrgencyLevel::Medium
    } else {
        UrgencyLevel::Low
    }
}
