//! Inbox ingestion: JSON fixture files and directories of `.eml` messages.

use std::path::{Path, PathBuf};

use mail_parser::MessageParser;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::IngestError;
use crate::pipeline::types::{Complexity, IntentCategory, RawEmail, string_or_number};

/// One email to process, with its labelled intent when known.
#[derive(Debug, Clone)]
pub struct InboxItem {
    pub email: RawEmail,
    pub expected_category: Option<IntentCategory>,
}

#[derive(Deserialize)]
struct FixtureFile {
    test_emails: Vec<Fixture>,
}

#[derive(Deserialize)]
struct Fixture {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
    #[serde(default)]
    subject: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    expected_category: Option<String>,
    #[serde(default)]
    complexity: Option<String>,
}

impl From<Fixture> for InboxItem {
    fn from(f: Fixture) -> Self {
        let expected_category = f.expected_category.and_then(|raw| match raw.parse() {
            Ok(category) => Some(category),
            Err(e) => {
                warn!(id = %f.id, error = %e, "Ignoring unknown expected_category");
                None
            }
        });
        let complexity = match f.complexity.as_deref().map(str::trim) {
            Some(c) if c.eq_ignore_ascii_case("complex") => Complexity::Complex,
            _ => Complexity::Simple,
        };

        Self {
            email: RawEmail {
                id: f.id,
                subject: f.subject,
                body: f.body,
                complexity,
            },
            expected_category,
        }
    }
}

/// Parse a `{"test_emails": [...]}` fixture document.
pub fn from_json(json: &str) -> Result<Vec<InboxItem>, IngestError> {
    let file: FixtureFile = serde_json::from_str(json)?;
    Ok(file.test_emails.into_iter().map(InboxItem::from).collect())
}

/// Load an inbox: a directory is read as `.eml` files, anything else as a fixture file.
pub async fn load(path: &Path) -> Result<Vec<InboxItem>, IngestError> {
    let items = if tokio::fs::metadata(path).await?.is_dir() {
        load_eml_dir(path).await?
    } else {
        from_json(&tokio::fs::read_to_string(path).await?)?
    };
    info!(path = %path.display(), emails = items.len(), "Loaded inbox");
    Ok(items)
}

/// Read every `.eml` file in `dir`, in file-name order. Unparseable files are skipped.
pub async fn load_eml_dir(dir: &Path) -> Result<Vec<InboxItem>, IngestError> {
    let mut paths: Vec<PathBuf> = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("eml"))
        {
            paths.push(path);
        }
    }
    paths.sort();

    let mut items = Vec::with_capacity(paths.len());
    for path in paths {
        let raw = tokio::fs::read(&path).await?;
        match parse_eml(&raw) {
            Some(email) => items.push(InboxItem {
                email,
                expected_category: None,
            }),
            None => warn!(path = %path.display(), "Skipping unreadable message"),
        }
    }
    Ok(items)
}

/// Read a single `.eml` file.
pub async fn load_eml_file(path: &Path) -> Result<RawEmail, IngestError> {
    let raw = tokio::fs::read(path).await?;
    parse_eml(&raw).ok_or_else(|| IngestError::UnreadableMessage {
        path: path.display().to_string(),
    })
}

/// Parse an RFC 5322 message into a `RawEmail` with quoted text removed.
pub fn parse_eml(raw: &[u8]) -> Option<RawEmail> {
    let parsed = MessageParser::default().parse(raw)?;

    let id = parsed
        .message_id()
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("gen-{}", Uuid::new_v4()));
    let subject = parsed.subject().unwrap_or_default().to_string();
    let body = if let Some(text) = parsed.body_text(0) {
        text.to_string()
    } else if let Some(html) = parsed.body_html(0) {
        strip_html(html.as_ref())
    } else {
        String::new()
    };

    Some(RawEmail::new(id, subject, strip_quoted_text(&body)))
}

/// Drop `>` quoted lines and everything from an `On ... wrote:` attribution
/// or an `Original Message` separator onward.
pub fn strip_quoted_text(body: &str) -> String {
    let mut kept = Vec::new();

    for line in body.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('>') {
            continue;
        }
        if (trimmed.starts_with("On ") && trimmed.ends_with("wrote:"))
            || (trimmed.starts_with("---") && trimmed.contains("Original Message"))
        {
            break;
        }
        kept.push(line);
    }

    while kept.last().is_some_and(|l| l.trim().is_empty()) {
        kept.pop();
    }
    kept.join("\n")
}

fn strip_html(html: &str) -> String {
    let mut text = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                text.push(' ');
            }
            _ if !in_tag => text.push(ch),
            _ => {}
        }
    }
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
