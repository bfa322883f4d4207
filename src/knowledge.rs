//! Read-only knowledge store loaded once at startup.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::KnowledgeError;
use crate::pipeline::types::{IntentCategory, KnowledgeEntry};

#[derive(Deserialize)]
struct KnowledgeFile {
    faqs: Vec<KnowledgeEntry>,
}

/// Immutable collection of FAQ entries in storage order.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    entries: Vec<KnowledgeEntry>,
}

impl KnowledgeBase {
    /// Build from entries, rejecting duplicate ids and empty sets.
    pub fn from_entries(entries: Vec<KnowledgeEntry>) -> Result<Self, KnowledgeError> {
        if entries.is_empty() {
            return Err(KnowledgeError::Empty);
        }
        let mut seen = HashSet::with_capacity(entries.len());
        for entry in &entries {
            if !seen.insert(entry.id.as_str()) {
                return Err(KnowledgeError::DuplicateId(entry.id.clone()));
            }
        }
        Ok(Self { entries })
    }

    /// Parse a `{"faqs": [...]}` document.
    pub fn from_json(json: &str) -> Result<Self, KnowledgeError> {
        let file: KnowledgeFile = serde_json::from_str(json)?;
        Self::from_entries(file.faqs)
    }

    /// Load the store from disk.
    pub async fn load(path: &Path) -> Result<Self, KnowledgeError> {
        let json = tokio::fs::read_to_string(path).await?;
        let kb = Self::from_json(&json)?;
        info!(path = %path.display(), entries = kb.len(), "Loaded knowledge base");
        Ok(kb)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&KnowledgeEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Candidates for a retrieval: the category's entries, or everything for
    /// `None` and cross-category intents. Storage order is preserved.
    pub fn candidates(&self, category: Option<IntentCategory>) -> Vec<&KnowledgeEntry> {
        match category {
            Some(category) if !category.is_cross_category() => self
                .entries
                .iter()
                .filter(|e| e.in_category(category))
                .collect(),
            _ => self.entries.iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"{"faqs": [
        {"id": 1, "category": "ORDER_TRACKING", "question": "Where is my order?", "answer": "Track it at /track."},
        {"id": 2, "category": "RETURN_REFUND", "question": "How do I return?", "answer": "30 days."},
        {"id": 3, "category": "ORDER_TRACKING", "question": "How long is shipping?", "answer": "3-5 days."}
    ]}"#;

    #[test]
    fn parses_numeric_ids_as_strings() {
        let kb = KnowledgeBase::from_json(SAMPLE).unwrap();
        assert_eq!(kb.len(), 3);
        assert_eq!(kb.get("2").unwrap().question, "How do I return?");
    }

    #[test]
    fn filters_by_category_in_storage_order() {
        let kb = KnowledgeBase::from_json(SAMPLE).unwrap();
        let ids: Vec<&str> = kb
            .candidates(Some(IntentCategory::OrderTracking))
            .iter()
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[test]
    fn cross_category_and_none_use_full_set() {
        let kb = KnowledgeBase::from_json(SAMPLE).unwrap();
        assert_eq!(kb.candidates(None).len(), 3);
        assert_eq!(kb.candidates(Some(IntentCategory::Multiple)).len(), 3);
        assert_eq!(kb.candidates(Some(IntentCategory::Other)).len(), 3);
    }

    #[test]
    fn unknown_category_yields_no_candidates() {
        let kb = KnowledgeBase::from_json(SAMPLE).unwrap();
        assert!(kb.candidates(Some(IntentCategory::Warranty)).is_empty());
    }

    #[test]
    fn rejects_duplicate_ids() {
        let json = r#"{"faqs": [
            {"id": "a", "category": "OTHER", "question": "q", "answer": "a"},
            {"id": "a", "category": "OTHER", "question": "q2", "answer": "a2"}
        ]}"#;
        assert!(matches!(
            KnowledgeBase::from_json(json),
            Err(KnowledgeError::DuplicateId(id)) if id == "a"
        ));
    }

    #[test]
    fn rejects_empty_store() {
        assert!(matches!(
            KnowledgeBase::from_json(r#"{"faqs": []}"#),
            Err(KnowledgeError::Empty)
        ));
    }

    #[tokio::test]
    async fn loads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let kb = KnowledgeBase::load(file.path()).await.unwrap();
        assert_eq!(kb.len(), 3);
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let err = KnowledgeBase::load(Path::new("/nonexistent/faqs.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, KnowledgeError::Io(_)));
    }
}
