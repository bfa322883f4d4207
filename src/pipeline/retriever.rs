//! Knowledge retrieval: category filter, then model-ranked top-K.
//!
//! Retrieval never fails the pipeline. If ranking is unavailable the first
//! `top_k` candidates are returned in storage order without relevance data.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::StageError;
use crate::knowledge::KnowledgeBase;
use crate::llm::Capability;
use crate::pipeline::types::{IntentCategory, KnowledgeEntry, RankedEntry, clamp_unit};

pub const STAGE: &str = "retrieval";

/// Score used when the ranker omits one.
const DEFAULT_RELEVANCE: f32 = 0.5;

const RANKING_SYSTEM_PROMPT: &str = "You are a relevance ranking system for a customer support knowledge base.\n\n\
    Rank which FAQs are most relevant to answer the customer's question. Consider:\n\
    - Exact topic match (e.g. if they ask about shipping, prioritize shipping FAQs)\n\
    - Semantic similarity (similar concepts even if different words)\n\
    - Completeness (does the FAQ fully answer their question?)\n\
    - Specificity (specific FAQs are better than generic ones)\n\n\
    Respond with ONLY a JSON object, no markdown:\n\
    {\"ranked_faqs\": [{\"id\": \"1\", \"relevance_score\": 0.95, \"reason\": \"Directly answers the question\"}]}";

#[derive(Debug, Deserialize)]
struct RankingResponse {
    ranked_faqs: Vec<RankedId>,
}

#[derive(Debug, Deserialize)]
struct RankedId {
    #[serde(deserialize_with = "crate::pipeline::types::string_or_number")]
    id: String,
    #[serde(default)]
    relevance_score: Option<f32>,
    #[serde(default, deserialize_with = "crate::pipeline::types::null_as_default")]
    reason: String,
}

/// Selects the knowledge entries most relevant to a question.
#[derive(Clone)]
pub struct KnowledgeRetriever {
    knowledge: Arc<KnowledgeBase>,
    capability: Capability,
}

impl KnowledgeRetriever {
    pub fn new(knowledge: Arc<KnowledgeBase>, capability: Capability) -> Self {
        Self {
            knowledge,
            capability,
        }
    }

    /// Up to `top_k` entries for `question`, best first.
    ///
    /// A specific `category` restricts candidates to that category; `None`,
    /// `MULTIPLE` and `OTHER` search everything. When the candidates already
    /// fit in `top_k` they are returned as-is without a ranking call.
    pub async fn retrieve(
        &self,
        question: &str,
        category: Option<IntentCategory>,
        top_k: usize,
    ) -> Vec<RankedEntry> {
        let candidates = self.knowledge.candidates(category);

        if top_k == 0 {
            return Vec::new();
        }
        if candidates.len() <= top_k {
            debug!(
                candidates = candidates.len(),
                top_k, "Few candidates, skipping ranking"
            );
            return candidates
                .into_iter()
                .cloned()
                .map(RankedEntry::unranked)
                .collect();
        }

        match self.rank(question, &candidates, top_k).await {
            Ok(ranked) => ranked,
            Err(e) => {
                warn!(error = %e, top_k, "Ranking failed, falling back to storage order");
                candidates
                    .into_iter()
                    .take(top_k)
                    .cloned()
                    .map(RankedEntry::unranked)
                    .collect()
            }
        }
    }

    /// Retrieval across every category.
    pub async fn search_multi_category(&self, question: &str, top_k: usize) -> Vec<RankedEntry> {
        self.retrieve(question, None, top_k).await
    }

    async fn rank(
        &self,
        question: &str,
        candidates: &[&KnowledgeEntry],
        top_k: usize,
    ) -> Result<Vec<RankedEntry>, StageError> {
        let prompt = build_ranking_prompt(question, candidates, top_k);
        let response: RankingResponse = self
            .capability
            .invoke_json(RANKING_SYSTEM_PROMPT, &prompt)
            .await?;

        Ok(resolve_ranking(response.ranked_faqs, candidates, top_k))
    }
}

/// Map the ranker's first `top_k` ids back to candidates, keeping its order.
/// Unknown and repeated ids are dropped and still count against `top_k`.
fn resolve_ranking(
    ranked: Vec<RankedId>,
    candidates: &[&KnowledgeEntry],
    top_k: usize,
) -> Vec<RankedEntry> {
    let mut seen = HashSet::new();
    ranked
        .into_iter()
        .take(top_k)
        .filter_map(|r| {
            let entry = candidates.iter().find(|e| e.id == r.id)?;
            if !seen.insert(r.id) {
                return None;
            }
            Some(RankedEntry {
                entry: (*entry).clone(),
                relevance_score: Some(clamp_unit(r.relevance_score.unwrap_or(DEFAULT_RELEVANCE))),
                relevance_reason: Some(r.reason),
            })
        })
        .collect()
}

fn build_ranking_prompt(question: &str, candidates: &[&KnowledgeEntry], top_k: usize) -> String {
    let faq_list = candidates
        .iter()
        .enumerate()
        .map(|(i, faq)| format!("{}. [ID: {}] Q: {}", i + 1, faq.id, faq.question))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "CUSTOMER QUESTION:\n{question}\n\n\
         AVAILABLE FAQs:\n{faq_list}\n\n\
         Rank the top {top_k} most relevant FAQs by ID."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedLlm;

    fn kb() -> Arc<KnowledgeBase> {
        let entries = [
            ("1", "ORDER_TRACKING", "Where is my order?"),
            ("2", "ORDER_TRACKING", "How long does shipping take?"),
            ("3", "ORDER_TRACKING", "Do you ship internationally?"),
            ("4", "ORDER_TRACKING", "Can I change my shipping address?"),
            ("5", "RETURN_REFUND", "What is your return policy?"),
            ("6", "WARRANTY", "What does the warranty cover?"),
        ]
        .into_iter()
        .map(|(id, category, question)| KnowledgeEntry {
            id: id.into(),
            category: category.into(),
            question: question.into(),
            answer: format!("Answer {id}"),
        })
        .collect();
        Arc::new(KnowledgeBase::from_entries(entries).unwrap())
    }

    fn retriever(llm: Arc<ScriptedLlm>) -> KnowledgeRetriever {
        KnowledgeRetriever::new(kb(), Capability::new(llm, STAGE))
    }

    fn ids(entries: &[RankedEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.entry.id.as_str()).collect()
    }

    #[tokio::test]
    async fn few_candidates_returned_without_ranking() {
        let llm = ScriptedLlm::failing();
        let result = retriever(llm.clone())
            .retrieve("broken amp", Some(IntentCategory::Warranty), 3)
            .await;
        assert_eq!(ids(&result), vec!["6"]);
        assert!(result[0].relevance_score.is_none());
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn ranking_order_preserved() {
        let llm = ScriptedLlm::replying(&[r#"{"ranked_faqs": [
            {"id": 3, "relevance_score": 0.9, "reason": "international"},
            {"id": "1", "relevance_score": 0.7, "reason": "status"}
        ]}"#]);
        let result = retriever(llm.clone())
            .retrieve("Do you ship to Canada?", Some(IntentCategory::OrderTracking), 2)
            .await;
        assert_eq!(ids(&result), vec!["3", "1"]);
        assert_eq!(result[0].relevance_score, Some(0.9));
        assert_eq!(result[1].relevance_reason.as_deref(), Some("status"));
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn unknown_and_off_category_ids_dropped() {
        let llm = ScriptedLlm::replying(&[r#"{"ranked_faqs": [
            {"id": 99, "relevance_score": 0.9, "reason": "hallucinated"},
            {"id": 5, "relevance_score": 0.8, "reason": "wrong category"},
            {"id": 2, "relevance_score": 0.6, "reason": "shipping"}
        ]}"#]);
        let result = retriever(llm)
            .retrieve("How long?", Some(IntentCategory::OrderTracking), 3)
            .await;
        assert_eq!(ids(&result), vec!["2"]);
    }

    #[tokio::test]
    async fn unknown_ids_count_against_top_k() {
        let llm = ScriptedLlm::replying(&[r#"{"ranked_faqs": [{"id": 99}, {"id": 4}, {"id": 2}]}"#]);
        let result = retriever(llm)
            .retrieve("address", Some(IntentCategory::OrderTracking), 2)
            .await;
        assert_eq!(ids(&result), vec!["4"]);
    }

    #[tokio::test]
    async fn null_score_and_reason_use_defaults() {
        let llm = ScriptedLlm::replying(&[
            r#"{"ranked_faqs": [{"id": 2, "relevance_score": null, "reason": null}]}"#,
        ]);
        let result = retriever(llm)
            .retrieve("shipping", Some(IntentCategory::OrderTracking), 2)
            .await;
        assert_eq!(ids(&result), vec!["2"]);
        assert_eq!(result[0].relevance_score, Some(DEFAULT_RELEVANCE));
        assert_eq!(result[0].relevance_reason.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn ranking_truncated_to_top_k() {
        let llm = ScriptedLlm::replying(&[r#"{"ranked_faqs": [
            {"id": 1}, {"id": 2}, {"id": 3}, {"id": 4}
        ]}"#]);
        let result = retriever(llm)
            .retrieve("order", Some(IntentCategory::OrderTracking), 2)
            .await;
        assert_eq!(ids(&result), vec!["1", "2"]);
        assert_eq!(result[0].relevance_score, Some(DEFAULT_RELEVANCE));
    }

    #[tokio::test]
    async fn duplicate_ids_dropped() {
        let llm = ScriptedLlm::replying(&[r#"{"ranked_faqs": [{"id": 4}, {"id": 4}, {"id": 1}]}"#]);
        let result = retriever(llm)
            .retrieve("address", Some(IntentCategory::OrderTracking), 3)
            .await;
        assert_eq!(ids(&result), vec!["4", "1"]);
    }

    #[tokio::test]
    async fn capability_failure_falls_back_to_storage_order() {
        let result = retriever(ScriptedLlm::failing())
            .retrieve("order", Some(IntentCategory::OrderTracking), 2)
            .await;
        assert_eq!(ids(&result), vec!["1", "2"]);
        assert!(result.iter().all(|e| e.relevance_score.is_none()));
    }

    #[tokio::test]
    async fn malformed_ranking_falls_back() {
        let llm = ScriptedLlm::replying(&["1, 3, 2"]);
        let result = retriever(llm)
            .retrieve("order", Some(IntentCategory::OrderTracking), 3)
            .await;
        assert_eq!(ids(&result), vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn multi_category_searches_everything() {
        let result = retriever(ScriptedLlm::failing())
            .search_multi_category("return my warranty order", 5)
            .await;
        assert_eq!(ids(&result), vec!["1", "2", "3", "4", "5"]);
    }

    #[tokio::test]
    async fn other_intent_ignores_category_filter() {
        let result = retriever(ScriptedLlm::failing())
            .retrieve("hello", Some(IntentCategory::Other), 6)
            .await;
        assert_eq!(result.len(), 6);
    }

    #[tokio::test]
    async fn zero_top_k_is_empty() {
        let llm = ScriptedLlm::failing();
        let result = retriever(llm.clone()).retrieve("q", None, 0).await;
        assert!(result.is_empty());
        assert_eq!(llm.calls(), 0);
    }

    #[test]
    fn ranking_prompt_lists_candidates() {
        let kb = kb();
        let candidates = kb.candidates(Some(IntentCategory::OrderTracking));
        let prompt = build_ranking_prompt("Where is it?", &candidates, 3);
        assert!(prompt.contains("Where is it?"));
        assert!(prompt.contains("1. [ID: 1] Q: Where is my order?"));
        assert!(prompt.contains("4. [ID: 4]"));
        assert!(!prompt.contains("[ID: 5]"));
        assert!(prompt.contains("top 3"));
    }
}
