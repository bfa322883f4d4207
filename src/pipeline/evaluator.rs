//! Independent quality control of a draft against the same knowledge set.
//!
//! Fails closed: an evaluator that cannot produce a report marks the draft
//! unsafe and in need of review. Whatever the model returns, the report
//! invariants are re-applied locally:
//! - score below the auto-send threshold ⇒ `needs_human_review`
//! - `!is_safe` ⇒ `needs_human_review`
//! - escalation phrase in the draft ⇒ `needs_human_review`

use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::RouterThresholds;
use crate::error::StageError;
use crate::llm::Capability;
use crate::pipeline::escalation::EscalationPhrases;
use crate::pipeline::router::quality_action;
use crate::pipeline::types::{
    QualityBreakdown, QualityReport, RankedEntry, RoutingAction, clamp_unit, null_as_default,
};

pub const STAGE: &str = "quality";

#[derive(Debug, Deserialize)]
struct QualityResponse {
    quality_score: f32,
    is_safe: bool,
    needs_human_review: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    issues: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    suggested_edits: String,
    #[serde(default, deserialize_with = "null_as_default")]
    breakdown: QualityBreakdown,
}

/// Scores drafts for accuracy, completeness, voice and policy adherence.
#[derive(Clone)]
pub struct QualityEvaluator {
    capability: Capability,
    phrases: EscalationPhrases,
    thresholds: RouterThresholds,
}

impl QualityEvaluator {
    pub fn new(
        capability: Capability,
        phrases: EscalationPhrases,
        thresholds: RouterThresholds,
    ) -> Self {
        Self {
            capability,
            phrases,
            thresholds,
        }
    }

    /// Evaluate `draft_body`. Any failure yields [`QualityEvaluator::fail_closed`].
    pub async fn evaluate(
        &self,
        email_body: &str,
        draft_body: &str,
        knowledge: &[RankedEntry],
    ) -> QualityReport {
        match self.try_evaluate(email_body, draft_body, knowledge).await {
            Ok(report) => {
                debug!(
                    quality_score = report.quality_score,
                    is_safe = report.is_safe,
                    needs_human_review = report.needs_human_review,
                    action = %report.action,
                    "Draft evaluated"
                );
                report
            }
            Err(e) => {
                warn!(error = %e, "Quality evaluation failed, failing closed");
                Self::fail_closed(&e)
            }
        }
    }

    /// Report used when evaluation itself fails.
    pub fn fail_closed(error: &StageError) -> QualityReport {
        QualityReport {
            quality_score: 0.0,
            is_safe: false,
            needs_human_review: true,
            issues: vec![format!("Quality check failed: {error}")],
            suggested_edits: String::new(),
            breakdown: QualityBreakdown::default(),
            action: RoutingAction::EscalateToHuman,
        }
    }

    async fn try_evaluate(
        &self,
        email_body: &str,
        draft_body: &str,
        knowledge: &[RankedEntry],
    ) -> Result<QualityReport, StageError> {
        let system = build_system_prompt(&self.phrases, self.thresholds.auto_send);
        let user = format!(
            "CUSTOMER_MESSAGE:\n{email_body}\n\nDRAFT_REPLY:\n{draft_body}\n\n\
             KNOWLEDGE_SNIPPETS:\n{}\n\nNow evaluate and return JSON:",
            format_snippets(knowledge)
        );

        let response: QualityResponse = self.capability.invoke_json(&system, &user).await?;
        Ok(self.enforce(response, draft_body))
    }

    /// Re-apply the report invariants to a model response.
    fn enforce(&self, response: QualityResponse, draft_body: &str) -> QualityReport {
        let quality_score = clamp_unit(response.quality_score);
        let mut issues = response.issues;
        let mut needs_human_review = response.needs_human_review;

        if quality_score < self.thresholds.auto_send && !needs_human_review {
            needs_human_review = true;
            issues.push(format!(
                "Quality score {quality_score:.2} is below the {:.2} threshold",
                self.thresholds.auto_send
            ));
        }
        if !response.is_safe {
            needs_human_review = true;
        }
        if let Some(phrase) = self.phrases.find_in(draft_body) {
            if !needs_human_review {
                issues.push(format!("Draft requests human follow-up (\"{phrase}\")"));
            }
            needs_human_review = true;
        }

        let breakdown = QualityBreakdown {
            accuracy: clamp_unit(response.breakdown.accuracy),
            completeness: clamp_unit(response.breakdown.completeness),
            voice_tone: clamp_unit(response.breakdown.voice_tone),
            policy_adherence: clamp_unit(response.breakdown.policy_adherence),
        };

        let mut report = QualityReport {
            quality_score,
            is_safe: response.is_safe,
            needs_human_review,
            issues,
            suggested_edits: response.suggested_edits,
            breakdown,
            action: RoutingAction::EscalateToHuman,
        };
        report.action = quality_action(&report, &self.thresholds);
        report
    }
}

fn build_system_prompt(phrases: &EscalationPhrases, threshold: f32) -> String {
    format!(
        "You are a quality-control assistant that evaluates email replies written by another AI.\n\n\
         Your job:\n\
         1) Check accuracy against the provided knowledge snippets\n\
         2) Check that the reply follows the voice and style rules\n\
         3) Check that the reply avoids hallucinations and unsafe statements\n\
         4) Check whether the draft itself requests human escalation\n\n\
         EVALUATION CRITERIA:\n\
         - Accuracy (40%): Does the reply stay consistent with the knowledge snippets?\n\
         - Completeness (25%): Does it answer the customer's main question(s)?\n\
         - Voice and tone (20%): Does it sound warm, reassuring, and confident?\n\
         - Policy adherence (15%): Any contradictions with policy? Any promises we can't guarantee?\n\n\
         Respond with ONLY raw JSON, no markdown:\n\
         {{\"quality_score\": 0.92, \"is_safe\": true, \"needs_human_review\": false, \
         \"issues\": [], \"suggested_edits\": \"\", \
         \"breakdown\": {{\"accuracy\": 0.95, \"completeness\": 0.90, \"voice_tone\": 0.92, \"policy_adherence\": 0.90}}}}\n\n\
         CRITICAL RULES:\n\
         - If the reply contradicts or goes beyond the snippets: \"is_safe\": false and \"needs_human_review\": true\n\
         - If important parts of the question are not answered: \"needs_human_review\": true\n\
         - If \"quality_score\" < {threshold:.2}: \"needs_human_review\": true\n\
         - If the draft contains ANY of these escalation phrases: \"needs_human_review\": true\n\
         {phrase_list}\n\n\
         Even a well-written reply (high score) that mentions human follow-up MUST have \
         \"needs_human_review\": true, because the reply itself is requesting escalation.",
        phrase_list = phrases.prompt_list(),
    )
}

fn format_snippets(knowledge: &[RankedEntry]) -> String {
    if knowledge.is_empty() {
        return "No snippets provided.".to_string();
    }
    knowledge
        .iter()
        .enumerate()
        .map(|(i, r)| format!("[{}] {}: {}", i + 1, r.entry.question, r.entry.answer))
        .collect::<Vec<_>>()
        .join("\n")
}
