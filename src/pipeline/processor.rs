//! Pipeline orchestrator: runs one email through every stage in order.
//!
//! Stage failures never surface here; each stage returns its fallback value,
//! so `process` is infallible and always ends in a `RoutingDecision`.

use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{Instrument, debug, info, info_span};
use uuid::Uuid;

use crate::config::{Persona, RetrievalConfig, RouterThresholds, TriageConfig};
use crate::error::Result;
use crate::knowledge::KnowledgeBase;
use crate::llm::{Capability, LlmProvider, create_provider};
use crate::pipeline::composer::{self, DraftComposer};
use crate::pipeline::escalation::EscalationPhrases;
use crate::pipeline::evaluator::{self, QualityEvaluator};
use crate::pipeline::intent::{self, IntentClassifier};
use crate::pipeline::preprocess::preprocess;
use crate::pipeline::retriever::{self, KnowledgeRetriever};
use crate::pipeline::router::{RoutingInputs, route};
use crate::pipeline::types::{
    Complexity, IntentCategory, IntentResult, PipelineOutcome, RankedEntry, RawEmail,
    RoutingAction,
};

/// Max tokens for the classifier call (runs on every email).
const INTENT_MAX_TOKENS: u32 = 500;
const RANKING_MAX_TOKENS: u32 = 1000;
const DRAFT_MAX_TOKENS: u32 = 1500;
const QUALITY_MAX_TOKENS: u32 = 1000;

/// Temperature for classification, ranking and QC.
const ANALYTIC_TEMPERATURE: f32 = 0.1;
/// Drafting gets a little more room to phrase things naturally.
const DRAFT_TEMPERATURE: f32 = 0.3;

/// The six-stage support pipeline.
pub struct SupportPipeline {
    classifier: IntentClassifier,
    retriever: KnowledgeRetriever,
    composer: DraftComposer,
    evaluator: QualityEvaluator,
    thresholds: RouterThresholds,
    retrieval: RetrievalConfig,
}

impl SupportPipeline {
    /// Build every stage on top of one provider, each with its own budget.
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        knowledge: Arc<KnowledgeBase>,
        persona: Persona,
        thresholds: RouterThresholds,
        retrieval: RetrievalConfig,
    ) -> Self {
        let phrases = EscalationPhrases::default();

        let classifier = IntentClassifier::new(
            Capability::new(llm.clone(), intent::STAGE)
                .with_temperature(ANALYTIC_TEMPERATURE)
                .with_max_tokens(INTENT_MAX_TOKENS),
            persona.company.clone(),
        );
        let retriever = KnowledgeRetriever::new(
            knowledge,
            Capability::new(llm.clone(), retriever::STAGE)
                .with_temperature(ANALYTIC_TEMPERATURE)
                .with_max_tokens(RANKING_MAX_TOKENS),
        );
        let composer = DraftComposer::new(
            Capability::new(llm.clone(), composer::STAGE)
                .with_temperature(DRAFT_TEMPERATURE)
                .with_max_tokens(DRAFT_MAX_TOKENS),
            persona,
            phrases.clone(),
        );
        let evaluator = QualityEvaluator::new(
            Capability::new(llm, evaluator::STAGE)
                .with_temperature(ANALYTIC_TEMPERATURE)
                .with_max_tokens(QUALITY_MAX_TOKENS),
            phrases,
            thresholds,
        );

        Self {
            classifier,
            retriever,
            composer,
            evaluator,
            thresholds,
            retrieval,
        }
    }

    pub fn from_config(
        llm: Arc<dyn LlmProvider>,
        knowledge: Arc<KnowledgeBase>,
        config: &TriageConfig,
    ) -> Self {
        Self::new(
            llm,
            knowledge,
            config.persona.clone(),
            config.thresholds,
            config.retrieval,
        )
    }

    /// Build the provider and load the knowledge base named by `config`.
    pub async fn load(config: &TriageConfig) -> Result<Self> {
        let llm = create_provider(&config.llm)?;
        let knowledge = Arc::new(KnowledgeBase::load(&config.knowledge_path).await?);
        Ok(Self::from_config(llm, knowledge, config))
    }

    /// Process one email end to end.
    pub async fn process(&self, email: &RawEmail) -> PipelineOutcome {
        let run_id = Uuid::new_v4();
        let span = info_span!("email", email_id = %email.id, %run_id);

        async {
            let preprocessed = preprocess(email);
            debug!(
                urgency = ?preprocessed.urgency_level,
                order_numbers = preprocessed.order_numbers.len(),
                length = preprocessed.length,
                "Preprocessed"
            );

            let intent = self.classifier.classify(&preprocessed.cleaned_text).await;
            let knowledge = self.retrieve(email, &intent, &preprocessed.cleaned_text).await;
            let draft = self.composer.compose(&preprocessed.body, &knowledge).await;
            let quality = self
                .evaluator
                .evaluate(&preprocessed.body, &draft.body, &knowledge)
                .await;

            let decision = route(
                &RoutingInputs::new(preprocessed.urgency_level, &draft, &quality),
                &self.thresholds,
            );

            info!(
                category = %intent.category,
                confidence = decision.final_confidence,
                action = %decision.action,
                reason = %decision.reason,
                "Email routed"
            );

            PipelineOutcome {
                run_id,
                email_id: email.id.clone(),
                preprocessed,
                intent,
                knowledge,
                draft,
                quality,
                decision,
                processed_at: Utc::now(),
            }
        }
        .instrument(span)
        .await
    }

    /// Process independent emails with at most `concurrency` in flight.
    /// Outcomes are returned in input order.
    pub async fn process_batch(
        &self,
        emails: &[RawEmail],
        concurrency: usize,
    ) -> Vec<PipelineOutcome> {
        let limit = concurrency.max(1);
        info!(emails = emails.len(), concurrency = limit, "Processing batch");

        stream::iter(emails)
            .map(|email| self.process(email))
            .buffered(limit)
            .collect()
            .await
    }

    /// Retrieval depth for this email.
    pub fn top_k(&self, email: &RawEmail, intent: &IntentResult) -> usize {
        if intent.category == IntentCategory::Multiple || email.complexity == Complexity::Complex {
            self.retrieval.wide_top_k
        } else {
            self.retrieval.default_top_k
        }
    }

    async fn retrieve(
        &self,
        email: &RawEmail,
        intent: &IntentResult,
        question: &str,
    ) -> Vec<RankedEntry> {
        let top_k = self.top_k(email, intent);
        if intent.category.is_cross_category() {
            self.retriever.search_multi_category(question, top_k).await
        } else {
            self.retriever
                .retrieve(question, Some(intent.category), top_k)
                .await
        }
    }
}

/// Aggregate counts over a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub auto_send: usize,
    pub human_review: usize,
    pub escalated: usize,
    /// Emails that carried an expected category.
    pub labelled: usize,
    pub intent_correct: usize,
    /// `None` when no email carried an expected category.
    pub intent_accuracy: Option<f32>,
}

impl BatchSummary {
    /// `expected[i]` is the labelled category of `outcomes[i]`, if any.
    pub fn from_outcomes(
        outcomes: &[PipelineOutcome],
        expected: &[Option<IntentCategory>],
    ) -> Self {
        let mut summary = Self {
            total: outcomes.len(),
            ..Self::default()
        };

        for (i, outcome) in outcomes.iter().enumerate() {
            match outcome.decision.action {
                RoutingAction::AutoSend => summary.auto_send += 1,
                RoutingAction::HumanReviewWithDraft => summary.human_review += 1,
                RoutingAction::EscalateToHuman => summary.escalated += 1,
            }

            if let Some(Some(label)) = expected.get(i) {
                summary.labelled += 1;
                if outcome.intent.category == *label {
                    summary.intent_correct += 1;
                }
            }
        }

        if summary.labelled > 0 {
            summary.intent_accuracy =
                Some(summary.intent_correct as f32 / summary.labelled as f32);
        }
        summary
    }
}
