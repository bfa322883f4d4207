//! Shared types for the support triage pipeline.
//!
//! Each stage produces one immutable value consumed by the next:
//! `RawEmail → PreprocessedEmail → IntentResult → Vec<RankedEntry> → Draft
//! → QualityReport → RoutingDecision`.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

// ── Inbound email ───────────────────────────────────────────────────

/// Caller-supplied hint about how involved an email is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    #[default]
    Simple,
    Complex,
}

/// A customer email as received. Consumed once by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEmail {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub complexity: Complexity,
}

impl RawEmail {
    pub fn new(id: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            subject: subject.into(),
            body: body.into(),
            complexity: Complexity::Simple,
        }
    }

    pub fn complex(mut self) -> Self {
        self.complexity = Complexity::Complex;
        self
    }
}

// ── Preprocessing ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UrgencyLevel {
    Low,
    Medium,
    High,
}

/// Deterministic features extracted from a `RawEmail`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessedEmail {
    pub subject: String,
    pub body: String,
    /// `"{subject}. {body}"` with every whitespace run collapsed to one space.
    pub cleaned_text: String,
    pub order_numbers: BTreeSet<String>,
    pub urgency_level: UrgencyLevel,
    /// Length of `cleaned_text` in characters.
    pub length: usize,
}

impl PreprocessedEmail {
    pub fn has_order_number(&self) -> bool {
        !self.order_numbers.is_empty()
    }
}

// ── Intent ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentCategory {
    OrderTracking,
    ReturnRefund,
    ProductQuestion,
    Warranty,
    TechnicalSupport,
    Complaint,
    Multiple,
    Other,
}

impl IntentCategory {
    pub const ALL: [IntentCategory; 8] = [
        Self::OrderTracking,
        Self::ReturnRefund,
        Self::ProductQuestion,
        Self::Warranty,
        Self::TechnicalSupport,
        Self::Complaint,
        Self::Multiple,
        Self::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OrderTracking => "ORDER_TRACKING",
            Self::ReturnRefund => "RETURN_REFUND",
            Self::ProductQuestion => "PRODUCT_QUESTION",
            Self::Warranty => "WARRANTY",
            Self::TechnicalSupport => "TECHNICAL_SUPPORT",
            Self::Complaint => "COMPLAINT",
            Self::Multiple => "MULTIPLE",
            Self::Other => "OTHER",
        }
    }

    /// One-line description used in the classifier prompt.
    pub fn description(self) -> &'static str {
        match self {
            Self::OrderTracking => "Questions about order status, shipping, delivery",
            Self::ReturnRefund => "Return requests, refund inquiries, exchanges",
            Self::ProductQuestion => "Questions about products, features, recommendations",
            Self::Warranty => "Warranty claims, coverage questions",
            Self::TechnicalSupport => "Help with using products, troubleshooting",
            Self::Complaint => "Complaints about service, product quality, delays",
            Self::Multiple => "Email contains multiple different questions/issues",
            Self::Other => "Does not fit any category above",
        }
    }

    /// Whether retrieval should search the whole knowledge set for this intent.
    pub fn is_cross_category(self) -> bool {
        matches!(self, Self::Multiple | Self::Other)
    }
}

impl fmt::Display for IntentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntentCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace([' ', '-'], "_");
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| format!("unknown intent category '{s}'"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentResult {
    pub category: IntentCategory,
    pub confidence: f32,
    pub reasoning: String,
}

// ── Knowledge ───────────────────────────────────────────────────────

/// One FAQ/policy article. Read-only for the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub category: String,
    pub question: String,
    pub answer: String,
}

impl KnowledgeEntry {
    pub fn in_category(&self, category: IntentCategory) -> bool {
        self.category.trim().eq_ignore_ascii_case(category.as_str())
    }
}

/// A knowledge entry as returned by retrieval.
///
/// Relevance fields are `None` when no ranking call was made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedEntry {
    #[serde(flatten)]
    pub entry: KnowledgeEntry,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_reason: Option<String>,
}

impl RankedEntry {
    pub fn unranked(entry: KnowledgeEntry) -> Self {
        Self {
            entry,
            relevance_score: None,
            relevance_reason: None,
        }
    }
}

// ── Draft ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Draft {
    pub body: String,
    pub confidence: f32,
    pub snippets_used: Vec<String>,
    pub needs_human: bool,
    pub persona_name: String,
}

// ── Quality ─────────────────────────────────────────────────────────

/// Per-dimension scores. Weights (40/25/20/15) are applied by the evaluator model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityBreakdown {
    #[serde(default, deserialize_with = "null_as_default")]
    pub accuracy: f32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub completeness: f32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub voice_tone: f32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub policy_adherence: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub quality_score: f32,
    pub is_safe: bool,
    pub needs_human_review: bool,
    pub issues: Vec<String>,
    /// Empty when the evaluator has no edits.
    pub suggested_edits: String,
    pub breakdown: QualityBreakdown,
    /// Recommendation derived locally from the fields above.
    pub action: RoutingAction,
}

// ── Routing ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoutingAction {
    AutoSend,
    HumanReviewWithDraft,
    EscalateToHuman,
}

impl RoutingAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AutoSend => "AUTO_SEND",
            Self::HumanReviewWithDraft => "HUMAN_REVIEW_WITH_DRAFT",
            Self::EscalateToHuman => "ESCALATE_TO_HUMAN",
        }
    }
}

impl fmt::Display for RoutingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal verdict for one email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub action: RoutingAction,
    pub reason: String,
    pub final_confidence: f32,
}

// ── Pipeline outcome ────────────────────────────────────────────────

/// Every artifact produced while processing one email, for audit.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub run_id: Uuid,
    pub email_id: String,
    pub preprocessed: PreprocessedEmail,
    pub intent: IntentResult,
    pub knowledge: Vec<RankedEntry>,
    pub draft: Draft,
    pub quality: QualityReport,
    pub decision: RoutingDecision,
    pub processed_at: DateTime<Utc>,
}

/// Accept `"12"` or `12` for identifier fields.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}

/// Read an explicit `null` the same as a missing field.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Clamp a model-reported score into `[0, 1]`.
pub(crate) fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}
