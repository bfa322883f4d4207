//! Final routing decision. Pure and deterministic.
//!
//! Branches are evaluated top to bottom and the first match wins:
//! 1. unsafe draft → escalate
//! 2. HIGH urgency → escalate, regardless of draft quality
//! 3. draft or QC asked for a human → review with draft
//! 4. combined confidence ≥ threshold → auto-send
//! 5. otherwise → review with draft

use crate::config::RouterThresholds;
use crate::pipeline::types::{
    Draft, QualityReport, RoutingAction, RoutingDecision, UrgencyLevel,
};

/// The six inputs the decision table reads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoutingInputs {
    pub urgency_level: UrgencyLevel,
    pub draft_needs_human: bool,
    pub draft_confidence: f32,
    pub qc_needs_human_review: bool,
    pub qc_is_safe: bool,
    pub qc_quality_score: f32,
}

impl RoutingInputs {
    pub fn new(urgency_level: UrgencyLevel, draft: &Draft, quality: &QualityReport) -> Self {
        Self {
            urgency_level,
            draft_needs_human: draft.needs_human,
            draft_confidence: draft.confidence,
            qc_needs_human_review: quality.needs_human_review,
            qc_is_safe: quality.is_safe,
            qc_quality_score: quality.quality_score,
        }
    }

    pub fn final_confidence(&self) -> f32 {
        self.draft_confidence.min(self.qc_quality_score)
    }
}

/// Route one email.
pub fn route(inputs: &RoutingInputs, thresholds: &RouterThresholds) -> RoutingDecision {
    let final_confidence = inputs.final_confidence();

    let (action, reason) = if !inputs.qc_is_safe {
        (RoutingAction::EscalateToHuman, "safety concern".to_string())
    } else if inputs.urgency_level == UrgencyLevel::High {
        (
            RoutingAction::EscalateToHuman,
            "urgency overrides quality metrics".to_string(),
        )
    } else if inputs.draft_needs_human || inputs.qc_needs_human_review {
        (
            RoutingAction::HumanReviewWithDraft,
            "draft or QC flagged".to_string(),
        )
    } else if final_confidence >= thresholds.auto_send {
        (
            RoutingAction::AutoSend,
            format!("confidence {final_confidence:.2} meets threshold"),
        )
    } else {
        (
            RoutingAction::HumanReviewWithDraft,
            "confidence below threshold".to_string(),
        )
    };

    RoutingDecision {
        action,
        reason,
        final_confidence,
    }
}

/// Recommendation from a quality report alone.
///
/// An unsafe or flagged report escalates. Otherwise the score picks the
/// band: auto-send at or above `auto_send`, review with the draft at or above
/// `review_floor`, escalate below it.
pub fn quality_action(report: &QualityReport, thresholds: &RouterThresholds) -> RoutingAction {
    if !report.is_safe || report.needs_human_review {
        RoutingAction::EscalateToHuman
    } else if report.quality_score >= thresholds.auto_send {
        RoutingAction::AutoSend
    } else if report.quality_score >= thresholds.review_floor {
        RoutingAction::HumanReviewWithDraft
    } else {
        RoutingAction::EscalateToHuman
    }
}
