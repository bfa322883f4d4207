//! Intent classification into the fixed support category set.

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::StageError;
use crate::llm::Capability;
use crate::pipeline::types::{IntentCategory, IntentResult, clamp_unit, null_as_default};

pub const STAGE: &str = "intent";

#[derive(Debug, Deserialize)]
struct IntentResponse {
    category: String,
    #[serde(default, deserialize_with = "null_as_default")]
    confidence: f32,
    #[serde(default, deserialize_with = "null_as_default")]
    reasoning: String,
}

/// Maps cleaned email text to an `IntentResult`. Never fails.
#[derive(Clone)]
pub struct IntentClassifier {
    capability: Capability,
    company: String,
}

impl IntentClassifier {
    pub fn new(capability: Capability, company: impl Into<String>) -> Self {
        Self {
            capability,
            company: company.into(),
        }
    }

    /// Classify `text`. Any failure yields `OTHER` with zero confidence.
    pub async fn classify(&self, text: &str) -> IntentResult {
        match self.try_classify(text).await {
            Ok(result) => {
                debug!(
                    category = %result.category,
                    confidence = result.confidence,
                    "Intent classified"
                );
                result
            }
            Err(e) => {
                warn!(error = %e, "Intent classification failed, defaulting to OTHER");
                IntentResult {
                    category: IntentCategory::Other,
                    confidence: 0.0,
                    reasoning: format!("Classification failed: {e}"),
                }
            }
        }
    }

    async fn try_classify(&self, text: &str) -> Result<IntentResult, StageError> {
        let response: IntentResponse = self
            .capability
            .invoke_json(&build_system_prompt(&self.company), &format!("Email to classify:\n{text}"))
            .await?;

        let category = response
            .category
            .parse::<IntentCategory>()
            .map_err(|reason| StageError::MalformedResponse {
                stage: STAGE,
                reason,
            })?;

        Ok(IntentResult {
            category,
            confidence: clamp_unit(response.confidence),
            reasoning: response.reasoning,
        })
    }
}

fn build_system_prompt(company: &str) -> String {
    let categories = IntentCategory::ALL
        .iter()
        .map(|c| format!("- {}: {}", c.as_str(), c.description()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are an email classifier for {company}, a musical instrument retailer.\n\n\
         Classify the customer email into exactly ONE category:\n\n\
         {categories}\n\n\
         Respond ONLY with valid JSON in this exact format:\n\
         {{\"category\": \"CATEGORY_NAME\", \"confidence\": 0.95, \"reasoning\": \"Brief explanation\"}}"
    )
}
