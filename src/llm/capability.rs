//! Single-attempt prompt invocation used by the pipeline stages.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::StageError;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::llm::response::parse_json_object;

/// A language capability bound to one stage's sampling budget.
///
/// Exactly one provider call per invocation. There is no retry; callers
/// turn any error into their fallback value.
#[derive(Clone)]
pub struct Capability {
    llm: Arc<dyn LlmProvider>,
    stage: &'static str,
    temperature: f32,
    max_tokens: u32,
}

impl Capability {
    pub fn new(llm: Arc<dyn LlmProvider>, stage: &'static str) -> Self {
        Self {
            llm,
            stage,
            temperature: 0.1,
            max_tokens: 1000,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Send one prompt and return the raw text.
    pub async fn invoke(&self, system: &str, user: &str) -> Result<String, StageError> {
        let request = CompletionRequest::new(vec![ChatMessage::system(system), ChatMessage::user(user)])
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);

        let response = self
            .llm
            .complete(request)
            .await
            .map_err(|e| StageError::CapabilityFailure {
                stage: self.stage,
                reason: e.to_string(),
            })?;

        debug!(
            stage = self.stage,
            model = self.llm.model_name(),
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "Capability call complete"
        );

        Ok(response.content)
    }

    /// Send one prompt and parse the reply as a JSON object of type `T`.
    pub async fn invoke_json<T: DeserializeOwned>(
        &self,
        system: &str,
        user: &str,
    ) -> Result<T, StageError> {
        let raw = self.invoke(system, user).await?;
        parse_json_object(&raw).map_err(|e| e.with_stage(self.stage))
    }
}
