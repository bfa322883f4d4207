//! Scripted provider for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::LlmError;
use crate::llm::provider::{CompletionRequest, CompletionResponse, FinishReason, LlmProvider};

type Responder = Box<dyn Fn(&CompletionRequest) -> Option<String> + Send + Sync>;

/// Mock LLM returning scripted text. `None` from the responder is a provider error.
pub struct ScriptedLlm {
    responder: Responder,
    calls: AtomicUsize,
    last: Mutex<Option<CompletionRequest>>,
}

impl ScriptedLlm {
    pub fn new(
        responder: impl Fn(&CompletionRequest) -> Option<String> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            responder: Box::new(responder),
            calls: AtomicUsize::new(0),
            last: Mutex::new(None),
        })
    }

    /// Reply with each entry in order, then fail.
    pub fn replying(replies: &[&str]) -> Arc<Self> {
        let queue: Mutex<VecDeque<String>> =
            Mutex::new(replies.iter().map(|s| s.to_string()).collect());
        Self::new(move |_| queue.lock().unwrap().pop_front())
    }

    /// Fail every call.
    pub fn failing() -> Arc<Self> {
        Self::new(|_| None)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.last.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = (self.responder)(&request);
        *self.last.lock().unwrap() = Some(request);

        match reply {
            Some(content) => Ok(CompletionResponse {
                content,
                input_tokens: 100,
                output_tokens: 50,
                finish_reason: FinishReason::Stop,
                response_id: None,
            }),
            None => Err(LlmError::RequestFailed {
                provider: "scripted".to_string(),
                reason: "scripted failure".to_string(),
            }),
        }
    }
}
