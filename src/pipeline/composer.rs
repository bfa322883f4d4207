//! Draft composition in the configured persona's voice.
//!
//! The escalation-phrase rule (phrase in body ⇒ `needs_human`) is part of
//! the prompt contract. This stage trusts the model's flag; the Quality
//! Evaluator re-checks the body.

use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Persona;
use crate::error::StageError;
use crate::llm::Capability;
use crate::pipeline::escalation::EscalationPhrases;
use crate::pipeline::types::{Draft, RankedEntry, clamp_unit, null_as_default};

pub const STAGE: &str = "draft";

#[derive(Debug, Deserialize)]
struct DraftResponse {
    draft_body: String,
    #[serde(default, deserialize_with = "null_as_default")]
    confidence: f32,
    #[serde(default, deserialize_with = "null_as_default")]
    snippets_used: Vec<serde_json::Value>,
    /// Absent or `null` means the model did not commit, so a human looks.
    #[serde(default)]
    needs_human: Option<bool>,
}

/// Writes a reply body from the email and retrieved knowledge.
#[derive(Clone)]
pub struct DraftComposer {
    capability: Capability,
    persona: Persona,
    phrases: EscalationPhrases,
}

impl DraftComposer {
    pub fn new(capability: Capability, persona: Persona, phrases: EscalationPhrases) -> Self {
        Self {
            capability,
            persona,
            phrases,
        }
    }

    /// Compose a reply. Any failure yields [`DraftComposer::fallback`].
    pub async fn compose(&self, email_body: &str, knowledge: &[RankedEntry]) -> Draft {
        match self.try_compose(email_body, knowledge).await {
            Ok(draft) => {
                debug!(
                    confidence = draft.confidence,
                    needs_human = draft.needs_human,
                    snippets = draft.snippets_used.len(),
                    "Draft composed"
                );
                draft
            }
            Err(e) => {
                warn!(error = %e, "Draft composition failed, using fallback reply");
                self.fallback()
            }
        }
    }

    /// Holding reply surfaced to a human when drafting fails. It only
    /// acknowledges the message and never claims to answer it.
    pub fn fallback(&self) -> Draft {
        Draft {
            body: format!(
                "Thank you for contacting {}. I want to make sure I give you the most \
                 accurate information, so I'm going to pass this to our specialist \
                 team, who will respond within 24 hours.",
                self.persona.company
            ),
            confidence: 0.0,
            snippets_used: Vec::new(),
            needs_human: true,
            persona_name: self.persona.name.clone(),
        }
    }

    async fn try_compose(
        &self,
        email_body: &str,
        knowledge: &[RankedEntry],
    ) -> Result<Draft, StageError> {
        let system = build_system_prompt(&self.persona, &self.phrases);
        let user = format!(
            "CUSTOMER MESSAGE:\n{email_body}\n\nRELEVANT KNOWLEDGE SNIPPETS:\n{}",
            format_snippets(knowledge)
        );

        let response: DraftResponse = self.capability.invoke_json(&system, &user).await?;

        if response.draft_body.trim().is_empty() {
            return Err(StageError::MalformedResponse {
                stage: STAGE,
                reason: "empty draft_body".to_string(),
            });
        }

        Ok(Draft {
            body: response.draft_body,
            confidence: clamp_unit(response.confidence),
            snippets_used: response
                .snippets_used
                .into_iter()
                .filter_map(|v| match v {
                    serde_json::Value::String(s) => Some(s),
                    serde_json::Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect(),
            needs_human: response.needs_human.unwrap_or(true),
            persona_name: self.persona.name.clone(),
        })
    }
}

fn build_system_prompt(persona: &Persona, phrases: &EscalationPhrases) -> String {
    let voice_rules = persona
        .voice_rules
        .iter()
        .map(|r| format!("- {r}"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are \"{name}\", a {role} at {company}. You have {experience} of experience.\n\n\
         Reply to customers in a friendly, calm, confident tone, using simple, clear language, \
         with high factual accuracy based ONLY on the knowledge snippets provided. If the \
         snippets do not answer the question, say you will pass it to a human specialist \
         instead of guessing.\n\n\
         TONE: {tone}\n\n\
         VOICE & STYLE:\n{voice_rules}\n\n\
         KNOWLEDGE BASE:\n\
         Use ONLY the snippets given with the message. Do not invent policies or facts.\n\n\
         FORMAT:\n\
         Return ONLY a raw JSON object, no markdown:\n\
         {{\"draft_body\": \"The email reply text\", \"confidence\": 0.95, \"snippets_used\": [\"snippet ids\"], \"needs_human\": false}}\n\n\
         CRITICAL CONSISTENCY RULE:\n\
         If draft_body contains ANY of these phrases you MUST set \"needs_human\": true:\n\
         {phrase_list}\n\n\
         Set \"needs_human\" to true if:\n\
         - The answer is not clearly supported by the knowledge snippets\n\
         - The question involves order-specific details you don't have\n\
         - The customer seems very upset\n\
         - Your draft suggests forwarding or escalation\n\n\
         Set \"confidence\" based on:\n\
         - 0.90-1.0: Complete answer from the snippets, no escalation needed\n\
         - 0.70-0.89: Partial answer, might need human follow-up\n\
         - 0.50-0.69: Mostly guidance, minimal direct answer\n\
         - Below 0.50: No good answer, definite escalation\n\n\
         CONSTRAINTS:\n\
         - Specific order questions without live data: \"needs_human\": true, \"confidence\" 0.70 or lower\n\
         - Fully answerable from the snippets: \"needs_human\": false, \"confidence\" 0.85 or higher\n\
         - NEVER combine confidence 0.90+ with an escalation phrase\n\
         - Sign the reply as {name}",
        name = persona.name,
        role = persona.role,
        company = persona.company,
        experience = persona.experience,
        tone = persona.tone,
        phrase_list = phrases.prompt_list(),
    )
}

/// Render snippets for the composer prompt.
pub(crate) fn format_snippets(knowledge: &[RankedEntry]) -> String {
    if knowledge.is_empty() {
        return "No relevant snippets found.".to_string();
    }

    knowledge
        .iter()
        .enumerate()
        .map(|(i, ranked)| {
            let e = &ranked.entry;
            format!(
                "[Snippet {}] ID: {}\nCategory: {}\nQ: {}\nA: {}",
                i + 1,
                e.id,
                e.category,
                e.question,
                e.answer
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedLlm;
    use crate::pipeline::types::KnowledgeEntry;

    fn composer(llm: std::sync::Arc<ScriptedLlm>) -> DraftComposer {
        DraftComposer::new(
            Capability::new(llm, STAGE),
            Persona::default(),
            EscalationPhrases::default(),
        )
    }

    fn snippet(id: &str) -> RankedEntry {
        RankedEntry::unranked(KnowledgeEntry {
            id: id.into(),
            category: "ORDER_TRACKING".into(),
            question: "Where is my order?".into(),
            answer: "Track it at harmonymusic.com/track.".into(),
        })
    }

    #[tokio::test]
    async fn parses_draft() {
        let llm = ScriptedLlm::replying(&[r#"{
            "draft_body": "Hi! You can track your order online. Best, Norman",
            "confidence": 0.92,
            "snippets_used": [1, "2"],
            "needs_human": false
        }"#]);
        let draft = composer(llm).compose("Where is my order?", &[snippet("1")]).await;
        assert!(draft.body.contains("track your order"));
        assert!((draft.confidence - 0.92).abs() < 1e-6);
        assert_eq!(draft.snippets_used, vec!["1", "2"]);
        assert!(!draft.needs_human);
        assert_eq!(draft.persona_name, "Norman");
    }

    #[tokio::test]
    async fn missing_needs_human_defaults_true() {
        let llm = ScriptedLlm::replying(&[r#"{"draft_body": "Hello", "confidence": 0.9}"#]);
        let draft = composer(llm).compose("hi", &[]).await;
        assert!(draft.needs_human);
    }

    #[tokio::test]
    async fn null_optional_fields_keep_the_draft() {
        let llm = ScriptedLlm::replying(&[r#"{
            "draft_body": "You can track it online. Best, Norman",
            "confidence": 0.93,
            "snippets_used": null,
            "needs_human": false
        }"#]);
        let draft = composer(llm).compose("Where is my order?", &[]).await;
        assert_eq!(draft.body, "You can track it online. Best, Norman");
        assert!((draft.confidence - 0.93).abs() < 1e-6);
        assert!(draft.snippets_used.is_empty());
        assert!(!draft.needs_human);
    }

    #[tokio::test]
    async fn null_needs_human_means_review() {
        let llm = ScriptedLlm::replying(&[
            r#"{"draft_body": "Hello", "confidence": null, "needs_human": null}"#,
        ]);
        let draft = composer(llm).compose("hi", &[]).await;
        assert_eq!(draft.body, "Hello");
        assert_eq!(draft.confidence, 0.0);
        assert!(draft.needs_human);
    }

    #[tokio::test]
    async fn model_flag_is_trusted_at_this_stage() {
        let llm = ScriptedLlm::replying(&[r#"{
            "draft_body": "I'll look into it for you!",
            "confidence": 0.95,
            "needs_human": false
        }"#]);
        let draft = composer(llm).compose("hi", &[]).await;
        assert!(!draft.needs_human);
    }

    #[tokio::test]
    async fn failure_yields_safe_fallback() {
        let llm = ScriptedLlm::failing();
        let draft = composer(llm.clone()).compose("Where is my order?", &[snippet("1")]).await;
        assert_eq!(draft.confidence, 0.0);
        assert!(draft.needs_human);
        assert!(draft.snippets_used.is_empty());
        assert!(draft.body.contains("Harmony Music Store"));
        assert!(EscalationPhrases::default().matches(&draft.body));
        assert_eq!(llm.calls(), 1);
    }

    #[tokio::test]
    async fn malformed_or_empty_body_yields_fallback() {
        for reply in ["not json", r#"{"confidence": 0.9}"#, r#"{"draft_body": "   "}"#] {
            let draft = composer(ScriptedLlm::replying(&[reply])).compose("hi", &[]).await;
            assert!(draft.needs_human, "reply {reply:?}");
            assert_eq!(draft.confidence, 0.0);
        }
    }

    #[tokio::test]
    async fn prompt_carries_persona_phrases_and_snippets() {
        let llm = ScriptedLlm::replying(&[r#"{"draft_body": "ok", "needs_human": true}"#]);
        composer(llm.clone()).compose("My strings snapped", &[snippet("42")]).await;

        let request = llm.last_request().unwrap();
        let system = request.system_prompt().unwrap();
        assert!(system.contains("\"Norman\""));
        assert!(system.contains("44 years"));
        assert!(system.contains("\"look into this for you\""));
        assert!(system.contains("TONE: Warm, reassuring, and professional\n"));
        assert!(system.contains("- 0.90-1.0: Complete answer"));
        assert!(system.contains("- 0.70-0.89: Partial answer"));
        assert!(system.contains("- 0.50-0.69: Mostly guidance"));
        assert!(system.contains("- Below 0.50: No good answer"));
        assert!(system.contains("NEVER combine confidence 0.90+ with an escalation phrase"));
        let user = &request.messages.last().unwrap().content;
        assert!(user.contains("My strings snapped"));
        assert!(user.contains("[Snippet 1] ID: 42"));
    }

    #[test]
    fn empty_snippets_placeholder() {
        assert_eq!(format_snippets(&[]), "No relevant snippets found.");
    }
}
