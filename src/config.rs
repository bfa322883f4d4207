//! Configuration types.

use std::path::PathBuf;

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};

/// Default model for every stage.
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Voice the Draft Composer writes in. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Persona {
    pub name: String,
    pub role: String,
    pub experience: String,
    pub company: String,
    pub tone: String,
    pub voice_rules: Vec<String>,
}

impl Default for Persona {
    fn default() -> Self {
        Self {
            name: "Norman".to_string(),
            role: "Master guitar luthier and customer support specialist".to_string(),
            experience: "44 years".to_string(),
            company: "Harmony Music Store".to_string(),
            tone: "Warm, reassuring, and professional".to_string(),
            voice_rules: vec![
                "Warm, reassuring, and professional tone".to_string(),
                "Use \"I\" when speaking as yourself".to_string(),
                "Use simple, clear language".to_string(),
                "Be concise but not cold".to_string(),
                "Encourage the customer and remove their worries".to_string(),
                "Never use corporate jargon or overly formal language".to_string(),
            ],
        }
    }
}

impl Persona {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = company.into();
        self
    }
}

/// Thresholds shared by the Quality Evaluator and the Router.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouterThresholds {
    /// Minimum combined confidence for `AUTO_SEND`; below it QC forces review.
    pub auto_send: f32,
    /// Lowest quality score a report may carry and still recommend review with the draft.
    pub review_floor: f32,
}

impl Default for RouterThresholds {
    fn default() -> Self {
        Self {
            auto_send: 0.85,
            review_floor: 0.70,
        }
    }
}

/// Retrieval depth per email.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrievalConfig {
    pub default_top_k: usize,
    /// Used for `MULTIPLE` intents and emails marked complex.
    pub wide_top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_top_k: 3,
            wide_top_k: 5,
        }
    }
}

/// Full runtime configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct TriageConfig {
    pub llm: LlmConfig,
    pub knowledge_path: PathBuf,
    pub inbox_path: PathBuf,
    pub concurrency: usize,
    pub log_dir: Option<PathBuf>,
    pub persona: Persona,
    pub thresholds: RouterThresholds,
    pub retrieval: RetrievalConfig,
}

impl TriageConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend: LlmBackend = match std::env::var("SUPPORT_TRIAGE_BACKEND") {
            Ok(raw) => raw.parse().map_err(|message| ConfigError::InvalidValue {
                key: "SUPPORT_TRIAGE_BACKEND".to_string(),
                message,
            })?,
            Err(_) => LlmBackend::Anthropic,
        };

        let key_var = backend.api_key_var();
        let api_key = std::env::var(key_var)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar(key_var.to_string()))?;

        let model =
            std::env::var("SUPPORT_TRIAGE_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        let knowledge_path = std::env::var("SUPPORT_TRIAGE_KNOWLEDGE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/faqs.json"));

        let inbox_path = std::env::var("SUPPORT_TRIAGE_INBOX")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/test_emails.json"));

        let concurrency: usize = std::env::var("SUPPORT_TRIAGE_CONCURRENCY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(4)
            .max(1);

        let log_dir = std::env::var("SUPPORT_TRIAGE_LOG_DIR").ok().map(PathBuf::from);

        let mut persona = Persona::default();
        if let Ok(name) = std::env::var("SUPPORT_TRIAGE_PERSONA_NAME") {
            persona = persona.with_name(name);
        }
        if let Ok(company) = std::env::var("SUPPORT_TRIAGE_COMPANY") {
            persona = persona.with_company(company);
        }

        Ok(Self {
            llm: LlmConfig {
                backend,
                api_key: secrecy::SecretString::from(api_key),
                model,
            },
            knowledge_path,
            inbox_path,
            concurrency,
            log_dir,
            persona,
            thresholds: RouterThresholds::default(),
            retrieval: RetrievalConfig::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_persona_is_norman() {
        let persona = Persona::default();
        assert_eq!(persona.name, "Norman");
        assert_eq!(persona.company, "Harmony Music Store");
        assert_eq!(persona.voice_rules.len(), 6);
    }

    #[test]
    fn persona_overrides() {
        let persona = Persona::default().with_name("Ada").with_company("Strings & Co");
        assert_eq!(persona.name, "Ada");
        assert_eq!(persona.company, "Strings & Co");
        assert_eq!(persona.role, Persona::default().role);
    }

    #[test]
    fn default_thresholds() {
        let t = RouterThresholds::default();
        assert!((t.auto_send - 0.85).abs() < f32::EPSILON);
        assert!((t.review_floor - 0.70).abs() < f32::EPSILON);
        let retrieval = RetrievalConfig::default();
        assert_eq!((retrieval.default_top_k, retrieval.wide_top_k), (3, 5));
    }

    #[test]
    fn from_env_requires_api_key() {
        // SAFETY: This test runs in isolation; no other test reads these vars.
        unsafe {
            std::env::set_var("SUPPORT_TRIAGE_BACKEND", "openai");
            std::env::remove_var("OPENAI_API_KEY");
        }
        let err = TriageConfig::from_env().unwrap_err();
        unsafe { std::env::remove_var("SUPPORT_TRIAGE_BACKEND") };
        assert!(matches!(err, ConfigError::MissingEnvVar(var) if var == "OPENAI_API_KEY"));
    }
}
