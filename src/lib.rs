//! Support Triage: customer email triage with drafted replies and fail-closed routing.

pub mod config;
pub mod error;
pub mod inbox;
pub mod knowledge;
pub mod llm;
pub mod pipeline;
