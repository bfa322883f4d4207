//! Support email pipeline.
//!
//! Every email flows strictly forward through:
//! 1. `preprocess()`: deterministic cleanup, order numbers, urgency
//! 2. `IntentClassifier::classify()`: one of eight categories
//! 3. `KnowledgeRetriever::retrieve()`: ranked FAQ entries
//! 4. `DraftComposer::compose()`: persona-voiced reply
//! 5. `QualityEvaluator::evaluate()`: independent QC, fails closed
//! 6. `route()`: fixed decision table
//!
//! Stages 2-5 never fail: each maps its errors into a safe fallback value.

pub mod composer;
pub mod escalation;
pub mod evaluator;
pub mod intent;
pub mod preprocess;
pub mod processor;
pub mod retriever;
pub mod router;
pub mod types;

pub use composer::DraftComposer;
pub use escalation::EscalationPhrases;
pub use evaluator::QualityEvaluator;
pub use intent::IntentClassifier;
pub use preprocess::preprocess;
pub use processor::{BatchSummary, SupportPipeline};
pub use retriever::KnowledgeRetriever;
pub use router::{RoutingInputs, route};
