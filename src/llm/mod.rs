//! Language model seam
//!
//! The model classifies and narrates. It never computes: narration
//! requests carry already-computed facts, never ledger events.

use crate::models::{FinancialFacts, Intent};
use crate::Result;
use async_trait::async_trait;

pub mod offline;
pub mod ollama;

pub use offline::KeywordModel;
pub use ollama::OllamaClient;

/// System prompt for intent classification.
pub const ROUTER_SYSTEM_PROMPT: &str = r#"You are a strictly logical financial routing AI.
Analyze the user's input and determine their intent.
You MUST respond ONLY with a valid JSON object containing a single key "intent".
The value for "intent" MUST be exactly one of these three strings:
1. "get_balance" (if asking about current money, transactions, ledger, balance, or spending)
2. "get_runway" (if asking how long their money will last, burn rate, or survival prediction)
3. "general_chat" (if anything else, greeting, or irrelevant)."#;

/// Everything the model may see when narrating.
#[derive(Debug, Clone)]
pub struct NarrationRequest {
    pub intent: Intent,
    pub system_prompt: String,
    pub user_input: String,
    pub facts: Option<FinancialFacts>,
}

/// Trait for the language model (classify + narrate only)
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Raw classifier output. Untrusted: callers must validate it.
    async fn classify(&self, input: &str) -> Result<String>;

    /// Render facts as natural-language text.
    async fn narrate(&self, request: &NarrationRequest) -> Result<String>;
}
