//! Offline keyword model
//!
//! Implements the language-model seam without a model server: keyword
//! scoring for classification and fixed templates for narration. Used
//! for development and tests.

use super::{LanguageModel, NarrationRequest};
use crate::presenter::render_facts_only;
use crate::Result;
use async_trait::async_trait;

/// Static keyword lists, zero allocation
const RUNWAY_KEYWORDS: &[&str] = &[
    "runway", "burn", "last", "survive", "survival", "how long", "run out", "months left",
    "until i", "afford to",
];

const BALANCE_KEYWORDS: &[&str] = &[
    "balance", "money", "spent", "spend", "spending", "transactions", "ledger", "how much",
    "account", "funds",
];

pub struct KeywordModel;

impl KeywordModel {
    fn label(input: &str) -> &'static str {
        let text = input.to_lowercase();

        let score = |keywords: &[&str]| keywords.iter().filter(|kw| text.contains(**kw)).count();
        let runway_score = score(RUNWAY_KEYWORDS);
        let balance_score = score(BALANCE_KEYWORDS);

        if runway_score > 0 && runway_score >= balance_score {
            "get_runway"
        } else if balance_score > 0 {
            "get_balance"
        } else {
            "general_chat"
        }
    }
}

#[async_trait]
impl LanguageModel for KeywordModel {
    async fn classify(&self, input: &str) -> Result<String> {
        Ok(serde_json::json!({ "intent": Self::label(input) }).to_string())
    }

    async fn narrate(&self, request: &NarrationRequest) -> Result<String> {
        Ok(render_facts_only(request.intent, request.facts.as_ref()))
    }
}
