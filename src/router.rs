//! Intent routing
//!
//! The model's output is untrusted: anything other than a one-key JSON
//! object with a known label routes to `Intent::Unknown`.

use crate::llm::LanguageModel;
use crate::models::Intent;
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RouterOutput {
    intent: String,
}

/// Classify a user message. Single attempt, never fails.
pub async fn route(model: &dyn LanguageModel, text: &str) -> Intent {
    if text.trim().is_empty() {
        return Intent::Unknown;
    }

    let raw = match model.classify(text).await {
        Ok(raw) => raw,
        Err(e) => {
            warn!(error = %e, "Router model call failed, routing to unknown");
            return Intent::Unknown;
        }
    };

    let intent = parse_intent(&raw);
    info!(intent = %intent, "Message routed");
    intent
}

/// Strict parse of the raw classifier output.
pub fn parse_intent(raw: &str) -> Intent {
    let body = strip_fences(raw);

    let output: RouterOutput = match serde_json::from_str(body) {
        Ok(output) => output,
        Err(e) => {
            warn!(error = %e, raw = %raw, "Router output is not a valid intent object");
            return Intent::Unknown;
        }
    };

    match output.intent.trim() {
        "get_balance" => Intent::GetBalance,
        "get_runway" | "analyze_runway" => Intent::GetRunway,
        "general_chat" | "unknown" => Intent::Unknown,
        other => {
            warn!(label = %other, "Router returned an unknown label");
            Intent::Unknown
        }
    }
}

/// Small models like to wrap JSON in markdown fences.
fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
