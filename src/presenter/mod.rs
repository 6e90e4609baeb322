//! Presentation of computed facts
//!
//! The model only rephrases facts computed elsewhere. When it is slow,
//! fails, or strays from the facts, the user gets the deterministic
//! facts-only rendering instead.

mod guard;

pub use guard::{
    GuardContext, GuardVerdict, NarrationGuard, NarrationRule, NoInventedFigures,
    NonEmptyNarration, RuleResult,
};

use crate::llm::{LanguageModel, NarrationRequest};
use crate::models::{EventKind, FinancialFacts, Intent, RunwayStatus};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const HELP_TEXT: &str = "I can tell you your current balance or how long your money will last \
at the current burn rate. Try asking \"What is my balance?\" or \"How long will my money last?\".";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presentation {
    pub text: String,
    /// False when the facts-only rendering was used.
    pub narrated: bool,
}

pub struct Presenter {
    model: Arc<dyn LanguageModel>,
    timeout: Duration,
    guard: NarrationGuard,
}

impl Presenter {
    pub fn new(model: Arc<dyn LanguageModel>, timeout: Duration) -> Self {
        Self {
            model,
            timeout,
            guard: NarrationGuard::default(),
        }
    }

    pub async fn present(
        &self,
        intent: Intent,
        user_input: &str,
        facts: Option<&FinancialFacts>,
    ) -> Presentation {
        let request = NarrationRequest {
            intent,
            system_prompt: system_prompt(intent, facts),
            user_input: user_input.to_string(),
            facts: facts.cloned(),
        };

        let narration = match tokio::time::timeout(self.timeout, self.model.narrate(&request)).await
        {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!(error = %e, "Narration failed, using facts-only response");
                return fallback(intent, facts);
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Narration timed out, using facts-only response"
                );
                return fallback(intent, facts);
            }
        };

        let context = GuardContext { facts, user_input };
        if !self.guard.check(&narration, &context).passed {
            return fallback(intent, facts);
        }

        info!(intent = %intent, "Narration accepted");
        Presentation {
            text: narration.trim().to_string(),
            narrated: true,
        }
    }
}

fn fallback(intent: Intent, facts: Option<&FinancialFacts>) -> Presentation {
    Presentation {
        text: render_facts_only(intent, facts),
        narrated: false,
    }
}

/// Deterministic rendering used when narration is unavailable.
pub fn render_facts_only(intent: Intent, facts: Option<&FinancialFacts>) -> String {
    match facts {
        Some(facts) => render_facts(intent, facts),
        None => HELP_TEXT.to_string(),
    }
}

pub fn render_facts(intent: Intent, facts: &FinancialFacts) -> String {
    let mut lines = vec![format!(
        "Your balance is {} {} as of {}.",
        amount(facts.balance),
        facts.currency,
        facts.as_of.format("%Y-%m-%d")
    )];

    match intent {
        Intent::GetRunway => {
            lines.push(burn_line(facts));
            lines.push(runway_line(facts));
        }
        _ => {
            if !facts.totals_by_kind.is_empty() {
                let totals: Vec<String> = facts
                    .totals_by_kind
                    .iter()
                    .map(|(kind, total)| format!("{} {}", kind_label(*kind), amount(*total)))
                    .collect();
                lines.push(format!("Totals: {}.", totals.join(", ")));
            }
        }
    }

    lines.join(" ")
}

fn burn_line(facts: &FinancialFacts) -> String {
    match &facts.burn_rate {
        Some(burn) if burn.net_flow_per_unit < Decimal::ZERO => format!(
            "Over the last {} days you spent {} {} per {} more than you received.",
            facts.burn_window_days,
            amount(burn.net_flow_per_unit.abs()),
            facts.currency,
            burn.unit
        ),
        Some(burn) => format!(
            "Over the last {} days your net flow was +{} {} per {}.",
            facts.burn_window_days,
            amount(burn.net_flow_per_unit),
            facts.currency,
            burn.unit
        ),
        None => format!(
            "There were no transactions in the last {} days, so the burn rate is unknown.",
            facts.burn_window_days
        ),
    }
}

fn runway_line(facts: &FinancialFacts) -> String {
    match facts.runway {
        RunwayStatus::Projected { units, unit } => {
            format!("At this rate your money lasts about {} {}s.", amount(units), unit)
        }
        RunwayStatus::NoDepletion => {
            "Your balance is not shrinking, so it is not projected to run out.".to_string()
        }
        RunwayStatus::Depleted => {
            "Your balance is already negative, so there is no runway left.".to_string()
        }
        RunwayStatus::Unknown => "Runway cannot be estimated without recent activity.".to_string(),
    }
}

fn kind_label(kind: EventKind) -> &'static str {
    match kind {
        EventKind::Deposit => "deposits",
        EventKind::Withdrawal => "withdrawals",
        EventKind::Subscription => "subscriptions",
    }
}

fn amount(value: Decimal) -> String {
    value.normalize().to_string()
}

fn system_prompt(intent: Intent, facts: Option<&FinancialFacts>) -> String {
    const RULES: &str = "Do NOT make up any numbers. Be concise and professional.\n\
CRITICAL: Always respond in English, regardless of the language the user speaks.";

    let Some(facts) = facts else {
        return format!(
            "You are MonoMind, a financial assistant. The user's message is not about their \
balance or runway. Reply briefly and explain that you can report their balance and how \
long their money will last.\n{}",
            RULES
        );
    };

    let mut lines = vec![
        format!("- Currency: {}", facts.currency),
        format!("- Current balance: {}", amount(facts.balance)),
    ];

    match intent {
        Intent::GetRunway => {
            let burn = match &facts.burn_rate {
                Some(b) => format!("{} per {}", amount(b.net_flow_per_unit), b.unit),
                None => "unknown (no recent transactions)".to_string(),
            };
            lines.push(format!(
                "- Net flow over the last {} days (negative means burning): {}",
                facts.burn_window_days, burn
            ));
            lines.push(format!("- Runway: {}", runway_fact(facts.runway)));
            format!(
                "You are MonoMind, a financial assistant.\n\
The user is asking about their financial runway or burn rate.\n\
Use ONLY these deterministic facts provided by the ledger engine:\n{}\n\
Explain these metrics clearly. Warn them if the runway is very short.\n{}",
                lines.join("\n"),
                RULES
            )
        }
        _ => {
            for (kind, total) in &facts.totals_by_kind {
                lines.push(format!("- Total {}: {}", kind_label(*kind), amount(*total)));
            }
            format!(
                "You are MonoMind, a financial assistant.\n\
Answer the user's question using ONLY the deterministic facts below:\n{}\n{}",
                lines.join("\n"),
                RULES
            )
        }
    }
}

fn runway_fact(status: RunwayStatus) -> String {
    match status {
        RunwayStatus::Projected { units, unit } => format!("{} {}s", amount(units), unit),
        RunwayStatus::NoDepletion => "not depleting".to_string(),
        RunwayStatus::Depleted => "already depleted (negative balance)".to_string(),
        RunwayStatus::Unknown => "unknown".to_string(),
    }
}
