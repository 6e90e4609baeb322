//! Narration guard
//!
//! Rules-based check of narrated text before it reaches the user.
//! Deterministic enforcement.

use crate::models::{FinancialFacts, RunwayStatus};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::str::FromStr;
use tracing::{info, warn};

/// What a rule may look at besides the narration itself.
pub struct GuardContext<'a> {
    pub facts: Option<&'a FinancialFacts>,
    pub user_input: &'a str,
}

/// Trait for narration rules
pub trait NarrationRule: Send + Sync {
    fn name(&self) -> &'static str;

    fn check(&self, narration: &str, context: &GuardContext<'_>) -> RuleResult;
}

pub struct RuleResult {
    pub passed: bool,
    pub details: String,
}

impl RuleResult {
    fn pass() -> Self {
        Self {
            passed: true,
            details: String::new(),
        }
    }

    fn fail(details: String) -> Self {
        Self {
            passed: false,
            details,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardVerdict {
    pub passed: bool,
    pub issues: Vec<String>,
}

pub struct NarrationGuard {
    rules: Vec<Box<dyn NarrationRule>>,
}

impl NarrationGuard {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn add_rule(&mut self, rule: Box<dyn NarrationRule>) {
        self.rules.push(rule);
    }

    pub fn check(&self, narration: &str, context: &GuardContext<'_>) -> GuardVerdict {
        let issues: Vec<String> = self
            .rules
            .iter()
            .filter_map(|rule| {
                let result = rule.check(narration, context);
                (!result.passed).then(|| format!("{}: {}", rule.name(), result.details))
            })
            .collect();

        let passed = issues.is_empty();
        if passed {
            info!(rule_count = self.rules.len(), "Narration passed guard");
        } else {
            warn!(issues = ?issues, "Narration rejected by guard");
        }

        GuardVerdict { passed, issues }
    }
}

impl Default for NarrationGuard {
    fn default() -> Self {
        let mut guard = Self::new();
        guard.add_rule(Box::new(NonEmptyNarration));
        guard.add_rule(Box::new(NoInventedFigures));
        guard
    }
}

/// Rule: narration must contain text
pub struct NonEmptyNarration;

impl NarrationRule for NonEmptyNarration {
    fn name(&self) -> &'static str {
        "non_empty_narration"
    }

    fn check(&self, narration: &str, _context: &GuardContext<'_>) -> RuleResult {
        if narration.trim().is_empty() {
            RuleResult::fail("narration is blank".to_string())
        } else {
            RuleResult::pass()
        }
    }
}

/// Rule: every number in the narration must come from the facts or the
/// user's own message
pub struct NoInventedFigures;

impl NarrationRule for NoInventedFigures {
    fn name(&self) -> &'static str {
        "no_invented_figures"
    }

    fn check(&self, narration: &str, context: &GuardContext<'_>) -> RuleResult {
        let allowed = allowed_figures(context);

        // A literal too large to parse cannot be backed by any fact.
        let invented: Vec<String> = extract_literals(narration)
            .into_iter()
            .filter(|literal| match Decimal::from_str(literal) {
                Ok(value) => !allowed.contains(&comparable(value)),
                Err(_) => true,
            })
            .collect();

        if invented.is_empty() {
            RuleResult::pass()
        } else {
            RuleResult::fail(format!("figures not backed by facts: {}", invented.join(", ")))
        }
    }
}

fn comparable(value: Decimal) -> Decimal {
    value.abs().round_dp(2).normalize()
}

fn allowed_figures(context: &GuardContext<'_>) -> HashSet<Decimal> {
    let mut values: Vec<Decimal> = extract_numbers(context.user_input);

    if let Some(facts) = context.facts {
        values.push(facts.balance);
        values.extend(facts.totals_by_kind.values().copied());
        values.push(Decimal::from(facts.burn_window_days));

        let date = facts.as_of.date_naive();
        values.extend(
            date.to_string()
                .split('-')
                .filter_map(|part| Decimal::from_str(part).ok()),
        );

        if let Some(burn) = &facts.burn_rate {
            values.push(burn.net_flow_per_unit);
        }
        if let RunwayStatus::Projected { units, .. } = facts.runway {
            values.push(units);
        }
    }

    // Models round: accept whole and one-place forms as well.
    values
        .into_iter()
        .flat_map(|v| {
            let v = v.abs();
            [v, v.trunc(), v.round_dp(0), v.round_dp(1)]
        })
        .map(comparable)
        .collect()
}

/// Numbers written in free text: `1,250.50`, `365`, `-12.5`, `$40`.
/// Literals that do not fit a `Decimal` are skipped.
fn extract_numbers(text: &str) -> Vec<Decimal> {
    extract_literals(text)
        .iter()
        .filter_map(|literal| Decimal::from_str(literal).ok())
        .collect()
}

/// Digit runs with thousands separators removed, unparsed.
fn extract_literals(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut numbers = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        if !chars[i].is_ascii_digit() {
            i += 1;
            continue;
        }

        let mut literal = String::new();
        while i < chars.len() {
            let c = chars[i];
            let next_is_digit = chars.get(i + 1).is_some_and(|n| n.is_ascii_digit());
            if c.is_ascii_digit() {
                literal.push(c);
            } else if c == '.' && next_is_digit {
                literal.push(c);
            } else if c == ',' && next_is_digit {
                // thousands separator
            } else {
                break;
            }
            i += 1;
        }

        numbers.push(literal);
    }

    numbers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BurnRate, EventKind, TimeUnit};
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn facts() -> FinancialFacts {
        let as_of = Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap();
        let mut totals = BTreeMap::new();
        totals.insert(EventKind::Deposit, dec!(500));
        totals.insert(EventKind::Withdrawal, dec!(120));
        totals.insert(EventKind::Subscription, dec!(15));

        FinancialFacts {
            currency: "USD".to_string(),
            balance: dec!(365),
            as_of,
            totals_by_kind: totals,
            burn_rate: Some(BurnRate {
                net_flow_per_unit: dec!(-109.5),
                unit: TimeUnit::Month,
                window_start: as_of - chrono::Duration::days(30),
                window_end: as_of,
                event_count: 3,
            }),
            burn_window_days: 30,
            runway: RunwayStatus::Projected {
                units: dec!(3.3333),
                unit: TimeUnit::Month,
            },
        }
    }

    fn check(narration: &str) -> GuardVerdict {
        let facts = facts();
        let context = GuardContext {
            facts: Some(&facts),
            user_input: "How long will my money last?",
        };
        NarrationGuard::default().check(narration, &context)
    }

    #[test]
    fn test_extract_numbers() {
        let found = extract_numbers("You have $1,250.50 left, spent 15 on 3.5 things. Done.");
        assert_eq!(found, vec![dec!(1250.50), dec!(15), dec!(3.5)]);
    }

    #[test]
    fn test_grounded_narration_passes() {
        let verdict = check(
            "Your balance is $365.00. Over the last 30 days you burned 109.50 per month, \
             so your money lasts about 3.3 months.",
        );
        assert!(verdict.passed, "{:?}", verdict.issues);
    }

    #[test]
    fn test_invented_figure_fails() {
        let verdict = check("Your balance is $365 and you will receive 2,000 next week.");
        assert!(!verdict.passed);
        assert!(verdict.issues[0].contains("2000"));
    }

    #[test]
    fn test_oversized_figure_fails() {
        let huge = "100000000000000000000000000000000";
        assert!(Decimal::from_str(huge).is_err());
        assert!(extract_numbers(huge).is_empty());

        let verdict = check(&format!("Your balance is $365. You will soon have {} USD.", huge));
        assert!(!verdict.passed);
        assert!(verdict.issues[0].contains(huge));

        let verdict = check("You will have 99,999,999,999,999,999,999,999,999,999,999 USD.");
        assert!(!verdict.passed);
    }

    #[test]
    fn test_blank_narration_fails() {
        let verdict = check("   ");
        assert!(!verdict.passed);
        assert!(verdict.issues[0].starts_with("non_empty_narration"));
    }

    #[test]
    fn test_user_numbers_are_allowed_without_facts() {
        let context = GuardContext {
            facts: None,
            user_input: "Can I spend 40 dollars?",
        };
        let verdict = NarrationGuard::default().check("Spending 40 dollars is up to you.", &context);
        assert!(verdict.passed);
    }
}
