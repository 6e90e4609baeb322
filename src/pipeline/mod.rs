//! Chat pipeline - one request, one sequential run
//!
//! ROUTE → FETCH → COMPUTE → PRESENT
//!
//! Unknown intents skip FETCH and COMPUTE. Numbers only ever come from
//! the aggregator and runway projector; the model routes and narrates.

use crate::aggregator::{compute_burn_rate, snapshot, totals_by_kind};
use crate::audit::{compute_facts_hash, AuditLog};
use crate::config::Settings;
use crate::error::AgentError;
use crate::ledger::LedgerStore;
use crate::llm::LanguageModel;
use crate::models::{
    Account, AccountId, ChatOutcome, FinancialFacts, Intent, LedgerEvent, PipelineRecord, RunwayStatus,
    TimeUnit,
};
use crate::presenter::Presenter;
use crate::router;
use crate::runway::project_burn;
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

/// Pipeline stages. `Present` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Route,
    Fetch,
    Compute,
    Present,
}

impl Stage {
    pub fn next(self, intent: Intent) -> Stage {
        match self {
            Stage::Route if intent.needs_ledger() => Stage::Fetch,
            Stage::Route => Stage::Present,
            Stage::Fetch => Stage::Compute,
            Stage::Compute | Stage::Present => Stage::Present,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    pub burn_window_days: i64,
    pub burn_rate_unit: TimeUnit,
    pub llm_timeout: std::time::Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for PipelineConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            burn_window_days: settings.burn_window_days,
            burn_rate_unit: settings.burn_rate_unit,
            llm_timeout: settings.llm_timeout,
        }
    }
}

pub struct Pipeline {
    ledger: Arc<dyn LedgerStore>,
    model: Arc<dyn LanguageModel>,
    presenter: Presenter,
    audit_log: Arc<AuditLog>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        model: Arc<dyn LanguageModel>,
        audit_log: Arc<AuditLog>,
        config: PipelineConfig,
    ) -> Self {
        let presenter = Presenter::new(model.clone(), config.llm_timeout);
        Self {
            ledger,
            model,
            presenter,
            audit_log,
            config,
        }
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerStore> {
        &self.ledger
    }

    pub fn audit_log(&self) -> &Arc<AuditLog> {
        &self.audit_log
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Answer one chat message for one account.
    ///
    /// Fails only on ledger errors (unknown account, storage failure).
    /// Model failures degrade to `Unknown` routing or facts-only text.
    pub async fn run(&self, account_id: AccountId, text: &str) -> Result<ChatOutcome> {
        let start_time = Instant::now();
        let mut reasoning_trace = vec![format!("INPUT: {} chars", text.chars().count())];

        info!(account_id = %account_id, "Pipeline: starting run");

        let mut stage = Stage::Route;
        let mut intent = Intent::Unknown;
        let mut account: Option<Account> = None;
        let mut events: Vec<LedgerEvent> = Vec::new();
        let mut facts: Option<FinancialFacts> = None;

        let presentation = loop {
            match stage {
                Stage::Route => {
                    intent = router::route(self.model.as_ref(), text).await;
                    reasoning_trace.push(format!("ROUTE: intent {}", intent));
                }
                Stage::Fetch => {
                    let found = self.ledger.find_account(account_id).await?.ok_or_else(|| {
                        AgentError::NotFound(format!("account {} not found", account_id))
                    })?;
                    events = self.ledger.list_events(account_id, None).await?;
                    account = Some(found);

                    debug!(event_count = events.len(), "Ledger fetched");
                    reasoning_trace.push(format!("FETCH: {} ledger events", events.len()));
                }
                Stage::Compute => {
                    let account = account.as_ref().ok_or_else(|| {
                        AgentError::NotFound(format!("account {} not fetched", account_id))
                    })?;
                    let computed = compute_facts(account, &events, Utc::now(), &self.config)?;
                    reasoning_trace.push(format!(
                        "COMPUTE: balance {} {}, runway {}",
                        computed.balance.normalize(),
                        computed.currency,
                        runway_label(&computed.runway)
                    ));
                    facts = Some(computed);
                }
                Stage::Present => {
                    break self.presenter.present(intent, text, facts.as_ref()).await;
                }
            }
            stage = stage.next(intent);
        };

        reasoning_trace.push(format!(
            "PRESENT: {}",
            if presentation.narrated {
                "narrated"
            } else {
                "facts-only"
            }
        ));

        let facts_hash = compute_facts_hash(facts.as_ref())?;
        let record = PipelineRecord {
            audit_id: Uuid::new_v4(),
            account_id,
            intent,
            facts: facts.clone().map(Arc::new),
            facts_hash,
            narrated: presentation.narrated,
            reasoning_trace: Arc::new(reasoning_trace.clone()),
            created_at: Utc::now(),
            execution_time_ms: start_time.elapsed().as_millis() as u64,
        };
        let audit_id = self.audit_log.record(record).await?;

        info!(
            account_id = %account_id,
            intent = %intent,
            narrated = presentation.narrated,
            audit_id = %audit_id,
            "Pipeline: run complete"
        );

        Ok(ChatOutcome {
            intent,
            response: presentation.text,
            narrated: presentation.narrated,
            facts,
            audit_id,
            reasoning_trace,
        })
    }
}

/// Derive the full fact set for an account at `now`.
///
/// An empty burn window gives an unknown burn rate and runway, never a
/// zero rate. A negative balance is reported as depleted.
pub fn compute_facts(
    account: &Account,
    events: &[LedgerEvent],
    now: DateTime<Utc>,
    config: &PipelineConfig,
) -> Result<FinancialFacts> {
    let snap = snapshot(account.account_id, events, now);
    let window_start = Duration::try_days(config.burn_window_days)
        .and_then(|window| now.checked_sub_signed(window))
        .ok_or_else(|| {
            AgentError::Config(format!(
                "burn window of {} days is out of range",
                config.burn_window_days
            ))
        })?;

    let burn_rate = match compute_burn_rate(events, window_start, now, config.burn_rate_unit) {
        Ok(rate) => Some(rate),
        Err(AgentError::InsufficientData(reason)) => {
            debug!(reason = %reason, "Burn rate unknown");
            None
        }
        Err(e) => return Err(e),
    };

    let runway = match &burn_rate {
        _ if snap.balance < Decimal::ZERO => RunwayStatus::Depleted,
        None => RunwayStatus::Unknown,
        Some(rate) => match project_burn(snap.balance, rate) {
            Ok(estimate) => estimate.into(),
            Err(AgentError::Domain(_)) => RunwayStatus::Depleted,
            Err(e) => return Err(e),
        },
    };

    Ok(FinancialFacts {
        currency: account.currency.clone(),
        balance: snap.balance,
        as_of: snap.as_of,
        totals_by_kind: totals_by_kind(events),
        burn_rate,
        burn_window_days: config.burn_window_days,
        runway,
    })
}

fn runway_label(status: &RunwayStatus) -> String {
    match status {
        RunwayStatus::Projected { units, unit } => format!("{} {}s", units, unit),
        RunwayStatus::NoDepletion => "no depletion".to_string(),
        RunwayStatus::Depleted => "depleted".to_string(),
        RunwayStatus::Unknown => "unknown".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::InMemoryLedgerStore;
    use crate::llm::{KeywordModel, NarrationRequest};
    use crate::models::{EventKind, NewAccount, NewLedgerEvent};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Routes by keyword, then fails or hangs on narration.
    struct BrokenNarrator {
        hang: bool,
        narrate_calls: AtomicUsize,
    }

    #[async_trait]
    impl LanguageModel for BrokenNarrator {
        async fn classify(&self, input: &str) -> Result<String> {
            KeywordModel.classify(input).await
        }

        async fn narrate(&self, _request: &NarrationRequest) -> Result<String> {
            self.narrate_calls.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            }
            Err(AgentError::Llm("model unavailable".to_string()))
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            llm_timeout: std::time::Duration::from_millis(50),
            ..PipelineConfig::default()
        }
    }

    async fn seeded_store() -> (Arc<InMemoryLedgerStore>, AccountId) {
        let store = Arc::new(InMemoryLedgerStore::new());
        let account = store
            .open_account(NewAccount {
                account_id: None,
                email: "user@example.com".to_string(),
                currency: None,
            })
            .await
            .unwrap();

        let now = Utc::now();
        for (kind, amount, days_ago) in [
            (EventKind::Deposit, dec!(500), 20),
            (EventKind::Withdrawal, dec!(120), 10),
            (EventKind::Subscription, dec!(15), 5),
        ] {
            store
                .append(
                    NewLedgerEvent::new(account.account_id, kind, amount)
                        .at(now - Duration::days(days_ago)),
                )
                .await
                .unwrap();
        }

        (store, account.account_id)
    }

    fn pipeline(store: Arc<InMemoryLedgerStore>, model: Arc<dyn LanguageModel>) -> Pipeline {
        Pipeline::new(store, model, Arc::new(AuditLog::new()), config())
    }

    #[test]
    fn test_stage_transitions() {
        assert_eq!(Stage::Route.next(Intent::GetBalance), Stage::Fetch);
        assert_eq!(Stage::Route.next(Intent::Unknown), Stage::Present);
        assert_eq!(Stage::Fetch.next(Intent::GetRunway), Stage::Compute);
        assert_eq!(Stage::Compute.next(Intent::GetRunway), Stage::Present);
    }

    #[tokio::test]
    async fn test_balance_question() {
        let (store, account_id) = seeded_store().await;
        let p = pipeline(store, Arc::new(KeywordModel));

        let outcome = p.run(account_id, "What is my balance?").await.unwrap();
        assert_eq!(outcome.intent, Intent::GetBalance);
        assert!(outcome.narrated);

        let facts = outcome.facts.unwrap();
        assert_eq!(facts.balance, dec!(365));
        assert_eq!(facts.totals_by_kind.get(&EventKind::Subscription), Some(&dec!(15)));
        assert!(outcome.response.contains("365 USD"));

        assert!(p.audit_log().verify_integrity(outcome.audit_id).await.unwrap());
        assert!(outcome.reasoning_trace.iter().any(|t| t.starts_with("FETCH: 3")));
    }

    #[tokio::test]
    async fn test_runway_question_is_projected() {
        let (store, account_id) = seeded_store().await;
        let p = pipeline(store, Arc::new(KeywordModel));

        let outcome = p.run(account_id, "How long will my money last?").await.unwrap();
        assert_eq!(outcome.intent, Intent::GetRunway);

        // Net +365 over the window: not depleting.
        let facts = outcome.facts.unwrap();
        assert_eq!(facts.runway, RunwayStatus::NoDepletion);
        assert_eq!(facts.burn_rate.unwrap().net_flow_per_unit, dec!(365));
    }

    #[tokio::test]
    async fn test_unknown_intent_skips_ledger() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let p = pipeline(store, Arc::new(KeywordModel));

        // The account does not exist: fetch would fail if it ran.
        let outcome = p.run(AccountId::new(), "hello there").await.unwrap();
        assert_eq!(outcome.intent, Intent::Unknown);
        assert!(outcome.facts.is_none());
        assert!(!outcome.reasoning_trace.iter().any(|t| t.starts_with("FETCH")));
    }

    #[tokio::test]
    async fn test_unknown_account_is_not_found() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let p = pipeline(store, Arc::new(KeywordModel));

        let err = p.run(AccountId::new(), "what is my balance").await.unwrap_err();
        assert!(matches!(err, AgentError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_model_failure_keeps_facts() {
        let (store, account_id) = seeded_store().await;
        let model = Arc::new(BrokenNarrator {
            hang: false,
            narrate_calls: AtomicUsize::new(0),
        });
        let p = pipeline(store, model.clone());

        let outcome = p.run(account_id, "What is my balance?").await.unwrap();
        assert!(!outcome.narrated);
        assert_eq!(outcome.facts.unwrap().balance, dec!(365));
        assert!(outcome.response.contains("365 USD"));
        assert_eq!(model.narrate_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_model_timeout_keeps_facts() {
        let (store, account_id) = seeded_store().await;
        let model = Arc::new(BrokenNarrator {
            hang: true,
            narrate_calls: AtomicUsize::new(0),
        });
        let p = pipeline(store, model);

        let outcome = p.run(account_id, "burn rate?").await.unwrap();
        assert_eq!(outcome.intent, Intent::GetRunway);
        assert!(!outcome.narrated);
        assert!(outcome.facts.is_some());
    }

    fn usd_account() -> Account {
        Account {
            account_id: AccountId::new(),
            email: "user@example.com".to_string(),
            currency: "USD".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_compute_facts_states() {
        let now = Utc::now();
        let account = usd_account();
        let make = |kind, amount, days_ago| LedgerEvent {
            id: crate::models::EventId::new(),
            account_id: account.account_id,
            kind,
            amount,
            currency: "USD".to_string(),
            description: None,
            occurred_at: now - Duration::days(days_ago),
        };
        let cfg = PipelineConfig::default();

        // Burning 10/month from 100.
        let events = vec![
            make(EventKind::Deposit, dec!(110), 60),
            make(EventKind::Withdrawal, dec!(10), 3),
        ];
        let facts = compute_facts(&account, &events, now, &cfg).unwrap();
        assert_eq!(facts.currency, "USD");
        assert_eq!(facts.as_of, now);
        assert_eq!(
            facts.runway,
            RunwayStatus::Projected {
                units: dec!(10),
                unit: TimeUnit::Month
            }
        );

        // Nothing in the window.
        let quiet = vec![make(EventKind::Deposit, dec!(50), 90)];
        let facts = compute_facts(&account, &quiet, now, &cfg).unwrap();
        assert!(facts.burn_rate.is_none());
        assert_eq!(facts.runway, RunwayStatus::Unknown);

        // Overdrawn.
        let overdrawn = vec![make(EventKind::Withdrawal, dec!(5), 1)];
        let facts = compute_facts(&account, &overdrawn, now, &cfg).unwrap();
        assert_eq!(facts.runway, RunwayStatus::Depleted);

        // No events at all: zero balance, unknown burn.
        let facts = compute_facts(&account, &[], now, &cfg).unwrap();
        assert_eq!(facts.balance, Decimal::ZERO);
        assert_eq!(facts.runway, RunwayStatus::Unknown);
    }

    #[test]
    fn test_out_of_range_window_is_config_error() {
        let account = usd_account();
        for days in [1_000_000_000, i64::MAX] {
            let cfg = PipelineConfig {
                burn_window_days: days,
                ..PipelineConfig::default()
            };
            let err = compute_facts(&account, &[], Utc::now(), &cfg).unwrap_err();
            assert!(matches!(err, AgentError::Config(_)), "{}", days);
        }
    }
}
