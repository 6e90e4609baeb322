//! Append-only ledger persistence
//!
//! The store contract has no update or delete: history cannot be
//! mutated through it. Balances are never stored, only derived.

use crate::error::AgentError;
use crate::models::{
    Account, AccountId, EventId, LedgerEvent, NewAccount, NewLedgerEvent, AMOUNT_PRECISION,
    AMOUNT_SCALE,
};
use crate::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryLedgerStore;
pub use postgres::PostgresLedgerStore;

pub const DEFAULT_CURRENCY: &str = "USD";
const MAX_DESCRIPTION_LEN: usize = 255;
const MAX_EMAIL_LEN: usize = 255;

/// Trait for ledger persistence
#[async_trait::async_trait]
pub trait LedgerStore: Send + Sync {
    async fn open_account(&self, account: NewAccount) -> Result<Account>;
    async fn find_account(&self, account_id: AccountId) -> Result<Option<Account>>;

    /// Validate and persist one event. Nothing is written on failure.
    async fn append(&self, event: NewLedgerEvent) -> Result<EventId>;

    /// Events of one account ordered by `occurred_at` ascending, optionally
    /// only those strictly after `since_exclusive`.
    async fn list_events(
        &self,
        account_id: AccountId,
        since_exclusive: Option<DateTime<Utc>>,
    ) -> Result<Vec<LedgerEvent>>;
}

/// Validate an account request and build the account record.
pub fn prepare_account(request: NewAccount, now: DateTime<Utc>) -> Result<Account> {
    let email = request.email.trim().to_string();

    let well_formed = email
        .split_once('@')
        .map(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.starts_with('.'))
        .unwrap_or(false);

    if !well_formed || email.len() > MAX_EMAIL_LEN {
        return Err(AgentError::Validation(format!("invalid email '{}'", email)));
    }

    let currency = normalize_currency(request.currency.as_deref().unwrap_or(DEFAULT_CURRENCY))?;

    Ok(Account {
        account_id: request.account_id.unwrap_or_default(),
        email,
        currency,
        created_at: now,
    })
}

/// Validate an event against its account and assign it an id.
pub fn prepare_event(
    event: NewLedgerEvent,
    account: &Account,
    now: DateTime<Utc>,
) -> Result<LedgerEvent> {
    validate_amount(event.amount)?;

    let currency = match event.currency.as_deref() {
        Some(c) => normalize_currency(c)?,
        None => account.currency.clone(),
    };
    if currency != account.currency {
        return Err(AgentError::Validation(format!(
            "currency {} does not match account currency {}",
            currency, account.currency
        )));
    }

    if let Some(description) = &event.description {
        if description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(AgentError::Validation(format!(
                "description exceeds {} characters",
                MAX_DESCRIPTION_LEN
            )));
        }
    }

    Ok(LedgerEvent {
        id: EventId::new(),
        account_id: event.account_id,
        kind: event.kind,
        amount: event.amount.normalize(),
        currency,
        description: event.description,
        occurred_at: event.occurred_at.unwrap_or(now),
    })
}

pub(crate) fn validate_amount(amount: Decimal) -> Result<()> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(AgentError::Validation(format!(
            "amount must be non-negative, got {}",
            amount
        )));
    }

    if amount.normalize().scale() > AMOUNT_SCALE {
        return Err(AgentError::Validation(format!(
            "amount {} has more than {} decimal places",
            amount, AMOUNT_SCALE
        )));
    }

    let integer_limit = Decimal::from(10_i64.pow(AMOUNT_PRECISION - AMOUNT_SCALE));
    if amount.trunc() >= integer_limit {
        return Err(AgentError::Validation(format!(
            "amount {} exceeds {} significant digits",
            amount, AMOUNT_PRECISION
        )));
    }

    Ok(())
}

fn normalize_currency(raw: &str) -> Result<String> {
    let code = raw.trim().to_uppercase();
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase()) {
        Ok(code)
    } else {
        Err(AgentError::Validation(format!("invalid currency code '{}'", raw)))
    }
}
