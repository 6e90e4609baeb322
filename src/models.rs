//! Core data models for the ledger assistant

use crate::error::AgentError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// Fractional digits kept for money and derived rates (NUMERIC(14,4)).
pub const AMOUNT_SCALE: u32 = 4;

/// Maximum significant digits of a stored amount.
pub const AMOUNT_PRECISION: u32 = 14;

//
// ================= Identifiers =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct AccountId(pub Uuid);

impl AccountId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Accepts a UUID as-is; any other non-empty string maps to a stable UUID
    /// so chat clients can keep using their own numeric user ids.
    pub fn from_external(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }

        Some(Self(
            Uuid::parse_str(value).unwrap_or_else(|_| stable_uuid_from_string(value)),
        ))
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn stable_uuid_from_string(input: &str) -> Uuid {
    use sha2::{Digest, Sha256};

    let hash = Sha256::digest(input.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);

    // Version 4 and RFC4122 variant bits.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    Uuid::from_bytes(bytes)
}

//
// ================= Event Kinds =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sign {
    Credit,
    Debit,
}

/// Closed set of ledger event kinds. Adding a kind means giving it a sign.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventKind {
    Deposit,
    Withdrawal,
    Subscription,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [
        EventKind::Deposit,
        EventKind::Withdrawal,
        EventKind::Subscription,
    ];

    pub fn sign(&self) -> Sign {
        match self {
            EventKind::Deposit => Sign::Credit,
            EventKind::Withdrawal | EventKind::Subscription => Sign::Debit,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Deposit => "DEPOSIT",
            EventKind::Withdrawal => "WITHDRAWAL",
            EventKind::Subscription => "SUBSCRIPTION",
        }
    }

    /// Apply this kind's sign to a non-negative amount.
    pub fn signed(&self, amount: Decimal) -> Decimal {
        match self.sign() {
            Sign::Credit => amount,
            Sign::Debit => -amount,
        }
    }
}

impl FromStr for EventKind {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "DEPOSIT" => Ok(EventKind::Deposit),
            "WITHDRAWAL" => Ok(EventKind::Withdrawal),
            "SUBSCRIPTION" => Ok(EventKind::Subscription),
            other => Err(AgentError::Validation(format!(
                "unknown event kind '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ================= Accounts & Events =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub account_id: AccountId,
    pub email: String,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAccount {
    pub account_id: Option<AccountId>,
    pub email: String,
    pub currency: Option<String>,
}

/// An immutable, persisted ledger event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerEvent {
    pub id: EventId,
    pub account_id: AccountId,
    pub kind: EventKind,
    pub amount: Decimal,
    pub currency: String,
    pub description: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl LedgerEvent {
    pub fn signed_amount(&self) -> Decimal {
        self.kind.signed(self.amount)
    }
}

/// An event awaiting validation and an id from the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLedgerEvent {
    pub account_id: AccountId,
    pub kind: EventKind,
    pub amount: Decimal,
    pub currency: Option<String>,
    pub description: Option<String>,
    pub occurred_at: Option<DateTime<Utc>>,
}

impl NewLedgerEvent {
    pub fn new(account_id: AccountId, kind: EventKind, amount: Decimal) -> Self {
        Self {
            account_id,
            kind,
            amount,
            currency: None,
            description: None,
            occurred_at: None,
        }
    }

    pub fn at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

//
// ================= Derived Facts =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Day,
    Week,
    Month,
}

impl TimeUnit {
    pub fn seconds(&self) -> i64 {
        match self {
            TimeUnit::Day => 86_400,
            TimeUnit::Week => 7 * 86_400,
            TimeUnit::Month => 30 * 86_400,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeUnit::Day => "day",
            TimeUnit::Week => "week",
            TimeUnit::Month => "month",
        }
    }
}

impl FromStr for TimeUnit {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "day" | "days" => Ok(TimeUnit::Day),
            "week" | "weeks" => Ok(TimeUnit::Week),
            "month" | "months" => Ok(TimeUnit::Month),
            other => Err(AgentError::Config(format!("unknown time unit '{}'", other))),
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BalanceSnapshot {
    pub account_id: AccountId,
    pub balance: Decimal,
    pub as_of: DateTime<Utc>,
    pub event_count: usize,
}

/// Signed net flow per unit of time. Negative means the account is shrinking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BurnRate {
    pub net_flow_per_unit: Decimal,
    pub unit: TimeUnit,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub event_count: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunwayEstimate {
    NoDepletion,
    Horizon { units: Decimal, unit: TimeUnit },
}

/// Runway as presented: a projection, or one of the states where no
/// horizon applies.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunwayStatus {
    Projected { units: Decimal, unit: TimeUnit },
    NoDepletion,
    Depleted,
    Unknown,
}

impl From<RunwayEstimate> for RunwayStatus {
    fn from(estimate: RunwayEstimate) -> Self {
        match estimate {
            RunwayEstimate::NoDepletion => RunwayStatus::NoDepletion,
            RunwayEstimate::Horizon { units, unit } => RunwayStatus::Projected { units, unit },
        }
    }
}

/// The closed set of computed facts handed to the presenter.
/// Holds no ledger events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FinancialFacts {
    pub currency: String,
    pub balance: Decimal,
    pub as_of: DateTime<Utc>,
    pub totals_by_kind: BTreeMap<EventKind, Decimal>,
    pub burn_rate: Option<BurnRate>,
    pub burn_window_days: i64,
    pub runway: RunwayStatus,
}

//
// ================= Intents =================
//

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    GetBalance,
    GetRunway,
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::GetBalance => "get_balance",
            Intent::GetRunway => "get_runway",
            Intent::Unknown => "unknown",
        }
    }

    /// Whether the intent needs ledger facts.
    pub fn needs_ledger(&self) -> bool {
        !matches!(self, Intent::Unknown)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ================= Pipeline Output =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatOutcome {
    pub intent: Intent,
    pub response: String,
    /// False when the facts-only fallback was used.
    pub narrated: bool,
    pub facts: Option<FinancialFacts>,
    pub audit_id: Uuid,
    pub reasoning_trace: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRecord {
    pub audit_id: Uuid,
    pub account_id: AccountId,
    pub intent: Intent,
    pub facts: Option<Arc<FinancialFacts>>,
    pub facts_hash: String,
    pub narrated: bool,
    pub reasoning_trace: Arc<Vec<String>>,
    pub created_at: DateTime<Utc>,
    pub execution_time_ms: u64,
}
