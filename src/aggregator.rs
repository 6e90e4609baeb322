//! Deterministic ledger aggregation
//!
//! The trusted source of numeric truth. Exact decimal arithmetic only;
//! LLM is NOT allowed here.

use crate::error::AgentError;
use crate::models::{
    AccountId, BalanceSnapshot, BurnRate, EventKind, LedgerEvent, Sign, TimeUnit, AMOUNT_SCALE,
};
use crate::Result;
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::BTreeMap;

/// Signed sum of all events. Order independent.
pub fn compute_balance(events: &[LedgerEvent]) -> Decimal {
    events
        .iter()
        .fold(Decimal::ZERO, |acc, event| acc + event.signed_amount())
}

/// Unsigned totals per event kind; kinds with no events are absent.
pub fn totals_by_kind(events: &[LedgerEvent]) -> BTreeMap<EventKind, Decimal> {
    let mut totals = BTreeMap::new();
    for event in events {
        *totals.entry(event.kind).or_insert(Decimal::ZERO) += event.amount;
    }
    totals
}

/// Sum of credit amounts.
pub fn gross_inflow(events: &[LedgerEvent]) -> Decimal {
    sum_by_sign(events, Sign::Credit)
}

/// Sum of debit amounts, as a positive number.
pub fn gross_outflow(events: &[LedgerEvent]) -> Decimal {
    sum_by_sign(events, Sign::Debit)
}

fn sum_by_sign(events: &[LedgerEvent], sign: Sign) -> Decimal {
    events
        .iter()
        .filter(|e| e.kind.sign() == sign)
        .map(|e| e.amount)
        .sum()
}

/// Events with `occurred_at` in `[start, end)`.
pub fn events_in_window(
    events: &[LedgerEvent],
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> Vec<LedgerEvent> {
    events
        .iter()
        .filter(|e| e.occurred_at >= window_start && e.occurred_at < window_end)
        .cloned()
        .collect()
}

/// Balance of all `events` as seen at `as_of`.
pub fn snapshot(account_id: AccountId, events: &[LedgerEvent], as_of: DateTime<Utc>) -> BalanceSnapshot {
    BalanceSnapshot {
        account_id,
        balance: compute_balance(events),
        as_of,
        event_count: events.len(),
    }
}

/// Net signed flow per `unit` over `[window_start, window_end)`.
///
/// An empty window is `InsufficientData`, never a zero rate.
pub fn compute_burn_rate(
    events: &[LedgerEvent],
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
    unit: TimeUnit,
) -> Result<BurnRate> {
    if window_end <= window_start {
        return Err(AgentError::Validation(format!(
            "burn window end {} is not after start {}",
            window_end, window_start
        )));
    }

    let in_window = events_in_window(events, window_start, window_end);
    if in_window.is_empty() {
        return Err(AgentError::InsufficientData(format!(
            "no ledger events between {} and {}",
            window_start, window_end
        )));
    }

    let net_flow = compute_balance(&in_window);

    let window_millis = Decimal::from((window_end - window_start).num_milliseconds());
    let unit_millis = Decimal::from(unit.seconds() * 1000);

    // net / (window / unit), rearranged so the only inexact step is the last division.
    let rate = (net_flow * unit_millis)
        .checked_div(window_millis)
        .ok_or_else(|| AgentError::Domain("burn rate overflow".to_string()))?
        .round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointNearestEven);

    Ok(BurnRate {
        net_flow_per_unit: rate.normalize(),
        unit,
        window_start,
        window_end,
        event_count: in_window.len(),
    })
}
