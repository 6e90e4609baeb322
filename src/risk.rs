//! Purchase risk assessment
//!
//! Rules-based check of whether a purchase, outright or on installments,
//! fits the account's recent cash flow. Deterministic.

use crate::aggregator::{compute_balance, events_in_window, gross_inflow, gross_outflow};
use crate::error::AgentError;
use crate::ledger::validate_amount;
use crate::models::LedgerEvent;
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Debt-to-income above this is critical.
const DTI_CRITICAL: Decimal = dec!(0.8);

const PROFILE_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct FinancialProfile {
    pub monthly_income: Decimal,
    pub monthly_expenses: Decimal,
    pub current_balance: Decimal,
}

impl FinancialProfile {
    /// Income and expenses over the trailing 30 days; balance over all events.
    pub fn from_ledger(events: &[LedgerEvent], now: DateTime<Utc>) -> Self {
        let recent = events_in_window(events, now - Duration::days(PROFILE_WINDOW_DAYS), now);

        Self {
            monthly_income: gross_inflow(&recent),
            monthly_expenses: gross_outflow(&recent),
            current_balance: compute_balance(events),
        }
    }

    pub fn free_cash_flow(&self) -> Result<Decimal> {
        checked(
            self.monthly_income.checked_sub(self.monthly_expenses),
            "free cash flow",
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseRequest {
    pub item_name: String,
    pub item_price: Decimal,
    #[serde(default)]
    pub is_credit: bool,
    #[serde(default = "default_credit_months")]
    pub credit_months: u32,
}

fn default_credit_months() -> u32 {
    1
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RiskReason {
    CriticalFunds,
    CashflowWarning,
    Safe,
    DtiCritical,
    NegativeCashflow,
    ManageableCredit,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RiskVerdict {
    pub is_risky: bool,
    pub reason: RiskReason,
    pub details: String,
}

impl RiskVerdict {
    fn new(reason: RiskReason, details: String) -> Self {
        let is_risky = !matches!(reason, RiskReason::Safe | RiskReason::ManageableCredit);
        Self {
            is_risky,
            reason,
            details,
        }
    }
}

pub struct RiskAnalyzer {
    profile: FinancialProfile,
}

impl RiskAnalyzer {
    pub fn new(profile: FinancialProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &FinancialProfile {
        &self.profile
    }

    pub fn assess(&self, request: &PurchaseRequest) -> Result<RiskVerdict> {
        if request.item_price.is_sign_negative() && !request.item_price.is_zero() {
            return Err(AgentError::Validation(format!(
                "item price must be non-negative, got {}",
                request.item_price
            )));
        }
        validate_amount(request.item_price)?;
        if request.credit_months == 0 {
            return Err(AgentError::Validation(
                "credit_months must be at least 1".to_string(),
            ));
        }

        if request.is_credit {
            self.assess_credit(request)
        } else {
            self.assess_outright(request)
        }
    }

    fn assess_outright(&self, request: &PurchaseRequest) -> Result<RiskVerdict> {
        let price = request.item_price;
        let balance = self.profile.current_balance;
        let free_cash_flow = self.profile.free_cash_flow()?;

        if price > balance {
            return Ok(RiskVerdict::new(
                RiskReason::CriticalFunds,
                format!("Insufficient funds. Balance: {}, Price: {}.", balance, price),
            ));
        }

        if price > free_cash_flow {
            let remaining = checked(free_cash_flow.checked_sub(price), "remaining cash flow")?;
            return Ok(RiskVerdict::new(
                RiskReason::CashflowWarning,
                format!(
                    "Purchase will consume all free cash flow this month. Remaining: {}.",
                    money(remaining)
                ),
            ));
        }

        Ok(RiskVerdict::new(
            RiskReason::Safe,
            "The purchase fits within the current balance and monthly cash flow.".to_string(),
        ))
    }

    fn assess_credit(&self, request: &PurchaseRequest) -> Result<RiskVerdict> {
        let payment = checked(
            request.item_price.checked_div(Decimal::from(request.credit_months)),
            "monthly payment",
        )?;
        let income = self.profile.monthly_income;
        let free_cash_flow = self.profile.free_cash_flow()?;

        if income <= Decimal::ZERO {
            return Ok(RiskVerdict::new(
                RiskReason::DtiCritical,
                "Critical risk! No recorded income to service the monthly payment.".to_string(),
            ));
        }

        // Checked before the ratio: a payment above free cash flow is
        // unaffordable even when the ratio looks acceptable.
        if free_cash_flow < payment {
            return Ok(RiskVerdict::new(
                RiskReason::NegativeCashflow,
                format!(
                    "You cannot afford the monthly payment. Free cash flow is {}, but payment is {}.",
                    money(free_cash_flow),
                    money(payment)
                ),
            ));
        }

        let new_expenses = checked(
            self.profile.monthly_expenses.checked_add(payment),
            "expenses with payment",
        )?;
        let dti = checked(new_expenses.checked_div(income), "debt-to-income ratio")?;
        if dti > DTI_CRITICAL {
            let percent = checked(dti.checked_mul(dec!(100)), "debt-to-income percentage")?;
            return Ok(RiskVerdict::new(
                RiskReason::DtiCritical,
                format!(
                    "Critical risk! With this credit, your expenses will be {}% of your income.",
                    percent.round_dp_with_strategy(1, RoundingStrategy::MidpointNearestEven)
                ),
            ));
        }

        Ok(RiskVerdict::new(
            RiskReason::ManageableCredit,
            format!("Credit is manageable. Your monthly payment will be {}.", money(payment)),
        ))
    }
}

fn checked(value: Option<Decimal>, what: &str) -> Result<Decimal> {
    value.ok_or_else(|| AgentError::Validation(format!("{} is out of range", what)))
}

fn money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
}
