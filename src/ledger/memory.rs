//! In-memory ledger store for development and tests

use super::{prepare_account, prepare_event, LedgerStore};
use crate::error::AgentError;
use crate::models::{Account, AccountId, EventId, LedgerEvent, NewAccount, NewLedgerEvent};
use crate::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

pub struct InMemoryLedgerStore {
    accounts: Arc<RwLock<HashMap<AccountId, Account>>>,
    events_by_account: Arc<RwLock<HashMap<AccountId, Vec<LedgerEvent>>>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self {
            accounts: Arc::new(RwLock::new(HashMap::new())),
            events_by_account: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LedgerStore for InMemoryLedgerStore {

    async fn open_account(&self, request: NewAccount) -> Result<Account> {
        let account = prepare_account(request, Utc::now())?;

        let mut accounts = self.accounts.write().await;

        if accounts.contains_key(&account.account_id) {
            return Err(AgentError::Conflict(format!(
                "account {} already exists",
                account.account_id
            )));
        }
        if accounts.values().any(|a| a.email.eq_ignore_ascii_case(&account.email)) {
            return Err(AgentError::Conflict(
                "account with this email already exists".to_string(),
            ));
        }

        accounts.insert(account.account_id, account.clone());
        Ok(account)
    }

    async fn find_account(&self, account_id: AccountId) -> Result<Option<Account>> {
        let accounts = self.accounts.read().await;
        Ok(accounts.get(&account_id).cloned())
    }

    async fn append(&self, event: NewLedgerEvent) -> Result<EventId> {
        let account = self
            .find_account(event.account_id)
            .await?
            .ok_or_else(|| AgentError::NotFound(format!("account {}", event.account_id)))?;

        let event = prepare_event(event, &account, Utc::now())?;
        let event_id = event.id;

        debug!(
            account_id = %event.account_id,
            event_id = %event_id,
            kind = %event.kind,
            "Appending ledger event"
        );

        let mut events = self.events_by_account.write().await;
        events.entry(event.account_id).or_default().push(event);

        Ok(event_id)
    }

    async fn list_events(
        &self,
        account_id: AccountId,
        since_exclusive: Option<DateTime<Utc>>,
    ) -> Result<Vec<LedgerEvent>> {
        let events = self.events_by_account.read().await;

        let mut selected: Vec<LedgerEvent> = events
            .get(&account_id)
            .map(|list| {
                list.iter()
                    .filter(|e| since_exclusive.map_or(true, |since| e.occurred_at > since))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        // Stable sort keeps insertion order among equal timestamps.
        selected.sort_by_key(|e| e.occurred_at);

        Ok(selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::compute_balance;
    use crate::models::EventKind;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    async fn open(store: &InMemoryLedgerStore, email: &str) -> AccountId {
        store
            .open_account(NewAccount {
                account_id: None,
                email: email.to_string(),
                currency: None,
            })
            .await
            .unwrap()
            .account_id
    }

    #[tokio::test]
    async fn test_list_events_orders_by_occurrence() {
        let store = InMemoryLedgerStore::new();
        let id = open(&store, "a@example.com").await;
        let now = Utc::now();

        store
            .append(NewLedgerEvent::new(id, EventKind::Withdrawal, dec!(20)).at(now))
            .await
            .unwrap();
        store
            .append(NewLedgerEvent::new(id, EventKind::Deposit, dec!(100)).at(now - Duration::days(2)))
            .await
            .unwrap();

        let events = store.list_events(id, None).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::Deposit);
        assert_eq!(events[1].kind, EventKind::Withdrawal);
    }

    #[tokio::test]
    async fn test_since_is_exclusive() {
        let store = InMemoryLedgerStore::new();
        let id = open(&store, "a@example.com").await;
        let t0 = Utc::now() - Duration::days(10);

        for offset in 0..3 {
            store
                .append(
                    NewLedgerEvent::new(id, EventKind::Deposit, dec!(1))
                        .at(t0 + Duration::days(offset)),
                )
                .await
                .unwrap();
        }

        let events = store.list_events(id, Some(t0)).await.unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.occurred_at > t0));
    }

    #[tokio::test]
    async fn test_append_to_unknown_account_fails() {
        let store = InMemoryLedgerStore::new();
        let err = store
            .append(NewLedgerEvent::new(AccountId::new(), EventKind::Deposit, dec!(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rejected_event_is_not_written() {
        let store = InMemoryLedgerStore::new();
        let id = open(&store, "a@example.com").await;

        let result = store
            .append(NewLedgerEvent::new(id, EventKind::Deposit, dec!(-5)))
            .await;
        assert!(matches!(result, Err(AgentError::Validation(_))));
        assert!(store.list_events(id, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_email_conflicts() {
        let store = InMemoryLedgerStore::new();
        open(&store, "dup@example.com").await;

        let err = store
            .open_account(NewAccount {
                account_id: None,
                email: "DUP@example.com".to_string(),
                currency: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_append_is_isolated_per_account() {
        let store = InMemoryLedgerStore::new();
        let alice = open(&store, "alice@example.com").await;
        let bob = open(&store, "bob@example.com").await;

        store
            .append(NewLedgerEvent::new(alice, EventKind::Deposit, dec!(50)))
            .await
            .unwrap();
        let before = compute_balance(&store.list_events(alice, None).await.unwrap());

        store
            .append(NewLedgerEvent::new(bob, EventKind::Withdrawal, dec!(30)))
            .await
            .unwrap();
        let after = compute_balance(&store.list_events(alice, None).await.unwrap());

        assert_eq!(before, after);
        assert_eq!(compute_balance(&store.list_events(bob, None).await.unwrap()), dec!(-30));
    }
}
