//! Postgres-backed ledger store
//!
//! Append-only is enforced by the database as well: a trigger rejects
//! UPDATE, DELETE and TRUNCATE on `ledger_events`.

use super::{prepare_account, prepare_event, LedgerStore};
use crate::error::AgentError;
use crate::models::{Account, AccountId, EventId, EventKind, LedgerEvent, NewAccount, NewLedgerEvent};
use crate::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use uuid::Uuid;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS accounts (
      account_id UUID PRIMARY KEY,
      email TEXT NOT NULL,
      currency TEXT NOT NULL CHECK (char_length(currency) = 3),
      created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );
    "#,
    r#"
    CREATE UNIQUE INDEX IF NOT EXISTS idx_accounts_email ON accounts (lower(email));
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ledger_events (
      event_id UUID PRIMARY KEY,
      seq BIGSERIAL NOT NULL,
      account_id UUID NOT NULL REFERENCES accounts (account_id),
      kind TEXT NOT NULL CHECK (kind IN ('DEPOSIT', 'WITHDRAWAL', 'SUBSCRIPTION')),
      amount NUMERIC(14, 4) NOT NULL CHECK (amount >= 0),
      currency TEXT NOT NULL,
      description VARCHAR(255),
      occurred_at TIMESTAMPTZ NOT NULL,
      recorded_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    );
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_ledger_events_account_time
    ON ledger_events (account_id, occurred_at);
    "#,
    r#"
    CREATE OR REPLACE FUNCTION ledger_events_reject_mutation() RETURNS trigger AS $$
    BEGIN
      RAISE EXCEPTION 'ledger_events is append-only';
    END;
    $$ LANGUAGE plpgsql;
    "#,
    r#"
    DROP TRIGGER IF EXISTS ledger_events_no_mutation ON ledger_events;
    "#,
    r#"
    CREATE TRIGGER ledger_events_no_mutation
    BEFORE UPDATE OR DELETE ON ledger_events
    FOR EACH ROW EXECUTE FUNCTION ledger_events_reject_mutation();
    "#,
    r#"
    DROP TRIGGER IF EXISTS ledger_events_no_truncate ON ledger_events;
    "#,
    r#"
    CREATE TRIGGER ledger_events_no_truncate
    BEFORE TRUNCATE ON ledger_events
    FOR EACH STATEMENT EXECUTE FUNCTION ledger_events_reject_mutation();
    "#,
];

#[derive(Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
    schema_ready: Arc<OnceCell<()>>,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
        }
    }

    /// Build a lazily-connecting pool; nothing touches the network until
    /// the first query.
    pub fn connect_lazy(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .connect_lazy(database_url)
            .map_err(|e| AgentError::Database(format!("Failed to configure pool: {}", e)))?;

        info!("Ledger backend: postgres");
        Ok(Self::new(pool))
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                for statement in SCHEMA {
                    sqlx::query(statement).execute(&self.pool).await?;
                }
                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| {
                AgentError::Database(format!("Failed to initialize ledger schema: {}", e))
            })?;

        Ok(())
    }
}

fn map_sqlx_error(operation: &str, error: sqlx::Error) -> AgentError {
    if let sqlx::Error::Database(db) = &error {
        match db.code().as_deref() {
            Some("23505") => {
                return AgentError::Conflict(format!("{}: duplicate record", operation));
            }
            Some("23503") => {
                return AgentError::NotFound(format!("{}: referenced account missing", operation));
            }
            Some("23514") => {
                return AgentError::Validation(format!("{}: {}", operation, db.message()));
            }
            _ => {}
        }
    }

    AgentError::Database(format!("{} failed: {}", operation, error))
}

fn account_from_row(row: &PgRow) -> Result<Account> {
    let decode = |e: sqlx::Error| AgentError::Database(format!("Failed to decode account row: {}", e));

    Ok(Account {
        account_id: AccountId(row.try_get::<Uuid, _>("account_id").map_err(decode)?),
        email: row.try_get("email").map_err(decode)?,
        currency: row.try_get("currency").map_err(decode)?,
        created_at: row.try_get("created_at").map_err(decode)?,
    })
}

fn event_from_row(row: &PgRow) -> Result<LedgerEvent> {
    let decode = |e: sqlx::Error| AgentError::Database(format!("Failed to decode event row: {}", e));

    let kind: String = row.try_get("kind").map_err(decode)?;
    let kind: EventKind = kind
        .parse()
        .map_err(|e| AgentError::Database(format!("Corrupt event kind in ledger: {}", e)))?;

    Ok(LedgerEvent {
        id: EventId(row.try_get::<Uuid, _>("event_id").map_err(decode)?),
        account_id: AccountId(row.try_get::<Uuid, _>("account_id").map_err(decode)?),
        kind,
        amount: row.try_get::<Decimal, _>("amount").map_err(decode)?.normalize(),
        currency: row.try_get("currency").map_err(decode)?,
        description: row.try_get("description").map_err(decode)?,
        occurred_at: row.try_get("occurred_at").map_err(decode)?,
    })
}

#[async_trait::async_trait]
impl LedgerStore for PostgresLedgerStore {

    async fn open_account(&self, request: NewAccount) -> Result<Account> {
        self.ensure_schema().await?;
        let account = prepare_account(request, Utc::now())?;

        sqlx::query(
            r#"
            INSERT INTO accounts (account_id, email, currency, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(account.account_id.as_uuid())
        .bind(&account.email)
        .bind(&account.currency)
        .bind(account.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("open_account", e))?;

        Ok(account)
    }

    async fn find_account(&self, account_id: AccountId) -> Result<Option<Account>> {
        self.ensure_schema().await?;

        let row = sqlx::query(
            r#"
            SELECT account_id, email, currency, created_at
            FROM accounts
            WHERE account_id = $1
            "#,
        )
        .bind(account_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_account", e))?;

        row.as_ref().map(account_from_row).transpose()
    }

    async fn append(&self, event: NewLedgerEvent) -> Result<EventId> {
        let account = self
            .find_account(event.account_id)
            .await?
            .ok_or_else(|| AgentError::NotFound(format!("account {}", event.account_id)))?;

        let event = prepare_event(event, &account, Utc::now())?;

        sqlx::query(
            r#"
            INSERT INTO ledger_events
              (event_id, account_id, kind, amount, currency, description, occurred_at)
            VALUES
              ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(event.id.0)
        .bind(event.account_id.as_uuid())
        .bind(event.kind.as_str())
        .bind(event.amount)
        .bind(&event.currency)
        .bind(&event.description)
        .bind(event.occurred_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("append", e))?;

        debug!(account_id = %event.account_id, event_id = %event.id, "Ledger event persisted");

        Ok(event.id)
    }

    async fn list_events(
        &self,
        account_id: AccountId,
        since_exclusive: Option<DateTime<Utc>>,
    ) -> Result<Vec<LedgerEvent>> {
        self.ensure_schema().await?;

        let rows = sqlx::query(
            r#"
            SELECT event_id, account_id, kind, amount, currency, description, occurred_at
            FROM ledger_events
            WHERE account_id = $1
              AND ($2::timestamptz IS NULL OR occurred_at > $2)
            ORDER BY occurred_at ASC, seq ASC
            "#,
        )
        .bind(account_id.as_uuid())
        .bind(since_exclusive)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_events", e))?;

        rows.iter().map(event_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::fmt;

    /// A server error carrying only a SQLSTATE code.
    #[derive(Debug)]
    struct SqlState {
        code: &'static str,
        message: &'static str,
    }

    impl fmt::Display for SqlState {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.message)
        }
    }

    impl std::error::Error for SqlState {}

    impl DatabaseError for SqlState {
        fn message(&self) -> &str {
            self.message
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed(self.code))
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            match self.code {
                "23505" => ErrorKind::UniqueViolation,
                "23503" => ErrorKind::ForeignKeyViolation,
                "23514" => ErrorKind::CheckViolation,
                _ => ErrorKind::Other,
            }
        }
    }

    fn server_error(code: &'static str, message: &'static str) -> sqlx::Error {
        sqlx::Error::Database(Box::new(SqlState { code, message }))
    }

    #[test]
    fn test_sqlstate_mapping() {
        let err = map_sqlx_error("open_account", server_error("23505", "duplicate key"));
        assert!(matches!(err, AgentError::Conflict(ref m) if m.starts_with("open_account")));

        let err = map_sqlx_error("append", server_error("23503", "violates foreign key"));
        assert!(matches!(err, AgentError::NotFound(_)));

        let err = map_sqlx_error("append", server_error("23514", "amount_non_negative"));
        assert!(matches!(err, AgentError::Validation(ref m) if m.contains("amount_non_negative")));

        // The append-only trigger raises a generic exception.
        let err = map_sqlx_error("append", server_error("P0001", "ledger_events is append-only"));
        assert!(matches!(err, AgentError::Database(ref m) if m.contains("append-only")));
    }

    #[test]
    fn test_non_server_errors_are_database_errors() {
        let err = map_sqlx_error("find_account", sqlx::Error::RowNotFound);
        assert!(matches!(err, AgentError::Database(ref m) if m.starts_with("find_account failed")));

        let err = map_sqlx_error("list_events", sqlx::Error::PoolTimedOut);
        assert!(matches!(err, AgentError::Database(_)));
    }
}
