use chrono::{Duration, Utc};
use monomind::{
    audit::AuditLog,
    ledger::{InMemoryLedgerStore, LedgerStore},
    llm::KeywordModel,
    EventKind, NewAccount, NewLedgerEvent, Pipeline, PipelineConfig,
};
use rust_decimal_macros::dec;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("MonoMind demo starting");

    let question = std::env::args()
        .skip(1)
        .collect::<Vec<_>>()
        .join(" ");
    let question = if question.trim().is_empty() {
        "How long will my money last?".to_string()
    } else {
        question
    };

    // Seed a small ledger
    let ledger = Arc::new(InMemoryLedgerStore::new());
    let account = ledger
        .open_account(NewAccount {
            account_id: None,
            email: "demo@monomind.local".to_string(),
            currency: Some("USD".to_string()),
        })
        .await?;

    let now = Utc::now();
    for (kind, amount, days_ago, description) in [
        (EventKind::Deposit, dec!(500), 25, "Salary"),
        (EventKind::Withdrawal, dec!(120), 12, "Groceries"),
        (EventKind::Subscription, dec!(15), 3, "Music streaming"),
    ] {
        ledger
            .append(
                NewLedgerEvent::new(account.account_id, kind, amount)
                    .at(now - Duration::days(days_ago))
                    .described(description),
            )
            .await?;
    }

    let pipeline = Pipeline::new(
        ledger,
        Arc::new(KeywordModel),
        Arc::new(AuditLog::new()),
        PipelineConfig::default(),
    );

    info!(account_id = %account.account_id, question = %question, "Running pipeline");

    match pipeline.run(account.account_id, &question).await {
        Ok(outcome) => {
            println!("\n=== MONOMIND ===");
            println!("Question: {}", question);
            println!("Intent:   {}", outcome.intent);
            println!("Answer:   {}", outcome.response);
            println!("Audit ID: {}", outcome.audit_id);
            println!("\nReasoning Trace:");
            for (i, step) in outcome.reasoning_trace.iter().enumerate() {
                println!("  {}: {}", i + 1, step);
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Pipeline failed: {}", e);
            Err(Box::new(e) as Box<dyn std::error::Error>)
        }
    }
}
