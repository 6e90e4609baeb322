//! MonoMind ledger assistant
//!
//! A conversational assistant over an append-only personal ledger:
//! - Stores ledger events immutably; balances are always derived
//! - Computes balance, burn rate and runway with exact decimals
//! - Uses a language model only to classify and to narrate
//! - Falls back to facts-only answers when the model misbehaves
//! - Records every answer in a hash-verified audit trail
//!
//! PIPELINE:
//! ROUTE → FETCH → COMPUTE → PRESENT

pub mod aggregator;
pub mod api;
pub mod audit;
pub mod config;
pub mod error;
pub mod ledger;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod presenter;
pub mod risk;
pub mod router;
pub mod runway;

pub use error::Result;

// Re-export common types
pub use models::*;
pub use pipeline::{Pipeline, PipelineConfig};
