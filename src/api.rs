//! REST API server for the ledger assistant
//!
//! Chat goes through the pipeline; the ledger and risk endpoints are
//! deterministic and never call the model.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::aggregator::snapshot;
use crate::error::AgentError;
use crate::models::{
    Account, AccountId, BalanceSnapshot, EventId, EventKind, FinancialFacts, Intent, NewAccount,
    NewLedgerEvent, PipelineRecord,
};
use crate::pipeline::{compute_facts, Pipeline};
use crate::risk::{FinancialProfile, PurchaseRequest, RiskAnalyzer, RiskVerdict};
use crate::Result;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub account_id: String,
    pub message: String,
    #[serde(default)]
    pub include_facts: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub email: String,
    pub currency: Option<String>,
    pub account_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTransactionRequest {
    pub account_id: String,
    pub kind: String,
    pub amount: Decimal,
    pub currency: Option<String>,
    pub description: Option<String>,
    pub occurred_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct PurchaseRiskRequest {
    pub account_id: String,
    #[serde(flatten)]
    pub purchase: PurchaseRequest,
}

/// =============================
/// Response Models
/// =============================

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub intent: Intent,
    pub response: String,
    pub narrated: bool,
    pub audit_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facts: Option<FinancialFacts>,
}

#[derive(Debug, Serialize)]
pub struct TransactionCreated {
    pub event_id: EventId,
}

#[derive(Debug, Serialize)]
pub struct BalanceView {
    pub snapshot: BalanceSnapshot,
    pub facts: FinancialFacts,
}

#[derive(Debug, Serialize)]
pub struct PurchaseRiskView {
    pub profile: FinancialProfile,
    pub verdict: RiskVerdict,
}

#[derive(Debug, Serialize)]
pub struct AuditView {
    pub record: PipelineRecord,
    pub integrity_verified: bool,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

type ApiReply = (StatusCode, Json<ApiResponse>);

pub fn status_for(error: &AgentError) -> StatusCode {
    match error {
        AgentError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        AgentError::NotFound(_) => StatusCode::NOT_FOUND,
        AgentError::Conflict(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn respond<T: Serialize>(ok: StatusCode, result: Result<T>) -> ApiReply {
    match result {
        Ok(data) => (ok, Json(ApiResponse::success(data))),
        Err(e) => {
            let status = status_for(&e);
            if status.is_server_error() {
                error!(error = %e, "Request failed");
            } else {
                warn!(error = %e, status = status.as_u16(), "Request rejected");
            }
            (status, Json(ApiResponse::error(e.to_string())))
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub pipeline: Arc<Pipeline>,
    pub service_name: String,
}

fn parse_account_id(raw: &str) -> Result<AccountId> {
    AccountId::from_external(raw)
        .ok_or_else(|| AgentError::Validation("account_id must not be empty".to_string()))
}

async fn load_account(state: &ApiState, account_id: AccountId) -> Result<Account> {
    state
        .pipeline
        .ledger()
        .find_account(account_id)
        .await?
        .ok_or_else(|| AgentError::NotFound(format!("account {} not found", account_id)))
}

/// =============================
/// Handlers
/// =============================

async fn health(State(state): State<ApiState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "operational",
        "service": state.service_name,
    }))
}

async fn chat(State(state): State<ApiState>, Json(req): Json<ChatRequest>) -> ApiReply {
    respond(StatusCode::OK, answer_chat(&state, req).await)
}

async fn answer_chat(state: &ApiState, req: ChatRequest) -> Result<ChatResponse> {
    let account_id = parse_account_id(&req.account_id)?;
    let outcome = state.pipeline.run(account_id, &req.message).await?;

    Ok(ChatResponse {
        intent: outcome.intent,
        response: outcome.response,
        narrated: outcome.narrated,
        audit_id: outcome.audit_id,
        facts: outcome.facts.filter(|_| req.include_facts),
    })
}

async fn create_account(
    State(state): State<ApiState>,
    Json(req): Json<CreateAccountRequest>,
) -> ApiReply {
    respond(StatusCode::CREATED, open_account(&state, req).await)
}

async fn open_account(state: &ApiState, req: CreateAccountRequest) -> Result<Account> {
    let account_id = req.account_id.as_deref().map(parse_account_id).transpose()?;
    let account = state
        .pipeline
        .ledger()
        .open_account(NewAccount {
            account_id,
            email: req.email,
            currency: req.currency,
        })
        .await?;

    info!(account_id = %account.account_id, "Account opened");
    Ok(account)
}

async fn create_transaction(
    State(state): State<ApiState>,
    Json(req): Json<CreateTransactionRequest>,
) -> ApiReply {
    respond(StatusCode::CREATED, append_transaction(&state, req).await)
}

async fn append_transaction(
    state: &ApiState,
    req: CreateTransactionRequest,
) -> Result<TransactionCreated> {
    let account_id = parse_account_id(&req.account_id)?;
    let kind: EventKind = req.kind.parse()?;

    let event = NewLedgerEvent {
        account_id,
        kind,
        amount: req.amount,
        currency: req.currency,
        description: req.description,
        occurred_at: req.occurred_at,
    };
    let event_id = state.pipeline.ledger().append(event).await?;

    info!(account_id = %account_id, event_id = %event_id, kind = %kind, "Ledger event appended");
    Ok(TransactionCreated { event_id })
}

async fn get_balance(State(state): State<ApiState>, Path(account_id): Path<String>) -> ApiReply {
    respond(StatusCode::OK, balance_view(&state, &account_id).await)
}

async fn balance_view(state: &ApiState, raw_account_id: &str) -> Result<BalanceView> {
    let account_id = parse_account_id(raw_account_id)?;
    let account = load_account(state, account_id).await?;
    let events = state.pipeline.ledger().list_events(account_id, None).await?;
    let now = Utc::now();
    let facts = compute_facts(&account, &events, now, state.pipeline.config())?;

    Ok(BalanceView {
        snapshot: snapshot(account_id, &events, now),
        facts,
    })
}

async fn purchase_risk(
    State(state): State<ApiState>,
    Json(req): Json<PurchaseRiskRequest>,
) -> ApiReply {
    respond(StatusCode::OK, assess_purchase(&state, req).await)
}

async fn assess_purchase(state: &ApiState, req: PurchaseRiskRequest) -> Result<PurchaseRiskView> {
    let account_id = parse_account_id(&req.account_id)?;
    load_account(state, account_id).await?;
    let events = state.pipeline.ledger().list_events(account_id, None).await?;

    let analyzer = RiskAnalyzer::new(FinancialProfile::from_ledger(&events, Utc::now()));
    let verdict = analyzer.assess(&req.purchase)?;

    info!(
        account_id = %account_id,
        item = %req.purchase.item_name,
        risky = verdict.is_risky,
        "Purchase risk assessed"
    );
    Ok(PurchaseRiskView {
        profile: *analyzer.profile(),
        verdict,
    })
}

async fn get_audit(State(state): State<ApiState>, Path(audit_id): Path<String>) -> ApiReply {
    respond(StatusCode::OK, audit_view(&state, &audit_id).await)
}

async fn audit_view(state: &ApiState, raw_audit_id: &str) -> Result<AuditView> {
    let audit_id = Uuid::parse_str(raw_audit_id.trim())
        .map_err(|e| AgentError::Validation(format!("invalid audit id: {}", e)))?;

    let audit_log = state.pipeline.audit_log();
    let record = audit_log
        .get(audit_id)
        .await?
        .ok_or_else(|| AgentError::NotFound(format!("audit record {} not found", audit_id)))?;
    let integrity_verified = audit_log.verify_integrity(audit_id).await?;

    Ok(AuditView {
        record,
        integrity_verified,
    })
}

/// =============================
/// Router
/// =============================

pub fn create_router(pipeline: Arc<Pipeline>, service_name: String) -> Router {
    let state = ApiState {
        pipeline,
        service_name,
    };

    Router::new()
        .route("/health", get(health))
        .route("/api/v1/chat", post(chat))
        .route("/api/v1/accounts", post(create_account))
        .route("/api/v1/accounts/:account_id/balance", get(get_balance))
        .route("/api/v1/transactions", post(create_transaction))
        .route("/api/v1/purchase-risk", post(purchase_risk))
        .route("/api/v1/audit/:audit_id", get(get_audit))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// =============================
/// Server Startup
/// =============================

pub async fn start_server(
    pipeline: Arc<Pipeline>,
    service_name: String,
    port: u16,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let router = create_router(pipeline, service_name);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;

    info!("API Server listening on http://0.0.0.0:{}", port);
    info!("Local: http://127.0.0.1:{}", port);

    axum::serve(listener, router).await?;

    Ok(())
}
