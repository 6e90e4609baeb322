use monomind::{
    api::start_server,
    audit::AuditLog,
    config::{LlmBackend, Settings},
    ledger::{InMemoryLedgerStore, LedgerStore, PostgresLedgerStore},
    llm::{KeywordModel, LanguageModel, OllamaClient},
    Pipeline, PipelineConfig,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::from_env()?;

    info!("{} - API Server", settings.project_name);
    info!("Port: {}", settings.api_port);
    info!("Audit retention: {} records", settings.audit_retention);

    let ledger: Arc<dyn LedgerStore> = match &settings.database_url {
        Some(url) => Arc::new(PostgresLedgerStore::connect_lazy(url)?),
        None => {
            warn!("No database URL configured, using in-memory ledger (data is lost on restart)");
            Arc::new(InMemoryLedgerStore::new())
        }
    };

    let model: Arc<dyn LanguageModel> = match settings.llm_backend {
        LlmBackend::Ollama => {
            info!(
                base_url = %settings.ollama_base_url,
                router_model = %settings.router_model,
                chat_model = %settings.chat_model,
                "Using Ollama models"
            );
            Arc::new(OllamaClient::new(
                &settings.ollama_base_url,
                settings.router_model.clone(),
                settings.chat_model.clone(),
                settings.llm_timeout,
            )?)
        }
        LlmBackend::Offline => {
            info!("Using offline keyword model");
            Arc::new(KeywordModel)
        }
    };

    let pipeline = Arc::new(Pipeline::new(
        ledger,
        model,
        Arc::new(AuditLog::with_capacity(settings.audit_retention)),
        PipelineConfig::from(&settings),
    ));

    info!("Pipeline initialized");
    info!("Starting API server...");

    start_server(pipeline, settings.project_name.clone(), settings.api_port).await?;

    Ok(())
}
