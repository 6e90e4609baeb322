//! Runtime settings read from the environment

use crate::audit::DEFAULT_AUDIT_RETENTION;
use crate::error::AgentError;
use crate::models::TimeUnit;
use crate::Result;
use std::env;
use std::time::Duration;

/// One hundred years.
pub const MAX_BURN_WINDOW_DAYS: i64 = 36_500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Ollama,
    Offline,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub project_name: String,
    pub database_url: Option<String>,
    pub llm_backend: LlmBackend,
    pub ollama_base_url: String,
    pub router_model: String,
    pub chat_model: String,
    pub llm_timeout: Duration,
    pub burn_window_days: i64,
    pub burn_rate_unit: TimeUnit,
    pub audit_retention: usize,
    pub api_port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            project_name: "MonoMind Core".to_string(),
            database_url: None,
            llm_backend: LlmBackend::Ollama,
            ollama_base_url: "http://localhost:11434".to_string(),
            router_model: "llama3.2:1b".to_string(),
            chat_model: "llama3.2:1b".to_string(),
            llm_timeout: Duration::from_secs(30),
            burn_window_days: 30,
            burn_rate_unit: TimeUnit::Month,
            audit_retention: DEFAULT_AUDIT_RETENTION,
            api_port: 8000,
        }
    }
}

impl Settings {
    /// Call `dotenv::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let llm_backend = match get("LLM_BACKEND").as_deref().map(str::trim) {
            None => defaults.llm_backend,
            Some(v) if v.eq_ignore_ascii_case("ollama") => LlmBackend::Ollama,
            Some(v) if v.eq_ignore_ascii_case("offline") => LlmBackend::Offline,
            Some(other) => {
                return Err(AgentError::Config(format!(
                    "LLM_BACKEND must be 'ollama' or 'offline', got '{}'",
                    other
                )))
            }
        };

        let llm_timeout_secs: u64 = parse_or(get("LLM_TIMEOUT_SECS"), "LLM_TIMEOUT_SECS", 30)?;
        if llm_timeout_secs == 0 {
            return Err(AgentError::Config("LLM_TIMEOUT_SECS must be positive".to_string()));
        }

        let burn_window_days: i64 = parse_or(get("BURN_WINDOW_DAYS"), "BURN_WINDOW_DAYS", 30)?;
        if burn_window_days <= 0 || burn_window_days > MAX_BURN_WINDOW_DAYS {
            return Err(AgentError::Config(format!(
                "BURN_WINDOW_DAYS must be between 1 and {}, got {}",
                MAX_BURN_WINDOW_DAYS, burn_window_days
            )));
        }

        let burn_rate_unit = match get("BURN_RATE_UNIT") {
            Some(raw) => raw.parse()?,
            None => defaults.burn_rate_unit,
        };

        let audit_retention: usize = parse_or(
            get("AUDIT_RETENTION"),
            "AUDIT_RETENTION",
            DEFAULT_AUDIT_RETENTION,
        )?;
        if audit_retention == 0 {
            return Err(AgentError::Config("AUDIT_RETENTION must be positive".to_string()));
        }

        let api_port = parse_or(get("PORT").or_else(|| get("API_PORT")), "PORT", 8000)?;

        Ok(Self {
            project_name: get("PROJECT_NAME").unwrap_or(defaults.project_name),
            database_url: database_url(&get),
            llm_backend,
            ollama_base_url: get("OLLAMA_BASE_URL").unwrap_or(defaults.ollama_base_url),
            router_model: get("ROUTER_MODEL").unwrap_or(defaults.router_model),
            chat_model: get("CHAT_MODEL").unwrap_or(defaults.chat_model),
            llm_timeout: Duration::from_secs(llm_timeout_secs),
            burn_window_days,
            burn_rate_unit,
            audit_retention,
            api_port,
        })
    }
}

/// A full URL wins; otherwise all five POSTGRES_* parts are required.
fn database_url(get: &dyn Fn(&str) -> Option<String>) -> Option<String> {
    if let Some(url) = get("DATABASE_URL").or_else(|| get("POSTGRES_URL")) {
        return Some(url);
    }

    let user = get("POSTGRES_USER")?;
    let password = get("POSTGRES_PASSWORD")?;
    let host = get("POSTGRES_HOST")?;
    let port = get("POSTGRES_PORT")?;
    let db = get("POSTGRES_DB")?;

    Some(format!(
        "postgres://{}:{}@{}:{}/{}",
        user, password, host, port, db
    ))
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| AgentError::Config(format!("{} has invalid value '{}'", key, value))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.project_name, "MonoMind Core");
        assert_eq!(s.database_url, None);
        assert_eq!(s.llm_backend, LlmBackend::Ollama);
        assert_eq!(s.burn_window_days, 30);
        assert_eq!(s.burn_rate_unit, TimeUnit::Month);
        assert_eq!(s.api_port, 8000);
        assert_eq!(s.llm_timeout, Duration::from_secs(30));
        assert_eq!(s.audit_retention, DEFAULT_AUDIT_RETENTION);
    }

    #[test]
    fn test_overrides() {
        let s = settings(&[
            ("LLM_BACKEND", "Offline"),
            ("BURN_WINDOW_DAYS", "14"),
            ("BURN_RATE_UNIT", "week"),
            ("AUDIT_RETENTION", "250"),
            ("API_PORT", "9000"),
            ("DATABASE_URL", "postgres://localhost/monomind"),
        ])
        .unwrap();

        assert_eq!(s.llm_backend, LlmBackend::Offline);
        assert_eq!(s.burn_window_days, 14);
        assert_eq!(s.burn_rate_unit, TimeUnit::Week);
        assert_eq!(s.audit_retention, 250);
        assert_eq!(s.api_port, 9000);
        assert_eq!(s.database_url.as_deref(), Some("postgres://localhost/monomind"));
    }

    #[test]
    fn test_database_url_from_parts() {
        let s = settings(&[
            ("POSTGRES_USER", "mono"),
            ("POSTGRES_PASSWORD", "secret"),
            ("POSTGRES_HOST", "db"),
            ("POSTGRES_PORT", "5432"),
            ("POSTGRES_DB", "ledger"),
        ])
        .unwrap();
        assert_eq!(
            s.database_url.as_deref(),
            Some("postgres://mono:secret@db:5432/ledger")
        );

        let partial = settings(&[("POSTGRES_USER", "mono")]).unwrap();
        assert_eq!(partial.database_url, None);
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        for vars in [
            vec![("BURN_WINDOW_DAYS", "thirty")],
            vec![("BURN_WINDOW_DAYS", "0")],
            vec![("BURN_WINDOW_DAYS", "36501")],
            vec![("BURN_WINDOW_DAYS", "1000000000")],
            vec![("AUDIT_RETENTION", "0")],
            vec![("AUDIT_RETENTION", "many")],
            vec![("BURN_RATE_UNIT", "fortnight")],
            vec![("LLM_BACKEND", "openai")],
            vec![("PORT", "70000")],
        ] {
            assert!(matches!(settings(&vars), Err(AgentError::Config(_))), "{:?}", vars);
        }
    }
}
