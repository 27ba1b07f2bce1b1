//! Runtime configuration.
//!
//! Favors manual, dependency-free construction (in the spirit of
//! `cloudllm::CloudLLMConfig`) over a config-file crate: every field is
//! read from the environment with an explicit default, no TOML/YAML
//! parsing is introduced.

use std::env;
use std::time::Duration;

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_duration_secs(key: &str, default_secs: u64) -> Duration {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(default_secs))
}

fn env_usize(key: &str, default: usize) -> usize {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub clickhouse_url: String,
    pub clickhouse_database: String,
    pub postgres_dsn: String,
    pub neo4j_uri: String,
    pub neo4j_user: String,
    pub neo4j_password: String,
    pub store_deadline: Duration,
    pub postgres_max_concurrency: usize,
    /// When true, every store falls back to its in-process implementation
    /// instead of dialing an upstream service. Used for local development
    /// and integration tests.
    pub use_in_memory_stores: bool,
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: String,
    pub base_url: String,
    pub default_model: String,
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub openai: ProviderConfig,
    pub anthropic: ProviderConfig,
    pub embedding_model: String,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub webhook_secret: String,
    pub queue_capacity: usize,
    pub max_payload_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
}

/// Credentials for the hosted action surface: issue-tracker, code-host,
/// and docs write actions a specialist can take on the user's behalf,
/// proxied through a single hosted gateway rather than one client per
/// vendor.
#[derive(Debug, Clone)]
pub struct ActionsConfig {
    pub base_url: String,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub stores: StoreConfig,
    pub llm: LlmConfig,
    pub ingest: IngestConfig,
    pub server: ServerConfig,
    pub actions: ActionsConfig,
}

impl AppConfig {
    /// Loads configuration from the process environment. Never panics on a
    /// missing optional value; required secrets that are absent surface as
    /// empty strings so callers fail at first use with a clear upstream
    /// error instead of at startup.
    pub fn from_env() -> Self {
        Self {
            stores: StoreConfig {
                clickhouse_url: env_or("CLICKHOUSE_URL", "http://localhost:8123"),
                clickhouse_database: env_or("CLICKHOUSE_DATABASE", "engintel"),
                postgres_dsn: env_or("POSTGRES_DSN", "host=localhost user=engintel dbname=engintel"),
                neo4j_uri: env_or("NEO4J_URI", "bolt://localhost:7687"),
                neo4j_user: env_or("NEO4J_USER", "neo4j"),
                neo4j_password: env::var("NEO4J_PASSWORD").unwrap_or_default(),
                store_deadline: env_duration_secs("STORE_DEADLINE_SECS", 5),
                postgres_max_concurrency: env_usize("POSTGRES_MAX_CONCURRENCY", 16),
                use_in_memory_stores: env::var("USE_IN_MEMORY_STORES")
                    .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                    .unwrap_or(false),
            },
            llm: LlmConfig {
                openai: ProviderConfig {
                    api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
                    base_url: env_or("OPENAI_BASE_URL", "https://api.openai.com/v1"),
                    default_model: env_or("OPENAI_DEFAULT_MODEL", "gpt-4.1-mini"),
                },
                anthropic: ProviderConfig {
                    api_key: env::var("ANTHROPIC_API_KEY").unwrap_or_default(),
                    base_url: env_or("ANTHROPIC_BASE_URL", "https://api.anthropic.com/v1"),
                    default_model: env_or("ANTHROPIC_DEFAULT_MODEL", "claude-3-5-sonnet-latest"),
                },
                embedding_model: env_or("EMBEDDING_MODEL", "text-embedding-3-small"),
                request_timeout: env_duration_secs("LLM_REQUEST_TIMEOUT_SECS", 60),
            },
            ingest: IngestConfig {
                webhook_secret: env::var("WEBHOOK_SECRET").unwrap_or_default(),
                queue_capacity: env_usize("INGEST_QUEUE_CAPACITY", 1024),
                max_payload_bytes: env_usize("INGEST_MAX_PAYLOAD_BYTES", 64 * 1024),
            },
            server: ServerConfig {
                bind_addr: env_or("BIND_ADDR", "0.0.0.0:8080"),
            },
            actions: ActionsConfig {
                base_url: env_or("ACTIONS_BASE_URL", "https://actions.internal"),
                api_key: env::var("ACTIONS_API_KEY").unwrap_or_default(),
            },
        }
    }
}
