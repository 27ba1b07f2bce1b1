//! Explicit application context: every global that would otherwise live
//! behind `once_cell::Lazy` statics (store clients, the HTTP client pool)
//! becomes a field here, constructed once at startup and threaded
//! through by `Arc`. Tests build a context with in-memory store
//! implementations instead of touching process statics.

use crate::actions::{ActionExecutor, HostedActionExecutor};
use crate::agent::builtin_tools::register_builtin_tools;
use crate::clients::claude::ClaudeClient;
use crate::clients::openai::OpenAIClient;
use crate::clients::{ClientWrapper, HttpClientPool};
use crate::config::AppConfig;
use crate::embedding::{EmbeddingClient, OpenAIEmbeddingClient};
use crate::graph_rag::GraphRagPipeline;
use crate::rag::RagPipeline;
use std::sync::Arc;
use std::time::Duration;
use stores::{
    ClickHouseEventLog, EventLogStore, GraphStore, InMemoryEventLog, InMemoryGraphStore,
    InMemoryRelationalStore, InMemoryThreadStore, Neo4jGraphStore, PostgresStore, RelationalStore,
    ThreadMemoryStore,
};
use tools::ToolRegistry;

pub struct AppContext {
    pub config: AppConfig,
    pub event_log: Arc<dyn EventLogStore>,
    pub relational: Arc<dyn RelationalStore>,
    pub graph: Arc<dyn GraphStore>,
    pub memory: Arc<dyn ThreadMemoryStore>,
    pub http_pool: Arc<HttpClientPool>,
    pub embeddings: Arc<dyn EmbeddingClient>,
    pub tools: Arc<ToolRegistry>,
    pub rag: Arc<RagPipeline>,
    pub graph_rag: Arc<GraphRagPipeline>,
    pub actions: Arc<dyn ActionExecutor>,
}

impl AppContext {
    pub async fn build(config: AppConfig) -> Self {
        let http_pool = Arc::new(HttpClientPool::new(config.llm.request_timeout));

        let (event_log, relational, graph): (Arc<dyn EventLogStore>, Arc<dyn RelationalStore>, Arc<dyn GraphStore>) =
            if config.stores.use_in_memory_stores {
                (Arc::new(InMemoryEventLog::new()), Arc::new(InMemoryRelationalStore::new()), Arc::new(InMemoryGraphStore::new()))
            } else {
                let event_log: Arc<dyn EventLogStore> = Arc::new(ClickHouseEventLog::new(
                    &config.stores.clickhouse_url,
                    &config.stores.clickhouse_database,
                    config.stores.store_deadline,
                ));
                let relational: Arc<dyn RelationalStore> = match PostgresStore::connect(
                    &config.stores.postgres_dsn,
                    config.stores.postgres_max_concurrency,
                    config.stores.store_deadline,
                )
                .await
                {
                    Ok(store) => Arc::new(store),
                    Err(e) => {
                        tracing::warn!(error = %e, "postgres unavailable at startup, falling back to in-memory relational store");
                        Arc::new(InMemoryRelationalStore::new())
                    }
                };
                let graph: Arc<dyn GraphStore> = match Neo4jGraphStore::connect(
                    &config.stores.neo4j_uri,
                    &config.stores.neo4j_user,
                    &config.stores.neo4j_password,
                    config.stores.store_deadline,
                )
                .await
                {
                    Ok(store) => Arc::new(store),
                    Err(e) => {
                        tracing::warn!(error = %e, "neo4j unavailable at startup, falling back to in-memory graph store");
                        Arc::new(InMemoryGraphStore::new())
                    }
                };
                (event_log, relational, graph)
            };

        let embeddings: Arc<dyn EmbeddingClient> = Arc::new(OpenAIEmbeddingClient::new(
            &http_pool,
            &config.llm.openai.api_key,
            &config.llm.openai.base_url,
            &config.llm.embedding_model,
        ));

        let rag_llm: Arc<dyn ClientWrapper> = Arc::new(ClaudeClient::new(
            &http_pool,
            &config.llm.anthropic.api_key,
            &config.llm.anthropic.base_url,
            &config.llm.anthropic.default_model,
        ));
        let rag = Arc::new(RagPipeline::new(relational.clone(), embeddings.clone(), rag_llm.clone()));
        let graph_rag = Arc::new(GraphRagPipeline::new(relational.clone(), graph.clone(), embeddings.clone(), rag_llm));

        let actions: Arc<dyn ActionExecutor> = Arc::new(HostedActionExecutor::new(&http_pool, &config.actions.base_url, &config.actions.api_key));

        let mut registry = ToolRegistry::new();
        register_builtin_tools(
            &mut registry,
            event_log.clone(),
            relational.clone(),
            graph.clone(),
            embeddings.clone(),
            rag.clone(),
            graph_rag.clone(),
            actions.clone(),
        );

        Self {
            tools: Arc::new(registry),
            memory: Arc::new(InMemoryThreadStore::new()),
            config,
            event_log,
            relational,
            graph,
            http_pool,
            embeddings,
            rag,
            graph_rag,
            actions,
        }
    }

    /// Resolves a client for `model` using whichever provider owns that
    /// model name, matching the supervisor's per-profile model selection.
    pub fn llm_client_for(&self, provider: &str, model: &str) -> Arc<dyn ClientWrapper> {
        match provider {
            "anthropic" => Arc::new(ClaudeClient::new(&self.http_pool, &self.config.llm.anthropic.api_key, &self.config.llm.anthropic.base_url, model)),
            _ => Arc::new(OpenAIClient::new(&self.http_pool, &self.config.llm.openai.api_key, &self.config.llm.openai.base_url, model)),
        }
    }
}

/// Builds a context wired entirely to in-memory store implementations.
/// Used by unit tests in this crate and by integration tests under
/// `tests/`; never reaches a real provider or database.
pub fn test_context() -> AppContext {
    use crate::config::{IngestConfig, LlmConfig, ProviderConfig, ServerConfig, StoreConfig};
    AppContext {
        config: AppConfig {
            stores: StoreConfig {
                clickhouse_url: String::new(),
                clickhouse_database: String::new(),
                postgres_dsn: String::new(),
                neo4j_uri: String::new(),
                neo4j_user: String::new(),
                neo4j_password: String::new(),
                store_deadline: Duration::from_secs(5),
                postgres_max_concurrency: 4,
                use_in_memory_stores: true,
            },
            llm: LlmConfig {
                openai: ProviderConfig { api_key: String::new(), base_url: "http://localhost".into(), default_model: "gpt-4.1-mini".into() },
                anthropic: ProviderConfig { api_key: String::new(), base_url: "http://localhost".into(), default_model: "claude-3-5-sonnet-latest".into() },
                embedding_model: "text-embedding-3-small".into(),
                request_timeout: Duration::from_secs(5),
            },
            ingest: IngestConfig { webhook_secret: "test-secret".into(), queue_capacity: 64, max_payload_bytes: 65536 },
            server: ServerConfig { bind_addr: "127.0.0.1:0".into() },
            actions: crate::config::ActionsConfig { base_url: "http://localhost".into(), api_key: String::new() },
        },
        event_log: Arc::new(InMemoryEventLog::new()),
        relational: Arc::new(InMemoryRelationalStore::new()),
        graph: Arc::new(InMemoryGraphStore::new()),
        memory: Arc::new(InMemoryThreadStore::new()),
        http_pool: Arc::new(HttpClientPool::new(Duration::from_secs(5))),
        embeddings: Arc::new(crate::embedding::tests_support::NullEmbeddingClient),
        tools: Arc::new(ToolRegistry::new()),
        rag: Arc::new(RagPipeline::new(
            Arc::new(InMemoryRelationalStore::new()),
            Arc::new(crate::embedding::tests_support::NullEmbeddingClient),
            Arc::new(crate::clients::tests_support::EchoClient),
        )),
        graph_rag: Arc::new(GraphRagPipeline::new(
            Arc::new(InMemoryRelationalStore::new()),
            Arc::new(InMemoryGraphStore::new()),
            Arc::new(crate::embedding::tests_support::NullEmbeddingClient),
            Arc::new(crate::clients::tests_support::EchoClient),
        )),
        actions: Arc::new(crate::actions::tests_support::RecordingActionExecutor::default()),
    }
}
