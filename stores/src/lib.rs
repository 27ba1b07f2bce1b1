//! Uniform store adapters: time-series event log, relational+vector
//! store, knowledge graph, and thread-scoped conversation memory.

pub mod error;
pub mod graph;
pub mod memory;
pub mod model;
pub mod relational;
pub mod time_series;

pub use error::{StoreError, StoreResult};
pub use graph::{CollaborationEdge, CollaborationEdgeKind, ExpertiseHit, GraphStore, InMemoryGraphStore, Neo4jGraphStore};
pub use memory::{InMemoryThreadStore, ThreadMemoryStore};
pub use model::SimilarEmbedding;
pub use relational::{InMemoryRelationalStore, PostgresStore, RelationalStore};
pub use time_series::{compute_developer_activity, ClickHouseEventLog, DeploymentMetrics, EventFilter, EventLogStore, InMemoryEventLog};
