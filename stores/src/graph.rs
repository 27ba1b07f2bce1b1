//! Knowledge graph adapter for the collaboration graph and Graph-RAG
//! traversal. Production backend is Neo4j via `neo4rs`.
//!
//! Nodes: `Employee`, `Project`, `Task`. Edges: `CONTRIBUTED_TO`,
//! `ASSIGNED_TO`, `REVIEWED`, `EXPERT_IN`. The adapter never fails a
//! caller outright when the graph is empty or unreachable for a given
//! project — it reports zero edges so Graph-RAG fusion can fall back to
//! vector-only ranking without a hard dependency on graph completeness.

use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashSet;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum CollaborationEdgeKind {
    ContributedTo,
    AssignedTo,
    Reviewed,
    ExpertIn,
}

impl CollaborationEdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollaborationEdgeKind::ContributedTo => "CONTRIBUTED_TO",
            CollaborationEdgeKind::AssignedTo => "ASSIGNED_TO",
            CollaborationEdgeKind::Reviewed => "REVIEWED",
            CollaborationEdgeKind::ExpertIn => "EXPERT_IN",
        }
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CollaborationEdge {
    pub from_employee_id: Uuid,
    pub to_node_id: Uuid,
    pub kind: CollaborationEdgeKind,
    pub weight: f32,
}

/// One hop of graph-derived expertise evidence.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ExpertiseHit {
    pub employee_id: Uuid,
    pub topic: String,
    /// Normalised `[0, 1]` score derived from edge weight and hop distance.
    pub graph_score: f32,
    pub path_summary: String,
}

#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn upsert_edge(&self, edge: CollaborationEdge) -> StoreResult<()>;

    async fn edges_for_employee(&self, employee_id: Uuid) -> StoreResult<Vec<CollaborationEdge>>;

    /// Employees with direct or one-hop collaboration exposure to a topic
    /// node.
    async fn find_experts(&self, topic_node_id: Uuid, limit: usize) -> StoreResult<Vec<ExpertiseHit>>;

    /// Collaborators reachable within `max_hops` of `employee_id`, used by
    /// the supervisor's "who else worked on this" tool.
    async fn collaborators(&self, employee_id: Uuid, max_hops: u32) -> StoreResult<Vec<Uuid>>;

    async fn ping(&self) -> StoreResult<()>;
}

/// In-process adjacency-list graph used in tests and as the degraded-mode
/// fallback when Neo4j is unreachable.
#[derive(Default)]
pub struct InMemoryGraphStore {
    edges: DashMap<Uuid, Vec<CollaborationEdge>>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn upsert_edge(&self, edge: CollaborationEdge) -> StoreResult<()> {
        self.edges.entry(edge.from_employee_id).or_default().push(edge);
        Ok(())
    }

    async fn edges_for_employee(&self, employee_id: Uuid) -> StoreResult<Vec<CollaborationEdge>> {
        Ok(self.edges.get(&employee_id).map(|v| v.clone()).unwrap_or_default())
    }

    async fn find_experts(&self, topic_node_id: Uuid, limit: usize) -> StoreResult<Vec<ExpertiseHit>> {
        let mut hits: Vec<ExpertiseHit> = self
            .edges
            .iter()
            .flat_map(|entry| {
                entry
                    .value()
                    .iter()
                    .filter(|e| e.to_node_id == topic_node_id && e.kind == CollaborationEdgeKind::ExpertIn)
                    .map(|e| ExpertiseHit {
                        employee_id: *entry.key(),
                        topic: topic_node_id.to_string(),
                        graph_score: e.weight.clamp(0.0, 1.0),
                        path_summary: format!("{} -[{}]-> {}", entry.key(), e.kind.as_str(), topic_node_id),
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        hits.sort_by(|a, b| b.graph_score.partial_cmp(&a.graph_score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn collaborators(&self, employee_id: Uuid, max_hops: u32) -> StoreResult<Vec<Uuid>> {
        let mut visited: HashSet<Uuid> = HashSet::new();
        let mut frontier = vec![employee_id];
        visited.insert(employee_id);
        for _ in 0..max_hops {
            let mut next = Vec::new();
            for node in &frontier {
                if let Some(edges) = self.edges.get(node) {
                    for edge in edges.value() {
                        if visited.insert(edge.to_node_id) {
                            next.push(edge.to_node_id);
                        }
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        visited.remove(&employee_id);
        Ok(visited.into_iter().collect())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Neo4j-backed graph (production configuration).
pub struct Neo4jGraphStore {
    graph: neo4rs::Graph,
    deadline: Duration,
}

impl Neo4jGraphStore {
    pub async fn connect(uri: &str, user: &str, password: &str, deadline: Duration) -> StoreResult<Self> {
        let graph = neo4rs::Graph::new(uri, user, password)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self { graph, deadline })
    }
}

#[async_trait]
impl GraphStore for Neo4jGraphStore {
    async fn upsert_edge(&self, edge: CollaborationEdge) -> StoreResult<()> {
        let query = neo4rs::query(
            "MERGE (e:Employee {id: $from_id})
             MERGE (n {id: $to_id})
             MERGE (e)-[r:RELATES {kind: $kind}]->(n)
             SET r.weight = $weight",
        )
        .param("from_id", edge.from_employee_id.to_string())
        .param("to_id", edge.to_node_id.to_string())
        .param("kind", edge.kind.as_str())
        .param("weight", edge.weight as f64);

        tokio::time::timeout(self.deadline, self.graph.run(query))
            .await
            .map_err(|_| StoreError::Timeout(self.deadline))?
            .map_err(|e| StoreError::Internal(e.to_string()))
    }

    async fn edges_for_employee(&self, employee_id: Uuid) -> StoreResult<Vec<CollaborationEdge>> {
        let query = neo4rs::query("MATCH (e:Employee {id: $id})-[r:RELATES]->(n) RETURN n.id AS to_id, r.kind AS kind, r.weight AS weight")
            .param("id", employee_id.to_string());
        let mut stream = tokio::time::timeout(self.deadline, self.graph.execute(query))
            .await
            .map_err(|_| StoreError::Timeout(self.deadline))?
            .map_err(|e| StoreError::Internal(e.to_string()))?;

        let mut edges = Vec::new();
        while let Ok(Some(row)) = stream.next().await {
            let to_id: String = row.get("to_id").unwrap_or_default();
            let kind: String = row.get("kind").unwrap_or_default();
            let weight: f64 = row.get("weight").unwrap_or(0.0);
            let Ok(to_node_id) = to_id.parse() else { continue };
            let kind = match kind.as_str() {
                "CONTRIBUTED_TO" => CollaborationEdgeKind::ContributedTo,
                "ASSIGNED_TO" => CollaborationEdgeKind::AssignedTo,
                "REVIEWED" => CollaborationEdgeKind::Reviewed,
                "EXPERT_IN" => CollaborationEdgeKind::ExpertIn,
                _ => continue,
            };
            edges.push(CollaborationEdge {
                from_employee_id: employee_id,
                to_node_id,
                kind,
                weight: weight as f32,
            });
        }
        Ok(edges)
    }

    async fn find_experts(&self, topic_node_id: Uuid, limit: usize) -> StoreResult<Vec<ExpertiseHit>> {
        let query = neo4rs::query(
            "MATCH (e:Employee)-[r:RELATES {kind: 'EXPERT_IN'}]->(n {id: $topic_id})
             RETURN e.id AS employee_id, r.weight AS weight
             ORDER BY r.weight DESC LIMIT $limit",
        )
        .param("topic_id", topic_node_id.to_string())
        .param("limit", limit as i64);
        let mut stream = tokio::time::timeout(self.deadline, self.graph.execute(query))
            .await
            .map_err(|_| StoreError::Timeout(self.deadline))?
            .map_err(|e| StoreError::Internal(e.to_string()))?;

        let mut hits = Vec::new();
        while let Ok(Some(row)) = stream.next().await {
            let employee_id_str: String = row.get("employee_id").unwrap_or_default();
            let weight: f64 = row.get("weight").unwrap_or(0.0);
            let Ok(employee_id) = employee_id_str.parse() else { continue };
            hits.push(ExpertiseHit {
                employee_id,
                topic: topic_node_id.to_string(),
                graph_score: (weight as f32).clamp(0.0, 1.0),
                path_summary: format!("{employee_id} -[EXPERT_IN]-> {topic_node_id}"),
            });
        }
        Ok(hits)
    }

    async fn collaborators(&self, employee_id: Uuid, max_hops: u32) -> StoreResult<Vec<Uuid>> {
        let query = neo4rs::query(&format!(
            "MATCH (e:Employee {{id: $id}})-[:RELATES*1..{max_hops}]-(other:Employee)
             RETURN DISTINCT other.id AS id"
        ))
        .param("id", employee_id.to_string());
        let mut stream = tokio::time::timeout(self.deadline, self.graph.execute(query))
            .await
            .map_err(|_| StoreError::Timeout(self.deadline))?
            .map_err(|e| StoreError::Internal(e.to_string()))?;

        let mut ids = Vec::new();
        while let Ok(Some(row)) = stream.next().await {
            let id_str: String = row.get("id").unwrap_or_default();
            if let Ok(id) = id_str.parse() {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    async fn ping(&self) -> StoreResult<()> {
        let query = neo4rs::query("RETURN 1");
        tokio::time::timeout(self.deadline, self.graph.execute(query))
            .await
            .map_err(|_| StoreError::Timeout(self.deadline))?
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn find_experts_ranks_by_weight_descending() {
        let store = InMemoryGraphStore::new();
        let topic = Uuid::new_v4();
        let (e1, e2) = (Uuid::new_v4(), Uuid::new_v4());
        store
            .upsert_edge(CollaborationEdge { from_employee_id: e1, to_node_id: topic, kind: CollaborationEdgeKind::ExpertIn, weight: 0.4 })
            .await
            .unwrap();
        store
            .upsert_edge(CollaborationEdge { from_employee_id: e2, to_node_id: topic, kind: CollaborationEdgeKind::ExpertIn, weight: 0.9 })
            .await
            .unwrap();
        let hits = store.find_experts(topic, 10).await.unwrap();
        assert_eq!(hits[0].employee_id, e2);
        assert_eq!(hits[1].employee_id, e1);
    }

    #[tokio::test]
    async fn collaborators_respects_hop_limit() {
        let store = InMemoryGraphStore::new();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        store
            .upsert_edge(CollaborationEdge { from_employee_id: a, to_node_id: b, kind: CollaborationEdgeKind::ContributedTo, weight: 1.0 })
            .await
            .unwrap();
        store
            .upsert_edge(CollaborationEdge { from_employee_id: b, to_node_id: c, kind: CollaborationEdgeKind::ContributedTo, weight: 1.0 })
            .await
            .unwrap();
        let one_hop = store.collaborators(a, 1).await.unwrap();
        assert_eq!(one_hop, vec![b]);
        let two_hop = store.collaborators(a, 2).await.unwrap();
        assert_eq!(two_hop.len(), 2);
    }

    #[tokio::test]
    async fn empty_graph_yields_no_experts_not_an_error() {
        let store = InMemoryGraphStore::new();
        let hits = store.find_experts(Uuid::new_v4(), 5).await.unwrap();
        assert!(hits.is_empty());
    }
}
