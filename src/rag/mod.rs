//! Self-correcting retrieval-augmented generation.
//!
//! State machine: `retrieve → grade → rewrite↺ → generate →
//! hallucination_check`. Grading and the hallucination check are LLM
//! calls; the loop bound keeps a misbehaving grader from rewriting
//! forever — at most `max_rewrites` rewrite cycles.

use crate::clients::{ClientWrapper, Message};
use crate::embedding::EmbeddingClient;
use crate::error::{PlatformError, PlatformResult};
use std::sync::Arc;
use stores::model::EmbeddingType;
use stores::{RelationalStore, SimilarEmbedding};

#[derive(Debug, Clone)]
pub struct RagAnswer {
    pub content: String,
    pub sources: Vec<SimilarEmbedding>,
    pub rewrites_used: u32,
    pub hallucination_flagged: bool,
}

pub struct RagPipeline {
    relational: Arc<dyn RelationalStore>,
    embeddings: Arc<dyn EmbeddingClient>,
    llm: Arc<dyn ClientWrapper>,
    max_rewrites: u32,
    top_k: usize,
}

impl RagPipeline {
    pub fn new(relational: Arc<dyn RelationalStore>, embeddings: Arc<dyn EmbeddingClient>, llm: Arc<dyn ClientWrapper>) -> Self {
        Self { relational, embeddings, llm, max_rewrites: 2, top_k: 5 }
    }

    pub async fn answer(&self, question: &str, embedding_type: EmbeddingType) -> PlatformResult<RagAnswer> {
        let mut query = question.to_string();
        let mut rewrites_used = 0;

        let docs = loop {
            let vector = self.embeddings.embed(&query).await?;
            let docs = self
                .relational
                .search_similar(embedding_type, &vector, self.top_k)
                .await
                .map_err(PlatformError::from)?;

            if self.grade(question, &docs).await? || rewrites_used >= self.max_rewrites {
                break docs;
            }
            query = self.rewrite(&query).await?;
            rewrites_used += 1;
        };

        let content = self.generate(question, &docs).await?;
        let hallucination_flagged = !self.grounded_in_sources(&content, &docs).await?;

        Ok(RagAnswer { content, sources: docs, rewrites_used, hallucination_flagged })
    }

    /// Returns `true` when at least one retrieved document is judged
    /// relevant to `question`.
    async fn grade(&self, question: &str, docs: &[SimilarEmbedding]) -> PlatformResult<bool> {
        if docs.is_empty() {
            return Ok(false);
        }
        let context = docs.iter().map(|d| d.content.as_str()).collect::<Vec<_>>().join("\n---\n");
        let prompt = format!(
            "Question: {question}\n\nDocuments:\n{context}\n\nReply with exactly one word, YES or NO: is at least one document relevant to answering the question?"
        );
        let reply = self.llm.send_message(&[Message::user(prompt)], None).await.map_err(|e| PlatformError::UpstreamUnavailable(e.to_string()))?;
        Ok(reply.content.to_uppercase().contains("YES"))
    }

    async fn rewrite(&self, query: &str) -> PlatformResult<String> {
        let prompt = format!("Rewrite this search query to be more specific and retrieval-friendly. Reply with only the rewritten query.\n\nQuery: {query}");
        let reply = self.llm.send_message(&[Message::user(prompt)], None).await.map_err(|e| PlatformError::UpstreamUnavailable(e.to_string()))?;
        Ok(reply.content.trim().to_string())
    }

    async fn generate(&self, question: &str, docs: &[SimilarEmbedding]) -> PlatformResult<String> {
        let context = docs
            .iter()
            .map(|d| format!("[{}] {}", d.title, d.content))
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = format!("Answer the question using only the context below. Cite sources by title.\n\nContext:\n{context}\n\nQuestion: {question}");
        let reply = self.llm.send_message(&[Message::user(prompt)], None).await.map_err(|e| PlatformError::UpstreamUnavailable(e.to_string()))?;
        Ok(reply.content.to_string())
    }

    async fn grounded_in_sources(&self, answer: &str, docs: &[SimilarEmbedding]) -> PlatformResult<bool> {
        if docs.is_empty() {
            return Ok(answer.trim().is_empty());
        }
        let context = docs.iter().map(|d| d.content.as_str()).collect::<Vec<_>>().join("\n---\n");
        let prompt = format!(
            "Context:\n{context}\n\nAnswer:\n{answer}\n\nReply with exactly one word, YES or NO: is the answer fully supported by the context?"
        );
        let reply = self.llm.send_message(&[Message::user(prompt)], None).await.map_err(|e| PlatformError::UpstreamUnavailable(e.to_string()))?;
        Ok(reply.content.to_uppercase().contains("YES"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{MessageStreamFuture, TokenUsage};
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use stores::model::Embedding;
    use stores::InMemoryRelationalStore;
    use tokio::sync::Mutex;
    use uuid::Uuid;

    struct ScriptedClient {
        replies: Vec<&'static str>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ClientWrapper for ScriptedClient {
        async fn send_message(&self, _messages: &[Message], _tools: Option<Vec<crate::clients::ToolDefinition>>) -> Result<Message, Box<dyn std::error::Error + Send + Sync>> {
            let i = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Message::assistant(*self.replies.get(i).unwrap_or(&"YES")))
        }

        fn model_name(&self) -> &str {
            "scripted"
        }

        fn usage_slot(&self) -> Option<&Mutex<Option<TokenUsage>>> {
            None
        }

        fn send_message_stream<'a>(&'a self, _m: &'a [Message], _t: Option<Vec<crate::clients::ToolDefinition>>) -> MessageStreamFuture<'a> {
            Box::pin(async { Ok(None) })
        }
    }

    #[tokio::test]
    async fn answers_when_first_retrieval_grades_relevant() {
        let relational = Arc::new(InMemoryRelationalStore::new());
        let now = Utc::now();
        relational
            .upsert_embedding(Embedding {
                id: Uuid::new_v4(),
                embedding_type: EmbeddingType::ProjectDoc,
                source_id: "doc-1".into(),
                source_table: "docs".into(),
                title: "Runbook".into(),
                content: "Restart the ingest worker to clear backlog.".into(),
                metadata: json!({}),
                embedding: vec![1.0, 0.0],
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();

        let llm = Arc::new(ScriptedClient { replies: vec!["YES", "The answer is grounded.", "YES"], calls: AtomicUsize::new(0) });
        let embeddings = Arc::new(crate::embedding::tests_support::NullEmbeddingClient);
        let pipeline = RagPipeline::new(relational, embeddings, llm);

        let answer = pipeline.answer("How do I clear the backlog?", EmbeddingType::ProjectDoc).await.unwrap();
        assert_eq!(answer.rewrites_used, 0);
        assert!(!answer.hallucination_flagged);
    }

    #[tokio::test]
    async fn rewrite_loop_is_bounded() {
        let relational = Arc::new(InMemoryRelationalStore::new());
        let llm = Arc::new(ScriptedClient { replies: vec!["NO", "query two", "NO", "query three", "NO", "final answer", "NO"], calls: AtomicUsize::new(0) });
        let embeddings = Arc::new(crate::embedding::tests_support::NullEmbeddingClient);
        let pipeline = RagPipeline::new(relational, embeddings, llm);

        let answer = pipeline.answer("anything", EmbeddingType::ProjectDoc).await.unwrap();
        assert_eq!(answer.rewrites_used, 2);
    }
}
