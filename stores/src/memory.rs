//! Thread-scoped conversation memory, grounded on a hash-chained thought
//! log and context trimming strategy, simplified to a flat append-only
//! message list per thread.

use crate::error::{StoreError, StoreResult};
use crate::model::{ConversationThread, ThreadMessage, ThreadRole};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

#[async_trait]
pub trait ThreadMemoryStore: Send + Sync {
    async fn new_thread(&self, title: String) -> StoreResult<ConversationThread>;
    async fn list_threads(&self) -> StoreResult<Vec<ConversationThread>>;
    async fn get_thread(&self, thread_id: Uuid) -> StoreResult<ConversationThread>;
    async fn append_message(&self, thread_id: Uuid, message: ThreadMessage) -> StoreResult<()>;
    async fn delete_thread(&self, thread_id: Uuid) -> StoreResult<()>;

    /// Returns the subset of `messages` to send to the model: the system
    /// prompt (if present) plus the most recent messages that fit within
    /// `max_tokens`, estimated at 4 characters per token.
    /// Never splits a user/assistant/tool exchange — trimming always
    /// drops from the oldest complete exchange first.
    async fn trim_for_context(&self, thread_id: Uuid, max_tokens: usize) -> StoreResult<Vec<ThreadMessage>>;
}

fn estimate_tokens(message: &ThreadMessage) -> usize {
    (message.content.len() / 4).max(1)
}

/// Groups messages into exchanges so trimming never cuts a triplet in
/// half: a leading system message stands alone, then each user message
/// and everything up to (but not including) the next user message forms
/// one exchange.
fn group_exchanges(messages: &[ThreadMessage]) -> Vec<Vec<&ThreadMessage>> {
    let mut groups: Vec<Vec<&ThreadMessage>> = Vec::new();
    for message in messages {
        match message.role {
            ThreadRole::System => groups.push(vec![message]),
            ThreadRole::User => groups.push(vec![message]),
            ThreadRole::Assistant | ThreadRole::Tool => {
                if let Some(last) = groups.last_mut() {
                    last.push(message);
                } else {
                    groups.push(vec![message]);
                }
            }
        }
    }
    groups
}

pub fn trim_messages(messages: &[ThreadMessage], max_tokens: usize) -> Vec<ThreadMessage> {
    let groups = group_exchanges(messages);
    let system: Vec<&ThreadMessage> = groups
        .first()
        .filter(|g| g.first().map(|m| m.role == ThreadRole::System).unwrap_or(false))
        .cloned()
        .unwrap_or_default();
    let system_tokens: usize = system.iter().map(|m| estimate_tokens(m)).sum();

    let rest_start = if system.is_empty() { 0 } else { 1 };
    let mut budget = max_tokens.saturating_sub(system_tokens);
    let mut kept: Vec<&Vec<&ThreadMessage>> = Vec::new();
    for group in groups[rest_start..].iter().rev() {
        let group_tokens: usize = group.iter().map(|m| estimate_tokens(m)).sum();
        if group_tokens > budget && !kept.is_empty() {
            break;
        }
        budget = budget.saturating_sub(group_tokens);
        kept.push(group);
    }
    kept.reverse();

    system
        .into_iter()
        .chain(kept.into_iter().flatten().copied())
        .cloned()
        .collect()
}

#[derive(Default)]
pub struct InMemoryThreadStore {
    threads: DashMap<Uuid, Arc<Mutex<ConversationThread>>>,
}

impl InMemoryThreadStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ThreadMemoryStore for InMemoryThreadStore {
    async fn new_thread(&self, title: String) -> StoreResult<ConversationThread> {
        let now = Utc::now();
        let thread = ConversationThread {
            thread_id: Uuid::new_v4(),
            title,
            created_at: now,
            last_active: now,
            messages: Vec::new(),
        };
        self.threads.insert(thread.thread_id, Arc::new(Mutex::new(thread.clone())));
        Ok(thread)
    }

    async fn list_threads(&self) -> StoreResult<Vec<ConversationThread>> {
        let mut threads = Vec::new();
        for entry in self.threads.iter() {
            threads.push(entry.value().lock().await.clone());
        }
        threads.sort_by_key(|t| std::cmp::Reverse(t.last_active));
        Ok(threads)
    }

    async fn get_thread(&self, thread_id: Uuid) -> StoreResult<ConversationThread> {
        let entry = self
            .threads
            .get(&thread_id)
            .ok_or_else(|| StoreError::NotFound(format!("thread {thread_id}")))?;
        let result = entry.value().lock().await.clone();
        Ok(result)
    }

    async fn append_message(&self, thread_id: Uuid, message: ThreadMessage) -> StoreResult<()> {
        let entry = self
            .threads
            .get(&thread_id)
            .ok_or_else(|| StoreError::NotFound(format!("thread {thread_id}")))?;
        let mut thread = entry.value().lock().await;
        thread.last_active = Utc::now();
        thread.messages.push(message);
        Ok(())
    }

    async fn delete_thread(&self, thread_id: Uuid) -> StoreResult<()> {
        self.threads
            .remove(&thread_id)
            .ok_or_else(|| StoreError::NotFound(format!("thread {thread_id}")))?;
        Ok(())
    }

    async fn trim_for_context(&self, thread_id: Uuid, max_tokens: usize) -> StoreResult<Vec<ThreadMessage>> {
        let thread = self.get_thread(thread_id).await?;
        Ok(trim_messages(&thread.messages, max_tokens))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(role: ThreadRole, content: &str) -> ThreadMessage {
        ThreadMessage {
            role,
            content: content.to_string(),
            model_used: None,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn append_and_trim_preserves_system_prompt() {
        let store = InMemoryThreadStore::new();
        let thread = store.new_thread("t".into()).await.unwrap();
        store.append_message(thread.thread_id, msg(ThreadRole::System, "be terse")).await.unwrap();
        for i in 0..20 {
            store
                .append_message(thread.thread_id, msg(ThreadRole::User, &format!("question {i} {}", "x".repeat(200))))
                .await
                .unwrap();
            store
                .append_message(thread.thread_id, msg(ThreadRole::Assistant, &format!("answer {i} {}", "y".repeat(200))))
                .await
                .unwrap();
        }
        let trimmed = store.trim_for_context(thread.thread_id, 300).await.unwrap();
        assert_eq!(trimmed.first().unwrap().role, ThreadRole::System);
        assert!(trimmed.len() < 41);
    }

    #[tokio::test]
    async fn trim_never_splits_an_exchange() {
        let messages = vec![
            msg(ThreadRole::User, &"a".repeat(40)),
            msg(ThreadRole::Assistant, &"b".repeat(40)),
            msg(ThreadRole::Tool, &"c".repeat(40)),
        ];
        let trimmed = trim_messages(&messages, 15);
        assert!(trimmed.is_empty() || trimmed.len() == 3);
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() {
        let store = InMemoryThreadStore::new();
        let thread = store.new_thread("t".into()).await.unwrap();
        store.delete_thread(thread.thread_id).await.unwrap();
        assert!(store.get_thread(thread.thread_id).await.is_err());
    }
}
