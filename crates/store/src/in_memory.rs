//! In-memory store: useful for testing and local runs without a database.

use async_trait::async_trait;
use chrono::Utc;
use faceagent_core::error::StoreError;
use faceagent_core::store::{ChatStore, ChatTurn, ProjectId, TurnRole};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    owners: HashMap<ProjectId, String>,
    turns: Vec<ChatTurn>,
    next_id: i64,
}

/// A [`ChatStore`] holding projects and turns in process memory.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
    claim_unknown: bool,
}

impl InMemoryStore {
    /// An empty store; only projects registered with [`grant`](Self::grant) exist.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store where an unknown project becomes owned by the first subject
    /// that asks about it.
    pub fn claim_on_first_use() -> Self {
        Self {
            claim_unknown: true,
            ..Self::default()
        }
    }

    /// Register `user_id` as the owner of `project_id`.
    pub async fn grant(&self, project_id: ProjectId, user_id: impl Into<String>) {
        self.inner.write().await.owners.insert(project_id, user_id.into());
    }

    /// Every stored turn, in insertion order.
    pub async fn all_turns(&self) -> Vec<ChatTurn> {
        self.inner.read().await.turns.clone()
    }

    async fn append(
        &self,
        project_id: ProjectId,
        user_id: &str,
        role: TurnRole,
        content: &str,
    ) -> Result<ChatTurn, StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.owners.contains_key(&project_id) {
            return Err(StoreError::Storage(format!("project {project_id} does not exist")));
        }
        inner.next_id += 1;
        let turn = ChatTurn {
            id: inner.next_id,
            project_id,
            user_id: user_id.to_string(),
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        inner.turns.push(turn.clone());
        Ok(turn)
    }
}

#[async_trait]
impl ChatStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn owns_project(&self, project_id: ProjectId, user_id: &str) -> Result<bool, StoreError> {
        if self.claim_unknown {
            let mut inner = self.inner.write().await;
            let owner = inner
                .owners
                .entry(project_id)
                .or_insert_with(|| user_id.to_string());
            return Ok(owner == user_id);
        }
        Ok(self
            .inner
            .read()
            .await
            .owners
            .get(&project_id)
            .is_some_and(|owner| owner == user_id))
    }

    async fn append_user_turn(
        &self,
        project_id: ProjectId,
        user_id: &str,
        content: &str,
    ) -> Result<ChatTurn, StoreError> {
        self.append(project_id, user_id, TurnRole::User, content).await
    }

    async fn append_assistant_turn(
        &self,
        project_id: ProjectId,
        user_id: &str,
        content: &str,
    ) -> Result<ChatTurn, StoreError> {
        self.append(project_id, user_id, TurnRole::Assistant, content).await
    }

    async fn recent_turns(&self, project_id: ProjectId, limit: usize) -> Result<Vec<ChatTurn>, StoreError> {
        let inner = self.inner.read().await;
        let mut recent: Vec<ChatTurn> = inner
            .turns
            .iter()
            .rev()
            .filter(|t| t.project_id == project_id)
            .take(limit)
            .cloned()
            .collect();
        recent.reverse();
        Ok(recent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ownership_is_per_subject() {
        let store = InMemoryStore::new();
        let project = ProjectId::new();
        store.grant(project, "alice").await;

        assert!(store.owns_project(project, "alice").await.unwrap());
        assert!(!store.owns_project(project, "mallory").await.unwrap());
        assert!(!store.owns_project(ProjectId::new(), "alice").await.unwrap());
    }

    #[tokio::test]
    async fn claim_on_first_use_binds_first_caller() {
        let store = InMemoryStore::claim_on_first_use();
        let project = ProjectId::new();

        assert!(store.owns_project(project, "alice").await.unwrap());
        assert!(!store.owns_project(project, "bob").await.unwrap());
        assert!(store.owns_project(project, "alice").await.unwrap());
    }

    #[tokio::test]
    async fn recent_turns_are_chronological_and_limited() {
        let store = InMemoryStore::new();
        let project = ProjectId::new();
        let other = ProjectId::new();
        store.grant(project, "u").await;
        store.grant(other, "u").await;

        for i in 0..5 {
            store.append_user_turn(project, "u", &format!("q{i}")).await.unwrap();
            store.append_assistant_turn(project, "u", &format!("a{i}")).await.unwrap();
            store.append_user_turn(other, "u", "noise").await.unwrap();
        }

        let recent = store.recent_turns(project, 3).await.unwrap();
        let contents: Vec<&str> = recent.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["a3", "q4", "a4"]);
        assert!(recent.windows(2).all(|w| w[0].id < w[1].id));
        assert_eq!(recent[0].role, TurnRole::Assistant);
    }

    #[tokio::test]
    async fn append_to_unknown_project_fails() {
        let store = InMemoryStore::new();
        let err = store.append_user_turn(ProjectId::new(), "u", "hi").await;
        assert!(matches!(err, Err(StoreError::Storage(_))));
        assert!(store.all_turns().await.is_empty());
    }
}
