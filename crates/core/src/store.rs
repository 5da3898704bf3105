//! Chat store trait: durable, append-only conversation history.
//!
//! The agent pipeline needs exactly four storage operations: an ownership
//! check, appending a user turn, appending an assistant turn, and reading the
//! most recent turns of a project in chronological order.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use crate::error::StoreError;

/// Identifier of the project (workspace) a conversation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(pub Uuid);

impl ProjectId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who authored a persisted turn. System and tool messages are never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(TurnRole::User),
            "assistant" => Some(TurnRole::Assistant),
            _ => None,
        }
    }
}

/// One persisted conversation turn. Rows are never updated after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    /// Monotonic ordering key assigned by the store
    pub id: i64,

    pub project_id: ProjectId,

    /// Subject that owns the project
    pub user_id: String,

    pub role: TurnRole,

    pub content: String,

    pub created_at: DateTime<Utc>,
}

/// The storage boundary used by the chat pipeline.
///
/// Implementations: PostgreSQL (production), in-memory (tests, local runs).
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// The backend name (e.g., "postgres", "in_memory").
    fn name(&self) -> &str;

    /// Whether `user_id` owns `project_id`.
    async fn owns_project(&self, project_id: ProjectId, user_id: &str) -> Result<bool, StoreError>;

    /// Append a user turn.
    async fn append_user_turn(
        &self,
        project_id: ProjectId,
        user_id: &str,
        content: &str,
    ) -> Result<ChatTurn, StoreError>;

    /// Append an assistant turn.
    async fn append_assistant_turn(
        &self,
        project_id: ProjectId,
        user_id: &str,
        content: &str,
    ) -> Result<ChatTurn, StoreError>;

    /// The last `limit` turns of a project, oldest first.
    async fn recent_turns(&self, project_id: ProjectId, limit: usize) -> Result<Vec<ChatTurn>, StoreError>;
}
