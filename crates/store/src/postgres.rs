//! PostgreSQL chat store.
//!
//! Reads project ownership from `public.projects` and appends turns to
//! `public.project_chat_messages`. Rows are insert-only.
//!
//! # Setup
//!
//! Run `faceagent migrate` once, or apply
//! `migrations/001_create_chat_messages.sql` by hand.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::Row;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgRow};
use tracing::{debug, info};

use faceagent_core::error::StoreError;
use faceagent_core::store::{ChatStore, ChatTurn, ProjectId, TurnRole};

/// PostgreSQL-backed [`ChatStore`].
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connect a pool to `database_url`.
    ///
    /// Transaction-mode poolers (PgBouncer, the Supabase pooler) hand each
    /// transaction a different backend, so prepared statements cached on one
    /// connection are missing on the next. Keep `statement_cache_capacity`
    /// at 0 behind such a pooler.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        statement_cache_capacity: usize,
    ) -> Result<Self, StoreError> {
        let options = connect_options(database_url, statement_cache_capacity)?;
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("PostgreSQL connection failed: {e}")))?;

        info!(max_connections, statement_cache_capacity, "Connected to PostgreSQL chat store");
        Ok(Self { pool })
    }

    /// Create from an existing connection pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run the schema migration.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        let migration_sql = include_str!("../migrations/001_create_chat_messages.sql");

        sqlx::raw_sql(migration_sql)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::MigrationFailed(format!("Migration failed: {e}")))?;

        info!("Chat schema migration complete");
        Ok(())
    }

    async fn insert_turn(
        &self,
        project_id: ProjectId,
        user_id: &str,
        role: TurnRole,
        content: &str,
    ) -> Result<ChatTurn, StoreError> {
        let row = sqlx::query(INSERT_TURN_SQL)
            .bind(project_id.0)
            .bind(user_id)
            .bind(role.as_str())
            .bind(content)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to append {} turn: {e}", role.as_str())))?;

        let turn = row_to_turn(&row)?;
        debug!(project_id = %project_id, id = turn.id, role = role.as_str(), "Appended chat turn");
        Ok(turn)
    }
}

/// Parse `database_url` and apply the statement cache size.
pub fn connect_options(database_url: &str, statement_cache_capacity: usize) -> Result<PgConnectOptions, StoreError> {
    let options = PgConnectOptions::from_str(database_url)
        .map_err(|e| StoreError::Storage(format!("Invalid database URL: {e}")))?;
    Ok(options.statement_cache_capacity(statement_cache_capacity))
}

const OWNS_PROJECT_SQL: &str =
    "SELECT 1 FROM public.projects WHERE id = $1 AND user_id::text = $2 LIMIT 1";

const INSERT_TURN_SQL: &str = "INSERT INTO public.project_chat_messages (project_id, user_id, role, content) \
     VALUES ($1, $2::uuid, $3, $4) \
     RETURNING id, project_id, user_id::text AS user_id, role, content, created_at";

const RECENT_TURNS_SQL: &str = "SELECT id, project_id, user_id, role, content, created_at FROM ( \
         SELECT id, project_id, user_id::text AS user_id, role, content, created_at \
         FROM public.project_chat_messages \
         WHERE project_id = $1 \
         ORDER BY id DESC \
         LIMIT $2 \
     ) recent \
     ORDER BY id ASC";

/// Convert a database row into a ChatTurn.
fn row_to_turn(row: &PgRow) -> Result<ChatTurn, StoreError> {
    let role: String = row
        .try_get("role")
        .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
    let role = TurnRole::parse(&role)
        .ok_or_else(|| StoreError::QueryFailed(format!("unexpected role '{role}' in chat history")))?;

    let get_err = |e: sqlx::Error| StoreError::QueryFailed(e.to_string());
    Ok(ChatTurn {
        id: row.try_get("id").map_err(get_err)?,
        project_id: ProjectId(row.try_get("project_id").map_err(get_err)?),
        user_id: row.try_get("user_id").map_err(get_err)?,
        role,
        content: row.try_get("content").map_err(get_err)?,
        created_at: row.try_get("created_at").map_err(get_err)?,
    })
}

#[async_trait]
impl ChatStore for PostgresStore {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn owns_project(&self, project_id: ProjectId, user_id: &str) -> Result<bool, StoreError> {
        let row = sqlx::query(OWNS_PROJECT_SQL)
            .bind(project_id.0)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Ownership check failed: {e}")))?;
        Ok(row.is_some())
    }

    async fn append_user_turn(
        &self,
        project_id: ProjectId,
        user_id: &str,
        content: &str,
    ) -> Result<ChatTurn, StoreError> {
        self.insert_turn(project_id, user_id, TurnRole::User, content).await
    }

    async fn append_assistant_turn(
        &self,
        project_id: ProjectId,
        user_id: &str,
        content: &str,
    ) -> Result<ChatTurn, StoreError> {
        self.insert_turn(project_id, user_id, TurnRole::Assistant, content).await
    }

    async fn recent_turns(&self, project_id: ProjectId, limit: usize) -> Result<Vec<ChatTurn>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(RECENT_TURNS_SQL)
            .bind(project_id.0)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("History query failed: {e}")))?;

        rows.iter().map(row_to_turn).collect()
    }
}

// ── Unit tests (no DB required) ──────────────────────────────────────────
