//! Shared test helpers for agent tests.

use async_trait::async_trait;
use faceagent_core::error::{ProviderError, StoreError, ToolError};
use faceagent_core::message::MessageToolCall;
use faceagent_core::provider::{ChunkReceiver, Provider, ProviderRequest, ProviderResponse, StreamChunk};
use faceagent_core::store::{ChatStore, ChatTurn, ProjectId};
use faceagent_core::tool::{Tool, ToolCall, ToolResult};
use faceagent_core::{MAX_REFERENCE_IMAGES, AgentSession, ReferenceImages, SessionContext};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;

/// One step of a scripted streaming turn.
#[derive(Clone)]
pub enum Step {
    Token(&'static str),
    ToolCall(&'static str, &'static str),
    Fail(ProviderError),
    /// Keep the stream open until the consumer drops it.
    Hang,
}

/// A provider that streams pre-scripted turns, one per `stream` call.
///
/// Once the script is exhausted every further turn is an empty answer.
pub struct ScriptedProvider {
    turns: Mutex<VecDeque<Vec<Step>>>,
    requests: Mutex<Vec<ProviderRequest>>,
    hang_released: Arc<Notify>,
}

impl ScriptedProvider {
    pub fn new(turns: Vec<Vec<Step>>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            requests: Mutex::new(Vec::new()),
            hang_released: Arc::new(Notify::new()),
        }
    }

    /// Notified when a [`Step::Hang`] stream loses its consumer.
    pub fn hang_released(&self) -> Arc<Notify> {
        self.hang_released.clone()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::NotConfigured("scripted provider only streams".into()))
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let steps = self.turns.lock().unwrap().pop_front().unwrap_or_default();
        let (tx, rx) = tokio::sync::mpsc::channel(16);
        let hang_released = self.hang_released.clone();

        tokio::spawn(async move {
            let mut tool_calls = Vec::new();
            for step in steps {
                match step {
                    Step::Token(t) => {
                        let chunk = StreamChunk {
                            content: Some(t.into()),
                            ..StreamChunk::default()
                        };
                        if tx.send(Ok(chunk)).await.is_err() {
                            return;
                        }
                    }
                    Step::ToolCall(id, arguments) => tool_calls.push(MessageToolCall {
                        id: id.into(),
                        name: "generate".into(),
                        arguments: arguments.into(),
                    }),
                    Step::Fail(e) => {
                        let _ = tx.send(Err(e)).await;
                        return;
                    }
                    Step::Hang => {
                        tx.closed().await;
                        hang_released.notify_one();
                        return;
                    }
                }
            }
            let _ = tx
                .send(Ok(StreamChunk {
                    tool_calls,
                    done: true,
                    ..StreamChunk::default()
                }))
                .await;
        });

        Ok(rx)
    }
}

/// A `generate` stand-in that echoes the server-owned project id.
#[derive(Default)]
pub struct EchoTool {
    pub calls: AtomicUsize,
}

impl EchoTool {
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tool for EchoTool {
    fn name(&self) -> &str {
        "generate"
    }

    fn description(&self) -> &str {
        "Echo"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object" })
    }

    async fn execute(&self, call: &ToolCall, context: &SessionContext) -> Result<ToolResult, ToolError> {
        if call.name != "generate" {
            return Err(ToolError::NotFound(call.name.clone()));
        }
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ToolResult {
            call_id: call.id.clone(),
            success: true,
            output: serde_json::json!({ "ok": true, "project_id": context.project_id }).to_string(),
        })
    }
}

/// A store whose writes always fail.
pub struct FailingStore;

#[async_trait]
impl ChatStore for FailingStore {
    fn name(&self) -> &str {
        "failing"
    }

    async fn owns_project(&self, _project_id: ProjectId, _user_id: &str) -> Result<bool, StoreError> {
        Ok(true)
    }

    async fn append_user_turn(&self, _: ProjectId, _: &str, _: &str) -> Result<ChatTurn, StoreError> {
        Err(StoreError::Storage("disk on fire".into()))
    }

    async fn append_assistant_turn(&self, _: ProjectId, _: &str, _: &str) -> Result<ChatTurn, StoreError> {
        Err(StoreError::Storage("disk on fire".into()))
    }

    async fn recent_turns(&self, _: ProjectId, _: usize) -> Result<Vec<ChatTurn>, StoreError> {
        Ok(vec![])
    }
}

pub fn session(project_id: ProjectId, input: &str) -> AgentSession {
    AgentSession::new(
        "You are a canvas assistant.",
        SessionContext {
            project_id,
            selected_ids: vec![],
            requested_aspect: None,
        },
        vec![],
        input,
        ReferenceImages::capped(vec![], MAX_REFERENCE_IMAGES),
    )
}
