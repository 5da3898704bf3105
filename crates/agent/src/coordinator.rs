//! Streaming/persistence coordinator.
//!
//! Relays token events from an [`AgentRun`] to the client and writes the
//! accumulated assistant text to the [`ChatStore`] exactly once, after the
//! stream has ended:
//!
//! | ending            | persisted            | client sees            |
//! |-------------------|----------------------|------------------------|
//! | loop done         | full text, if any    | tokens, `done`         |
//! | client disconnect | partial text, if any | nothing further        |
//! | loop error        | partial text, if any | tokens, `error`, `done`|

use std::sync::Arc;
use std::time::Instant;
use faceagent_core::store::{ChatStore, ProjectId};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::loop_runner::AgentRun;
use crate::stream_event::AgentStreamEvent;

/// Error code carried by every client-visible `error` event.
pub const STREAM_ERROR_CODE: &str = "stream_error";

/// Events delivered to the client transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ClientEvent {
    Token { content: String },
    Error { message: String, code: String },
    Done {},
}

impl ClientEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            code: STREAM_ERROR_CODE.into(),
        }
    }

    /// Event name on the wire.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Token { .. } => "token",
            Self::Error { .. } => "error",
            Self::Done {} => "done",
        }
    }

    /// JSON payload line.
    pub fn data(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".into())
    }

    /// `event: <name>\ndata: <json>\n\n`
    pub fn to_sse_frame(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.event_name(), self.data())
    }
}

/// How the stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ending {
    Completed,
    Cancelled,
    Failed(String),
}

/// What the coordinator did, for logs and tests.
#[derive(Debug, Clone)]
pub struct CoordinatorReport {
    pub ending: Ending,
    pub tokens: usize,
    pub content: String,
    pub persisted: bool,
}

/// Bridges one agent run to one client and to durable history.
pub struct Coordinator {
    store: Arc<dyn ChatStore>,
    project_id: ProjectId,
    user_id: String,
    request_id: String,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn ChatStore>,
        project_id: ProjectId,
        user_id: impl Into<String>,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            project_id,
            user_id: user_id.into(),
            request_id: request_id.into(),
        }
    }

    /// Start coordinating on a background task.
    ///
    /// The receiver is the client side; dropping it counts as a disconnect.
    pub fn spawn(self, run: AgentRun) -> (mpsc::Receiver<ClientEvent>, JoinHandle<CoordinatorReport>) {
        let (tx, rx) = mpsc::channel(64);
        let handle = tokio::spawn(self.run(run, tx));
        (rx, handle)
    }

    /// Consume `run` until it ends, forwarding to `client`.
    pub async fn run(self, mut run: AgentRun, client: mpsc::Sender<ClientEvent>) -> CoordinatorReport {
        let started = Instant::now();
        let mut content = String::new();
        let mut tokens = 0usize;

        let ending = loop {
            tokio::select! {
                biased;
                _ = client.closed() => break Ending::Cancelled,
                event = run.recv() => match event {
                    Some(AgentStreamEvent::Token { content: token }) => {
                        if client.send(ClientEvent::Token { content: token.clone() }).await.is_err() {
                            break Ending::Cancelled;
                        }
                        content.push_str(&token);
                        tokens += 1;
                    }
                    Some(AgentStreamEvent::Done { .. }) => break Ending::Completed,
                    Some(AgentStreamEvent::Error { message }) => break Ending::Failed(message),
                    Some(AgentStreamEvent::ToolCall { name, .. }) => {
                        info!(request_id = %self.request_id, tool = %name, "Tool call");
                    }
                    Some(AgentStreamEvent::ToolResult { name, success, .. }) => {
                        info!(request_id = %self.request_id, tool = %name, success, "Tool result");
                    }
                    None => break Ending::Failed("agent task ended unexpectedly".into()),
                },
            }
        };

        // The loop is finished or abandoned; stop it before writing.
        drop(run);

        let persisted = match &ending {
            Ending::Completed => {
                let persisted = self.persist(&content).await;
                let elapsed = started.elapsed().as_secs_f64();
                if tokens == 0 {
                    warn!(request_id = %self.request_id, "Zero tokens streamed");
                }
                info!(request_id = %self.request_id, elapsed_secs = elapsed, tokens, "Stream complete");
                let _ = client.send(ClientEvent::Done {}).await;
                persisted
            }
            Ending::Cancelled => {
                info!(request_id = %self.request_id, tokens, "Client disconnected");
                self.persist_shielded(&content).await
            }
            Ending::Failed(message) => {
                error!(request_id = %self.request_id, error = %message, "Stream failed");
                let persisted = self.persist(&content).await;
                let _ = client.send(ClientEvent::error(message.clone())).await;
                let _ = client.send(ClientEvent::Done {}).await;
                persisted
            }
        };

        CoordinatorReport {
            ending,
            tokens,
            content,
            persisted,
        }
    }

    /// Append the assistant turn if there is anything to write. Failures are
    /// logged only.
    async fn persist(&self, content: &str) -> bool {
        if content.is_empty() {
            return false;
        }
        write_turn(
            self.store.clone(),
            self.project_id,
            self.user_id.clone(),
            content.to_string(),
            self.request_id.clone(),
        )
        .await
    }

    /// As [`persist`](Self::persist), on its own task so that tearing down
    /// the caller cannot interrupt the write.
    async fn persist_shielded(&self, content: &str) -> bool {
        if content.is_empty() {
            return false;
        }
        let write = tokio::spawn(write_turn(
            self.store.clone(),
            self.project_id,
            self.user_id.clone(),
            content.to_string(),
            self.request_id.clone(),
        ));
        match write.await {
            Ok(persisted) => persisted,
            Err(e) => {
                error!(request_id = %self.request_id, error = %e, "Partial persistence task failed");
                false
            }
        }
    }
}

async fn write_turn(
    store: Arc<dyn ChatStore>,
    project_id: ProjectId,
    user_id: String,
    content: String,
    request_id: String,
) -> bool {
    match store.append_assistant_turn(project_id, &user_id, &content).await {
        Ok(turn) => {
            info!(request_id = %request_id, turn_id = turn.id, chars = content.len(), "Assistant turn saved");
            true
        }
        Err(e) => {
            error!(request_id = %request_id, error = %e, "Failed to save assistant turn");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loop_runner::AgentLoop;
    use crate::test_helpers::{EchoTool, FailingStore, ScriptedProvider, Step, session};
    use async_trait::async_trait;
    use faceagent_core::error::{ProviderError, StoreError};
    use faceagent_core::store::{ChatTurn, TurnRole};
    use faceagent_store::InMemoryStore;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Holds every assistant write until `release` is notified.
    struct GatedStore {
        inner: InMemoryStore,
        write_started: Notify,
        release: Notify,
    }

    #[async_trait]
    impl ChatStore for GatedStore {
        fn name(&self) -> &str {
            "gated"
        }

        async fn owns_project(&self, project_id: ProjectId, user_id: &str) -> Result<bool, StoreError> {
            self.inner.owns_project(project_id, user_id).await
        }

        async fn append_user_turn(
            &self,
            project_id: ProjectId,
            user_id: &str,
            content: &str,
        ) -> Result<ChatTurn, StoreError> {
            self.inner.append_user_turn(project_id, user_id, content).await
        }

        async fn append_assistant_turn(
            &self,
            project_id: ProjectId,
            user_id: &str,
            content: &str,
        ) -> Result<ChatTurn, StoreError> {
            self.write_started.notify_one();
            self.release.notified().await;
            self.inner.append_assistant_turn(project_id, user_id, content).await
        }

        async fn recent_turns(&self, project_id: ProjectId, limit: usize) -> Result<Vec<ChatTurn>, StoreError> {
            self.inner.recent_turns(project_id, limit).await
        }
    }

    async fn setup(turns: Vec<Vec<Step>>) -> (InMemoryStore, ProjectId, AgentRun) {
        let store = InMemoryStore::new();
        let project = ProjectId::new();
        store.grant(project, "user-1").await;
        let agent = AgentLoop::new(
            Arc::new(ScriptedProvider::new(turns)),
            Arc::new(EchoTool::default()),
            "gpt-4o",
            0.7,
        );
        let run = agent.run_stream(session(project, "hi"));
        (store, project, run)
    }

    async fn collect(mut rx: mpsc::Receiver<ClientEvent>) -> Vec<ClientEvent> {
        let mut out = Vec::new();
        while let Some(e) = rx.recv().await {
            out.push(e);
        }
        out
    }

    fn token(s: &str) -> ClientEvent {
        ClientEvent::Token { content: s.into() }
    }

    #[test]
    fn sse_framing_is_exact() {
        assert_eq!(token("Hi").to_sse_frame(), "event: token\ndata: {\"content\":\"Hi\"}\n\n");
        assert_eq!(
            ClientEvent::error("boom").to_sse_frame(),
            "event: error\ndata: {\"message\":\"boom\",\"code\":\"stream_error\"}\n\n"
        );
        assert_eq!(ClientEvent::Done {}.to_sse_frame(), "event: done\ndata: {}\n\n");
    }

    #[tokio::test]
    async fn completed_stream_persists_once_then_done() {
        let (store, project, run) = setup(vec![vec![Step::Token("Hel"), Step::Token("lo")]]).await;
        let coordinator = Coordinator::new(Arc::new(store.clone()), project, "user-1", "req1");

        let (rx, handle) = coordinator.spawn(run);
        let events = collect(rx).await;
        let report = handle.await.unwrap();

        assert_eq!(events, vec![token("Hel"), token("lo"), ClientEvent::Done {}]);
        assert_eq!(report.ending, Ending::Completed);
        assert!(report.persisted);

        let rows = store.all_turns().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].role, TurnRole::Assistant);
        assert_eq!(rows[0].content, "Hello");
        assert_eq!(rows[0].user_id, "user-1");
    }

    #[tokio::test]
    async fn zero_tokens_persists_nothing() {
        let (store, project, run) = setup(vec![vec![]]).await;
        let (rx, handle) = Coordinator::new(Arc::new(store.clone()), project, "user-1", "req2").spawn(run);

        assert_eq!(collect(rx).await, vec![ClientEvent::Done {}]);
        let report = handle.await.unwrap();
        assert_eq!(report.tokens, 0);
        assert!(!report.persisted);
        assert!(store.all_turns().await.is_empty());
    }

    #[tokio::test]
    async fn upstream_error_persists_partial_then_error_then_done() {
        let (store, project, run) = setup(vec![vec![
            Step::Token("Half an ans"),
            Step::Fail(ProviderError::StreamInterrupted("connection reset".into())),
        ]])
        .await;
        let (rx, handle) = Coordinator::new(Arc::new(store.clone()), project, "user-1", "req3").spawn(run);
        let events = collect(rx).await;

        assert_eq!(events.len(), 3);
        assert_eq!(events[0], token("Half an ans"));
        match &events[1] {
            ClientEvent::Error { message, code } => {
                assert!(message.contains("connection reset"));
                assert_eq!(code, STREAM_ERROR_CODE);
            }
            other => panic!("expected error, got {other:?}"),
        }
        assert_eq!(events[2], ClientEvent::Done {});

        assert!(matches!(handle.await.unwrap().ending, Ending::Failed(_)));
        let rows = store.all_turns().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].content, "Half an ans");
    }

    #[tokio::test]
    async fn persistence_failure_does_not_mask_error_event() {
        let agent = AgentLoop::new(
            Arc::new(ScriptedProvider::new(vec![vec![
                Step::Token("x"),
                Step::Fail(ProviderError::Network("down".into())),
            ]])),
            Arc::new(EchoTool::default()),
            "gpt-4o",
            0.7,
        );
        let project = ProjectId::new();
        let run = agent.run_stream(session(project, "hi"));
        let (rx, handle) = Coordinator::new(Arc::new(FailingStore), project, "user-1", "req4").spawn(run);

        let events = collect(rx).await;
        assert_eq!(events.len(), 3);
        assert!(matches!(events[1], ClientEvent::Error { .. }));
        assert!(!handle.await.unwrap().persisted);
    }

    #[tokio::test]
    async fn disconnect_persists_exactly_the_streamed_partial() {
        let (store, project, run) = setup(vec![vec![Step::Token("Once "), Step::Token("upon"), Step::Hang]]).await;
        let (mut rx, handle) = Coordinator::new(Arc::new(store.clone()), project, "user-1", "req5").spawn(run);

        assert_eq!(rx.recv().await, Some(token("Once ")));
        assert_eq!(rx.recv().await, Some(token("upon")));
        drop(rx);

        let report = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.ending, Ending::Cancelled);
        assert!(report.persisted);

        let rows = store.all_turns().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].content, "Once upon");
    }

    #[tokio::test]
    async fn partial_write_outlives_an_aborted_coordinator() {
        let inner = InMemoryStore::new();
        let project = ProjectId::new();
        inner.grant(project, "user-1").await;
        let store = Arc::new(GatedStore {
            inner: inner.clone(),
            write_started: Notify::new(),
            release: Notify::new(),
        });

        let agent = AgentLoop::new(
            Arc::new(ScriptedProvider::new(vec![vec![Step::Token("Once "), Step::Hang]])),
            Arc::new(EchoTool::default()),
            "gpt-4o",
            0.7,
        );
        let run = agent.run_stream(session(project, "hi"));
        let (tx, mut rx) = mpsc::channel(8);
        let coordinator = Coordinator::new(store.clone(), project, "user-1", "req8");
        let task = tokio::spawn(coordinator.run(run, tx));

        assert_eq!(rx.recv().await, Some(token("Once ")));
        drop(rx);

        // Tear the request down while the partial write is in flight.
        store.write_started.notified().await;
        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());

        store.release.notify_one();
        tokio::time::timeout(Duration::from_secs(5), async {
            while inner.all_turns().await.is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("partial turn was never written");

        let rows = inner.all_turns().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].role, TurnRole::Assistant);
        assert_eq!(rows[0].content, "Once ");
    }

    #[tokio::test]
    async fn disconnect_before_any_token_persists_nothing() {
        let (store, project, run) = setup(vec![vec![Step::Hang]]).await;
        let (rx, handle) = Coordinator::new(Arc::new(store.clone()), project, "user-1", "req6").spawn(run);
        drop(rx);

        let report = handle.await.unwrap();
        assert_eq!(report.ending, Ending::Cancelled);
        assert!(!report.persisted);
        assert!(store.all_turns().await.is_empty());
    }

    #[tokio::test]
    async fn tool_round_trip_streams_only_text() {
        let (store, project, run) = setup(vec![
            vec![Step::Token("Let me start that. "), Step::ToolCall("c1", r#"{"route":"t2i","intent":"x"}"#)],
            vec![Step::Token("Done!")],
        ])
        .await;
        let (rx, handle) = Coordinator::new(Arc::new(store.clone()), project, "user-1", "req7").spawn(run);
        let events = collect(rx).await;

        assert_eq!(
            events,
            vec![token("Let me start that. "), token("Done!"), ClientEvent::Done {}]
        );
        assert_eq!(handle.await.unwrap().content, "Let me start that. Done!");
        assert_eq!(store.all_turns().await.len(), 1);
    }
}
