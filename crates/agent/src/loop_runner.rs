//! The agent reasoning loop implementation.
//!
//! An explicit two-state machine:
//!
//! ```text
//!   REASON --(tool call)--> ACT --(always)--> REASON
//!   REASON --(text only)--> DONE
//! ```
//!
//! Each REASON step is one streamed model turn. The number of REASON steps
//! per request is bounded by `max_iterations`.

use std::sync::Arc;
use faceagent_config::AppConfig;
use faceagent_core::error::{AgentError, ToolError};
use faceagent_core::message::{Message, MessageToolCall};
use faceagent_core::provider::{Provider, ProviderRequest, ToolDefinition, Usage};
use faceagent_core::session::AgentSession;
use faceagent_core::tool::{Tool, ToolCall};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::stream_event::AgentStreamEvent;

/// Loop state. DONE is represented by returning from [`AgentLoop::run`].
enum LoopState {
    Reason,
    Act(Vec<MessageToolCall>),
}

/// What one REASON step produced.
struct ReasonOutput {
    message: Message,
    usage: Option<Usage>,
}

/// Summary of a loop that reached DONE.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub iterations: u32,
    pub tool_calls_made: usize,
    pub usage: Option<Usage>,
    /// The final model-facing history, system prompt included.
    pub messages: Vec<Message>,
}

/// A running loop. Dropping it aborts the loop task.
pub struct AgentRun {
    events: mpsc::Receiver<AgentStreamEvent>,
    task: JoinHandle<()>,
}

impl AgentRun {
    /// Next event, or `None` once the loop task has gone away.
    pub async fn recv(&mut self) -> Option<AgentStreamEvent> {
        self.events.recv().await
    }
}

impl Drop for AgentRun {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Drives a provider and the single tool through REASON/ACT until DONE.
#[derive(Clone)]
pub struct AgentLoop {
    /// The LLM provider to use
    provider: Arc<dyn Provider>,

    /// The one tool the model may call
    tool: Arc<dyn Tool>,

    /// The model to use
    model: String,

    /// Temperature setting
    temperature: f32,

    /// Default max tokens per response
    max_tokens: Option<u32>,

    /// Maximum REASON steps per request
    max_iterations: u32,
}

impl AgentLoop {
    /// Create a new agent loop.
    pub fn new(
        provider: Arc<dyn Provider>,
        tool: Arc<dyn Tool>,
        model: impl Into<String>,
        temperature: f32,
    ) -> Self {
        Self {
            provider,
            tool,
            model: model.into(),
            temperature,
            max_tokens: None,
            max_iterations: 8,
        }
    }

    /// Build from application config.
    pub fn from_config(config: &AppConfig, provider: Arc<dyn Provider>, tool: Arc<dyn Tool>) -> Self {
        Self::new(provider, tool, config.model.clone(), config.temperature)
            .with_max_iterations(config.agent.max_tool_iterations)
    }

    /// Set the maximum number of REASON steps.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    /// Set the default max tokens per LLM response.
    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Run the loop on a background task and stream its events.
    ///
    /// The last event is always `Done` or `Error`, unless the run is dropped.
    pub fn run_stream(&self, session: AgentSession) -> AgentRun {
        let (tx, rx) = mpsc::channel(128);
        let agent = self.clone();

        let task = tokio::spawn(async move {
            let terminal = match agent.run(session, &tx).await {
                Ok(summary) => AgentStreamEvent::Done {
                    usage: summary.usage,
                    iterations: summary.iterations,
                    tool_calls_made: summary.tool_calls_made,
                },
                Err(AgentError::Aborted(reason)) => {
                    debug!(reason = %reason, "Agent loop aborted");
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "Agent loop failed");
                    AgentStreamEvent::Error {
                        message: e.to_string(),
                    }
                }
            };
            let _ = tx.send(terminal).await;
        });

        AgentRun { events: rx, task }
    }

    /// Run the loop to DONE, emitting token and tool events on `events`.
    pub async fn run(
        &self,
        mut session: AgentSession,
        events: &mpsc::Sender<AgentStreamEvent>,
    ) -> Result<RunSummary, AgentError> {
        let tools = vec![self.tool.to_definition()];
        let mut state = LoopState::Reason;
        let mut iterations = 0u32;
        let mut tool_calls_made = 0usize;
        let mut usage = None;

        info!(
            project_id = %session.context().project_id,
            messages = session.messages().len(),
            "Agent loop started"
        );

        loop {
            state = match state {
                LoopState::Reason => {
                    if iterations >= self.max_iterations {
                        warn!(iterations, "Max reasoning steps reached");
                        return Err(AgentError::IterationLimit {
                            max_iterations: self.max_iterations,
                        });
                    }
                    iterations += 1;
                    debug!(iteration = iterations, "REASON");

                    let output = self.reason(&session, &tools, events).await?;
                    usage = output.usage.or(usage);
                    let calls = output.message.tool_calls.clone();
                    session.push(output.message);

                    if calls.is_empty() {
                        info!(iterations, tool_calls_made, "Agent loop done");
                        return Ok(RunSummary {
                            iterations,
                            tool_calls_made,
                            usage,
                            messages: session.messages().to_vec(),
                        });
                    }
                    LoopState::Act(calls)
                }
                LoopState::Act(calls) => {
                    tool_calls_made += self.act(&mut session, calls, events).await?;
                    LoopState::Reason
                }
            };
        }
    }

    /// One streamed model turn.
    async fn reason(
        &self,
        session: &AgentSession,
        tools: &[ToolDefinition],
        events: &mpsc::Sender<AgentStreamEvent>,
    ) -> Result<ReasonOutput, AgentError> {
        let request = ProviderRequest {
            model: self.model.clone(),
            messages: session.messages().to_vec(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            tools: tools.to_vec(),
            response_format: None,
            stream: true,
        };

        let mut rx = self.provider.stream(request).await?;
        let mut content = String::new();
        let mut tool_calls = Vec::new();
        let mut usage = None;

        while let Some(chunk) = rx.recv().await {
            let chunk = chunk?;
            if let Some(text) = chunk.content.filter(|t| !t.is_empty()) {
                content.push_str(&text);
                emit(events, AgentStreamEvent::Token { content: text }).await?;
            }
            tool_calls.extend(chunk.tool_calls);
            if chunk.usage.is_some() {
                usage = chunk.usage;
            }
            if chunk.done {
                break;
            }
        }

        let mut message = Message::assistant(content);
        message.tool_calls = tool_calls;
        Ok(ReasonOutput { message, usage })
    }

    /// Execute the first tool call; reject any others so every call id
    /// still gets a result message. Returns how many calls were executed.
    async fn act(
        &self,
        session: &mut AgentSession,
        calls: Vec<MessageToolCall>,
        events: &mpsc::Sender<AgentStreamEvent>,
    ) -> Result<usize, AgentError> {
        let mut calls = calls.into_iter();
        let Some(first) = calls.next() else {
            return Ok(0);
        };

        let output = match serde_json::from_str::<serde_json::Value>(&first.arguments) {
            Ok(arguments) => {
                let call = ToolCall {
                    id: first.id.clone(),
                    name: first.name.clone(),
                    arguments,
                };
                emit(
                    events,
                    AgentStreamEvent::ToolCall {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        input: call.arguments.clone(),
                    },
                )
                .await?;

                match self.execute(&call, session).await {
                    Ok(result) => {
                        emit(
                            events,
                            AgentStreamEvent::ToolResult {
                                id: call.id.clone(),
                                name: call.name.clone(),
                                output: result.output.clone(),
                                success: result.success,
                            },
                        )
                        .await?;
                        result.output
                    }
                    Err(e) => {
                        warn!(tool = %call.name, error = %e, "Tool call rejected");
                        format!("Error: {e}")
                    }
                }
            }
            Err(e) => {
                let e = ToolError::InvalidArguments(format!("arguments are not valid JSON: {e}"));
                warn!(tool = %first.name, error = %e, "Tool call rejected");
                format!("Error: {e}")
            }
        };
        session.push(Message::tool_result(&first.id, output));

        for extra in calls {
            warn!(tool = %extra.name, id = %extra.id, "Ignoring additional tool call in the same turn");
            let e = ToolError::Rejected("only one tool call per turn is executed".into());
            session.push(Message::tool_result(&extra.id, format!("Error: {e}")));
        }

        Ok(1)
    }

    async fn execute(
        &self,
        call: &ToolCall,
        session: &AgentSession,
    ) -> Result<faceagent_core::ToolResult, ToolError> {
        if call.name != self.tool.name() {
            return Err(ToolError::NotFound(call.name.clone()));
        }
        self.tool.execute(call, session.context()).await
    }
}

/// Send an event; a closed channel means nobody is listening any more.
async fn emit(events: &mpsc::Sender<AgentStreamEvent>, event: AgentStreamEvent) -> Result<(), AgentError> {
    events
        .send(event)
        .await
        .map_err(|_| AgentError::Aborted("event receiver dropped".into()))
}
