//! Agent-level streaming events.
//!
//! `AgentStreamEvent` wraps provider-level stream chunks and tool activity
//! into the events the coordinator consumes. Only `token`, `done` and
//! `error` reach the client; tool events are for logging and tests.

use faceagent_core::provider::Usage;
use serde::{Deserialize, Serialize};

/// Events emitted by the agent loop while it runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentStreamEvent {
    /// Partial text token from a reasoning turn.
    Token { content: String },

    /// The agent is calling a tool.
    ToolCall {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    /// Tool execution completed.
    ToolResult {
        id: String,
        name: String,
        output: String,
        success: bool,
    },

    /// The loop reached DONE.
    Done {
        usage: Option<Usage>,
        iterations: u32,
        tool_calls_made: usize,
    },

    /// The loop stopped on an error.
    Error { message: String },
}

impl AgentStreamEvent {
    /// Event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Token { .. } => "token",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }

    /// Whether no further events follow this one.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}
