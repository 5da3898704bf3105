//! The canvas agent: reasoning loop and stream coordination.
//!
//! A request flows through two pieces:
//!
//! 1. [`AgentLoop`] drives the model through **REASON → ACT → REASON … →
//!    DONE**, calling the `generate` tool whenever a turn asks for it, and
//!    emits [`AgentStreamEvent`]s.
//! 2. [`Coordinator`] relays token events to the client and persists the
//!    assistant's text exactly once, however the stream ends.
//!
//! The loop is bounded by a maximum number of REASON steps.

pub mod coordinator;
pub mod history;
pub mod loop_runner;
pub mod prompts;
pub mod stream_event;

#[cfg(test)]
mod test_helpers;

pub use coordinator::{ClientEvent, Coordinator, CoordinatorReport, Ending, STREAM_ERROR_CODE};
pub use history::history_from_turns;
pub use loop_runner::{AgentLoop, AgentRun, RunSummary};
pub use prompts::SYSTEM_PROMPT;
pub use stream_event::AgentStreamEvent;
