//! # FaceAgent Core
//!
//! Domain types, traits, and error definitions for the FaceAgent
//! generation assistant. This crate has **no framework dependencies**: it
//! defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here: the language model
//! ([`Provider`]), the generation tool ([`Tool`]) and durable history
//! ([`ChatStore`]). Implementations live in their respective crates, so the
//! agent loop and the streaming coordinator can be tested against in-memory
//! stand-ins.

pub mod error;
pub mod message;
pub mod provider;
pub mod route;
pub mod session;
pub mod store;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{AgentError, Error, ProviderError, Result, StoreError, ToolError};
pub use message::{Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ResponseFormat, StreamChunk, ToolDefinition};
pub use route::Route;
pub use session::{AgentSession, ReferenceImages, SessionContext, MAX_REFERENCE_IMAGES};
pub use store::{ChatStore, ChatTurn, ProjectId, TurnRole};
pub use tool::{Tool, ToolCall, ToolResult};
