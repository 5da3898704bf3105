//! Tool implementations for FaceAgent.
//!
//! The agent has exactly one tool, `generate`. It elaborates the model's
//! intent with a structured sub-call ([`specialist`]) and hands the result
//! to the generation workflow ([`dispatch`]).

pub mod dispatch;
pub mod generate;
pub mod specialist;

pub use dispatch::{DispatchErrorCode, DispatchOutcome, DispatchPayload, WebhookDispatcher};
pub use generate::{GENERATE_TOOL_NAME, GenerateArgs, GenerateTool};
pub use specialist::{Elaboration, Specialist, SpecialistError, SpecialistPrompts, allowed_models};
