//! LLM Provider implementations for FaceAgent.
//!
//! All providers implement the `faceagent_core::Provider` trait. FaceAgent
//! speaks the OpenAI chat completions dialect only.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatProvider;
