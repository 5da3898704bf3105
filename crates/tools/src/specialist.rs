//! Elaboration sub-call.
//!
//! Turns the model's terse `intent` into a concrete generation request by
//! asking the provider for a structured `{prompt, amount, model}` document
//! at zero temperature. The per-route instructions name the model
//! identifiers the downstream workflow accepts.

use faceagent_core::{Message, Provider, ProviderRequest, ResponseFormat, Route};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, warn};

const T2I_PROMPT: &str = "You are a specialist prompt-writer for text-to-image generation.

Return ONLY structured output with fields:
- prompt: string
- amount: int (>= 1). Keep amount reasonable (1-4).
- model: string. Must be EXACTLY one of: gpt4o_image

The prompt should be production-grade and specific. Do not include JSON fences or extra commentary.";

const I2I_PROMPT: &str = "You are a specialist prompt-writer for image-to-image editing.

Return ONLY structured output with fields:
- prompt: string
- amount: int (>= 1). Keep amount reasonable (1-4).
- model: string. Must be EXACTLY one of: nano_banana, nano_banana_pro

The prompt should describe the edit precisely, assuming the image(s) are provided externally. No extra commentary.";

const M2I_PROMPT: &str = "You are a specialist prompt-writer for multi-image to image generation and editing.

Return ONLY structured output with fields:
- prompt: string
- amount: int (>= 1). Keep amount reasonable (1-4).
- model: string. Must be EXACTLY one of: nano_banana_pro

The prompt should be consistent across multiple references. No extra commentary.";

const I2V_PROMPT: &str = "You are a specialist prompt-writer for image-to-video generation.

Return ONLY structured output with fields:
- prompt: string
- amount: int (>= 1). Keep amount reasonable (1-2).
- model: string. Must be EXACTLY one of: sora_kie_standard, sora_kie_hd, veo_fast, veo_standard

The prompt should describe motion and temporal edits clearly. No extra commentary.";

/// Model identifiers the workflow accepts for each route.
pub fn allowed_models(route: Route) -> &'static [&'static str] {
    match route {
        Route::T2i => &["gpt4o_image"],
        Route::I2i => &["nano_banana", "nano_banana_pro"],
        Route::M2i => &["nano_banana_pro"],
        Route::I2v => &["sora_kie_standard", "sora_kie_hd", "veo_fast", "veo_standard"],
    }
}

/// Per-route system instructions for the elaboration call.
#[derive(Debug, Clone)]
pub struct SpecialistPrompts {
    prompts: HashMap<Route, String>,
}

impl Default for SpecialistPrompts {
    fn default() -> Self {
        let prompts = [
            (Route::T2i, T2I_PROMPT),
            (Route::I2i, I2I_PROMPT),
            (Route::M2i, M2I_PROMPT),
            (Route::I2v, I2V_PROMPT),
        ]
        .into_iter()
        .map(|(route, prompt)| (route, prompt.to_string()))
        .collect();
        Self { prompts }
    }
}

impl SpecialistPrompts {
    /// Built-in prompts with configured overrides applied. An empty override
    /// removes the route.
    pub fn with_overrides(overrides: &BTreeMap<String, String>) -> Self {
        let mut prompts = Self::default();
        for (key, prompt) in overrides {
            let Ok(route) = key.parse::<Route>() else {
                warn!(key = %key, "Ignoring specialist prompt for unknown route");
                continue;
            };
            if prompt.trim().is_empty() {
                prompts.prompts.remove(&route);
            } else {
                prompts.prompts.insert(route, prompt.clone());
            }
        }
        prompts
    }

    pub fn get(&self, route: Route) -> Option<&str> {
        self.prompts.get(&route).map(String::as_str)
    }
}

/// Validated output of the elaboration call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Elaboration {
    pub prompt: String,
    pub amount: i64,
    pub model: String,
}

impl Elaboration {
    /// Check each field independently. Trimming is used for the check only.
    pub fn validate(self) -> Result<Self, SpecialistError> {
        if self.amount < 1 {
            return Err(SpecialistError::Invalid(format!("amount {} is below 1", self.amount)));
        }
        if self.model.trim().is_empty() {
            return Err(SpecialistError::Invalid("model is blank".into()));
        }
        if self.prompt.trim().is_empty() {
            return Err(SpecialistError::Invalid("prompt is blank".into()));
        }
        Ok(self)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SpecialistError {
    #[error("elaboration call failed: {0}")]
    Provider(#[from] faceagent_core::ProviderError),

    #[error("elaboration output did not parse: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("elaboration output rejected: {0}")]
    Invalid(String),
}

/// Runs the elaboration call against a provider.
#[derive(Clone)]
pub struct Specialist {
    provider: Arc<dyn Provider>,
    model: String,
}

impl Specialist {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    fn output_schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "prompt": { "type": "string", "description": "Final generation/edit prompt." },
                "amount": { "type": "integer", "description": "Number of outputs to generate. Must be >= 1." },
                "model": { "type": "string", "description": "Generation model identifier." }
            },
            "required": ["prompt", "amount", "model"],
            "additionalProperties": false
        })
    }

    pub fn request(&self, instructions: &str, intent: &str) -> ProviderRequest {
        ProviderRequest {
            model: self.model.clone(),
            messages: vec![Message::system(instructions), Message::user(intent)],
            temperature: 0.0,
            max_tokens: None,
            tools: vec![],
            response_format: Some(ResponseFormat::JsonSchema {
                name: "specialist_result".into(),
                schema: Self::output_schema(),
                strict: true,
            }),
            stream: false,
        }
    }

    /// Elaborate `intent` under `instructions`.
    pub async fn elaborate(&self, instructions: &str, intent: &str) -> Result<Elaboration, SpecialistError> {
        let response = self.provider.complete(self.request(instructions, intent)).await?;
        debug!(model = %response.model, "Elaboration returned");
        let elaboration: Elaboration = serde_json::from_str(response.message.content.trim())?;
        elaboration.validate()
    }
}
