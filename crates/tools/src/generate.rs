//! The `generate` tool: the only tool the canvas agent can call.
//!
//! The model supplies `route` and `intent`. Project id, selected nodes and
//! the aspect hint come from the [`SessionContext`]; [`GenerateArgs`] has no
//! field for them.

use async_trait::async_trait;
use faceagent_config::AppConfig;
use faceagent_core::error::ToolError;
use faceagent_core::tool::{Tool, ToolCall, ToolResult};
use faceagent_core::{Error, Provider, Route, SessionContext};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::dispatch::{DispatchErrorCode, DispatchOutcome, DispatchPayload, WebhookDispatcher};
use crate::specialist::{Specialist, SpecialistPrompts};

/// Tool name advertised to the model.
pub const GENERATE_TOOL_NAME: &str = "generate";

/// Arguments the model is allowed to supply.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GenerateArgs {
    pub route: Route,
    pub intent: String,
}

pub struct GenerateTool {
    specialist: Specialist,
    prompts: SpecialistPrompts,
    dispatcher: WebhookDispatcher,
}

impl GenerateTool {
    pub fn new(specialist: Specialist, prompts: SpecialistPrompts, dispatcher: WebhookDispatcher) -> Self {
        Self {
            specialist,
            prompts,
            dispatcher,
        }
    }

    /// Wire the tool from configuration, sharing the reasoning provider.
    pub fn from_config(config: &AppConfig, provider: Arc<dyn Provider>) -> Result<Self, Error> {
        let dispatcher = WebhookDispatcher::new(config.webhook.url.clone(), config.webhook.timeout())?;
        if !dispatcher.is_configured() {
            warn!("No generation webhook configured; generate calls will fail with missing_webhook_url");
        }
        Ok(Self::new(
            Specialist::new(provider, config.model.clone()),
            SpecialistPrompts::with_overrides(&config.specialist_prompts),
            dispatcher,
        ))
    }

    /// Run the full pipeline for one call. Never fails.
    pub async fn run(&self, args: &GenerateArgs, context: &SessionContext) -> DispatchOutcome {
        let route = args.route;

        if !self.dispatcher.is_configured() {
            return DispatchOutcome::failure(DispatchErrorCode::MissingWebhookUrl, route);
        }

        let Some(instructions) = self.prompts.get(route) else {
            return DispatchOutcome::failure(DispatchErrorCode::InvalidRoute, route);
        };

        let elaboration = match self.specialist.elaborate(instructions, &args.intent).await {
            Ok(e) => e,
            Err(e) => {
                warn!(route = %route, error = %e, "Elaboration failed");
                return DispatchOutcome::failure(DispatchErrorCode::SpecialistParseError, route);
            }
        };

        let payload = DispatchPayload::new(
            context,
            route,
            &elaboration.prompt,
            elaboration.amount,
            &elaboration.model,
        );
        self.dispatcher.dispatch(&payload).await
    }
}

#[async_trait]
impl Tool for GenerateTool {
    fn name(&self) -> &str {
        GENERATE_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Start an image or video generation on the user's canvas. Pick the route \
         (t2i: text to image, i2i: edit one image, m2i: combine several images, \
         i2v: animate an image into video) and describe what the user wants in intent."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "route": {
                    "type": "string",
                    "enum": Route::ALL.iter().map(Route::as_str).collect::<Vec<_>>(),
                    "description": "Generation mode"
                },
                "intent": {
                    "type": "string",
                    "description": "Short description of what to generate or change"
                }
            },
            "required": ["route", "intent"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall, context: &SessionContext) -> Result<ToolResult, ToolError> {
        if call.name != GENERATE_TOOL_NAME {
            return Err(ToolError::NotFound(call.name.clone()));
        }
        let args: GenerateArgs = serde_json::from_value(call.arguments.clone())
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

        let outcome = self.run(&args, context).await;
        info!(
            route = %args.route,
            ok = outcome.is_success(),
            error_code = outcome.error_code().map(|c| c.as_str()),
            "generate finished"
        );

        Ok(ToolResult {
            call_id: call.id.clone(),
            success: outcome.is_success(),
            output: outcome.to_json().to_string(),
        })
    }
}
