//! Generation dispatch: the single outbound call to the workflow webhook.
//!
//! Every failure is classified into a [`DispatchErrorCode`]; nothing in here
//! returns `Err` to the caller. One attempt per call, no retries.

use faceagent_core::{Error, Route, SessionContext};
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

/// Failure codes reported back to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchErrorCode {
    MissingWebhookUrl,
    InvalidRoute,
    SpecialistParseError,
    WebhookHttpError,
    WebhookTimeout,
    WebhookNetworkError,
}

impl DispatchErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingWebhookUrl => "missing_webhook_url",
            Self::InvalidRoute => "invalid_route",
            Self::SpecialistParseError => "specialist_parse_error",
            Self::WebhookHttpError => "webhook_http_error",
            Self::WebhookTimeout => "webhook_timeout",
            Self::WebhookNetworkError => "webhook_network_error",
        }
    }
}

/// Result of one `generate` invocation. `route` and `video` are present in
/// both variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Success {
        route: Route,
        video: bool,
        amount: i64,
        model: String,
    },
    Failure {
        code: DispatchErrorCode,
        route: Route,
        video: bool,
    },
}

impl DispatchOutcome {
    pub fn failure(code: DispatchErrorCode, route: Route) -> Self {
        Self::Failure {
            code,
            route,
            video: route.is_video(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn video(&self) -> bool {
        match self {
            Self::Success { video, .. } | Self::Failure { video, .. } => *video,
        }
    }

    pub fn error_code(&self) -> Option<DispatchErrorCode> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { code, .. } => Some(*code),
        }
    }

    /// The JSON document handed back to the model as the tool result.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Success {
                route,
                video,
                amount,
                model,
            } => serde_json::json!({
                "ok": true,
                "route": route,
                "video": video,
                "amount": amount,
                "model": model,
            }),
            Self::Failure { code, route, video } => serde_json::json!({
                "ok": false,
                "error_code": code,
                "route": route,
                "video": video,
            }),
        }
    }
}

/// Body POSTed to the webhook.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchPayload<'a> {
    pub project_id: String,
    pub selected_ids: &'a [String],
    pub prompt: &'a str,
    pub amount: i64,
    pub model: &'a str,
    pub requested_aspect: Option<&'a str>,
    pub route: Route,
    pub video: bool,
}

impl<'a> DispatchPayload<'a> {
    pub fn new(
        context: &'a SessionContext,
        route: Route,
        prompt: &'a str,
        amount: i64,
        model: &'a str,
    ) -> Self {
        Self {
            project_id: context.project_id.to_string(),
            selected_ids: &context.selected_ids,
            prompt,
            amount,
            model,
            requested_aspect: context.requested_aspect.as_deref(),
            route,
            video: route.is_video(),
        }
    }
}

/// Posts generation requests to the configured workflow endpoint.
#[derive(Clone)]
pub struct WebhookDispatcher {
    url: Option<String>,
    client: reqwest::Client,
}

impl WebhookDispatcher {
    pub fn new(url: Option<String>, timeout: Duration) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config {
                message: format!("webhook HTTP client: {e}"),
            })?;
        Ok(Self {
            url: url.filter(|u| !u.trim().is_empty()),
            client,
        })
    }

    pub fn is_configured(&self) -> bool {
        self.url.is_some()
    }

    /// Send `payload` once and classify the result.
    pub async fn dispatch(&self, payload: &DispatchPayload<'_>) -> DispatchOutcome {
        let route = payload.route;
        let Some(url) = &self.url else {
            return DispatchOutcome::failure(DispatchErrorCode::MissingWebhookUrl, route);
        };

        let code = match self.client.post(url).json(payload).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!(
                    route = %route,
                    amount = payload.amount,
                    model = %payload.model,
                    status = resp.status().as_u16(),
                    "Generation dispatched"
                );
                return DispatchOutcome::Success {
                    route,
                    video: payload.video,
                    amount: payload.amount,
                    model: payload.model.to_string(),
                };
            }
            Ok(resp) => {
                warn!(route = %route, status = resp.status().as_u16(), "Webhook rejected generation request");
                DispatchErrorCode::WebhookHttpError
            }
            Err(e) if e.is_timeout() => {
                warn!(route = %route, error = %e, "Webhook timed out");
                DispatchErrorCode::WebhookTimeout
            }
            Err(e) => {
                warn!(route = %route, error = %e, "Webhook unreachable");
                DispatchErrorCode::WebhookNetworkError
            }
        };
        DispatchOutcome::failure(code, route)
    }
}
