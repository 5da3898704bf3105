//! `POST /chat`: authenticated, streamed chat turns.
//!
//! The handler validates the body, checks project ownership, replays recent
//! history, records the user turn and then hands the agent run to a
//! [`Coordinator`], whose client events become the SSE response body.

use std::convert::Infallible;

use axum::Extension;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderName, HeaderValue, header};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use faceagent_agent::{ClientEvent, Coordinator, SYSTEM_PROMPT, history_from_turns};
use faceagent_core::{AgentSession, MAX_REFERENCE_IMAGES, ProjectId, ReferenceImages, SessionContext};
use serde::{Deserialize, Deserializer};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::info;
use uuid::Uuid;

use crate::AppState;
use crate::auth::AuthUser;
use crate::error::ApiError;

/// Body of `POST /chat`. Unknown fields are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub project_id: Uuid,

    #[serde(rename = "chatInput")]
    pub chat_input: String,

    #[serde(default, deserialize_with = "string_list")]
    pub selected_ids: Vec<String>,

    #[serde(default, deserialize_with = "string_list")]
    pub thumb_urls: Vec<String>,

    #[serde(default)]
    pub requested_aspect: Option<String>,
}

impl ChatRequest {
    pub fn from_json(body: &[u8]) -> Result<Self, ApiError> {
        serde_json::from_slice(body).map_err(|e| ApiError::Unprocessable(e.to_string()))
    }
}

/// Accepts a list, a JSON-encoded list, `null` or `""`.
///
/// Clients that post form-ish payloads send lists as JSON strings; both
/// shapes normalise to the same `Vec<String>`.
pub fn normalize_list(value: serde_json::Value) -> Result<Vec<String>, String> {
    use serde_json::Value;

    let items = match value {
        Value::Null => return Ok(Vec::new()),
        Value::String(s) if s.is_empty() => return Ok(Vec::new()),
        Value::String(s) => match serde_json::from_str::<Value>(&s) {
            Ok(Value::Array(items)) => items,
            Ok(_) => return Err("Expected JSON list".into()),
            Err(_) => return Err("Invalid JSON string".into()),
        },
        Value::Array(items) => items,
        _ => return Err("Expected list or JSON-string list".into()),
    };

    Ok(items
        .into_iter()
        .map(|item| match item {
            Value::String(s) => s,
            other => other.to_string(),
        })
        .collect())
}

fn string_list<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    normalize_list(value).map_err(serde::de::Error::custom)
}

fn new_request_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

fn sse_event(event: &ClientEvent) -> Event {
    Event::default().event(event.event_name()).data(event.data())
}

pub async fn chat_handler(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request = ChatRequest::from_json(&body)?;
    let request_id = new_request_id();
    let project_id = ProjectId(request.project_id);

    if !state.store.owns_project(project_id, &user.subject).await? {
        info!(request_id = %request_id, project_id = %project_id, "Project not owned by caller");
        return Err(ApiError::NotFound("Project not found".into()));
    }

    let turns = state.store.recent_turns(project_id, state.history_limit).await?;
    let history = history_from_turns(&turns, &request.chat_input);
    state
        .store
        .append_user_turn(project_id, &user.subject, &request.chat_input)
        .await?;

    let images = ReferenceImages::capped(request.thumb_urls, MAX_REFERENCE_IMAGES);
    info!(
        request_id = %request_id,
        project_id = %project_id,
        selection_count = request.selected_ids.len(),
        thumb_urls_received = images.received(),
        thumb_urls_used = images.used(),
        thumb_urls_dropped = images.dropped(),
        history_turns = turns.len(),
        "Chat request"
    );

    let context = SessionContext {
        project_id,
        selected_ids: request.selected_ids,
        requested_aspect: request.requested_aspect,
    };
    let session = AgentSession::new(SYSTEM_PROMPT, context, history, &request.chat_input, images);

    let run = state.agent.run_stream(session);
    let coordinator = Coordinator::new(state.store.clone(), project_id, user.subject, request_id);
    let (events, _report) = coordinator.spawn(run);

    let stream = ReceiverStream::new(events).map(|event| Ok::<_, Infallible>(sse_event(&event)));

    Ok((
        [
            (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
            (HeaderName::from_static("x-accel-buffering"), HeaderValue::from_static("no")),
        ],
        Sse::new(stream),
    )
        .into_response())
}
