//! Per-request agent session state.
//!
//! An [`AgentSession`] lives for exactly one chat request. It owns the
//! model-facing message history and the server-owned [`SessionContext`] that
//! tools read from. Nothing in here is persisted.

use serde::{Deserialize, Serialize};
use tracing::warn;
use crate::message::{Message, Role};
use crate::store::ProjectId;

/// Default cap on reference images forwarded to the model.
pub const MAX_REFERENCE_IMAGES: usize = 4;

/// Identifiers owned by the server, never by the model.
///
/// Tools receive this alongside the model's arguments; the argument types
/// the model fills in have no field that could override any of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    pub project_id: ProjectId,

    #[serde(default)]
    pub selected_ids: Vec<String>,

    #[serde(default)]
    pub requested_aspect: Option<String>,
}

/// Reference image URLs after capping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceImages {
    urls: Vec<String>,
    received: usize,
}

impl ReferenceImages {
    /// Keep the first `max` URLs; the rest are dropped without error.
    pub fn capped(mut urls: Vec<String>, max: usize) -> Self {
        let received = urls.len();
        urls.truncate(max);
        Self { urls, received }
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn received(&self) -> usize {
        self.received
    }

    pub fn used(&self) -> usize {
        self.urls.len()
    }

    pub fn dropped(&self) -> usize {
        self.received.saturating_sub(self.urls.len())
    }

    pub fn into_urls(self) -> Vec<String> {
        self.urls
    }
}

/// In-memory state for one request.
///
/// Invariant: `messages[0]` is the only system message.
#[derive(Debug, Clone)]
pub struct AgentSession {
    messages: Vec<Message>,
    context: SessionContext,
    reference_images: Vec<String>,
}

impl AgentSession {
    /// Build a session from the system prompt, replayed history and the
    /// current user input.
    pub fn new(
        system_prompt: &str,
        context: SessionContext,
        history: Vec<Message>,
        user_input: &str,
        images: ReferenceImages,
    ) -> Self {
        let reference_images = images.into_urls();
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(system_prompt));
        messages.extend(history.into_iter().filter(|m| m.role != Role::System));
        messages.push(Message::user_with_images(user_input, reference_images.clone()));

        Self {
            messages,
            context,
            reference_images,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn reference_images(&self) -> &[String] {
        &self.reference_images
    }

    /// Append an assistant or tool message produced during the loop.
    pub fn push(&mut self, message: Message) {
        if message.role == Role::System {
            warn!("Ignoring system message appended mid-session");
            return;
        }
        self.messages.push(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> SessionContext {
        SessionContext {
            project_id: ProjectId::new(),
            selected_ids: vec!["a".into()],
            requested_aspect: None,
        }
    }

    fn urls(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("https://cdn.example/{i}.png")).collect()
    }

    #[test]
    fn images_capped_to_four() {
        let images = ReferenceImages::capped(urls(7), MAX_REFERENCE_IMAGES);
        assert_eq!(images.used(), 4);
        assert_eq!(images.received(), 7);
        assert_eq!(images.dropped(), 3);
        assert_eq!(images.urls()[3], "https://cdn.example/3.png");
    }

    #[test]
    fn short_image_list_drops_nothing() {
        for n in 0..=4 {
            let images = ReferenceImages::capped(urls(n), MAX_REFERENCE_IMAGES);
            assert_eq!(images.used(), n);
            assert_eq!(images.dropped(), 0);
        }
    }

    #[test]
    fn system_prompt_is_first_and_unique() {
        let history = vec![
            Message::system("stale prompt"),
            Message::user("earlier"),
            Message::assistant("reply"),
        ];
        let session = AgentSession::new(
            "You are helpful",
            context(),
            history,
            "now",
            ReferenceImages::capped(vec![], MAX_REFERENCE_IMAGES),
        );
        let msgs = session.messages();
        assert_eq!(msgs[0].role, Role::System);
        assert_eq!(msgs[0].content, "You are helpful");
        assert_eq!(msgs.iter().filter(|m| m.role == Role::System).count(), 1);
        assert_eq!(msgs.last().unwrap().content, "now");
        assert_eq!(msgs.len(), 4);
    }

    #[test]
    fn current_user_message_carries_images() {
        let session = AgentSession::new(
            "sys",
            context(),
            vec![],
            "make it blue",
            ReferenceImages::capped(urls(6), MAX_REFERENCE_IMAGES),
        );
        assert_eq!(session.messages().last().unwrap().images.len(), 4);
        assert_eq!(session.reference_images().len(), 4);
    }

    #[test]
    fn push_ignores_system_messages() {
        let mut session = AgentSession::new(
            "sys",
            context(),
            vec![],
            "hi",
            ReferenceImages::capped(vec![], MAX_REFERENCE_IMAGES),
        );
        session.push(Message::system("override"));
        session.push(Message::assistant("hello"));
        assert_eq!(session.messages().len(), 3);
        assert_eq!(session.messages()[0].content, "sys");
    }
}
