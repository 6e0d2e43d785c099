use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;
use uuid::Uuid;

use crate::providers::{Content, ContentProvider, ContentRequest, Part};

pub const SYSTEM_INSTRUCTION: &str = "You are an AI interior design assistant. Your role is to help users refine their generated room designs. If asked for product recommendations, provide conceptual ideas and suggest types of stores where they might find such items (e.g., \"vintage furniture stores,\" \"online lighting retailers,\" or \"local artisan markets\"). Do not provide actual URLs or product links.";

/// A dialogue with the assistant, tied to one uploaded room photo.
///
/// The service is stateless per request, so the session replays its own
/// history (successful turns only) on every message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSession {
    id: String,
    model: String,
    system_instruction: String,
    history: Vec<Content>,
}

impl ChatSession {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn system_instruction(&self) -> &str {
        &self.system_instruction
    }

    pub fn history(&self) -> &[Content] {
        &self.history
    }

    pub fn turns(&self) -> usize {
        self.history.len() / 2
    }
}

#[derive(Clone)]
pub struct ConversationClient {
    provider: Arc<dyn ContentProvider>,
    model: String,
}

impl ConversationClient {
    pub fn new(provider: Arc<dyn ContentProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn create_session(&self) -> Result<ChatSession> {
        self.provider
            .check_ready()
            .with_context(|| format!("{} chat service unavailable", self.provider.name()))?;
        let session = ChatSession {
            id: Uuid::new_v4().to_string(),
            model: self.model.clone(),
            system_instruction: SYSTEM_INSTRUCTION.to_string(),
            history: Vec::new(),
        };
        info!(session = %session.id, model = %session.model, "chat session created");
        Ok(session)
    }

    pub fn send_message(&self, session: &mut ChatSession, text: &str) -> Result<String> {
        let user_turn = Content::user(vec![Part::text(text)]);
        let mut contents = session.history.clone();
        contents.push(user_turn.clone());

        let request = ContentRequest {
            model: session.model.clone(),
            system_instruction: Some(session.system_instruction.clone()),
            contents,
            response_modalities: Vec::new(),
        };
        let response = self
            .provider
            .generate_content(&request)
            .with_context(|| format!("chat turn failed (session {})", session.id))?;
        let reply = response.text();
        if reply.trim().is_empty() {
            bail!("{} returned an empty reply", self.provider.name());
        }

        session.history.push(user_turn);
        session.history.push(Content::model(vec![Part::text(reply.clone())]));
        Ok(reply)
    }
}
