use std::sync::mpsc::{self, Receiver, Sender};

use anyhow::anyhow;
use indexmap::IndexMap;
use roomcraft_contracts::chat::{ChatMessage, ChatTranscript};
use roomcraft_contracts::events::EventWriter;
use roomcraft_contracts::models::{Capability, ModelSelector};
use roomcraft_contracts::styles::StyleCatalog;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::codec::{encode_image_file, EncodedImage, ImageFile, UploadedImage};
use crate::config::StudioConfig;
use crate::conversation::{ChatSession, ConversationClient};
use crate::error::{
    StudioError, CHAT_FAILED, CHAT_INIT_FAILED, CHAT_NOT_INITIALIZED, EDIT_FAILED,
    EDIT_PRECONDITIONS, EMPTY_CHAT_MESSAGE, GENERATION_FAILED, NO_IMAGE_UPLOADED,
};
use crate::generation::GenerationClient;
use crate::providers::{default_provider_registry, resolve_model};

pub const RESPONDING_LABEL: &str = "AI is typing...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Generating,
    Editing,
    Responding,
}

/// What the user sees about in-flight work. `busy` drives control disabling
/// only; it does not lock anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OperationStatus {
    pub busy: bool,
    pub label: String,
    pub kind: Option<OperationKind>,
    pub last_error: Option<String>,
}

/// State transitions, published to subscribers and mirrored to the event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StudioUpdate {
    ImageUploaded {
        mime_type: String,
        encoded_len: usize,
        digest: String,
    },
    SessionChanged {
        session_id: Option<String>,
    },
    StyleSelected {
        style: String,
        cached: bool,
    },
    VariantStored {
        style: String,
        mime_type: String,
        encoded_len: usize,
        digest: String,
    },
    StatusChanged {
        busy: bool,
        label: String,
        kind: Option<OperationKind>,
    },
    MessageAppended {
        message: ChatMessage,
    },
    ErrorChanged {
        error: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudioSnapshot {
    pub original_mime_type: Option<String>,
    pub active_style: Option<String>,
    pub generated_styles: Vec<String>,
    pub showing_variant: bool,
    pub transcript_len: usize,
    pub pending_instruction: String,
    pub session_id: Option<String>,
    pub status: OperationStatus,
}

#[derive(Debug, Default)]
struct StudioState {
    original: Option<UploadedImage>,
    variants: IndexMap<String, EncodedImage>,
    active_style: Option<String>,
    transcript: ChatTranscript,
    pending_instruction: String,
    status: OperationStatus,
}

/// Owns everything about the current room photo: the original, one variant
/// per style, the active style, the chat transcript and its assistant session.
///
/// Operations take `&mut self`, so two of them never overlap on one studio and
/// a late generation result cannot overwrite a newer edit of the same style.
/// Each operation that returns `Err` has already stored the user-facing
/// message in `status().last_error`.
pub struct DesignStudio {
    catalog: StyleCatalog,
    generation: GenerationClient,
    conversation: ConversationClient,
    state: StudioState,
    session: Option<ChatSession>,
    events: EventWriter,
    subscribers: Vec<Sender<StudioUpdate>>,
}

impl DesignStudio {
    pub fn new(
        generation: GenerationClient,
        conversation: ConversationClient,
        events: EventWriter,
    ) -> Self {
        Self {
            catalog: StyleCatalog::default(),
            generation,
            conversation,
            state: StudioState::default(),
            session: None,
            events,
            subscribers: Vec::new(),
        }
    }

    /// Wires providers for the configured models, falling back per capability.
    pub fn from_config(config: &StudioConfig, events: EventWriter) -> anyhow::Result<Self> {
        let registry = default_provider_registry(config);
        let selector = ModelSelector::default();
        let image = resolve_model(&registry, &selector, &config.image_model, Capability::Edit)?;
        let text = resolve_model(&registry, &selector, &config.text_model, Capability::Text)?;
        for reason in [&image.fallback_reason, &text.fallback_reason]
            .into_iter()
            .flatten()
        {
            warn!(%reason, "model fallback");
        }
        info!(
            image_model = %image.model,
            text_model = %text.model,
            "studio ready"
        );
        Ok(Self::new(
            GenerationClient::new(image.provider, image.model),
            ConversationClient::new(text.provider, text.model),
            events,
        ))
    }

    pub fn subscribe(&mut self) -> Receiver<StudioUpdate> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn upload_image(&mut self, file: &ImageFile) -> Result<(), StudioError> {
        let uploaded = match encode_image_file(file) {
            Ok(uploaded) => uploaded,
            Err(err) => return Err(self.fail(err)),
        };
        info!(name = %file.name, mime_type = %uploaded.mime_type, "room photo uploaded");

        let update = StudioUpdate::ImageUploaded {
            mime_type: uploaded.mime_type.clone(),
            encoded_len: uploaded.encoded_len(),
            digest: uploaded.digest(),
        };
        self.state.original = Some(uploaded);
        self.state.variants.clear();
        self.state.active_style = None;
        self.state.transcript.clear();
        self.state.pending_instruction.clear();
        self.clear_error();
        self.publish(update);

        if self.session.take().is_some() {
            self.publish(StudioUpdate::SessionChanged { session_id: None });
        }
        match self.conversation.create_session() {
            Ok(session) => {
                let session_id = session.id().to_string();
                self.session = Some(session);
                self.publish(StudioUpdate::SessionChanged {
                    session_id: Some(session_id),
                });
                Ok(())
            }
            Err(source) => Err(self.fail(StudioError::Initialization {
                message: CHAT_INIT_FAILED.to_string(),
                source,
            })),
        }
    }

    /// Shows `name`, generating it only when no variant exists yet.
    pub fn select_style(&mut self, name: &str) -> Result<EncodedImage, StudioError> {
        let Some(original) = self.state.original.clone() else {
            return Err(self.fail(StudioError::validation(NO_IMAGE_UPLOADED)));
        };
        let Some(style) = self.catalog.resolve(name).map(|spec| spec.name.clone()) else {
            return Err(self.fail(StudioError::validation(format!(
                "Unknown design style \"{}\".",
                name.trim()
            ))));
        };

        self.state.active_style = Some(style.clone());
        let cached = self.state.variants.get(&style).cloned();
        self.publish(StudioUpdate::StyleSelected {
            style: style.clone(),
            cached: cached.is_some(),
        });
        if let Some(image) = cached {
            return Ok(image);
        }

        self.clear_error();
        self.begin(
            OperationKind::Generating,
            format!("Reimagining your room in {style} style..."),
        );
        let result = self.generation.generate_styled_image(&original, &style);
        self.finish();

        match result {
            Ok(image) => {
                self.store_variant(style, image.clone());
                Ok(image)
            }
            Err(source) => Err(self.fail(StudioError::Generation {
                message: GENERATION_FAILED.to_string(),
                source,
            })),
        }
    }

    /// Applies `instruction` to the variant shown for the active style.
    pub fn edit_current_image(&mut self, instruction: &str) -> Result<EncodedImage, StudioError> {
        self.state.pending_instruction = instruction.to_string();
        let target = self.state.active_style.as_ref().and_then(|style| {
            self.state
                .variants
                .get(style)
                .map(|variant| (style.clone(), variant.clone()))
        });
        let Some((style, base)) = target.filter(|_| !instruction.trim().is_empty()) else {
            return Err(self.fail(StudioError::validation(EDIT_PRECONDITIONS)));
        };

        self.clear_error();
        self.begin(
            OperationKind::Editing,
            format!("Applying edit: \"{instruction}\"..."),
        );
        let result = self.generation.edit_image(&base, instruction);
        self.finish();

        match result {
            Ok(image) => {
                self.store_variant(style, image.clone());
                self.state.pending_instruction.clear();
                Ok(image)
            }
            Err(source) => Err(self.fail(StudioError::Generation {
                message: EDIT_FAILED.to_string(),
                source,
            })),
        }
    }

    /// Sends `text` to the assistant. The user message stays in the
    /// transcript even when the reply fails.
    pub fn send_chat_message(&mut self, text: &str) -> Result<String, StudioError> {
        if self.session.is_none() {
            return Err(self.fail(StudioError::Chat {
                message: CHAT_NOT_INITIALIZED.to_string(),
                source: anyhow!("no assistant session for the current photo"),
            }));
        }
        if text.trim().is_empty() {
            return Err(self.fail(StudioError::validation(EMPTY_CHAT_MESSAGE)));
        }

        self.append_message(ChatMessage::user(text));
        self.clear_error();
        self.begin(OperationKind::Responding, RESPONDING_LABEL.to_string());
        let result = match self.session.as_mut() {
            Some(session) => self.conversation.send_message(session, text),
            None => Err(anyhow!("assistant session dropped mid-turn")),
        };
        self.finish();

        match result {
            Ok(reply) => {
                self.append_message(ChatMessage::assistant(reply.clone()));
                Ok(reply)
            }
            Err(source) => Err(self.fail(StudioError::Chat {
                message: CHAT_FAILED.to_string(),
                source,
            })),
        }
    }

    pub fn dismiss_error(&mut self) {
        self.clear_error();
    }

    pub fn set_edit_instruction(&mut self, text: &str) {
        self.state.pending_instruction = text.to_string();
    }

    pub fn catalog(&self) -> &StyleCatalog {
        &self.catalog
    }

    pub fn original(&self) -> Option<&UploadedImage> {
        self.state.original.as_ref()
    }

    pub fn variant(&self, style: &str) -> Option<&EncodedImage> {
        self.state.variants.get(style)
    }

    pub fn variants(&self) -> &IndexMap<String, EncodedImage> {
        &self.state.variants
    }

    pub fn active_style(&self) -> Option<&str> {
        self.state.active_style.as_deref()
    }

    /// The "after" image: the variant of the active style, if generated.
    pub fn current_variant(&self) -> Option<&EncodedImage> {
        self.state
            .active_style
            .as_ref()
            .and_then(|style| self.state.variants.get(style))
    }

    pub fn transcript(&self) -> &ChatTranscript {
        &self.state.transcript
    }

    pub fn status(&self) -> &OperationStatus {
        &self.state.status
    }

    pub fn pending_instruction(&self) -> &str {
        &self.state.pending_instruction
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&ChatSession> {
        self.session.as_ref()
    }

    pub fn image_model(&self) -> &str {
        self.generation.model()
    }

    pub fn text_model(&self) -> &str {
        self.conversation.model()
    }

    pub fn snapshot(&self) -> StudioSnapshot {
        StudioSnapshot {
            original_mime_type: self
                .state
                .original
                .as_ref()
                .map(|image| image.mime_type.clone()),
            active_style: self.state.active_style.clone(),
            generated_styles: self.state.variants.keys().cloned().collect(),
            showing_variant: self.current_variant().is_some(),
            transcript_len: self.state.transcript.len(),
            pending_instruction: self.state.pending_instruction.clone(),
            session_id: self.session.as_ref().map(|session| session.id().to_string()),
            status: self.state.status.clone(),
        }
    }

    fn store_variant(&mut self, style: String, image: EncodedImage) {
        let update = StudioUpdate::VariantStored {
            style: style.clone(),
            mime_type: image.mime_type.clone(),
            encoded_len: image.encoded_len(),
            digest: image.digest(),
        };
        self.state.variants.insert(style, image);
        self.publish(update);
    }

    fn append_message(&mut self, message: ChatMessage) {
        self.state.transcript.push(message.clone());
        self.publish(StudioUpdate::MessageAppended { message });
    }

    fn begin(&mut self, kind: OperationKind, label: String) {
        self.state.status.busy = true;
        self.state.status.kind = Some(kind);
        self.state.status.label = label;
        self.publish_status();
    }

    fn finish(&mut self) {
        self.state.status.busy = false;
        self.state.status.kind = None;
        self.state.status.label.clear();
        self.publish_status();
    }

    fn publish_status(&mut self) {
        let status = &self.state.status;
        let update = StudioUpdate::StatusChanged {
            busy: status.busy,
            label: status.label.clone(),
            kind: status.kind,
        };
        self.publish(update);
    }

    fn clear_error(&mut self) {
        if self.state.status.last_error.take().is_some() {
            self.publish(StudioUpdate::ErrorChanged { error: None });
        }
    }

    fn fail(&mut self, err: StudioError) -> StudioError {
        warn!(kind = err.kind(), detail = %err.detail(), "studio operation failed");
        let message = err.user_message();
        self.state.status.last_error = Some(message.clone());
        self.publish(StudioUpdate::ErrorChanged {
            error: Some(message),
        });
        err
    }

    fn publish(&mut self, update: StudioUpdate) {
        match serde_json::to_value(&update) {
            Ok(Value::Object(mut payload)) => {
                let event_type = payload
                    .remove("type")
                    .and_then(|value| value.as_str().map(str::to_string))
                    .unwrap_or_else(|| "studio_update".to_string());
                if let Err(err) = self.events.emit(&event_type, payload) {
                    warn!(error = %err, event = %event_type, "event log write failed");
                }
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "studio update not serializable"),
        }
        self.subscribers
            .retain(|subscriber| subscriber.send(update.clone()).is_ok());
    }
}
