use std::path::PathBuf;

pub const INVALID_IMAGE_TYPE: &str = "Please upload a valid image file (JPEG, PNG, WEBP).";
pub const IMAGE_READ_FAILED: &str = "Could not process the image file.";
pub const NO_IMAGE_UPLOADED: &str = "Please upload a room photo first.";
pub const EDIT_PRECONDITIONS: &str = "Please select a style and enter an edit instruction.";
pub const EMPTY_CHAT_MESSAGE: &str = "Please enter a message for the assistant.";
pub const CHAT_INIT_FAILED: &str =
    "Failed to initialize the chat service. Please check your API key and refresh the page.";
pub const CHAT_NOT_INITIALIZED: &str = "Chat is not initialized.";
pub const GENERATION_FAILED: &str = "Failed to generate image. Please try another style or image.";
pub const EDIT_FAILED: &str = "Failed to edit image. The model may not be able to perform this request.";
pub const CHAT_FAILED: &str = "Failed to get a response from the chat assistant.";

/// Failures surfaced by studio operations.
///
/// `Display` is always the short user-facing message; the underlying cause is
/// reachable through `source()` for logging.
#[derive(Debug, thiserror::Error)]
pub enum StudioError {
    #[error("{0}")]
    Validation(String),
    #[error("{message}")]
    Initialization {
        message: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("{message}")]
    Generation {
        message: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("{message}")]
    Chat {
        message: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("Could not process the image file.")]
    Decode {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StudioError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn user_message(&self) -> String {
        self.to_string()
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Initialization { .. } => "initialization",
            Self::Generation { .. } => "generation",
            Self::Chat { .. } => "chat",
            Self::Decode { .. } => "decode",
        }
    }

    /// Full cause chain, for logs only.
    pub fn detail(&self) -> String {
        let mut parts = vec![self.to_string()];
        let mut cause = std::error::Error::source(self);
        while let Some(err) = cause {
            let text = err.to_string();
            if parts.last().map(|last| last != &text).unwrap_or(true) {
                parts.push(text);
            }
            cause = err.source();
        }
        parts.join(" | caused by: ")
    }
}
