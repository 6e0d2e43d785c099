pub mod codec;
pub mod config;
pub mod conversation;
pub mod error;
pub mod generation;
pub mod providers;
pub mod studio;

pub use codec::{encode_image_file, EncodedImage, ImageFile, UploadedImage};
pub use config::StudioConfig;
pub use conversation::{ChatSession, ConversationClient};
pub use error::StudioError;
pub use generation::GenerationClient;
pub use studio::{DesignStudio, OperationKind, OperationStatus, StudioSnapshot, StudioUpdate};
