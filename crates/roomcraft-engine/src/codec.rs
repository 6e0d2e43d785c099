use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use sha2::{Digest, Sha256};

use crate::error::{StudioError, INVALID_IMAGE_TYPE};

/// An image as carried between the studio and the generative service:
/// base64 payload plus its mime type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub data: String,
    pub mime_type: String,
}

/// The room photo supplied by the user.
pub type UploadedImage = EncodedImage;

impl EncodedImage {
    pub fn new(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    pub fn from_bytes(bytes: &[u8], mime_type: impl Into<String>) -> Self {
        Self::new(BASE64.encode(bytes), mime_type)
    }

    /// Short content digest for logs; never log `data` itself.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.data.as_bytes());
        hex::encode(&hasher.finalize()[..6])
    }

    pub fn encoded_len(&self) -> usize {
        self.data.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

/// A user-selected file together with the type it declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub name: String,
    pub mime_type: String,
    pub source: ImageSource,
}

impl ImageFile {
    /// Declared type comes from the extension, the way a file picker reports it.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mime_type = mime_for_path(&path)
            .unwrap_or("application/octet-stream")
            .to_string();
        Self {
            name: path
                .file_name()
                .map(|value| value.to_string_lossy().to_string())
                .unwrap_or_default(),
            mime_type,
            source: ImageSource::Path(path),
        }
    }

    pub fn from_bytes(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            source: ImageSource::Bytes(bytes),
        }
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

/// Reads and base64-encodes the file, keeping its declared mime type as is.
pub fn encode_image_file(file: &ImageFile) -> Result<UploadedImage, StudioError> {
    if !file.is_image() {
        return Err(StudioError::validation(INVALID_IMAGE_TYPE));
    }
    let encoded = match &file.source {
        ImageSource::Bytes(bytes) => BASE64.encode(bytes),
        ImageSource::Path(path) => {
            let bytes = fs::read(path).map_err(|source| StudioError::Decode {
                path: path.clone(),
                source,
            })?;
            BASE64.encode(bytes)
        }
    };
    Ok(EncodedImage::new(encoded, file.mime_type.clone()))
}

pub fn decode_payload(image: &EncodedImage) -> Result<Vec<u8>> {
    BASE64
        .decode(image.data.as_bytes())
        .with_context(|| format!("invalid base64 payload ({})", image.mime_type))
}

pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "heic" => Some("image/heic"),
        "bmp" => Some("image/bmp"),
        _ => None,
    }
}

pub fn extension_for_mime(mime: &str) -> &'static str {
    let lowered = mime.to_ascii_lowercase();
    if lowered.contains("jpeg") || lowered.contains("jpg") {
        return "jpg";
    }
    if lowered.contains("webp") {
        return "webp";
    }
    if lowered.contains("gif") {
        return "gif";
    }
    if lowered.contains("heic") {
        return "heic";
    }
    if lowered.contains("bmp") {
        return "bmp";
    }
    "png"
}

/// Writes `image` to `dir/<stem>.<ext>` and returns the path.
pub fn write_image(dir: &Path, stem: &str, image: &EncodedImage) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join(format!("{stem}.{}", extension_for_mime(&image.mime_type)));
    let bytes = decode_payload(image)?;
    fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}
