use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tracing::info;

use crate::codec::EncodedImage;
use crate::providers::{Content, ContentProvider, ContentRequest, Modality, Part};

/// Builds the redesign instruction sent for a catalog style.
pub fn style_prompt(style: &str) -> String {
    format!(
        "Redesign this room as a photorealistic interior in the {style} style. \
         Keep the room's geometry, layout, walls, windows, doors and camera angle exactly as they are. \
         Replace furniture, decor, materials, colours and lighting so the space clearly reads as {style}. \
         Return the redesigned room as an image."
    )
}

/// Styled-image generation and image edits against one image-capable model.
///
/// Results are never cached here.
#[derive(Clone)]
pub struct GenerationClient {
    provider: Arc<dyn ContentProvider>,
    model: String,
}

impl GenerationClient {
    pub fn new(provider: Arc<dyn ContentProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn generate_styled_image(&self, base: &EncodedImage, style: &str) -> Result<EncodedImage> {
        self.transform(base, &style_prompt(style))
            .with_context(|| format!("styled generation failed ({style})"))
    }

    pub fn edit_image(&self, base: &EncodedImage, instruction: &str) -> Result<EncodedImage> {
        self.transform(base, instruction)
            .context("image edit failed")
    }

    fn transform(&self, base: &EncodedImage, instruction: &str) -> Result<EncodedImage> {
        let request = ContentRequest {
            model: self.model.clone(),
            system_instruction: None,
            contents: vec![Content::user(vec![
                Part::InlineImage(base.clone()),
                Part::text(instruction),
            ])],
            response_modalities: vec![Modality::Image, Modality::Text],
        };
        let response = self.provider.generate_content(&request)?;
        let Some(image) = response.first_image().cloned() else {
            let text = response.text();
            return Err(if text.trim().is_empty() {
                anyhow!("{} returned no image", self.provider.name())
            } else {
                anyhow!(
                    "{} returned text without an image: {}",
                    self.provider.name(),
                    text.trim()
                )
            });
        };
        info!(
            provider = self.provider.name(),
            model = %self.model,
            mime_type = %image.mime_type,
            digest = %image.digest(),
            "image received"
        );
        Ok(image)
    }
}
