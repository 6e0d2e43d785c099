use std::io::Cursor;

use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use sha2::{Digest, Sha256};

use super::{ContentProvider, ContentRequest, ContentResponse, Modality, Part};
use crate::codec::{decode_payload, EncodedImage};

const FALLBACK_WIDTH: u32 = 512;
const FALLBACK_HEIGHT: u32 = 384;
const TINT_STRENGTH: f32 = 0.35;

/// Offline provider producing deterministic output without network access.
///
/// Image requests return the last inline image of the request tinted by a
/// colour derived from the instruction text (a solid swatch if the input cannot
/// be decoded). Text requests echo the latest user turn.
pub struct DryrunProvider;

impl ContentProvider for DryrunProvider {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn generate_content(&self, request: &ContentRequest) -> Result<ContentResponse> {
        let latest = request.contents.last();
        let prompt = latest
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(Part::as_text)
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .unwrap_or_default();

        if request.response_modalities.contains(&Modality::Image) {
            let base = latest.and_then(|content| content.parts.iter().rev().find_map(Part::as_image));
            let rendered = render_tinted(base, &prompt)?;
            return Ok(ContentResponse {
                parts: vec![
                    Part::text(format!("Dryrun render for: {prompt}")),
                    Part::InlineImage(rendered),
                ],
                finish_reason: Some("STOP".to_string()),
            });
        }

        Ok(ContentResponse {
            parts: vec![Part::text(format!(
                "(dryrun assistant) You said: \"{}\". Consider layering warm ambient light with a statement fixture; look in local lighting showrooms or online lighting retailers.",
                prompt.trim()
            ))],
            finish_reason: Some("STOP".to_string()),
        })
    }
}

fn render_tinted(base: Option<&EncodedImage>, prompt: &str) -> Result<EncodedImage> {
    let (r, g, b) = color_from_prompt(prompt);
    let decoded = base
        .and_then(|image| decode_payload(image).ok())
        .and_then(|bytes| image::load_from_memory(&bytes).ok());

    let output = match decoded {
        Some(source) => {
            let mut rgb = source.to_rgb8();
            for pixel in rgb.pixels_mut() {
                *pixel = blend(*pixel, [r, g, b]);
            }
            rgb
        }
        None => {
            let mut swatch = RgbImage::new(FALLBACK_WIDTH, FALLBACK_HEIGHT);
            for pixel in swatch.pixels_mut() {
                *pixel = Rgb([r, g, b]);
            }
            swatch
        }
    };

    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(output)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .context("dryrun PNG encode failed")?;
    Ok(EncodedImage::from_bytes(&bytes, "image/png"))
}

fn blend(pixel: Rgb<u8>, tint: [u8; 3]) -> Rgb<u8> {
    let mix = |base: u8, over: u8| -> u8 {
        (base as f32 * (1.0 - TINT_STRENGTH) + over as f32 * TINT_STRENGTH).round() as u8
    };
    Rgb([
        mix(pixel[0], tint[0]),
        mix(pixel[1], tint[1]),
        mix(pixel[2], tint[2]),
    ])
}

fn color_from_prompt(prompt: &str) -> (u8, u8, u8) {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    let digest = hasher.finalize();
    (digest[0], digest[1], digest[2])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::Content;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_pixel(width, height, Rgb([200, 200, 200]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn image_request(base: EncodedImage, prompt: &str) -> ContentRequest {
        ContentRequest {
            model: "dryrun-image-1".to_string(),
            system_instruction: None,
            contents: vec![Content::user(vec![
                Part::InlineImage(base),
                Part::text(prompt),
            ])],
            response_modalities: vec![Modality::Image, Modality::Text],
        }
    }

    #[test]
    fn image_request_keeps_input_dimensions() -> anyhow::Result<()> {
        let base = EncodedImage::from_bytes(&png_bytes(32, 24), "image/png");
        let response = DryrunProvider.generate_content(&image_request(base, "Coastal"))?;
        let image = response.first_image().expect("dryrun image");
        assert_eq!(image.mime_type, "image/png");
        let decoded = image::load_from_memory(&decode_payload(image)?)?;
        assert_eq!((decoded.width(), decoded.height()), (32, 24));
        Ok(())
    }

    #[test]
    fn undecodable_input_falls_back_to_swatch() -> anyhow::Result<()> {
        let base = EncodedImage::from_bytes(b"garbage", "image/jpeg");
        let response = DryrunProvider.generate_content(&image_request(base, "Modern"))?;
        let image = response.first_image().expect("dryrun image");
        let decoded = image::load_from_memory(&decode_payload(image)?)?;
        assert_eq!(
            (decoded.width(), decoded.height()),
            (FALLBACK_WIDTH, FALLBACK_HEIGHT)
        );
        Ok(())
    }

    #[test]
    fn output_is_deterministic_per_prompt() -> anyhow::Result<()> {
        let base = EncodedImage::from_bytes(&png_bytes(8, 8), "image/png");
        let first = DryrunProvider.generate_content(&image_request(base.clone(), "Japandi"))?;
        let second = DryrunProvider.generate_content(&image_request(base.clone(), "Japandi"))?;
        let other = DryrunProvider.generate_content(&image_request(base, "Industrial"))?;
        assert_eq!(first.first_image(), second.first_image());
        assert_ne!(first.first_image(), other.first_image());
        Ok(())
    }

    #[test]
    fn text_request_echoes_latest_turn() -> anyhow::Result<()> {
        let request = ContentRequest {
            model: "dryrun-text-1".to_string(),
            system_instruction: Some("persona".to_string()),
            contents: vec![Content::user(vec![Part::text("what lighting fits this?")])],
            response_modalities: Vec::new(),
        };
        let response = DryrunProvider.generate_content(&request)?;
        assert!(response.first_image().is_none());
        assert!(response.text().contains("what lighting fits this?"));
        Ok(())
    }
}
