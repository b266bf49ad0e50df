//! WebP variant generation
//!
//! Raster uploads get up to four lossless WebP renditions, one per
//! [`VariantKind`], each bounded by the configured max width. Images are
//! never upscaled, and a kind whose width would repeat a smaller one is
//! left out.

use crate::config::ImageConfig;
use crate::models::VariantKind;
use anyhow::{Context, Result};
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use std::io::Cursor;

#[derive(Debug, Clone)]
pub struct GeneratedVariant {
    pub kind: VariantKind,
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

/// Decoded dimensions plus the renditions
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub width: u32,
    pub height: u32,
    pub variants: Vec<GeneratedVariant>,
}

/// SVG is vector and animated GIFs would lose their frames
pub fn supports_variants(content_type: &str) -> bool {
    matches!(content_type, "image/jpeg" | "image/png" | "image/webp")
}

/// CPU-bound; call from `spawn_blocking`.
pub fn generate_variants(bytes: &[u8], config: &ImageConfig) -> Result<ProcessedImage> {
    let img = image::load_from_memory(bytes).context("Failed to decode image")?;
    let (width, height) = img.dimensions();

    let mut variants: Vec<GeneratedVariant> = Vec::with_capacity(VariantKind::ALL.len());
    for kind in VariantKind::ALL {
        let target = config.width_for(kind).min(width).max(1);
        if variants.iter().any(|v| v.width == target) {
            continue;
        }

        let target_height = scaled_height(width, height, target);
        let resized = if target == width {
            img.clone()
        } else {
            img.resize_exact(target, target_height, FilterType::Lanczos3)
        };

        variants.push(GeneratedVariant {
            kind,
            width: target,
            height: target_height,
            bytes: encode_webp(&resized).with_context(|| format!("Failed to encode {} variant", kind))?,
        });
    }

    Ok(ProcessedImage { width, height, variants })
}

fn scaled_height(width: u32, height: u32, target_width: u32) -> u32 {
    if width == 0 {
        return height.max(1);
    }
    ((height as u64 * target_width as u64 + width as u64 / 2) / width as u64).max(1) as u32
}

fn encode_webp(img: &DynamicImage) -> Result<Vec<u8>> {
    let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
    let mut out = Cursor::new(Vec::new());
    rgba.write_with_encoder(WebPEncoder::new_lossless(&mut out))?;
    Ok(out.into_inner())
}
