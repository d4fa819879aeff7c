// SPDX-License-Identifier: LGPL-3.0-only
//! Thumbnail generator backed by the `image` crate.
//!
//! Handles the raster formats the crate is built with. Anything else, and any
//! id that is not a `file://` path, gets a generic tile that the pipeline
//! displays but never caches.

use crate::thumbnail::bitmap::Bitmap;
use crate::thumbnail::error::ThumbnailError;
use crate::thumbnail::{GeneratorOutput, ThumbnailGenerator, MAX_THUMBNAIL_SIZE};
use nimbus_core::ResourceId;
use std::path::Path;

const FALLBACK_RGBA: [u8; 4] = [0x9e, 0x9e, 0x9e, 0xff];

/// Decodes local image files and downsizes them.
#[derive(Debug, Clone, Default)]
pub struct ImageGenerator;

impl ImageGenerator {
    /// Create a new `ImageGenerator`.
    pub fn new() -> Self {
        Self
    }

    /// Whether the file extension is one this generator decodes.
    pub fn is_supported(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        matches!(
            ext.to_lowercase().as_str(),
            "png" | "jpg" | "jpeg" | "gif" | "bmp" | "webp"
        )
    }

    fn fallback(size: u32) -> Result<GeneratorOutput, ThumbnailError> {
        let edge = clamp_edge(size);
        Ok(GeneratorOutput::Fallback(Bitmap::solid(edge, edge, FALLBACK_RGBA)?))
    }
}

fn clamp_edge(size: u32) -> u32 {
    size.clamp(1, MAX_THUMBNAIL_SIZE)
}

#[async_trait::async_trait]
impl ThumbnailGenerator for ImageGenerator {
    async fn generate(&self, id: &ResourceId, size: u32) -> Result<GeneratorOutput, ThumbnailError> {
        let Some(path) = id.to_path().filter(|p| self.is_supported(p)) else {
            log::debug!("No generator for {}, using fallback", id);
            return Self::fallback(size);
        };

        log::debug!("Generating thumbnail for {:?} at size {}", path, size);
        let edge = clamp_edge(size);
        let decoded = tokio::task::spawn_blocking(move || {
            let image = image::open(&path)?;
            Ok::<_, image::ImageError>(image.thumbnail(edge, edge).to_rgba8())
        })
        .await
        .map_err(|e| ThumbnailError::GenerationFailed(format!("Task execution error: {}", e)))?;

        let rgba = decoded.map_err(|e| ThumbnailError::GenerationFailed(e.to_string()))?;
        let (width, height) = rgba.dimensions();
        let bitmap = Bitmap::from_rgba(width, height, rgba.into_raw())?;
        Ok(GeneratorOutput::Content(bitmap))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_downsizes_preserving_aspect_ratio() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wide.png");
        image::RgbaImage::from_pixel(200, 100, image::Rgba([10, 20, 30, 255]))
            .save(&path)
            .unwrap();

        let output = ImageGenerator::new()
            .generate(&ResourceId::from_path(&path), 64)
            .await
            .unwrap();
        match output {
            GeneratorOutput::Content(bitmap) => {
                assert_eq!((bitmap.width, bitmap.height), (64, 32));
            },
            other => panic!("expected content, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unsupported_extension_falls_back() {
        let output = ImageGenerator::new()
            .generate(&ResourceId::from_path("/tmp/notes.txt"), 32)
            .await
            .unwrap();
        assert!(matches!(output, GeneratorOutput::Fallback(b) if b.width == 32));
    }

    #[tokio::test]
    async fn test_oversized_fallback_is_clamped() {
        let output = ImageGenerator::new()
            .generate(&ResourceId::from_uri("cloud://huge"), u32::MAX)
            .await
            .unwrap();
        match output {
            GeneratorOutput::Fallback(bitmap) => {
                assert_eq!((bitmap.width, bitmap.height), (MAX_THUMBNAIL_SIZE, MAX_THUMBNAIL_SIZE));
            },
            other => panic!("expected fallback, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_corrupt_image_is_generation_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"not a png").unwrap();

        let err = ImageGenerator::new()
            .generate(&ResourceId::from_path(&path), 32)
            .await
            .unwrap_err();
        assert!(matches!(err, ThumbnailError::GenerationFailed(_)));
    }
}
