// SPDX-License-Identifier: LGPL-3.0-only
//! Decoded thumbnail pixels.

use crate::thumbnail::error::ThumbnailError;
use image::{ImageFormat, RgbaImage};
use std::fmt;
use std::io::Cursor;
use std::sync::Arc;

/// RGBA8 thumbnail pixels. Cloning shares the pixel buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct Bitmap {
    /// Raw RGBA pixel data, `width * height * 4` bytes.
    pub data: Arc<Vec<u8>>,
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
}

impl Bitmap {
    /// Wrap raw RGBA pixels, checking the buffer length.
    pub fn from_rgba(width: u32, height: u32, data: Vec<u8>) -> Result<Self, ThumbnailError> {
        let expected = rgba_len(width, height)?;
        if data.len() != expected {
            return Err(ThumbnailError::GenerationFailed(format!(
                "RGBA buffer is {} bytes, expected {} for {}x{}",
                data.len(),
                expected,
                width,
                height
            )));
        }
        Ok(Self {
            data: Arc::new(data),
            width,
            height,
        })
    }

    /// A bitmap filled with a single color.
    ///
    /// Fails when `width * height * 4` does not fit in memory addressing.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Result<Self, ThumbnailError> {
        let len = rgba_len(width, height)?;
        let data = rgba.iter().copied().cycle().take(len).collect();
        Ok(Self {
            data: Arc::new(data),
            width,
            height,
        })
    }

    /// Size of the pixel buffer in bytes.
    pub fn byte_size(&self) -> usize {
        self.data.len()
    }

    pub(crate) fn encode_png(&self) -> Result<Vec<u8>, ThumbnailError> {
        let image = RgbaImage::from_raw(self.width, self.height, self.data.as_ref().clone())
            .ok_or_else(|| {
                ThumbnailError::GenerationFailed(format!(
                    "bitmap buffer does not match {}x{}",
                    self.width, self.height
                ))
            })?;
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png)?;
        Ok(out.into_inner())
    }

    pub(crate) fn decode_png(bytes: &[u8]) -> Result<Self, ThumbnailError> {
        let rgba = image::load_from_memory_with_format(bytes, ImageFormat::Png)?.to_rgba8();
        let (width, height) = rgba.dimensions();
        Ok(Self {
            data: Arc::new(rgba.into_raw()),
            width,
            height,
        })
    }
}

fn rgba_len(width: u32, height: u32) -> Result<usize, ThumbnailError> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|pixels| pixels.checked_mul(4))
        .ok_or_else(|| {
            ThumbnailError::GenerationFailed(format!("{}x{} bitmap is too large", width, height))
        })
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bitmap")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}
