//! Validation of uploaded photos before they are sent for analysis.

use base64::Engine;
use image::{ImageFormat, ImageReader};
use std::io::Cursor;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImageError {
    #[error("image data is empty")]
    Empty,
    #[error("image is not valid base64: {0}")]
    InvalidBase64(String),
    #[error("unsupported image format")]
    UnsupportedFormat,
    #[error("image could not be decoded: {0}")]
    Undecodable(String),
}

/// A decoded photo whose header was read successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckedImage {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

impl CheckedImage {
    pub fn mime_type(&self) -> &'static str {
        self.format.to_mime_type()
    }
}

const SUPPORTED: [ImageFormat; 4] = [
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::Gif,
    ImageFormat::WebP,
];

/// Decodes a base64 photo and checks it is a JPEG, PNG, GIF or WebP image.
///
/// A `data:image/...;base64,` prefix is tolerated.
pub fn decode_image(encoded: &str) -> Result<CheckedImage, ImageError> {
    let encoded = match encoded.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => encoded,
    };
    if encoded.is_empty() {
        return Err(ImageError::Empty);
    }
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .map_err(|e| ImageError::InvalidBase64(e.to_string()))?;
    check_image(bytes)
}

pub fn check_image(bytes: Vec<u8>) -> Result<CheckedImage, ImageError> {
    if bytes.is_empty() {
        return Err(ImageError::Empty);
    }
    let reader = ImageReader::new(Cursor::new(&bytes))
        .with_guessed_format()
        .map_err(|e| ImageError::Undecodable(e.to_string()))?;
    let format = match reader.format() {
        Some(format) if SUPPORTED.contains(&format) => format,
        _ => return Err(ImageError::UnsupportedFormat),
    };
    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| ImageError::Undecodable(e.to_string()))?;

    Ok(CheckedImage {
        bytes,
        format,
        width,
        height,
    })
}
