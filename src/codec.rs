use anyhow::{Context, Result};
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageReader, RgbaImage};
use std::io::Cursor;
use thiserror::Error;

pub const SKIN_WIDTH: u32 = 64;
pub const LEGACY_SKIN_HEIGHT: u32 = 32;
pub const MODERN_SKIN_HEIGHT: u32 = 64;

// Upper bound for anything we decode: skins are 64 px wide, renders at most 300.
const MAX_DECODE_DIM: u32 = 1024;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unsupported image format: {reason}")]
    UnsupportedFormat { reason: String },
}

impl DecodeError {
    fn unsupported(reason: impl ToString) -> Self {
        Self::UnsupportedFormat {
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkinLayout {
    /// 64x32, single layer for everything except the hat.
    Legacy,
    /// 64x64, second layer for every body part.
    Modern,
}

impl SkinLayout {
    pub fn from_dimensions(width: u32, height: u32) -> Option<Self> {
        match (width, height) {
            (SKIN_WIDTH, LEGACY_SKIN_HEIGHT) => Some(Self::Legacy),
            (SKIN_WIDTH, MODERN_SKIN_HEIGHT) => Some(Self::Modern),
            _ => None,
        }
    }

    pub fn height(&self) -> u32 {
        match self {
            Self::Legacy => LEGACY_SKIN_HEIGHT,
            Self::Modern => MODERN_SKIN_HEIGHT,
        }
    }
}

/// A decoded skin texture. Always 64 px wide and 32 or 64 px tall.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkinBitmap {
    image: RgbaImage,
    layout: SkinLayout,
}

impl SkinBitmap {
    pub fn from_image(image: RgbaImage) -> Result<Self, DecodeError> {
        let layout = SkinLayout::from_dimensions(image.width(), image.height()).ok_or_else(|| {
            DecodeError::unsupported(format!(
                "skin must be 64x32 or 64x64, got {}x{}",
                image.width(),
                image.height()
            ))
        })?;
        Ok(Self { image, layout })
    }

    /// Caller guarantees the image matches the layout dimensions.
    pub(crate) fn from_parts(image: RgbaImage, layout: SkinLayout) -> Self {
        debug_assert_eq!(image.dimensions(), (SKIN_WIDTH, layout.height()));
        Self { image, layout }
    }

    pub fn layout(&self) -> SkinLayout {
        self.layout
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

pub fn decode_skin(bytes: &[u8]) -> Result<SkinBitmap, DecodeError> {
    let (width, height) = image_dimensions(bytes)?;
    if SkinLayout::from_dimensions(width, height).is_none() {
        return Err(DecodeError::unsupported(format!(
            "skin must be 64x32 or 64x64, got {width}x{height}"
        )));
    }
    SkinBitmap::from_image(decode_rgba(bytes)?)
}

/// Lossless decode of any image we produced ourselves (renders, crops).
pub fn decode_png(bytes: &[u8]) -> Result<RgbaImage, DecodeError> {
    decode_rgba(bytes)
}

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    PngEncoder::new(&mut bytes)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgba8,
        )
        .context("encode png")?;
    Ok(bytes)
}

fn image_dimensions(bytes: &[u8]) -> Result<(u32, u32), DecodeError> {
    let mut reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(DecodeError::unsupported)?;
    reader.limits(decode_limits());
    reader.into_dimensions().map_err(DecodeError::unsupported)
}

fn decode_rgba(bytes: &[u8]) -> Result<RgbaImage, DecodeError> {
    let mut reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(DecodeError::unsupported)?;
    reader.limits(decode_limits());
    let image = reader.decode().map_err(DecodeError::unsupported)?;
    if image.width() == 0 || image.height() == 0 {
        return Err(DecodeError::unsupported("image has no pixels"));
    }
    Ok(image.to_rgba8())
}

fn decode_limits() -> image::Limits {
    let mut limits = image::Limits::default();
    limits.max_image_width = Some(MAX_DECODE_DIM);
    limits.max_image_height = Some(MAX_DECODE_DIM);
    limits.max_alloc = Some(u64::from(MAX_DECODE_DIM) * u64::from(MAX_DECODE_DIM) * 4);
    limits
}
