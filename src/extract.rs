use crate::codec::{SkinBitmap, SkinLayout};
use crate::render::RenderError;
use image::{Rgba, RgbaImage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Front face of the head. Same UV position in both layouts.
pub const HEAD_REGION: Region = Region {
    x: 8,
    y: 8,
    width: 8,
    height: 8,
};

/// Front face of the hat (second head layer).
pub const HAT_REGION: Region = Region {
    x: 40,
    y: 8,
    width: 8,
    height: 8,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKind {
    Raw,
    Avatar,
    Helm,
}

impl ViewKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Raw => "skin",
            Self::Avatar => "avatar",
            Self::Helm => "helm",
        }
    }
}

pub fn extract(view: ViewKind, skin: &SkinBitmap) -> Result<RgbaImage, RenderError> {
    match view {
        ViewKind::Raw => Ok(skin.image().clone()),
        ViewKind::Avatar => crop(skin.image(), HEAD_REGION),
        ViewKind::Helm => helm(skin),
    }
}

/// Hat layer for the layout, if it carries one.
pub fn hat_region(layout: SkinLayout) -> Option<Region> {
    match layout {
        SkinLayout::Modern => Some(HAT_REGION),
        SkinLayout::Legacy => None,
    }
}

fn helm(skin: &SkinBitmap) -> Result<RgbaImage, RenderError> {
    let mut head = crop(skin.image(), HEAD_REGION)?;
    let Some(region) = hat_region(skin.layout()) else {
        return Ok(head);
    };
    let hat = crop(skin.image(), region)?;
    for (base, top) in head.pixels_mut().zip(hat.pixels()) {
        blend_over(base, top);
    }
    Ok(head)
}

fn crop(image: &RgbaImage, region: Region) -> Result<RgbaImage, RenderError> {
    let fits_x = region.x.checked_add(region.width).is_some_and(|end| end <= image.width());
    let fits_y = region
        .y
        .checked_add(region.height)
        .is_some_and(|end| end <= image.height());
    if !fits_x || !fits_y {
        return Err(RenderError::DerivationFailed {
            reason: format!(
                "region {}x{}+{}+{} outside {}x{} image",
                region.width,
                region.height,
                region.x,
                region.y,
                image.width(),
                image.height()
            ),
        });
    }
    Ok(image::imageops::crop_imm(image, region.x, region.y, region.width, region.height).to_image())
}

/// Source-over compositing in integer math. The output alpha is never below
/// the base alpha.
fn blend_over(base: &mut Rgba<u8>, top: &Rgba<u8>) {
    let top_alpha = u32::from(top[3]);
    if top_alpha == 0 {
        return;
    }
    if top_alpha == 255 {
        *base = *top;
        return;
    }
    let base_alpha = u32::from(base[3]);
    let top_weight = top_alpha * 255;
    let base_weight = base_alpha * (255 - top_alpha);
    // alpha scaled by 255; non-zero because top_alpha > 0
    let total = top_weight + base_weight;
    let mut out = [0u8; 4];
    for channel in 0..3 {
        let value = u32::from(top[channel]) * top_weight + u32::from(base[channel]) * base_weight;
        out[channel] = ((value + total / 2) / total) as u8;
    }
    out[3] = ((total + 127) / 255) as u8;
    *base = Rgba(out);
}
