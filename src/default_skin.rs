use crate::codec::{SKIN_WIDTH, SkinBitmap, SkinLayout};
use image::{Rgba, RgbaImage};
use std::sync::OnceLock;

pub const HAIR: Rgba<u8> = Rgba([58, 40, 22, 255]);
pub const SKIN_TONE: Rgba<u8> = Rgba([184, 136, 108, 255]);
pub const EYE_WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
pub const EYE_IRIS: Rgba<u8> = Rgba([82, 61, 137, 255]);
pub const MOUTH: Rgba<u8> = Rgba([118, 68, 52, 255]);
pub const SHIRT: Rgba<u8> = Rgba([0, 168, 168, 255]);
pub const TROUSERS: Rgba<u8> = Rgba([62, 58, 160, 255]);
pub const SHOES: Rgba<u8> = Rgba([72, 72, 72, 255]);

static DEFAULT_SKIN: OnceLock<SkinBitmap> = OnceLock::new();

/// The placeholder served when no real skin can be found. Modern layout with
/// an empty second layer, so its helm and avatar renders are identical.
pub fn default_skin() -> SkinBitmap {
    DEFAULT_SKIN.get_or_init(build_default_skin).clone()
}

fn build_default_skin() -> SkinBitmap {
    let mut image = RgbaImage::new(SKIN_WIDTH, SkinLayout::Modern.height());

    // head: top, bottom, right, front, left, back
    fill(&mut image, 8, 0, 8, 8, HAIR);
    fill(&mut image, 16, 0, 8, 8, SKIN_TONE);
    fill(&mut image, 0, 8, 32, 8, SKIN_TONE);
    fill(&mut image, 0, 8, 32, 2, HAIR);
    fill(&mut image, 24, 8, 8, 8, HAIR);
    paint_face(&mut image, 8, 8);

    // body and arms
    fill(&mut image, 16, 16, 24, 16, SHIRT);
    fill(&mut image, 40, 16, 16, 16, SKIN_TONE);
    fill(&mut image, 40, 16, 16, 8, SHIRT);
    fill(&mut image, 32, 48, 16, 16, SKIN_TONE);
    fill(&mut image, 32, 48, 16, 8, SHIRT);

    // legs
    fill(&mut image, 0, 16, 16, 16, TROUSERS);
    fill(&mut image, 0, 28, 16, 4, SHOES);
    fill(&mut image, 16, 48, 16, 16, TROUSERS);
    fill(&mut image, 16, 60, 16, 4, SHOES);

    SkinBitmap::from_parts(image, SkinLayout::Modern)
}

fn paint_face(image: &mut RgbaImage, origin_x: u32, origin_y: u32) {
    fill(image, origin_x, origin_y + 2, 8, 6, SKIN_TONE);
    image.put_pixel(origin_x + 1, origin_y + 4, EYE_WHITE);
    image.put_pixel(origin_x + 2, origin_y + 4, EYE_IRIS);
    image.put_pixel(origin_x + 5, origin_y + 4, EYE_IRIS);
    image.put_pixel(origin_x + 6, origin_y + 4, EYE_WHITE);
    fill(image, origin_x + 3, origin_y + 6, 2, 1, MOUTH);
}

fn fill(image: &mut RgbaImage, x: u32, y: u32, width: u32, height: u32, color: Rgba<u8>) {
    for py in y..y + height {
        for px in x..x + width {
            image.put_pixel(px, py, color);
        }
    }
}
