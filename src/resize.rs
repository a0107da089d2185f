use crate::render::RenderError;
use image::RgbaImage;

/// Point-sampled resize: destination `(x, y)` copies source
/// `(x * src_w / width, y * src_h / height)`, rounded down. No filtering, so
/// pixel art stays crisp at any scale.
pub fn resize(width: u32, height: u32, source: &RgbaImage) -> Result<RgbaImage, RenderError> {
    let (src_width, src_height) = source.dimensions();
    if width == 0 || height == 0 || src_width == 0 || src_height == 0 {
        return Err(RenderError::InvalidDimensions { width, height });
    }
    if (src_width, src_height) == (width, height) {
        return Ok(source.clone());
    }
    let column_map: Vec<u32> = (0..width)
        .map(|x| sample_index(x, src_width, width))
        .collect();
    let row_map: Vec<u32> = (0..height)
        .map(|y| sample_index(y, src_height, height))
        .collect();
    Ok(RgbaImage::from_fn(width, height, |x, y| {
        *source.get_pixel(column_map[x as usize], row_map[y as usize])
    }))
}

fn sample_index(dest: u32, src_len: u32, dest_len: u32) -> u32 {
    (u64::from(dest) * u64::from(src_len) / u64::from(dest_len)) as u32
}
