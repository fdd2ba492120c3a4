use image::imageops::FilterType;
use image::{ImageFormat, Rgb, RgbImage, RgbaImage};
use vto_core::{GarmentCategory, GarmentType};
use crate::encode::encode_or_blank;
use crate::fallback::{silhouette, DEFAULT_HEIGHT, DEFAULT_WIDTH};

/// A garment image handed to the preview renderer
#[derive(Debug, Clone, Copy)]
pub struct PreviewGarment<'a> {
    pub garment_type: GarmentType,
    pub image: &'a [u8],
}

/// Body region a garment type is pasted onto, as fractions of the frame
fn region(garment_type: GarmentType) -> (f32, f32, f32, f32) {
    match garment_type {
        GarmentType::Top => (0.25, 0.24, 0.75, 0.55),
        GarmentType::Bottom => (0.28, 0.52, 0.72, 0.94),
        GarmentType::Dress => (0.25, 0.24, 0.75, 0.86),
        GarmentType::Outer => (0.2, 0.22, 0.8, 0.6),
    }
}

/// Paint order so outerwear sits on top of tops, tops on top of bottoms
fn layer(garment_type: GarmentType) -> u8 {
    match garment_type {
        GarmentType::Bottom => 0,
        GarmentType::Dress => 1,
        GarmentType::Top => 2,
        GarmentType::Outer => 3,
    }
}

/// Small deterministic offset derived from the seed and slot
fn jitter(seed: i32, slot: usize) -> (i64, i64) {
    let mut state = (seed as u32 as u64) ^ (slot as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    let dx = ((state >> 33) % 17) as i64 - 8;
    let dy = ((state >> 17) % 17) as i64 - 8;
    (dx, dy)
}

/// Render a synthetic try-on preview as PNG.
///
/// The model image (or a plain silhouette when it can't be decoded) is used as
/// the backdrop and each decodable garment is blended onto the body region of
/// its type. Output is deterministic for identical inputs.
pub fn render_preview(
    model_image: &[u8],
    garments: &[PreviewGarment],
    category: GarmentCategory,
    slot: usize,
    seed: i32,
) -> Vec<u8> {
    let (width, height) = (DEFAULT_WIDTH, DEFAULT_HEIGHT);

    let mut canvas = match image::load_from_memory(model_image) {
        Ok(img) => img.resize_to_fill(width, height, FilterType::Triangle).to_rgb8(),
        Err(e) => {
            log::debug!("Model image not decodable for preview, using silhouette: {}", e);
            silhouette(width, height, slot)
        }
    };

    let mut ordered: Vec<&PreviewGarment> = garments.iter().collect();
    ordered.sort_by_key(|g| layer(g.garment_type));

    let (dx, dy) = jitter(seed, slot);

    for garment in ordered {
        let Ok(img) = image::load_from_memory(garment.image) else {
            log::debug!("Skipping undecodable {} image in preview", garment.garment_type);
            continue;
        };

        // A dress already covers the legs; a separate bottom would be hidden anyway
        if category == GarmentCategory::Dress && garment.garment_type == GarmentType::Bottom {
            continue;
        }

        let (x0, y0, x1, y1) = region(garment.garment_type);
        let rw = ((x1 - x0) * width as f32) as u32;
        let rh = ((y1 - y0) * height as f32) as u32;
        if rw == 0 || rh == 0 {
            continue;
        }

        let patch = img.resize_exact(rw, rh, FilterType::Triangle).to_rgba8();
        let left = (x0 * width as f32) as i64 + dx;
        let top = (y0 * height as f32) as i64 + dy;
        blend(&mut canvas, &patch, left, top, 0.8);
    }

    encode_or_blank(canvas, ImageFormat::Png)
}

fn blend(canvas: &mut RgbImage, patch: &RgbaImage, left: i64, top: i64, opacity: f32) {
    let (cw, ch) = (canvas.width() as i64, canvas.height() as i64);

    for (x, y, src) in patch.enumerate_pixels() {
        let (tx, ty) = (left + x as i64, top + y as i64);
        if tx < 0 || ty < 0 || tx >= cw || ty >= ch {
            continue;
        }

        let alpha = (src.0[3] as f32 / 255.0) * opacity;
        let dst = canvas.get_pixel_mut(tx as u32, ty as u32);
        let mix = |s: u8, d: u8| (s as f32 * alpha + d as f32 * (1.0 - alpha)).round() as u8;
        *dst = Rgb([
            mix(src.0[0], dst.0[0]),
            mix(src.0[1], dst.0[1]),
            mix(src.0[2], dst.0[2]),
        ]);
    }
}
