use image::imageops::FilterType;
use image::{ImageFormat, Rgb, RgbImage};
use crate::encode::encode_or_blank;

pub const DEFAULT_WIDTH: u32 = 512;
pub const DEFAULT_HEIGHT: u32 = 768;

/// Inputs available when a placeholder has to stand in for a real result
#[derive(Debug, Clone, Copy, Default)]
pub struct SynthContext<'a> {
    pub slot_index: usize,
    /// Images the request was built from, most relevant first (usually the model image)
    pub source_images: &'a [Vec<u8>],
}

impl<'a> SynthContext<'a> {
    pub fn new(slot_index: usize) -> Self {
        Self { slot_index, source_images: &[] }
    }

    pub fn with_sources(slot_index: usize, source_images: &'a [Vec<u8>]) -> Self {
        Self { slot_index, source_images }
    }
}

/// Produces placeholder JPEGs whenever a real result image is unavailable.
///
/// Never fails: undecodable sources fall back to a plain silhouette.
#[derive(Debug, Clone, Copy)]
pub struct FallbackImageSynthesizer {
    width: u32,
    height: u32,
}

impl Default for FallbackImageSynthesizer {
    fn default() -> Self {
        Self::new(DEFAULT_WIDTH, DEFAULT_HEIGHT)
    }
}

impl FallbackImageSynthesizer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }

    /// Render and encode a placeholder as JPEG
    pub fn synthesize(&self, ctx: &SynthContext) -> Vec<u8> {
        encode_or_blank(self.render(ctx), ImageFormat::Jpeg)
    }

    pub fn render(&self, ctx: &SynthContext) -> RgbImage {
        let source = ctx
            .source_images
            .iter()
            .find_map(|bytes| image::load_from_memory(bytes).ok());

        match source {
            Some(img) => {
                let base = img
                    .resize_to_fill(self.width, self.height, FilterType::Triangle)
                    .to_rgb8();
                veil(base, ctx.slot_index)
            }
            None => silhouette(self.width, self.height, ctx.slot_index),
        }
    }
}

/// Accent colour for a slot, so side-by-side placeholders are distinguishable
pub(crate) fn slot_color(slot: usize) -> [u8; 3] {
    const PALETTE: [[u8; 3]; 6] = [
        [150, 150, 180],
        [180, 140, 150],
        [140, 175, 150],
        [185, 170, 130],
        [150, 135, 185],
        [130, 170, 185],
    ];
    PALETTE[slot % PALETTE.len()]
}

/// Washed-out, striped version of the source image
fn veil(mut img: RgbImage, slot: usize) -> RgbImage {
    let tint = slot_color(slot);

    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let [r, g, b] = pixel.0;
        let gray = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
        let stripe = if (x + y) / 48 % 2 == 0 { 1.0 } else { 0.85 };

        let mix = |c: u8| ((gray * 0.7 + c as f32 * 0.3) * stripe).clamp(0.0, 255.0) as u8;
        *pixel = Rgb([mix(tint[0]), mix(tint[1]), mix(tint[2])]);
    }

    img
}

/// Gradient backdrop with a simple figure outline
pub(crate) fn silhouette(width: u32, height: u32, slot: usize) -> RgbImage {
    let tint = slot_color(slot);
    let (w, h) = (width as f32, height as f32);

    let head_center = (w * 0.5, h * 0.18);
    let head_radius = w.min(h) * 0.09;
    let torso = (w * 0.32, h * 0.3, w * 0.68, h * 0.92);

    RgbImage::from_fn(width, height, |x, y| {
        let (px, py) = (x as f32, y as f32);

        let dx = px - head_center.0;
        let dy = py - head_center.1;
        let in_head = (dx * dx + dy * dy).sqrt() < head_radius;
        let in_torso = px >= torso.0 && px <= torso.2 && py >= torso.1 && py <= torso.3;

        if in_head || in_torso {
            Rgb([tint[0], tint[1], tint[2]])
        } else {
            let bg_brightness = 0.2 + (py / h) * 0.1;
            Rgb([
                (200.0 * bg_brightness) as u8,
                (200.0 * bg_brightness) as u8,
                (220.0 * bg_brightness) as u8,
            ])
        }
    })
}
