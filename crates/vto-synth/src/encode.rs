use std::io::Cursor;
use image::{DynamicImage, ImageFormat, ImageResult, Rgb, RgbImage};

pub(crate) fn encode(img: RgbImage, format: ImageFormat) -> ImageResult<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img).write_to(&mut buf, format)?;
    Ok(buf.into_inner())
}

/// Encode the image, retrying with a small solid frame if the encoder fails.
/// In-memory PNG/JPEG encoding of an RGB8 buffer does not fail in practice.
pub(crate) fn encode_or_blank(img: RgbImage, format: ImageFormat) -> Vec<u8> {
    match encode(img, format) {
        Ok(bytes) if !bytes.is_empty() => bytes,
        Ok(_) => {
            log::error!("{:?} encoder produced an empty buffer, using blank frame", format);
            blank(format)
        }
        Err(e) => {
            log::error!("Failed to encode {:?} image, using blank frame: {}", format, e);
            blank(format)
        }
    }
}

fn blank(format: ImageFormat) -> Vec<u8> {
    encode(RgbImage::from_pixel(16, 16, Rgb([128, 128, 128])), format).unwrap_or_default()
}
