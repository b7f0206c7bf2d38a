use std::io::Cursor;

use bytes::Bytes;
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType};
use thiserror::Error;
use tokio::task;
use tracing::{info, warn};

pub const MAX_EDGE: u32 = 1200;
pub const PRODUCT_QUALITY: u8 = 85;
pub const SCENE_QUALITY: u8 = 80;

#[derive(Debug, Error)]
pub enum PreprocessError {
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Decodes any supported format and re-encodes as JPEG inside a
/// `max_edge` x `max_edge` box. Never enlarges.
pub fn normalize_jpeg(bytes: &[u8], max_edge: u32, quality: u8) -> Result<Bytes, PreprocessError> {
    let img = image::load_from_memory(bytes)?;
    let img = if img.width() > max_edge || img.height() > max_edge {
        img.resize(max_edge, max_edge, FilterType::Triangle)
    } else {
        img
    };

    let mut out = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut out, quality).encode_image(&img.to_rgb8())?;
    Ok(Bytes::from(out.into_inner()))
}

/// Like `normalize_jpeg`, but hands back the original buffer when it cannot
/// be decoded.
pub fn normalize_or_passthrough(bytes: Bytes, quality: u8, label: &str) -> Bytes {
    match normalize_jpeg(&bytes, MAX_EDGE, quality) {
        Ok(out) => {
            info!("🗜️ {} image normalised: {} -> {} bytes", label, bytes.len(), out.len());
            out
        }
        Err(e) => {
            warn!("⚠️ {} image compression failed, using original: {}", label, e);
            bytes
        }
    }
}

/// Runs `normalize_or_passthrough` on the blocking pool. A panicked or
/// cancelled job passes the original buffer through.
pub async fn normalize_blocking(bytes: Bytes, quality: u8, label: &'static str) -> Bytes {
    let original = bytes.clone();
    match task::spawn_blocking(move || normalize_or_passthrough(bytes, quality, label)).await {
        Ok(out) => out,
        Err(e) => {
            warn!("⚠️ {} image normalisation task failed, using original: {}", label, e);
            original
        }
    }
}

#[cfg(test)]
pub(crate) fn png_fixture(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 180, 160]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).expect("encode png");
    out.into_inner()
}
