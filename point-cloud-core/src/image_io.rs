//! Conversions between raw frame buffers and `image` buffers.
use std::path::Path;

use constants::coordinate_system::{COLOUR_CHANNELS, MAX_EXPORT_DEPTH_METERS};
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma, RgbImage, RgbaImage};

use crate::error::{PointCloudError, Result};

pub type DepthImage = ImageBuffer<Luma<u16>, Vec<u16>>;

/// 16-bit grayscale depth in millimetres. NaN and depths past the 16-bit
/// range saturate to the maximum value.
pub fn depth_image(depths: &[f32], width: usize, height: usize) -> Result<DepthImage> {
    check_len("depth", depths.len(), width, height, 1)?;
    let millimetres = depths
        .iter()
        .map(|&d| {
            if d.is_nan() || d > MAX_EXPORT_DEPTH_METERS {
                u16::MAX
            } else {
                (d.max(0.0) * 1000.0) as u16
            }
        })
        .collect();
    ImageBuffer::from_raw(width as u32, height as u32, millimetres)
        .ok_or_else(|| mismatch("depth", width, height, 1, depths.len()))
}

/// RGB image from four-byte RGBX pixels, dropping the unused channel.
pub fn color_image(colors: &[u8], width: usize, height: usize) -> Result<RgbImage> {
    check_len("colour", colors.len(), width, height, COLOUR_CHANNELS)?;
    let rgb = colors
        .chunks_exact(COLOUR_CHANNELS)
        .flat_map(|px| [px[0], px[1], px[2]])
        .collect();
    RgbImage::from_raw(width as u32, height as u32, rgb)
        .ok_or_else(|| mismatch("colour", width, height, COLOUR_CHANNELS, colors.len()))
}

/// Resamples an RGBX buffer from `from` to `to` (width, height).
pub fn resize_colors(colors: &[u8], from: (usize, usize), to: (usize, usize)) -> Result<Vec<u8>> {
    check_len("colour", colors.len(), from.0, from.1, COLOUR_CHANNELS)?;
    let source = RgbaImage::from_raw(from.0 as u32, from.1 as u32, colors.to_vec())
        .ok_or_else(|| mismatch("colour", from.0, from.1, COLOUR_CHANNELS, colors.len()))?;
    let resized = imageops::resize(&source, to.0 as u32, to.1 as u32, FilterType::Triangle);
    Ok(resized.into_raw())
}

pub fn save_depth_png(path: &Path, depths: &[f32], width: usize, height: usize) -> Result<()> {
    depth_image(depths, width, height)?.save(path)?;
    Ok(())
}

pub fn save_color_png(path: &Path, colors: &[u8], width: usize, height: usize) -> Result<()> {
    color_image(colors, width, height)?.save(path)?;
    Ok(())
}

fn check_len(
    what: &'static str,
    actual: usize,
    width: usize,
    height: usize,
    per_pixel: usize,
) -> Result<()> {
    if actual != width * height * per_pixel {
        return Err(mismatch(what, width, height, per_pixel, actual));
    }
    Ok(())
}

fn mismatch(
    what: &'static str,
    width: usize,
    height: usize,
    per_pixel: usize,
    actual: usize,
) -> PointCloudError {
    PointCloudError::DimensionMismatch {
        what,
        width,
        height,
        expected: width * height * per_pixel,
        actual,
    }
}
