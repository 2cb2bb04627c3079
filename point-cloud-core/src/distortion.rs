//! Lens distortion correction through a radial lookup table.
//!
//! The calibration carries a 1-D table of distortion magnitudes sampled
//! uniformly from the distortion center (r = 0) out to the farthest image
//! corner (r = r_max). Intermediate radii are linearly interpolated. The table
//! is turned into a per-pixel map telling which source pixel lands on each
//! rectilinear output pixel.

use crate::error::{PointCloudError, Result};
use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Whether reconstruction samples pixels through the distortion map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistortionMode {
    /// Sample every pixel where it lies.
    #[default]
    Disabled,
    /// Sample through the inverse lookup table, skipping pixels mapped off-image.
    Rectify,
}

/// Radial magnitude lookup with linear interpolation.
#[derive(Debug, Clone)]
pub struct RadialLookup<'a> {
    table: &'a [f32],
    r_max: f32,
}

impl<'a> RadialLookup<'a> {
    pub fn new(table: &'a [f32], r_max: f32) -> Result<Self> {
        if table.is_empty() {
            return Err(PointCloudError::EmptyDistortionTable);
        }
        Ok(Self { table, r_max })
    }

    /// Magnitude at radius `r`; radii at or beyond `r_max` use the last entry.
    pub fn magnitude(&self, r: f32) -> f32 {
        let last = self.table.len() - 1;
        if r >= self.r_max || last == 0 {
            return self.table[last];
        }
        let position = r.max(0.0) * last as f32 / self.r_max;
        let index = (position as usize).min(last - 1);
        let fraction = position - index as f32;
        (1.0 - fraction) * self.table[index] + fraction * self.table[index + 1]
    }
}

/// Builds the source pixel for every output pixel of a `width` x `height` image.
/// Entries are `None` where the corrected position falls outside the image.
pub fn build_pixel_map(
    width: usize,
    height: usize,
    center: Vec2,
    table: &[f32],
) -> Result<Vec<Option<usize>>> {
    let x_max = center.x.max(width as f32 - center.x);
    let y_max = center.y.max(height as f32 - center.y);
    let r_max = (x_max * x_max + y_max * y_max).sqrt();
    let lookup = RadialLookup::new(table, r_max)?;

    let map = (0..width * height)
        .map(|i| {
            let x = (i % width) as f32 - center.x;
            let y = (i / width) as f32 - center.y;
            let magnitude = lookup.magnitude((x * x + y * y).sqrt());

            let nx = (center.x + x + magnitude * x).round();
            let ny = (center.y + y + magnitude * y).round();
            if nx < 0.0 || ny < 0.0 || nx >= width as f32 || ny >= height as f32 {
                None
            } else {
                Some(ny as usize * width + nx as usize)
            }
        })
        .collect();

    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_zero_table_is_identity() {
        let map = build_pixel_map(8, 6, Vec2::new(4.0, 3.0), &[0.0, 0.0, 0.0]).unwrap();
        for (i, entry) in map.iter().enumerate() {
            assert_eq!(*entry, Some(i));
        }
    }

    #[test]
    fn test_interpolation_between_entries() {
        let table = [0.0, 1.0, 3.0];
        let lookup = RadialLookup::new(&table, 10.0).unwrap();
        assert_relative_eq!(lookup.magnitude(0.0), 0.0);
        assert_relative_eq!(lookup.magnitude(2.5), 0.5);
        assert_relative_eq!(lookup.magnitude(7.5), 2.0);
        assert_relative_eq!(lookup.magnitude(10.0), 3.0);
        assert_relative_eq!(lookup.magnitude(42.0), 3.0);
    }

    #[test]
    fn test_single_entry_table() {
        let table = [0.2];
        let lookup = RadialLookup::new(&table, 5.0).unwrap();
        assert_relative_eq!(lookup.magnitude(1.0), 0.2);
    }

    #[test]
    fn test_strong_distortion_pushes_corners_off_image() {
        let map = build_pixel_map(8, 8, Vec2::new(4.0, 4.0), &[0.0, 1.0]).unwrap();
        // Center pixel stays put, the far corner maps outside.
        assert_eq!(map[4 * 8 + 4], Some(4 * 8 + 4));
        assert_eq!(map[0], None);
    }

    #[test]
    fn test_empty_table_is_rejected() {
        assert!(matches!(
            build_pixel_map(4, 4, Vec2::ZERO, &[]),
            Err(PointCloudError::EmptyDistortionTable)
        ));
    }
}
