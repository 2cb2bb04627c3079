//! Depth map unprojection into coloured camera-space vertices.
//!
//! Pixel `(x, y)` with depth `d` becomes, after the horizontal flip used by
//! the capture pipeline (`u = width - x`, `z = -d`):
//!
//! ```text
//! X = (u - cx) * z / fx
//! Y = (y - cy) * z / fy
//! Z = z
//! ```
//!
//! NaN depths are skipped. An optional rotation aligns measured gravity with
//! the down axis, and an optional heatmap recolours vertices by height.

use std::sync::atomic::{AtomicBool, Ordering};

use constants::coordinate_system::{COLOUR_CHANNELS, COLOUR_SCALE};
use glam::{Mat3, Vec3};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::calibration::Intrinsics;
use crate::distortion::{DistortionMode, build_pixel_map};
use crate::error::{PointCloudError, Result};
use crate::heatmap::{HeatmapBlend, HeightGradient, find_reference_pixel};
use crate::vertex::PointCloudVertex;

/// Pixel sampling stride. Only one pixel of every `k x k` block is reconstructed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Interlace {
    #[default]
    Full,
    Half,
    Quarter,
}

impl Interlace {
    pub fn stride(self) -> usize {
        match self {
            Interlace::Full => 1,
            Interlace::Half => 2,
            Interlace::Quarter => 4,
        }
    }

    /// Denser sampling for shorter recordings.
    pub fn for_frame_count(count: usize, thresholds: &InterlaceThresholds) -> Self {
        if count < thresholds.full_density_below {
            Interlace::Full
        } else if count < thresholds.half_density_below {
            Interlace::Half
        } else {
            Interlace::Quarter
        }
    }
}

/// Frame-count limits used to pick an interlace factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterlaceThresholds {
    pub full_density_below: usize,
    pub half_density_below: usize,
}

impl Default for InterlaceThresholds {
    fn default() -> Self {
        Self {
            full_density_below: constants::playback::FULL_DENSITY_FRAME_LIMIT,
            half_density_below: constants::playback::HALF_DENSITY_FRAME_LIMIT,
        }
    }
}

/// Per-frame reconstruction switches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructionOptions {
    pub distortion: DistortionMode,
    pub heatmap: bool,
    pub heatmap_blend: HeatmapBlend,
    /// Rotate vertices so the recorded gravity points down.
    pub gravity_alignment: bool,
    /// Depths at or beyond this distance (metres) are dropped.
    pub depth_truncation: Option<f32>,
}

impl Default for ReconstructionOptions {
    fn default() -> Self {
        Self {
            distortion: DistortionMode::Disabled,
            heatmap: false,
            heatmap_blend: HeatmapBlend::Average,
            gravity_alignment: true,
            depth_truncation: None,
        }
    }
}

/// Depth and colour buffers of one frame, validated against the frame size.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    pub width: usize,
    pub height: usize,
    /// One depth per pixel in metres, NaN where unmeasured.
    pub depths: Vec<f32>,
    /// Four bytes per pixel: R, G, B, ignored.
    pub colors: Vec<u8>,
}

impl RawFrame {
    pub fn new(width: usize, height: usize, depths: Vec<f32>, colors: Vec<u8>) -> Result<Self> {
        let pixels = width * height;
        if depths.len() != pixels {
            return Err(PointCloudError::DimensionMismatch {
                what: "depth",
                width,
                height,
                expected: pixels,
                actual: depths.len(),
            });
        }
        if colors.len() != pixels * COLOUR_CHANNELS {
            return Err(PointCloudError::DimensionMismatch {
                what: "colour",
                width,
                height,
                expected: pixels * COLOUR_CHANNELS,
                actual: colors.len(),
            });
        }
        Ok(Self {
            width,
            height,
            depths,
            colors,
        })
    }

    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }
}

/// Everything needed to unproject one frame.
#[derive(Debug, Clone)]
pub struct Reconstruction<'a> {
    pub intrinsics: Intrinsics,
    pub interlace: Interlace,
    pub rotation: Option<Mat3>,
    pub options: &'a ReconstructionOptions,
    /// Forward lens distortion table, only read in `DistortionMode::Rectify`.
    pub distortion_table: &'a [f32],
}

impl Reconstruction<'_> {
    /// Unprojects `frame`. When `cancel` is raised between rows the partial
    /// result is discarded and `Cancelled` returned.
    pub fn run(
        &self,
        frame: &RawFrame,
        cancel: Option<&AtomicBool>,
    ) -> Result<Vec<PointCloudVertex>> {
        let width = frame.width;
        let height = frame.height;
        let stride = self.interlace.stride();

        let pixel_map = match self.options.distortion {
            DistortionMode::Disabled => None,
            DistortionMode::Rectify => Some(build_pixel_map(
                width,
                height,
                self.intrinsics.distortion_center,
                self.distortion_table,
            )?),
        };
        let source_pixel = |x: usize, y: usize| -> Option<usize> {
            let index = y * width + x;
            match &pixel_map {
                Some(map) => map[index],
                None => Some(index),
            }
        };

        let reference_y = if self.options.heatmap {
            let reference = find_reference_pixel(
                &frame.depths,
                width,
                height,
                (self.intrinsics.cx, self.intrinsics.cy),
            )
            .and_then(|(x, y)| self.unproject(frame, y * width + x))
            .map(|point| point.y);
            if reference.is_none() {
                warn!("No valid depth near the principal point, heatmap skipped");
            }
            reference
        } else {
            None
        };
        let gradient = reference_y.map(|_| HeightGradient::default());

        // Only complete stride x stride blocks are sampled.
        let columns = width / stride;
        let rows = height / stride;
        let mut vertices = Vec::with_capacity(columns * rows);
        for y in (0..rows).map(|row| row * stride) {
            if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                return Err(PointCloudError::Cancelled);
            }
            for x in (0..columns).map(|column| column * stride) {
                let Some(index) = source_pixel(x, y) else {
                    continue;
                };
                let Some(point) = self.unproject(frame, index) else {
                    continue;
                };

                let c = index * COLOUR_CHANNELS;
                let mut vertex = PointCloudVertex {
                    x: point.x,
                    y: point.y,
                    z: point.z,
                    r: frame.colors[c] as f32 * COLOUR_SCALE,
                    g: frame.colors[c + 1] as f32 * COLOUR_SCALE,
                    b: frame.colors[c + 2] as f32 * COLOUR_SCALE,
                };
                if let (Some(gradient), Some(reference_y)) = (&gradient, reference_y) {
                    gradient.apply(&mut vertex, reference_y, self.options.heatmap_blend);
                }
                vertices.push(vertex);
            }
        }

        debug!(
            "Reconstructed {} vertices from {}x{} depth map (stride {})",
            vertices.len(),
            width,
            height,
            stride
        );
        Ok(vertices)
    }

    /// Camera-space position of the pixel at `index`, `None` for invalid depth.
    fn unproject(&self, frame: &RawFrame, index: usize) -> Option<Vec3> {
        let depth = frame.depths[index];
        if depth.is_nan() {
            return None;
        }
        if self.options.depth_truncation.is_some_and(|limit| depth >= limit) {
            return None;
        }

        let Intrinsics { fx, fy, cx, cy, .. } = self.intrinsics;
        let u = (frame.width - index % frame.width) as f32;
        let v = (index / frame.width) as f32;
        let z = -depth;
        let point = Vec3::new((u - cx) * z / fx, (v - cy) * z / fy, z);

        Some(match self.rotation {
            Some(rotation) => rotation * point,
            None => point,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gravity::alignment_rotation;
    use approx::assert_relative_eq;

    fn flat_frame(width: usize, height: usize, depth: f32) -> RawFrame {
        let colors = (0..width * height)
            .flat_map(|i| [(i % 256) as u8, 128, 255, 0])
            .collect();
        RawFrame::new(width, height, vec![depth; width * height], colors).unwrap()
    }

    fn run(
        frame: &RawFrame,
        interlace: Interlace,
        options: &ReconstructionOptions,
    ) -> Vec<PointCloudVertex> {
        Reconstruction {
            intrinsics: Intrinsics::new(4.0, 4.0, 2.0, 2.0),
            interlace,
            rotation: None,
            options,
            distortion_table: &[],
        }
        .run(frame, None)
        .unwrap()
    }

    #[test]
    fn test_four_by_four_grid() {
        let frame = flat_frame(4, 4, 1.0);
        let vertices = run(&frame, Interlace::Full, &ReconstructionOptions::default());
        assert_eq!(vertices.len(), 16);

        for v in &vertices {
            assert_relative_eq!(v.z, -1.0);
        }
        // Row 0: x = 0..3 flips to u = 4..1.
        let xs: Vec<f32> = vertices[..4].iter().map(|v| v.x).collect();
        assert_eq!(xs, vec![-0.5, -0.25, 0.0, 0.25]);
        let ys: Vec<f32> = vertices.iter().step_by(4).map(|v| v.y).collect();
        assert_eq!(ys, vec![0.5, 0.25, 0.0, -0.25]);
    }

    #[test]
    fn test_colours_are_normalised() {
        let frame = flat_frame(4, 4, 1.0);
        let vertices = run(&frame, Interlace::Full, &ReconstructionOptions::default());
        assert_relative_eq!(vertices[3].r, 3.0 / 255.0);
        assert_relative_eq!(vertices[3].g, 128.0 / 255.0);
        assert_relative_eq!(vertices[3].b, 1.0);
    }

    #[test]
    fn test_nan_pixels_are_skipped() {
        let mut frame = flat_frame(4, 4, 2.0);
        frame.depths[0] = f32::NAN;
        frame.depths[5] = f32::NAN;
        frame.depths[15] = f32::NAN;
        let vertices = run(&frame, Interlace::Full, &ReconstructionOptions::default());
        assert_eq!(vertices.len(), 13);
        assert!(vertices.iter().all(|v| v.x.is_finite() && v.y.is_finite()));
    }

    #[test]
    fn test_all_nan_frame_yields_nothing() {
        let frame = flat_frame(6, 3, f32::NAN);
        let vertices = run(&frame, Interlace::Full, &ReconstructionOptions::default());
        assert!(vertices.is_empty());
    }

    #[test]
    fn test_interlace_limits_vertex_count() {
        let frame = flat_frame(8, 8, 1.0);
        let options = ReconstructionOptions::default();
        assert_eq!(run(&frame, Interlace::Half, &options).len(), 16);
        assert_eq!(run(&frame, Interlace::Quarter, &options).len(), 4);
    }

    #[test]
    fn test_interlace_skips_partial_edge_blocks() {
        let frame = flat_frame(5, 5, 1.0);
        let options = ReconstructionOptions::default();
        assert_eq!(run(&frame, Interlace::Half, &options).len(), 4);
        assert_eq!(run(&frame, Interlace::Quarter, &options).len(), 1);
        assert_eq!(run(&flat_frame(3, 9, 1.0), Interlace::Quarter, &options).len(), 0);
        assert_eq!(run(&frame, Interlace::Full, &options).len(), 25);
    }

    #[test]
    fn test_depth_truncation() {
        let mut frame = flat_frame(4, 4, 1.0);
        frame.depths[..8].fill(3.0);
        let options = ReconstructionOptions {
            depth_truncation: Some(2.0),
            ..Default::default()
        };
        assert_eq!(run(&frame, Interlace::Full, &options).len(), 8);
    }

    #[test]
    fn test_deterministic_output() {
        let mut frame = flat_frame(5, 7, 1.5);
        frame.depths[3] = f32::NAN;
        let options = ReconstructionOptions::default();
        let first = run(&frame, Interlace::Full, &options);
        let second = run(&frame, Interlace::Full, &options);
        assert_eq!(first, second);
    }

    #[test]
    fn test_identity_gravity_leaves_points_unchanged() {
        let frame = flat_frame(4, 4, 1.0);
        let options = ReconstructionOptions::default();
        let plain = run(&frame, Interlace::Full, &options);
        let rotated = Reconstruction {
            intrinsics: Intrinsics::new(4.0, 4.0, 2.0, 2.0),
            interlace: Interlace::Full,
            rotation: Some(alignment_rotation(Vec3::new(0.0, -1.0, 0.0))),
            options: &options,
            distortion_table: &[],
        }
        .run(&frame, None)
        .unwrap();
        assert_eq!(plain, rotated);
    }

    #[test]
    fn test_heatmap_recolours_reference_height() {
        let frame = flat_frame(4, 4, 1.0);
        let options = ReconstructionOptions {
            heatmap: true,
            heatmap_blend: HeatmapBlend::Replace,
            ..Default::default()
        };
        let vertices = run(&frame, Interlace::Full, &options);
        // Reference pixel (2, 2) sits at y = 0; rows at +/-0.25 m stay uncoloured.
        let center = vertices[2 * 4 + 2];
        let gradient = HeightGradient::default();
        assert_eq!(Some(center.colour()), gradient.colour_for(0.0));
        assert_relative_eq!(vertices[0].g, 128.0 / 255.0);
    }

    #[test]
    fn test_rectify_with_zero_table_matches_plain() {
        let frame = flat_frame(4, 4, 1.0);
        let plain = run(&frame, Interlace::Full, &ReconstructionOptions::default());
        let options = ReconstructionOptions {
            distortion: DistortionMode::Rectify,
            ..Default::default()
        };
        let rectified = Reconstruction {
            intrinsics: Intrinsics::new(4.0, 4.0, 2.0, 2.0),
            interlace: Interlace::Full,
            rotation: None,
            options: &options,
            distortion_table: &[0.0, 0.0],
        }
        .run(&frame, None)
        .unwrap();
        assert_eq!(plain, rectified);
    }

    #[test]
    fn test_cancelled_reconstruction() {
        let frame = flat_frame(4, 4, 1.0);
        let options = ReconstructionOptions::default();
        let cancel = AtomicBool::new(true);
        let result = Reconstruction {
            intrinsics: Intrinsics::new(4.0, 4.0, 2.0, 2.0),
            interlace: Interlace::Full,
            rotation: None,
            options: &options,
            distortion_table: &[],
        }
        .run(&frame, Some(&cancel));
        assert!(matches!(result, Err(PointCloudError::Cancelled)));
    }

    #[test]
    fn test_dimension_mismatch() {
        assert!(matches!(
            RawFrame::new(4, 4, vec![1.0; 15], vec![0; 64]),
            Err(PointCloudError::DimensionMismatch { what: "depth", .. })
        ));
        assert!(matches!(
            RawFrame::new(4, 4, vec![1.0; 16], vec![0; 48]),
            Err(PointCloudError::DimensionMismatch { what: "colour", .. })
        ));
    }

    #[test]
    fn test_interlace_thresholds() {
        let thresholds = InterlaceThresholds::default();
        assert_eq!(Interlace::for_frame_count(10, &thresholds), Interlace::Full);
        assert_eq!(Interlace::for_frame_count(120, &thresholds), Interlace::Half);
        assert_eq!(Interlace::for_frame_count(299, &thresholds), Interlace::Half);
        assert_eq!(Interlace::for_frame_count(300, &thresholds), Interlace::Quarter);
    }
}
