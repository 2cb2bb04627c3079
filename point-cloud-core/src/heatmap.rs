//! Height heatmap colouring relative to a reference pixel.
//!
//! A 100-stop gradient (white, cyan, green, yellow, red) is indexed by the
//! signed height difference between a vertex and the reference height.
//! `-HEIGHT_RANGE_METERS` maps to the first stop and `+HEIGHT_RANGE_METERS`
//! to the last; vertices outside that band keep their colour.

use constants::heatmap::{CENTER_SEARCH_RADIUS, GRADIENT_KEYS, GRADIENT_STOPS, HEIGHT_RANGE_METERS};
use serde::{Deserialize, Serialize};

use crate::vertex::PointCloudVertex;

/// How the gradient colour combines with the captured colour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeatmapBlend {
    /// Average of gradient and captured colour.
    #[default]
    Average,
    /// Gradient colour only.
    Replace,
}

#[derive(Debug, Clone)]
pub struct HeightGradient {
    stops: Vec<[f32; 3]>,
}

impl Default for HeightGradient {
    fn default() -> Self {
        Self::new(GRADIENT_STOPS)
    }
}

impl HeightGradient {
    /// Evenly interpolates `stop_count` colours across the key colours.
    pub fn new(stop_count: usize) -> Self {
        let stop_count = stop_count.max(2);
        let segments = (GRADIENT_KEYS.len() - 1) as f32;
        let stops = (0..stop_count)
            .map(|i| {
                let t = i as f32 / (stop_count - 1) as f32 * segments;
                let segment = (t as usize).min(GRADIENT_KEYS.len() - 2);
                let fraction = t - segment as f32;
                let from = GRADIENT_KEYS[segment];
                let to = GRADIENT_KEYS[segment + 1];
                [
                    from[0] + (to[0] - from[0]) * fraction,
                    from[1] + (to[1] - from[1]) * fraction,
                    from[2] + (to[2] - from[2]) * fraction,
                ]
            })
            .collect();
        Self { stops }
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    pub fn stop(&self, index: usize) -> Option<[f32; 3]> {
        self.stops.get(index).copied()
    }

    /// Gradient colour for a signed height difference, `None` outside the band.
    pub fn colour_for(&self, height_delta: f32) -> Option<[f32; 3]> {
        if !height_delta.is_finite() || height_delta.abs() > HEIGHT_RANGE_METERS {
            return None;
        }
        let t = (height_delta + HEIGHT_RANGE_METERS) / (2.0 * HEIGHT_RANGE_METERS);
        let index = (t * (self.stops.len() - 1) as f32).round() as usize;
        self.stop(index.min(self.stops.len() - 1))
    }

    /// Recolours a vertex by its height relative to `reference_y`.
    pub fn apply(&self, vertex: &mut PointCloudVertex, reference_y: f32, blend: HeatmapBlend) {
        let Some([r, g, b]) = self.colour_for(vertex.y - reference_y) else {
            return;
        };
        match blend {
            HeatmapBlend::Average => {
                vertex.r = (vertex.r + r) * 0.5;
                vertex.g = (vertex.g + g) * 0.5;
                vertex.b = (vertex.b + b) * 0.5;
            }
            HeatmapBlend::Replace => {
                vertex.r = r;
                vertex.g = g;
                vertex.b = b;
            }
        }
    }
}

/// Finds the pixel used as the reference height: the pixel at `center` when
/// its depth is valid, otherwise the nearest valid pixel within the search radius.
pub fn find_reference_pixel(
    depths: &[f32],
    width: usize,
    height: usize,
    center: (f32, f32),
) -> Option<(usize, usize)> {
    if width == 0 || height == 0 {
        return None;
    }
    let cx = (center.0.round() as i64).clamp(0, width as i64 - 1);
    let cy = (center.1.round() as i64).clamp(0, height as i64 - 1);
    let radius = CENTER_SEARCH_RADIUS as i64;
    let is_valid = |x: i64, y: i64| {
        x >= 0
            && y >= 0
            && (x as usize) < width
            && (y as usize) < height
            && !depths[y as usize * width + x as usize].is_nan()
    };

    let mut best: Option<(i64, i64, i64)> = None;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let distance = dx * dx + dy * dy;
            if distance > radius * radius || !is_valid(cx + dx, cy + dy) {
                continue;
            }
            if best.is_none_or(|(d, _, _)| distance < d) {
                best = Some((distance, cx + dx, cy + dy));
            }
        }
    }

    best.map(|(_, x, y)| (x as usize, y as usize))
}
