//! Coloured point in camera space, laid out for direct upload to a vertex buffer.
use bytemuck::{Pod, Zeroable};

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct PointCloudVertex {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl PointCloudVertex {
    pub fn position(&self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }

    pub fn colour(&self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }
}

/// Interleaved `(x, y, z, r, g, b)` bytes for a renderer.
pub fn as_bytes(vertices: &[PointCloudVertex]) -> &[u8] {
    bytemuck::cast_slice(vertices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interleaved_layout() {
        let vertices = [PointCloudVertex {
            x: 1.0,
            y: 2.0,
            z: 3.0,
            r: 0.25,
            g: 0.5,
            b: 0.75,
        }];
        let bytes = as_bytes(&vertices);
        assert_eq!(bytes.len(), 6 * std::mem::size_of::<f32>());

        let floats: &[f32] = bytemuck::cast_slice(bytes);
        assert_eq!(floats, &[1.0, 2.0, 3.0, 0.25, 0.5, 0.75]);
    }
}
