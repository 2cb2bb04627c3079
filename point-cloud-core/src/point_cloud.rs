//! Eager and lazily materialised point clouds.
//!
//! `PointCloud` is a finished vertex list with its calibration snapshot.
//! `PointCloud2` holds the raw depth and colour buffers of one frame and turns
//! them into vertices exactly once, on the first `build`.

use std::fmt::Write as _;
use std::sync::atomic::AtomicBool;

use glam::{Mat4, Vec3, Vec4};
use log::debug;

use crate::bounds::PointCloudBounds;
use crate::calibration::{FrameCalibrationInfo, Intrinsics};
use crate::error::{PointCloudError, Result};
use crate::gravity::optional_alignment;
use crate::image_io::resize_colors;
use crate::reconstruct::{Interlace, RawFrame, Reconstruction, ReconstructionOptions};
use crate::vertex::{self, PointCloudVertex};

const AXIS_SAMPLES: usize = 500;
const AXIS_INCREMENT: f32 = 0.001;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    pub vertices: Vec<PointCloudVertex>,
    pub info: FrameCalibrationInfo,
}

impl PointCloud {
    pub fn new(vertices: Vec<PointCloudVertex>, info: FrameCalibrationInfo) -> Self {
        Self { vertices, info }
    }

    /// Builds a cloud from explicit points and packed RGB bytes (three per point).
    /// Points with `z` beyond `depth_truncation` are dropped.
    pub fn from_points(
        points: &[Vec3],
        colors: &[u8],
        depth_truncation: Option<f32>,
    ) -> Result<Self> {
        if colors.len() != points.len() * 3 {
            return Err(PointCloudError::DimensionMismatch {
                what: "point colour",
                width: points.len(),
                height: 1,
                expected: points.len() * 3,
                actual: colors.len(),
            });
        }

        let vertices = points
            .iter()
            .zip(colors.chunks_exact(3))
            .filter(|(p, _)| depth_truncation.is_none_or(|limit| p.z <= limit))
            .map(|(p, c)| PointCloudVertex {
                x: p.x,
                y: p.y,
                z: p.z,
                r: c[0] as f32 / 255.0,
                g: c[1] as f32 / 255.0,
                b: c[2] as f32 / 255.0,
            })
            .collect();

        Ok(Self {
            vertices,
            info: FrameCalibrationInfo::default(),
        })
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Re-expresses vertices captured at camera pose `current` in the frame of `origin`.
    pub fn transform(&mut self, origin: Mat4, current: Mat4) {
        let to_origin = origin * current.inverse();
        for v in &mut self.vertices {
            let p = to_origin * Vec4::new(v.x, v.y, v.z, 1.0);
            v.x = p.x;
            v.y = p.y;
            v.z = p.z;
        }
    }

    pub fn bounds(&self) -> PointCloudBounds {
        PointCloudBounds::from_vertices(&self.vertices)
    }

    pub fn as_bytes(&self) -> &[u8] {
        vertex::as_bytes(&self.vertices)
    }

    /// ASCII PLY with double positions and byte colours.
    pub fn to_ply(&self) -> String {
        let mut out = String::with_capacity(200 + self.vertices.len() * 40);
        out.push_str("ply\nformat ascii 1.0\n");
        let _ = writeln!(out, "element vertex {}", self.vertices.len());
        out.push_str(
            "property double x\nproperty double y\nproperty double z\n\
             property uchar red\nproperty uchar green\nproperty uchar blue\nend_header\n",
        );
        for v in &self.vertices {
            let _ = writeln!(
                out,
                "{} {} {} {} {} {}",
                v.x,
                v.y,
                v.z,
                (v.r * 255.0) as u8,
                (v.g * 255.0) as u8,
                (v.b * 255.0) as u8
            );
        }
        out
    }

    /// Half-metre axis markers in both directions of X, Y and Z.
    pub fn axes() -> Self {
        let mut points = Vec::with_capacity(AXIS_SAMPLES * 6);
        let mut colors = Vec::with_capacity(AXIS_SAMPLES * 18);
        for i in 0..AXIS_SAMPLES {
            let l = i as f32 * AXIS_INCREMENT;
            points.extend_from_slice(&[
                Vec3::new(l, 0.0, 0.0),
                Vec3::new(-l, 0.0, 0.0),
                Vec3::new(0.0, l, 0.0),
                Vec3::new(0.0, -l, 0.0),
                Vec3::new(0.0, 0.0, l),
                Vec3::new(0.0, 0.0, -l),
            ]);
            colors.extend_from_slice(&[
                255, 0, 0, 255, 0, 255, //
                0, 255, 0, 255, 255, 0, //
                0, 0, 255, 0, 255, 255,
            ]);
        }
        Self {
            vertices: points
                .iter()
                .zip(colors.chunks_exact(3))
                .map(|(p, c)| PointCloudVertex {
                    x: p.x,
                    y: p.y,
                    z: p.z,
                    r: c[0] as f32 / 255.0,
                    g: c[1] as f32 / 255.0,
                    b: c[2] as f32 / 255.0,
                })
                .collect(),
            info: FrameCalibrationInfo::default(),
        }
    }

    /// A `width` x `width` grid in the z = 0 plane with spacing `increment`.
    pub fn square(width: usize, increment: f32, colour: [u8; 3]) -> Self {
        let vertices = (0..width * width)
            .map(|i| PointCloudVertex {
                x: (i % width) as f32 * increment,
                y: (i / width) as f32 * increment,
                z: 0.0,
                r: colour[0] as f32 / 255.0,
                g: colour[1] as f32 / 255.0,
                b: colour[2] as f32 / 255.0,
            })
            .collect();
        Self {
            vertices,
            info: FrameCalibrationInfo::default(),
        }
    }
}

#[derive(Debug, Clone)]
enum Materialization {
    Unbuilt(RawFrame),
    Built(Vec<PointCloudVertex>),
}

/// Lazily reconstructed cloud. Raw buffers are released once vertices exist.
#[derive(Debug, Clone)]
pub struct PointCloud2 {
    info: FrameCalibrationInfo,
    intrinsics: Intrinsics,
    interlace: Interlace,
    gravity: Option<Vec3>,
    options: ReconstructionOptions,
    state: Materialization,
}

impl PointCloud2 {
    /// Wraps one recorded frame. Intrinsics come from `info`, which must
    /// describe the same resolution as `frame`.
    pub fn new(
        info: FrameCalibrationInfo,
        frame: RawFrame,
        options: ReconstructionOptions,
        interlace: Interlace,
    ) -> Result<Self> {
        if info.width != frame.width || info.height != frame.height {
            return Err(PointCloudError::MissingCalibration(format!(
                "calibration describes {}x{} but the frame is {}x{}",
                info.width, info.height, frame.width, frame.height
            )));
        }
        let intrinsics = Intrinsics::from_calibration(&info)?;
        let gravity = if options.gravity_alignment {
            info.gravity_vector()
        } else {
            None
        };
        Ok(Self {
            info,
            intrinsics,
            interlace,
            gravity,
            options,
            state: Materialization::Unbuilt(frame),
        })
    }

    /// Wraps a frame with explicit intrinsics instead of a calibration snapshot.
    pub fn with_intrinsics(
        frame: RawFrame,
        intrinsics: Intrinsics,
        interlace: Interlace,
        gravity: Option<Vec3>,
        options: ReconstructionOptions,
    ) -> Self {
        let info = FrameCalibrationInfo {
            width: frame.width,
            height: frame.height,
            gravity: gravity.map(|g| g.to_array()),
            ..Default::default()
        };
        Self {
            info,
            intrinsics,
            interlace,
            gravity,
            options,
            state: Materialization::Unbuilt(frame),
        }
    }

    pub fn info(&self) -> &FrameCalibrationInfo {
        &self.info
    }

    pub fn intrinsics(&self) -> &Intrinsics {
        &self.intrinsics
    }

    pub fn interlace(&self) -> Interlace {
        self.interlace
    }

    pub fn is_built(&self) -> bool {
        matches!(self.state, Materialization::Built(_))
    }

    /// Raw buffers, present until the cloud is built.
    pub fn raw_frame(&self) -> Option<&RawFrame> {
        match &self.state {
            Materialization::Unbuilt(frame) => Some(frame),
            Materialization::Built(_) => None,
        }
    }

    pub fn vertices(&self) -> Option<&[PointCloudVertex]> {
        match &self.state {
            Materialization::Built(vertices) => Some(vertices.as_slice()),
            Materialization::Unbuilt(_) => None,
        }
    }

    /// Reconstructs on first call; later calls return the same vertices.
    pub fn build(&mut self) -> Result<&[PointCloudVertex]> {
        self.materialize(None)
    }

    /// Like `build`, but stops between rows once `cancel` is raised and
    /// leaves the cloud unbuilt.
    pub fn build_cancellable(&mut self, cancel: &AtomicBool) -> Result<&[PointCloudVertex]> {
        self.materialize(Some(cancel))
    }

    pub fn into_point_cloud(mut self) -> Result<PointCloud> {
        self.materialize(None)?;
        match self.state {
            Materialization::Built(vertices) => Ok(PointCloud::new(vertices, self.info)),
            Materialization::Unbuilt(_) => Err(PointCloudError::Cancelled),
        }
    }

    fn materialize(&mut self, cancel: Option<&AtomicBool>) -> Result<&[PointCloudVertex]> {
        if let Materialization::Unbuilt(frame) = &self.state {
            let vertices = Reconstruction {
                intrinsics: self.intrinsics,
                interlace: self.interlace,
                rotation: optional_alignment(self.gravity),
                options: &self.options,
                distortion_table: &self.info.calibration_lens_distortion_lookup_table,
            }
            .run(frame, cancel)?;
            debug!("Materialised point cloud with {} vertices", vertices.len());
            self.state = Materialization::Built(vertices);
        }

        match &self.state {
            Materialization::Built(vertices) => Ok(vertices.as_slice()),
            Materialization::Unbuilt(_) => Err(PointCloudError::Cancelled),
        }
    }
}

/// Builds a cloud from a live frame. A colour image of a different size than
/// the depth map is resized to the depth resolution first.
pub fn capture_point_cloud(
    depths: Vec<f32>,
    colors: &[u8],
    color_size: (usize, usize),
    info: FrameCalibrationInfo,
    options: ReconstructionOptions,
) -> Result<PointCloud2> {
    let (width, height) = (info.width, info.height);
    let colors = if color_size == (width, height) {
        colors.to_vec()
    } else {
        resize_colors(colors, color_size, (width, height))?
    };
    let frame = RawFrame::new(width, height, depths, colors)?;
    PointCloud2::new(info, frame, options, Interlace::Full)
}
