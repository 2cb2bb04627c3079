//! Per-frame camera calibration snapshot and the intrinsics derived from it.
use crate::error::{PointCloudError, Result};
use glam::{Mat3, Mat4, Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Calibration recorded alongside every depth frame.
/// Serialised as JSON with the camelCase keys written by the capture app;
/// sizes and points are two-element arrays, matrices are column-major nested arrays.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FrameCalibrationInfo {
    /// Depth map width in pixels.
    pub width: usize,
    /// Depth map height in pixels.
    pub height: usize,
    /// 3x3 intrinsic matrix at the reference resolution, `m[column][row]`.
    pub calibration_intrinsic_matrix: Vec<Vec<f32>>,
    pub calibration_pixel_size: f32,
    /// Resolution (width, height) the intrinsic matrix refers to.
    pub calibration_intrinsic_matrix_reference_dimensions: [f32; 2],
    /// Optical center of the lens distortion at the reference resolution.
    pub calibration_lens_distortion_center: [f32; 2],
    /// Radial distortion magnitudes sampled from the center to the farthest corner.
    pub calibration_lens_distortion_lookup_table: Vec<f32>,
    pub calibration_inverse_lens_distortion_lookup_table: Vec<f32>,
    pub camera_image_resolution: [f32; 2],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_transform: Option<Vec<Vec<f32>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_intrinsics: Option<Vec<Vec<f32>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_projection_matrix: Option<Vec<Vec<f32>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub camera_view_matrix: Option<Vec<Vec<f32>>>,
    /// Accelerometer gravity reading in the device frame.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gravity: Option<[f32; 3]>,
}

impl FrameCalibrationInfo {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(data: &str) -> Result<Self> {
        Ok(serde_json::from_str(data)?)
    }

    /// Nested column-major rows for a 3x3 matrix.
    pub fn mat3_to_rows(matrix: &Mat3) -> Vec<Vec<f32>> {
        matrix.to_cols_array_2d().iter().map(|c| c.to_vec()).collect()
    }

    /// Nested column-major rows for a 4x4 matrix.
    pub fn mat4_to_rows(matrix: &Mat4) -> Vec<Vec<f32>> {
        matrix.to_cols_array_2d().iter().map(|c| c.to_vec()).collect()
    }

    pub fn intrinsic_matrix(&self) -> Option<Mat3> {
        mat3_from_rows(&self.calibration_intrinsic_matrix)
    }

    pub fn camera_transform_matrix(&self) -> Option<Mat4> {
        self.camera_transform.as_deref().and_then(mat4_from_rows)
    }

    pub fn camera_projection(&self) -> Option<Mat4> {
        self.camera_projection_matrix.as_deref().and_then(mat4_from_rows)
    }

    pub fn camera_view(&self) -> Option<Mat4> {
        self.camera_view_matrix.as_deref().and_then(mat4_from_rows)
    }

    pub fn gravity_vector(&self) -> Option<Vec3> {
        self.gravity.map(Vec3::from_array)
    }

    /// Number of pixels in the depth map.
    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }
}

fn mat3_from_rows(rows: &[Vec<f32>]) -> Option<Mat3> {
    if rows.len() != 3 || rows.iter().any(|c| c.len() != 3) {
        return None;
    }
    Some(Mat3::from_cols_array_2d(&[
        [rows[0][0], rows[0][1], rows[0][2]],
        [rows[1][0], rows[1][1], rows[1][2]],
        [rows[2][0], rows[2][1], rows[2][2]],
    ]))
}

fn mat4_from_rows(rows: &[Vec<f32>]) -> Option<Mat4> {
    if rows.len() != 4 || rows.iter().any(|c| c.len() != 4) {
        return None;
    }
    let mut cols = [[0.0f32; 4]; 4];
    for (col, src) in cols.iter_mut().zip(rows) {
        col.copy_from_slice(src);
    }
    Some(Mat4::from_cols_array_2d(&cols))
}

/// Pinhole intrinsics scaled to the depth map resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intrinsics {
    pub fx: f32,
    pub fy: f32,
    pub cx: f32,
    pub cy: f32,
    /// Lens distortion center at the depth resolution.
    pub distortion_center: Vec2,
}

impl Intrinsics {
    pub fn new(fx: f32, fy: f32, cx: f32, cy: f32) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            distortion_center: Vec2::new(cx, cy),
        }
    }

    /// Derive depth-resolution intrinsics from a calibration snapshot.
    /// The reference-resolution matrix is divided by `reference_width / width`.
    pub fn from_calibration(info: &FrameCalibrationInfo) -> Result<Self> {
        if info.width == 0 || info.height == 0 {
            return Err(PointCloudError::MissingCalibration(
                "frame dimensions are zero".to_string(),
            ));
        }
        let matrix = info.intrinsic_matrix().ok_or_else(|| {
            PointCloudError::MissingCalibration("intrinsic matrix is not 3x3".to_string())
        })?;
        let reference_width = info.calibration_intrinsic_matrix_reference_dimensions[0];
        if reference_width <= 0.0 {
            return Err(PointCloudError::MissingCalibration(
                "reference dimensions are zero".to_string(),
            ));
        }

        let ratio = reference_width / info.width as f32;
        let [lx, ly] = info.calibration_lens_distortion_center;
        Ok(Self {
            fx: matrix.x_axis.x / ratio,
            fy: matrix.y_axis.y / ratio,
            cx: matrix.z_axis.x / ratio,
            cy: matrix.z_axis.y / ratio,
            distortion_center: Vec2::new(lx / ratio, ly / ratio),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_info() -> FrameCalibrationInfo {
        FrameCalibrationInfo {
            width: 320,
            height: 240,
            calibration_intrinsic_matrix: vec![
                vec![2800.0, 0.0, 0.0],
                vec![0.0, 2800.0, 0.0],
                vec![2016.0, 1512.0, 1.0],
            ],
            calibration_pixel_size: 0.001,
            calibration_intrinsic_matrix_reference_dimensions: [4032.0, 3024.0],
            calibration_lens_distortion_center: [2010.0, 1505.0],
            calibration_lens_distortion_lookup_table: vec![0.0, 0.001, 0.003],
            calibration_inverse_lens_distortion_lookup_table: vec![0.0, -0.001, -0.003],
            camera_image_resolution: [1920.0, 1440.0],
            ..Default::default()
        }
    }

    #[test]
    fn test_intrinsics_scaled_to_depth_resolution() {
        let intrinsics = Intrinsics::from_calibration(&sample_info()).unwrap();
        let ratio = 4032.0 / 320.0;
        assert_relative_eq!(intrinsics.fx, 2800.0 / ratio, epsilon = 1e-4);
        assert_relative_eq!(intrinsics.fy, 2800.0 / ratio, epsilon = 1e-4);
        assert_relative_eq!(intrinsics.cx, 2016.0 / ratio, epsilon = 1e-4);
        assert_relative_eq!(intrinsics.cy, 1512.0 / ratio, epsilon = 1e-4);
        assert_relative_eq!(intrinsics.distortion_center.x, 2010.0 / ratio, epsilon = 1e-4);
    }

    #[test]
    fn test_missing_matrix_is_rejected() {
        let info = FrameCalibrationInfo {
            calibration_intrinsic_matrix: vec![vec![]],
            ..sample_info()
        };
        assert!(matches!(
            Intrinsics::from_calibration(&info),
            Err(PointCloudError::MissingCalibration(_))
        ));
    }

    #[test]
    fn test_json_round_trip_with_optional_fields() {
        let mut info = sample_info();
        info.camera_transform = Some(FrameCalibrationInfo::mat4_to_rows(&Mat4::IDENTITY));
        info.camera_view_matrix = Some(vec![vec![]]);
        info.gravity = Some([0.1, -0.98, 0.05]);

        let json = info.to_json().unwrap();
        let decoded = FrameCalibrationInfo::from_json(&json).unwrap();
        assert_eq!(decoded, info);
        assert_eq!(decoded.camera_transform_matrix(), Some(Mat4::IDENTITY));
        assert_eq!(decoded.camera_view(), None);
    }

    #[test]
    fn test_json_round_trip_without_optional_fields() {
        let info = sample_info();
        let json = info.to_json().unwrap();
        assert!(!json.contains("gravity"));
        let decoded = FrameCalibrationInfo::from_json(&json).unwrap();
        assert_eq!(decoded, info);
        assert_eq!(decoded.gravity_vector(), None);
    }

    #[test]
    fn test_parses_capture_app_keys() {
        let json = r#"{
            "width": 4, "height": 4,
            "calibrationIntrinsicMatrix": [[4,0,0],[0,4,0],[2,2,1]],
            "calibrationIntrinsicMatrixReferenceDimensions": [4, 4],
            "calibrationLensDistortionCenter": [2, 2],
            "cameraTransform": [[]]
        }"#;
        let info = FrameCalibrationInfo::from_json(json).unwrap();
        let intrinsics = Intrinsics::from_calibration(&info).unwrap();
        assert_eq!(intrinsics, Intrinsics::new(4.0, 4.0, 2.0, 2.0));
        assert_eq!(info.camera_transform, Some(vec![vec![]]));
        assert_eq!(info.camera_transform_matrix(), None);
    }

    #[test]
    fn test_corrupt_json_is_an_error() {
        assert!(matches!(
            FrameCalibrationInfo::from_json("{\"width\": "),
            Err(PointCloudError::CalibrationParse(_))
        ));
    }
}
