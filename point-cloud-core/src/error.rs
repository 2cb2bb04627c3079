//! Error type shared by every point-cloud component.
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PointCloudError {
    #[error("Ring buffer capacity must be greater than 0")]
    ZeroCapacity,

    #[error("{what} buffer holds {actual} values, expected {expected} for {width}x{height}")]
    DimensionMismatch {
        what: &'static str,
        width: usize,
        height: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Frame calibration is missing or unusable: {0}")]
    MissingCalibration(String),

    #[error("Calibration JSON could not be parsed: {0}")]
    CalibrationParse(#[from] serde_json::Error),

    #[error("Lens distortion lookup table is empty")]
    EmptyDistortionTable,

    #[error("Record file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not a point cloud record file: {}", .0.display())]
    BadHeader(PathBuf),

    #[error("Frame {index} is corrupt: {reason}")]
    CorruptFrame { index: usize, reason: String },

    #[error("Record store was opened read-only")]
    NotWritable,

    #[error("Record store contains no frames")]
    EmptyStore,

    #[error("Frame {index} is out of range (0..{count})")]
    FrameOutOfRange { index: usize, count: usize },

    #[error("Frame {index} timestamp {time} precedes the previous frame at {previous}")]
    UnorderedTimestamps {
        index: usize,
        time: f64,
        previous: f64,
    },

    #[error("Reconstruction was cancelled")]
    Cancelled,

    #[error("Image encoding failed: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, PointCloudError>;
