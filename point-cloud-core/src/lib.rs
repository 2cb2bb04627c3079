//! RGB-D point cloud reconstruction, recording and playback.
//!
//! Depth frames with per-frame calibration are stored in a binary record
//! file, reconstructed into coloured camera-space vertices on demand and
//! served by time or frame index through [`PointCloudPlayer`].

pub mod bounds;
pub mod cache;
pub mod calibration;
pub mod config;
pub mod distortion;
pub mod error;
pub mod frame_history;
pub mod gravity;
pub mod heatmap;
pub mod image_io;
pub mod player;
pub mod point_cloud;
pub mod pose_history;
pub mod reconstruct;
pub mod recorder;
pub mod ring_buffer;
pub mod search;
pub mod vertex;

pub use cache::{FrameCache, LruFrameCache};
pub use calibration::{FrameCalibrationInfo, Intrinsics};
pub use config::PlayerConfig;
pub use error::{PointCloudError, Result};
pub use player::PointCloudPlayer;
pub use point_cloud::{PointCloud, PointCloud2};
pub use reconstruct::{Interlace, RawFrame, ReconstructionOptions};
pub use recorder::{FrameSink, FrameStore, RecordReader, RecordWriter, Whence};
pub use ring_buffer::RingBuffer;
pub use vertex::PointCloudVertex;
