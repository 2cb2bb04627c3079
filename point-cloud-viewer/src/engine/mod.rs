pub mod camera;
pub mod playback;
pub mod point_cloud;
