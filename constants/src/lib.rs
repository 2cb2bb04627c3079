/// Shared tunables for the point-cloud workspace
pub mod coordinate_system;
pub mod heatmap;
pub mod playback;
pub mod record_format;
pub mod render_settings;
