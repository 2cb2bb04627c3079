/// Recordings with fewer frames than this are reconstructed at full density.
pub const FULL_DENSITY_FRAME_LIMIT: usize = 120;

/// Recordings with fewer frames than this (and at least the full density
/// limit) sample every second pixel; longer ones every fourth.
pub const HALF_DENSITY_FRAME_LIMIT: usize = 300;

/// Default number of reconstructed frames kept by the frame cache (240 fps for a minute).
pub const DEFAULT_CACHE_CAPACITY: usize = 240 * 60;

/// Default capacity of the in-memory frame history used during live capture.
pub const DEFAULT_FRAME_HISTORY: usize = 1000;

/// Default capacity of the pose history (five minutes at 240 fps).
pub const DEFAULT_POSE_HISTORY: usize = 240 * 60 * 5;
