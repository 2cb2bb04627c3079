/// Name tag of the single "current frame" node in the render scene.
pub const CURRENT_NODE_NAME: &str = "it";

/// Viewer camera distance from the origin along +Z (metres).
pub const CAMERA_DISTANCE: f32 = 0.5;

/// Background colour of the viewer (sRGB).
pub const CLEAR_COLOUR: [f32; 3] = [0.08, 0.08, 0.1];
