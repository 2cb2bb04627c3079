/// Canonical "down" axis that a measured gravity vector is rotated onto.
pub const DOWN_AXIS: [f32; 3] = [0.0, -1.0, 0.0];

/// Cross products shorter than this are treated as parallel vectors
/// when deriving the gravity alignment rotation.
pub const GRAVITY_AXIS_EPSILON: f32 = 1.0e-6;

/// Scale applied to 8-bit colour channels to normalise them to 0-1.
pub const COLOUR_SCALE: f32 = 1.0 / 255.0;

/// Bytes per pixel of the colour buffer (R, G, B, ignored).
pub const COLOUR_CHANNELS: usize = 4;

/// Depths above this value saturate when exported as 16-bit millimetres.
pub const MAX_EXPORT_DEPTH_METERS: f32 = 65.535;
