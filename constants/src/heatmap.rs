/// Number of colour stops in the height gradient.
pub const GRADIENT_STOPS: usize = 100;

/// Height difference (metres) mapped to either end of the gradient.
pub const HEIGHT_RANGE_METERS: f32 = 0.1;

/// Search radius (pixels) around the principal point for a valid reference depth.
pub const CENTER_SEARCH_RADIUS: i32 = 5;

/// Gradient key colours, evenly spaced: white, cyan, green, yellow, red.
pub const GRADIENT_KEYS: [[f32; 3]; 5] = [
    [1.0, 1.0, 1.0],
    [0.0, 1.0, 1.0],
    [0.0, 1.0, 0.0],
    [1.0, 1.0, 0.0],
    [1.0, 0.0, 0.0],
];
