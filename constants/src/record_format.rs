/// File magic at offset zero of every record file.
pub const MAGIC: &[u8; 8] = b"PointCld";

/// Record format version written into the header.
pub const VERSION: u32 = 0x01;

/// Header layout: magic, version, frame count, start time, end time.
pub const HEADER_SIZE: u64 = 8 + 4 + 4 + 8 + 8;

/// Byte offset of the frame count field inside the header.
pub const COUNT_OFFSET: u64 = 8 + 4;

/// Fixed bytes per frame besides the payloads: six u32 fields and the f64 timestamp.
pub const FRAME_OVERHEAD: u64 = 6 * 4 + 8;

/// Leading frame fields: size, index, timestamp.
pub const FRAME_PREFIX_SIZE: u64 = 4 + 4 + 8;

/// Upper bound accepted for an embedded calibration JSON blob.
pub const MAX_INFO_SIZE: usize = 8192;
