//! Binary record files holding a sequence of RGB-D frames.
//!
//! Layout, integers big-endian:
//!
//! ```text
//! header: [magic "PointCld":8][version:4][count:4][start-time f64:8][end-time f64:8]
//! frame:  [size:4][index:4][time f64:8]
//!         [info-len:4][info] [depths-len:4][depths f32 LE] [colors-len:4][colors]
//!         [size:4]
//! ```
//!
//! `size` covers the whole frame including both size fields, so a reader can
//! step over frames without touching the payloads.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use constants::record_format::{
    COUNT_OFFSET, FRAME_OVERHEAD, FRAME_PREFIX_SIZE, HEADER_SIZE, MAGIC, MAX_INFO_SIZE, VERSION,
};
use log::{debug, info, warn};

use crate::error::{PointCloudError, Result};

/// Reference point for `FrameStore::seek`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Start,
    Current,
    End,
}

/// Read access to an ordered sequence of recorded frames.
///
/// The store has a current frame whose calibration and buffers are exposed
/// through `info`, `depths` and `colors`.
pub trait FrameStore: Send {
    fn frame_count(&self) -> usize;

    /// Index of the current frame.
    fn frame_number(&self) -> usize;

    fn start_time(&self) -> f64;

    fn end_time(&self) -> f64;

    /// Absolute timestamp of the current frame.
    fn current_time(&self) -> f64;

    /// Moves to `offset` relative to `whence`, clamped to the valid range,
    /// and loads that frame. Returns the new frame number.
    fn seek(&mut self, offset: i64, whence: Whence) -> Result<usize>;

    /// Advances one frame. With `skip` only the index and timestamp are
    /// updated and the payload buffers keep their previous contents.
    fn next_frame(&mut self, skip: bool) -> Result<()>;

    fn info(&self) -> &str;

    fn depths(&self) -> &[f32];

    fn colors(&self) -> &[u8];

    /// Short name of the underlying source, used to build cache keys.
    fn source_name(&self) -> Option<&str> {
        None
    }

    /// Creation time of the source in milliseconds since the epoch.
    fn created_ms(&self) -> Option<i64> {
        None
    }
}

/// Write access to a frame store.
pub trait FrameSink {
    fn record(&mut self, time: f64, info: &str, depths: &[f32], colors: &[u8]) -> Result<()>;

    /// Finalises the header. Further `record` calls fail.
    fn close(&mut self) -> Result<()>;
}

#[derive(Debug, Clone, Copy)]
struct FrameEntry {
    offset: u64,
    size: u64,
    time: f64,
}

/// Read-only view of a record file.
#[derive(Debug)]
pub struct RecordReader {
    path: PathBuf,
    name: String,
    created_ms: Option<i64>,
    file: BufReader<File>,
    frames: Vec<FrameEntry>,
    start_time: f64,
    end_time: f64,
    frame_number: usize,
    /// Next frame `next_frame` reads.
    cursor: usize,
    current_time: f64,
    info: String,
    depths: Vec<f32>,
    colors: Vec<u8>,
}

impl RecordReader {
    /// Opens `path`, validates the header and indexes every complete frame.
    /// A truncated trailing frame is dropped with a warning. When frames
    /// exist, the first one is loaded.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let metadata = file.metadata()?;
        let file_len = metadata.len();
        let created_ms = metadata
            .created()
            .or_else(|_| metadata.modified())
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64);
        let mut file = BufReader::new(file);

        let mut header = [0u8; HEADER_SIZE as usize];
        if file_len < HEADER_SIZE || file.read_exact(&mut header).is_err() {
            return Err(PointCloudError::BadHeader(path.to_path_buf()));
        }
        if &header[..8] != MAGIC || be_u32(&header[8..12]) != VERSION {
            return Err(PointCloudError::BadHeader(path.to_path_buf()));
        }
        let header_count = be_u32(&header[12..16]) as usize;
        let mut start_time = be_f64(&header[16..24]);
        let mut end_time = be_f64(&header[24..32]);

        let frames = index_frames(&mut file, file_len)?;
        if header_count != frames.len() {
            warn!(
                "{}: header lists {} frames, found {} complete frames",
                path.display(),
                header_count,
                frames.len()
            );
        }
        if let (Some(first), Some(last)) = (frames.first(), frames.last()) {
            if header_count != frames.len() || (start_time == 0.0 && end_time == 0.0) {
                start_time = first.time;
                end_time = last.time;
            }
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        info!(
            "Opened {} ({} frames, {:.3}s)",
            path.display(),
            frames.len(),
            end_time - start_time
        );

        let mut reader = Self {
            path: path.to_path_buf(),
            name,
            created_ms,
            file,
            frames,
            start_time,
            end_time,
            frame_number: 0,
            cursor: 0,
            current_time: start_time,
            info: String::new(),
            depths: Vec::new(),
            colors: Vec::new(),
        };
        if !reader.frames.is_empty() {
            reader.load(0, false)?;
        }
        Ok(reader)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads frame `index` and makes it current.
    fn load(&mut self, index: usize, skip: bool) -> Result<()> {
        let entry = *self.frames.get(index).ok_or(PointCloudError::FrameOutOfRange {
            index,
            count: self.frames.len(),
        })?;

        if !skip {
            self.file.seek(SeekFrom::Start(entry.offset + FRAME_PREFIX_SIZE))?;
            // Payload bytes the three blobs must account for exactly.
            let mut remaining = entry.size - FRAME_OVERHEAD;
            let info = read_blob(&mut self.file, index, &mut remaining, MAX_INFO_SIZE as u64)?;
            let depth_bytes = read_blob(&mut self.file, index, &mut remaining, u64::MAX)?;
            if depth_bytes.len() % 4 != 0 {
                return Err(corrupt(index, "depth blob is not a whole number of f32".into()));
            }
            let colors = read_blob(&mut self.file, index, &mut remaining, u64::MAX)?;
            if remaining != 0 {
                return Err(corrupt(
                    index,
                    format!("blobs leave {} of {} frame bytes unaccounted", remaining, entry.size),
                ));
            }

            self.info = String::from_utf8(info)
                .map_err(|_| corrupt(index, "info blob is not UTF-8".into()))?;
            self.depths = depth_bytes
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect();
            self.colors = colors;
        }

        self.frame_number = index;
        self.cursor = index + 1;
        self.current_time = entry.time;
        Ok(())
    }
}

impl FrameStore for RecordReader {
    fn frame_count(&self) -> usize {
        self.frames.len()
    }

    fn frame_number(&self) -> usize {
        self.frame_number
    }

    fn start_time(&self) -> f64 {
        self.start_time
    }

    fn end_time(&self) -> f64 {
        self.end_time
    }

    fn current_time(&self) -> f64 {
        self.current_time
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<usize> {
        let count = self.frames.len();
        if count == 0 {
            return Err(PointCloudError::EmptyStore);
        }
        let target = match whence {
            Whence::Start => offset,
            Whence::Current => self.frame_number as i64 + offset,
            Whence::End => count as i64 + offset,
        }
        .clamp(0, count as i64 - 1) as usize;

        self.load(target, false)?;
        Ok(target)
    }

    fn next_frame(&mut self, skip: bool) -> Result<()> {
        self.load(self.cursor, skip)
    }

    fn info(&self) -> &str {
        &self.info
    }

    fn depths(&self) -> &[f32] {
        &self.depths
    }

    fn colors(&self) -> &[u8] {
        &self.colors
    }

    fn source_name(&self) -> Option<&str> {
        Some(&self.name)
    }

    fn created_ms(&self) -> Option<i64> {
        self.created_ms
    }
}

/// Walks the frame headers after the file header and records each complete frame.
fn index_frames(file: &mut BufReader<File>, file_len: u64) -> Result<Vec<FrameEntry>> {
    let mut frames = Vec::new();
    let mut offset = HEADER_SIZE;
    let mut prefix = [0u8; FRAME_PREFIX_SIZE as usize];

    while offset < file_len {
        let index = frames.len();
        if offset + FRAME_PREFIX_SIZE > file_len {
            warn!("Dropping truncated frame {} at byte {}", index, offset);
            break;
        }
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut prefix)?;

        let size = be_u32(&prefix[0..4]) as u64;
        if size < FRAME_OVERHEAD {
            return Err(corrupt(index, format!("frame size {} is below the minimum", size)));
        }
        if offset + size > file_len {
            warn!(
                "Dropping truncated frame {} ({} of {} bytes present)",
                index,
                file_len - offset,
                size
            );
            break;
        }

        let mut trailer = [0u8; 4];
        file.seek(SeekFrom::Start(offset + size - 4))?;
        file.read_exact(&mut trailer)?;
        if be_u32(&trailer) as u64 != size {
            return Err(corrupt(index, "leading and trailing sizes differ".into()));
        }

        frames.push(FrameEntry {
            offset,
            size,
            time: be_f64(&prefix[8..16]),
        });
        offset += size;
    }

    debug!("Indexed {} frames", frames.len());
    Ok(frames)
}

/// Reads one length-prefixed blob. The length is checked against `limit` and
/// the payload bytes `remaining` in the frame before anything is allocated.
fn read_blob(
    file: &mut BufReader<File>,
    index: usize,
    remaining: &mut u64,
    limit: u64,
) -> Result<Vec<u8>> {
    let mut len = [0u8; 4];
    file.read_exact(&mut len)?;
    let len = be_u32(&len) as u64;
    if len > limit {
        return Err(corrupt(index, format!("blob of {} bytes exceeds {}", len, limit)));
    }
    if len > *remaining {
        return Err(corrupt(
            index,
            format!("blob of {} bytes overruns the frame ({} left)", len, remaining),
        ));
    }
    *remaining -= len;

    let len = len as usize;
    let mut data = vec![0u8; len];
    file.read_exact(&mut data)
        .map_err(|_| corrupt(index, format!("blob of {} bytes is cut short", len)))?;
    Ok(data)
}

fn corrupt(index: usize, reason: String) -> PointCloudError {
    PointCloudError::CorruptFrame { index, reason }
}

fn be_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn be_f64(bytes: &[u8]) -> f64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[..8]);
    f64::from_be_bytes(raw)
}

/// Appends frames to a new record file.
#[derive(Debug)]
pub struct RecordWriter {
    path: PathBuf,
    file: Option<File>,
    frame_count: u32,
    start_time: f64,
    end_time: f64,
}

impl RecordWriter {
    /// Creates or truncates `path` and writes an empty header.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.write_all(&encode_header(0, 0.0, 0.0))?;
        debug!("Created record file {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
            frame_count: 0,
            start_time: 0.0,
            end_time: 0.0,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count as usize
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameSink for RecordWriter {
    fn record(&mut self, time: f64, info: &str, depths: &[f32], colors: &[u8]) -> Result<()> {
        let file = self.file.as_mut().ok_or(PointCloudError::NotWritable)?;
        if colors.len() != depths.len() * 4 {
            return Err(PointCloudError::DimensionMismatch {
                what: "colour",
                width: depths.len(),
                height: 1,
                expected: depths.len() * 4,
                actual: colors.len(),
            });
        }

        if info.len() > MAX_INFO_SIZE {
            return Err(corrupt(
                self.frame_count as usize,
                format!("info blob of {} bytes", info.len()),
            ));
        }

        let size = info.len() as u64 + depths.len() as u64 * 8 + FRAME_OVERHEAD;
        let size = u32::try_from(size).map_err(|_| {
            corrupt(self.frame_count as usize, format!("frame of {} bytes is too large", size))
        })?;

        let mut bytes = Vec::with_capacity(size as usize);
        bytes.extend_from_slice(&size.to_be_bytes());
        bytes.extend_from_slice(&self.frame_count.to_be_bytes());
        bytes.extend_from_slice(&time.to_be_bytes());
        bytes.extend_from_slice(&(info.len() as u32).to_be_bytes());
        bytes.extend_from_slice(info.as_bytes());
        bytes.extend_from_slice(&((depths.len() * 4) as u32).to_be_bytes());
        for &depth in depths {
            bytes.extend_from_slice(&depth.to_le_bytes());
        }
        bytes.extend_from_slice(&(colors.len() as u32).to_be_bytes());
        bytes.extend_from_slice(colors);
        bytes.extend_from_slice(&size.to_be_bytes());

        file.seek(SeekFrom::End(0))?;
        file.write_all(&bytes)?;

        if self.frame_count == 0 {
            self.start_time = time;
        }
        self.end_time = time;
        self.frame_count += 1;

        file.seek(SeekFrom::Start(COUNT_OFFSET))?;
        file.write_all(&self.frame_count.to_be_bytes())?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let Some(mut file) = self.file.take() else {
            return Ok(());
        };
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&encode_header(self.frame_count, self.start_time, self.end_time))?;
        file.flush()?;
        info!(
            "Closed {} ({} frames, {:.3}s)",
            self.path.display(),
            self.frame_count,
            self.end_time - self.start_time
        );
        Ok(())
    }
}

fn encode_header(count: u32, start_time: f64, end_time: f64) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_SIZE as usize);
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&VERSION.to_be_bytes());
    bytes.extend_from_slice(&count.to_be_bytes());
    bytes.extend_from_slice(&start_time.to_be_bytes());
    bytes.extend_from_slice(&end_time.to_be_bytes());
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_frames(path: &Path, times: &[f64]) {
        let mut writer = RecordWriter::create(path).unwrap();
        for (i, &t) in times.iter().enumerate() {
            let depths = vec![i as f32 + 0.5; 4];
            let colors = vec![i as u8; 16];
            writer.record(t, &format!("{{\"frame\":{}}}", i), &depths, &colors).unwrap();
        }
        writer.close().unwrap();
    }

    #[test]
    fn test_header_and_frame_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layout.pcd");
        write_frames(&path, &[1.0, 2.0]);

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..8], b"PointCld");
        assert_eq!(be_u32(&bytes[8..12]), 1);
        assert_eq!(be_u32(&bytes[12..16]), 2);
        assert_eq!(be_f64(&bytes[16..24]), 1.0);
        assert_eq!(be_f64(&bytes[24..32]), 2.0);

        let info_len = "{\"frame\":0}".len() as u64;
        let size = info_len + 4 * 8 + FRAME_OVERHEAD;
        assert_eq!(be_u32(&bytes[32..36]) as u64, size);
        assert_eq!(bytes.len() as u64, HEADER_SIZE + 2 * size);
        let trailer = (HEADER_SIZE + size - 4) as usize;
        assert_eq!(be_u32(&bytes[trailer..trailer + 4]) as u64, size);
    }

    #[test]
    fn test_seek_whence_and_clamp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seek.pcd");
        write_frames(&path, &[10.0, 10.5, 11.0, 11.5]);

        let mut reader = RecordReader::open(&path).unwrap();
        assert_eq!(reader.frame_count(), 4);
        assert_eq!(reader.frame_number(), 0);
        assert_eq!(reader.info(), "{\"frame\":0}");

        assert_eq!(reader.seek(2, Whence::Start).unwrap(), 2);
        assert_eq!(reader.depths(), &[2.5; 4]);
        assert_eq!(reader.colors(), &[2; 16]);
        assert_eq!(reader.current_time(), 11.0);

        assert_eq!(reader.seek(-1, Whence::Current).unwrap(), 1);
        assert_eq!(reader.seek(0, Whence::End).unwrap(), 3);
        assert_eq!(reader.seek(-2, Whence::End).unwrap(), 2);
        assert_eq!(reader.seek(99, Whence::Start).unwrap(), 3);
        assert_eq!(reader.seek(-99, Whence::Current).unwrap(), 0);
    }

    #[test]
    fn test_next_frame_skip_keeps_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skip.pcd");
        write_frames(&path, &[0.0, 0.1, 0.2]);

        let mut reader = RecordReader::open(&path).unwrap();
        reader.next_frame(true).unwrap();
        assert_eq!(reader.frame_number(), 1);
        assert_eq!(reader.current_time(), 0.1);
        assert_eq!(reader.info(), "{\"frame\":0}");

        reader.next_frame(false).unwrap();
        assert_eq!(reader.info(), "{\"frame\":2}");
        assert!(matches!(
            reader.next_frame(false),
            Err(PointCloudError::FrameOutOfRange { index: 3, count: 3 })
        ));
    }

    #[test]
    fn test_bad_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.pcd");
        std::fs::write(&path, b"NotACloud-and-some-more-padding-bytes").unwrap();
        assert!(matches!(
            RecordReader::open(&path),
            Err(PointCloudError::BadHeader(_))
        ));
    }

    /// Overwrites the colour length field of `frame` in a file from `write_frames`.
    fn patch_colour_len(path: &Path, frame: u64, len: u32) {
        let info_len = "{\"frame\":0}".len() as u64;
        let size = info_len + 4 * 8 + FRAME_OVERHEAD;
        let at = HEADER_SIZE + frame * size + FRAME_PREFIX_SIZE + 4 + info_len + 4 + 16;

        let mut file = OpenOptions::new().write(true).open(path).unwrap();
        file.seek(SeekFrom::Start(at)).unwrap();
        file.write_all(&len.to_be_bytes()).unwrap();
    }

    #[test]
    fn test_blob_overrunning_frame_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overrun.pcd");
        write_frames(&path, &[0.0, 0.1]);
        patch_colour_len(&path, 1, 40);

        let mut reader = RecordReader::open(&path).unwrap();
        assert!(matches!(
            reader.seek(1, Whence::Start),
            Err(PointCloudError::CorruptFrame { index: 1, .. })
        ));
        assert_eq!(reader.seek(0, Whence::Start).unwrap(), 0);
        assert_eq!(reader.colors(), &[0; 16]);
    }

    #[test]
    fn test_blob_short_of_frame_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.pcd");
        write_frames(&path, &[0.0, 0.1]);
        patch_colour_len(&path, 0, 8);

        assert!(matches!(
            RecordReader::open(&path),
            Err(PointCloudError::CorruptFrame { index: 0, .. })
        ));
    }

    #[test]
    fn test_oversized_info_length_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("info.pcd");
        write_frames(&path, &[0.0]);

        let mut file = OpenOptions::new().write(true).open(&path).unwrap();
        file.seek(SeekFrom::Start(HEADER_SIZE + FRAME_PREFIX_SIZE)).unwrap();
        file.write_all(&u32::MAX.to_be_bytes()).unwrap();
        drop(file);

        assert!(matches!(
            RecordReader::open(&path),
            Err(PointCloudError::CorruptFrame { index: 0, .. })
        ));
    }

    #[test]
    fn test_closed_writer_rejects_frames() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = RecordWriter::create(dir.path().join("closed.pcd")).unwrap();
        writer.close().unwrap();
        assert!(matches!(
            writer.record(0.0, "{}", &[1.0], &[0; 4]),
            Err(PointCloudError::NotWritable)
        ));
    }

    #[test]
    fn test_unclosed_writer_is_readable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unclosed.pcd");
        let mut writer = RecordWriter::create(&path).unwrap();
        writer.record(3.0, "{}", &[1.0], &[0; 4]).unwrap();
        writer.record(4.0, "{}", &[1.0], &[0; 4]).unwrap();
        drop(writer);

        let reader = RecordReader::open(&path).unwrap();
        assert_eq!(reader.frame_count(), 2);
        assert_eq!(reader.start_time(), 3.0);
        assert_eq!(reader.end_time(), 4.0);
    }

    #[test]
    fn test_empty_store_cannot_seek() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.pcd");
        write_frames(&path, &[]);
        let mut reader = RecordReader::open(&path).unwrap();
        assert_eq!(reader.frame_count(), 0);
        assert!(matches!(
            reader.seek(0, Whence::Start),
            Err(PointCloudError::EmptyStore)
        ));
    }
}
