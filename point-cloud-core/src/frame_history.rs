//! In-memory recording of live frames, bounded by a ring buffer.
use constants::playback::DEFAULT_FRAME_HISTORY;
use log::debug;

use crate::error::Result;
use crate::point_cloud::PointCloud2;
use crate::ring_buffer::RingBuffer;
use crate::search::floor_index;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HistoryStatus {
    #[default]
    Stopped,
    Playing,
    Recording,
}

#[derive(Debug, Clone)]
pub struct HistoryFrame {
    pub time: f64,
    pub cloud: PointCloud2,
}

/// Keeps the most recent frames while recording; the oldest frame is
/// dropped once the capacity is reached.
#[derive(Debug)]
pub struct FrameHistory {
    ring: RingBuffer<HistoryFrame>,
    status: HistoryStatus,
    current_frame: usize,
}

impl FrameHistory {
    pub fn new(capacity: usize) -> Result<Self> {
        Ok(Self {
            ring: RingBuffer::try_new(capacity)?,
            status: HistoryStatus::Stopped,
            current_frame: 0,
        })
    }

    pub fn with_default_capacity() -> Result<Self> {
        Self::new(DEFAULT_FRAME_HISTORY)
    }

    pub fn status(&self) -> HistoryStatus {
        self.status
    }

    pub fn is_playing(&self) -> bool {
        self.status == HistoryStatus::Playing
    }

    pub fn is_recording(&self) -> bool {
        self.status == HistoryStatus::Recording
    }

    pub fn start_recording(&mut self) {
        self.status = HistoryStatus::Recording;
    }

    pub fn stop_recording(&mut self) {
        if self.is_recording() {
            self.status = HistoryStatus::Stopped;
        }
    }

    /// Starts playback, rewinding when the cursor sits on the last frame.
    /// Returns false when there is nothing to play.
    pub fn play(&mut self) -> bool {
        if self.ring.is_empty() {
            return false;
        }
        if self.current_frame + 1 >= self.len() {
            self.current_frame = 0;
        }
        self.status = HistoryStatus::Playing;
        true
    }

    pub fn stop(&mut self) {
        self.status = HistoryStatus::Stopped;
    }

    /// Moves playback one frame forward. Reaching the last frame stops playback.
    pub fn advance(&mut self) -> Option<usize> {
        if !self.is_playing() {
            return None;
        }
        if self.current_frame + 1 >= self.len() {
            self.status = HistoryStatus::Stopped;
            return None;
        }
        self.current_frame += 1;
        Some(self.current_frame)
    }

    /// Records a frame. Ignored unless recording.
    pub fn append(&mut self, cloud: PointCloud2, time: f64) -> bool {
        if !self.is_recording() {
            return false;
        }
        self.ring.append(HistoryFrame { time, cloud }, true);
        self.current_frame = self.len() - 1;
        debug!("Recorded frame at {:.3}s ({} held)", time, self.len());
        true
    }

    pub fn clear(&mut self) {
        self.ring.clear();
        self.current_frame = 0;
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn start_time(&self) -> f64 {
        self.ring.front().map_or(0.0, |f| f.time)
    }

    pub fn end_time(&self) -> f64 {
        self.ring.rear().map_or(0.0, |f| f.time)
    }

    pub fn duration(&self) -> f64 {
        self.end_time() - self.start_time()
    }

    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    pub fn current_time(&self) -> f64 {
        self.ring.get(self.current_frame).map_or(0.0, |f| f.time)
    }

    pub fn current_mut(&mut self) -> Option<&mut HistoryFrame> {
        self.ring.get_mut(self.current_frame)
    }

    pub fn get(&self, index: usize) -> Option<&HistoryFrame> {
        self.ring.get(index)
    }

    pub fn seek_frame(&mut self, index: usize) -> Option<&HistoryFrame> {
        if index >= self.len() {
            return None;
        }
        self.current_frame = index;
        self.ring.get(index)
    }

    /// Moves to the last frame at or before `time`.
    pub fn seek_time(&mut self, time: f64) -> Option<&HistoryFrame> {
        let index = floor_index(self.len(), time, |i| self.ring.get(i).map(|f| f.time))?;
        self.seek_frame(index)
    }
}
