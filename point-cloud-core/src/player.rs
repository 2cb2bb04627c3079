//! Time-addressable playback over a frame store.
//!
//! The player indexes every frame timestamp once on open, then serves seeks
//! by frame or by time, materialising the current frame's point cloud through
//! an injected cache. All store access happens under one mutex so seeks,
//! preload and export never observe each other's intermediate positions.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use image::RgbImage;
use log::{debug, info, warn};
use rayon::prelude::*;

use crate::cache::{FrameCache, LruFrameCache, cache_key};
use crate::calibration::FrameCalibrationInfo;
use crate::config::PlayerConfig;
use crate::error::{PointCloudError, Result};
use crate::image_io::color_image;
use crate::point_cloud::{PointCloud, PointCloud2};
use crate::reconstruct::{Interlace, RawFrame};
use crate::recorder::{FrameSink, FrameStore, RecordReader, RecordWriter, Whence};
use crate::search::floor_in_slice;

/// Frames read per lock window during preload.
const PRELOAD_BATCH: usize = 32;

/// Copy of one recorded frame taken out of the store.
#[derive(Debug, Clone)]
pub struct FrameData {
    pub index: usize,
    /// Seconds since the first frame.
    pub time: f64,
    pub info: String,
    pub depths: Vec<f32>,
    pub colors: Vec<u8>,
}

impl FrameData {
    fn read(store: &dyn FrameStore) -> Self {
        Self {
            index: store.frame_number(),
            time: store.current_time() - store.start_time(),
            info: store.info().to_string(),
            depths: store.depths().to_vec(),
            colors: store.colors().to_vec(),
        }
    }

    pub fn calibration(&self) -> Result<FrameCalibrationInfo> {
        FrameCalibrationInfo::from_json(&self.info)
    }
}

enum Lookup {
    Cached(Arc<PointCloud>),
    Missing(FrameData, Option<String>),
}

pub struct PointCloudPlayer {
    store: Mutex<Box<dyn FrameStore>>,
    cache: Arc<dyn FrameCache>,
    config: PlayerConfig,
    /// Frame timestamps relative to the first frame, non-decreasing.
    frame_times: Vec<f64>,
    interlace: Interlace,
    duration: f64,
    source_name: Option<String>,
    created_ms: Option<i64>,
}

impl std::fmt::Debug for PointCloudPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PointCloudPlayer")
            .field("frames", &self.frame_times.len())
            .field("duration", &self.duration)
            .field("interlace", &self.interlace)
            .field("source_name", &self.source_name)
            .finish()
    }
}

impl PointCloudPlayer {
    /// Opens a record file with a private LRU cache sized by `config`.
    pub fn open(path: impl AsRef<Path>, config: PlayerConfig) -> Result<Self> {
        let cache = Arc::new(LruFrameCache::new(config.cache_capacity)?);
        Self::open_with_cache(path, config, cache)
    }

    pub fn open_with_cache(
        path: impl AsRef<Path>,
        config: PlayerConfig,
        cache: Arc<dyn FrameCache>,
    ) -> Result<Self> {
        let reader = RecordReader::open(path)?;
        Self::from_store(Box::new(reader), config, cache)
    }

    /// Indexes `store` and leaves it on frame 0.
    pub fn from_store(
        mut store: Box<dyn FrameStore>,
        config: PlayerConfig,
        cache: Arc<dyn FrameCache>,
    ) -> Result<Self> {
        let count = store.frame_count();
        if count == 0 {
            return Err(PointCloudError::EmptyStore);
        }

        let start = store.start_time();
        let mut frame_times = Vec::with_capacity(count);
        store.seek(0, Whence::Start)?;
        for index in 0..count {
            if index > 0 {
                store.next_frame(true)?;
            }
            let time = store.current_time() - start;
            if let Some(&previous) = frame_times.last() {
                if time < previous {
                    return Err(PointCloudError::UnorderedTimestamps {
                        index,
                        time,
                        previous,
                    });
                }
            }
            frame_times.push(time);
        }
        store.seek(0, Whence::Start)?;

        let interlace = config.interlace_for(count);
        let duration = store.end_time() - start;
        let source_name = store.source_name().map(str::to_string);
        let created_ms = store.created_ms();
        info!(
            "Player ready: {} frames over {:.3}s, interlace {}",
            count,
            duration,
            interlace.stride()
        );

        Ok(Self {
            store: Mutex::new(store),
            cache,
            config,
            frame_times,
            interlace,
            duration,
            source_name,
            created_ms,
        })
    }

    pub fn frame_count(&self) -> usize {
        self.frame_times.len()
    }

    /// Seconds from the first to the last frame.
    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn interlace(&self) -> Interlace {
        self.interlace
    }

    pub fn frame_times(&self) -> &[f64] {
        &self.frame_times
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn current_frame(&self) -> usize {
        self.store().frame_number()
    }

    /// Current position in seconds since the first frame.
    pub fn current_time(&self) -> f64 {
        let store = self.store();
        store.current_time() - store.start_time()
    }

    /// Last frame at or before `time`; 0 before the start, last frame past the end.
    pub fn time_to_frame(&self, time: f64) -> usize {
        floor_in_slice(&self.frame_times, time).unwrap_or(0)
    }

    /// Moves to `index` and returns its point cloud. The cloud is `None` when
    /// the frame's calibration cannot be used; the seek still happens.
    pub fn seek_frame(&self, index: usize) -> Result<Option<Arc<PointCloud>>> {
        let count = self.frame_count();
        if index >= count {
            return Err(PointCloudError::FrameOutOfRange { index, count });
        }

        let lookup = {
            let mut store = self.store();
            store.seek(index as i64, Whence::Start)?;
            self.lookup(store.as_ref())
        };
        Ok(self.resolve(lookup))
    }

    pub fn seek_time(&self, time: f64) -> Result<Option<Arc<PointCloud>>> {
        self.seek_frame(self.time_to_frame(time))
    }

    /// Point cloud of the current frame.
    pub fn point_cloud(&self) -> Option<Arc<PointCloud>> {
        let lookup = self.lookup(self.store().as_ref());
        self.resolve(lookup)
    }

    /// Copies frame `index` out of the store, keeping the current position.
    pub fn read_frame(&self, index: usize) -> Result<FrameData> {
        let count = self.frame_count();
        if index >= count {
            return Err(PointCloudError::FrameOutOfRange { index, count });
        }
        let mut store = self.store();
        let saved = store.frame_number();
        store.seek(index as i64, Whence::Start)?;
        let frame = FrameData::read(store.as_ref());
        store.seek(saved as i64, Whence::Start)?;
        Ok(frame)
    }

    /// Builds every frame into the cache. Returns the number of frames built.
    pub fn preload(&self) -> Result<usize> {
        self.preload_with_progress(|| {})
    }

    /// Preload, calling `on_frame` once per frame handled.
    ///
    /// Frames are read in batches under the store lock, restoring the current
    /// position after each batch, and reconstructed outside it in parallel.
    pub fn preload_with_progress<F>(&self, on_frame: F) -> Result<usize>
    where
        F: Fn() + Sync,
    {
        if self.source_name.is_none() || self.created_ms.is_none() {
            warn!("Store has no stable identity, preloaded frames would not be cached");
            return Ok(0);
        }

        let started = Instant::now();
        let count = self.frame_count();
        let mut built = 0;

        for batch_start in (0..count).step_by(PRELOAD_BATCH) {
            let batch_end = (batch_start + PRELOAD_BATCH).min(count);
            let pending: Vec<(FrameData, String)> = {
                let mut store = self.store();
                let saved = store.frame_number();
                let mut pending = Vec::with_capacity(batch_end - batch_start);
                for index in batch_start..batch_end {
                    store.seek(index as i64, Whence::Start)?;
                    match self.lookup(store.as_ref()) {
                        Lookup::Missing(frame, Some(key)) => pending.push((frame, key)),
                        _ => on_frame(),
                    }
                }
                store.seek(saved as i64, Whence::Start)?;
                pending
            };

            built += pending
                .into_par_iter()
                .filter_map(|(frame, key)| {
                    let cloud = self.build(frame);
                    on_frame();
                    cloud.map(|cloud| self.cache.insert(key, cloud))
                })
                .count();
        }

        info!(
            "Loading {} point clouds done: {} ms",
            count,
            started.elapsed().as_millis()
        );
        Ok(built)
    }

    /// Copies frames covering `[start, end]` seconds to `sink` and returns how
    /// many were written. The end frame is pushed one past the floor match
    /// unless it is already the last frame.
    pub fn export(&self, sink: &mut dyn FrameSink, start: f64, end: f64) -> Result<usize> {
        self.export_with_progress(sink, start, end, || {})
    }

    pub fn export_with_progress<F>(
        &self,
        sink: &mut dyn FrameSink,
        start: f64,
        end: f64,
        on_frame: F,
    ) -> Result<usize>
    where
        F: Fn(),
    {
        let (first, last) = self.export_range(start, end);
        let mut store = self.store();
        let saved = store.frame_number();
        let copied = copy_frames(store.as_mut(), sink, first, last, &on_frame);
        store.seek(saved as i64, Whence::Start)?;
        let copied = copied?;

        info!("Exported frames {}..={} ({} frames)", first, last, copied);
        Ok(copied)
    }

    /// Writes the `[start, end]` range into a new record file at `path`.
    pub fn export_to_path(&self, path: impl AsRef<Path>, start: f64, end: f64) -> Result<usize> {
        let mut writer = RecordWriter::create(path)?;
        let copied = self.export(&mut writer, start, end)?;
        writer.close()?;
        Ok(copied)
    }

    /// Inclusive frame range an export of `[start, end]` seconds covers.
    pub fn export_range(&self, start: f64, end: f64) -> (usize, usize) {
        let mut first = self.time_to_frame(start);
        let mut last = self.time_to_frame(end);
        if last < first {
            std::mem::swap(&mut first, &mut last);
        }
        if last + 1 < self.frame_count() {
            last += 1;
        }
        (first, last)
    }

    /// Colour image of the first frame.
    pub fn thumbnail(&self) -> Result<RgbImage> {
        let frame = self.read_frame(0)?;
        let info = frame.calibration()?;
        color_image(&frame.colors, info.width, info.height)
    }

    pub fn close(self) {
        info!(
            "Closed player over {}",
            self.source_name.as_deref().unwrap_or("<unnamed store>")
        );
    }

    fn store(&self) -> MutexGuard<'_, Box<dyn FrameStore>> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cache_key(&self, store: &dyn FrameStore) -> Option<String> {
        let name = self.source_name.as_deref()?;
        let created_ms = self.created_ms?;
        Some(cache_key(name, created_ms, self.duration, store.current_time()))
    }

    fn lookup(&self, store: &dyn FrameStore) -> Lookup {
        let key = self.cache_key(store);
        if let Some(cloud) = key.as_deref().and_then(|k| self.cache.get(k)) {
            debug!("Frame {} served from cache", store.frame_number());
            return Lookup::Cached(cloud);
        }
        Lookup::Missing(FrameData::read(store), key)
    }

    fn resolve(&self, lookup: Lookup) -> Option<Arc<PointCloud>> {
        match lookup {
            Lookup::Cached(cloud) => Some(cloud),
            Lookup::Missing(frame, key) => {
                let cloud = self.build(frame)?;
                if let Some(key) = key {
                    self.cache.insert(key, Arc::clone(&cloud));
                }
                Some(cloud)
            }
        }
    }

    fn build(&self, frame: FrameData) -> Option<Arc<PointCloud>> {
        let index = frame.index;
        let built = frame.calibration().and_then(|info| {
            let raw = RawFrame::new(info.width, info.height, frame.depths, frame.colors)?;
            PointCloud2::new(
                info,
                raw,
                self.config.reconstruction.clone(),
                self.interlace,
            )?
            .into_point_cloud()
        });

        match built {
            Ok(cloud) => Some(Arc::new(cloud)),
            Err(e) => {
                warn!("Frame {} has no point cloud: {}", index, e);
                None
            }
        }
    }
}

fn copy_frames(
    store: &mut dyn FrameStore,
    sink: &mut dyn FrameSink,
    first: usize,
    last: usize,
    on_frame: &dyn Fn(),
) -> Result<usize> {
    let mut pixels = 0;
    for index in first..=last {
        store.seek(index as i64, Whence::Start)?;
        if index == first {
            let info = FrameCalibrationInfo::from_json(store.info())?;
            pixels = info.pixel_count();
        }
        if store.depths().len() != pixels || store.colors().len() != pixels * 4 {
            return Err(PointCloudError::CorruptFrame {
                index,
                reason: format!(
                    "{} depths and {} colour bytes do not match {} pixels",
                    store.depths().len(),
                    store.colors().len(),
                    pixels
                ),
            });
        }
        sink.record(store.current_time(), store.info(), store.depths(), store.colors())?;
        on_frame();
    }
    Ok(last + 1 - first)
}
