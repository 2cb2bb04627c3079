//! Timestamped 2-D body keypoints with per-keypoint motion derivatives.
use glam::DVec2;
use log::debug;

use constants::playback::DEFAULT_POSE_HISTORY;

use crate::error::Result;
use crate::ring_buffer::RingBuffer;
use crate::search::floor_index;

/// Detected keypoints followed by the synthetic wrist midpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyPart {
    Nose,
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    LeftShoulder,
    RightShoulder,
    LeftElbow,
    RightElbow,
    LeftWrist,
    RightWrist,
    LeftHip,
    RightHip,
    LeftKnee,
    RightKnee,
    LeftAnkle,
    RightAnkle,
    Wrist,
}

impl BodyPart {
    pub const ALL: [BodyPart; 18] = [
        BodyPart::Nose,
        BodyPart::LeftEye,
        BodyPart::RightEye,
        BodyPart::LeftEar,
        BodyPart::RightEar,
        BodyPart::LeftShoulder,
        BodyPart::RightShoulder,
        BodyPart::LeftElbow,
        BodyPart::RightElbow,
        BodyPart::LeftWrist,
        BodyPart::RightWrist,
        BodyPart::LeftHip,
        BodyPart::RightHip,
        BodyPart::LeftKnee,
        BodyPart::RightKnee,
        BodyPart::LeftAnkle,
        BodyPart::RightAnkle,
        BodyPart::Wrist,
    ];

    /// Number of keypoints produced by the detector.
    pub const DETECTED: usize = 17;

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Keypoint {
    /// Current position, possibly corrected.
    pub position: DVec2,
    /// Position as detected.
    pub detected: DVec2,
    pub score: f32,
    pub velocity: DVec2,
    pub acceleration: DVec2,
}

impl Keypoint {
    pub fn new(position: DVec2, score: f32) -> Self {
        Self {
            position,
            detected: position,
            score,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PoseSample {
    pub time: f64,
    pub keypoints: [Keypoint; 18],
    pub score: f32,
    /// Distance between the hip and knee midpoints, a per-body length unit.
    pub unit: f64,
}

impl PoseSample {
    /// Builds a sample from the 17 detected keypoints, adding the wrist midpoint.
    pub fn from_detection(
        time: f64,
        detected: &[(DVec2, f32); BodyPart::DETECTED],
        score: f32,
    ) -> Self {
        let mut keypoints = [Keypoint::default(); 18];
        for (slot, &(position, score)) in keypoints.iter_mut().zip(detected) {
            *slot = Keypoint::new(position, score);
        }

        let midpoint = |a: BodyPart, b: BodyPart| {
            (keypoints[a.index()].detected + keypoints[b.index()].detected) * 0.5
        };
        let hip = midpoint(BodyPart::LeftHip, BodyPart::RightHip);
        let knee = midpoint(BodyPart::LeftKnee, BodyPart::RightKnee);
        let wrist = Keypoint::new(
            midpoint(BodyPart::LeftWrist, BodyPart::RightWrist),
            keypoints[BodyPart::LeftWrist.index()]
                .score
                .min(keypoints[BodyPart::RightWrist.index()].score),
        );
        keypoints[BodyPart::Wrist.index()] = wrist;

        Self {
            time,
            keypoints,
            score,
            unit: hip.distance(knee),
        }
    }

    pub fn keypoint(&self, part: BodyPart) -> &Keypoint {
        &self.keypoints[part.index()]
    }
}

/// Bounded pose history. Appends are refused once full.
#[derive(Debug)]
pub struct PoseHistory {
    ring: RingBuffer<PoseSample>,
    minimum_score: f32,
    current_frame: usize,
    current_time: f64,
}

impl PoseHistory {
    pub fn new(capacity: usize, minimum_score: f32) -> Result<Self> {
        Ok(Self {
            ring: RingBuffer::try_new(capacity)?,
            minimum_score,
            current_frame: 0,
            current_time: 0.0,
        })
    }

    pub fn with_default_capacity(minimum_score: f32) -> Result<Self> {
        Self::new(DEFAULT_POSE_HISTORY, minimum_score)
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn start_time(&self) -> f64 {
        self.ring.front().map_or(0.0, |s| s.time)
    }

    pub fn end_time(&self) -> f64 {
        self.ring.rear().map_or(0.0, |s| s.time)
    }

    pub fn duration(&self) -> f64 {
        self.end_time() - self.start_time()
    }

    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn clear(&mut self) {
        self.ring.clear();
        self.current_frame = 0;
        self.current_time = 0.0;
    }

    /// Stores `sample` as the newest entry and derives its motion. Returns
    /// false when the history is full.
    pub fn append(&mut self, sample: PoseSample) -> bool {
        let time = sample.time;
        if !self.ring.append(sample, false) {
            debug!("Pose history full, dropping sample at {:.3}s", time);
            return false;
        }
        self.current_frame = self.len() - 1;
        self.current_time = time;
        self.derive_motion(self.current_frame);
        true
    }

    /// Velocity and acceleration of every keypoint of sample `index` from the
    /// two nearest earlier samples where the keypoint is trusted.
    fn derive_motion(&mut self, index: usize) {
        let Some(mut sample) = self.ring.get(index).cloned() else {
            return;
        };

        for part in 0..BodyPart::ALL.len() {
            let minimum = self.minimum_score;
            let mut trusted = (0..index).rev().filter_map(|i| {
                self.ring
                    .get(i)
                    .filter(|s| s.score > minimum && s.keypoints[part].score > minimum)
            });
            let Some(previous) = trusted.next() else {
                continue;
            };
            let dt = sample.time - previous.time;
            if dt <= 0.0 {
                continue;
            }

            let prior = &previous.keypoints[part];
            let keypoint = &mut sample.keypoints[part];
            keypoint.velocity = (keypoint.position - prior.position) / dt;
            if trusted.next().is_some() {
                keypoint.acceleration = (keypoint.velocity - prior.velocity) / dt;
            }
        }

        self.ring.set(index, sample);
    }

    pub fn get(&self, index: usize) -> Option<&PoseSample> {
        self.ring.get(index)
    }

    /// Sample at `index`, optionally moving the cursor onto it.
    pub fn seek_index(&mut self, index: usize, move_cursor: bool) -> Option<&PoseSample> {
        let time = self.ring.get(index)?.time;
        if move_cursor {
            self.current_frame = index;
            self.current_time = time;
        }
        self.ring.get(index)
    }

    /// Sample matching `time`. Without an exact match, `toward_before` picks
    /// the nearest earlier sample, otherwise the nearest later one.
    pub fn seek_time(&mut self, time: f64, toward_before: bool) -> Option<&PoseSample> {
        let floor = floor_index(self.len(), time, |i| self.ring.get(i).map(|s| s.time))?;
        let floor_time = self.ring.get(floor)?.time;

        let index = if floor_time == time {
            floor
        } else if toward_before {
            if floor_time > time {
                return None;
            }
            floor
        } else if floor_time > time {
            floor
        } else {
            floor + 1
        };
        self.seek_index(index, true)
    }
}
