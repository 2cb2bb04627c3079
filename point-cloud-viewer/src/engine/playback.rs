//! Keyboard stepping and timestamp-driven playback.
use bevy::prelude::*;

use crate::engine::point_cloud::Player;

/// Playback state. Frame changes are queued as a request and applied by
/// `show_requested_frame`.
#[derive(Resource, Debug)]
pub struct Playback {
    frame_count: usize,
    playing: bool,
    /// Seconds since the first frame.
    clock: f64,
    requested: Option<usize>,
}

impl Playback {
    /// Starts paused with the first frame queued for display.
    pub fn new(frame_count: usize) -> Self {
        Self {
            frame_count,
            playing: false,
            clock: 0.0,
            requested: Some(0),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn request(&mut self, index: usize) {
        if self.frame_count > 0 {
            self.requested = Some(index.min(self.frame_count - 1));
        }
    }

    pub fn take_request(&mut self) -> Option<usize> {
        self.requested.take()
    }

    /// Frame `delta` steps away from `current`, clamped to the recording.
    pub fn step_from(&self, current: usize, delta: i64) -> usize {
        let last = self.frame_count.saturating_sub(1) as i64;
        (current as i64 + delta).clamp(0, last) as usize
    }

    /// Starts playing from `time`, rewinding when already at the last frame.
    pub fn play_from(&mut self, current: usize, time: f64) {
        if current + 1 >= self.frame_count {
            self.clock = 0.0;
            self.request(0);
        } else {
            self.clock = time;
        }
        self.playing = true;
    }

    pub fn pause(&mut self) {
        self.playing = false;
    }

    /// Advances the clock by `delta` seconds and stops once it passes `duration`.
    pub fn tick(&mut self, delta: f64, duration: f64) -> f64 {
        self.clock += delta;
        if self.clock >= duration {
            self.clock = duration;
            self.playing = false;
        }
        self.clock
    }
}

pub fn playback_input(
    keyboard: Res<ButtonInput<KeyCode>>,
    player: Res<Player>,
    mut playback: ResMut<Playback>,
) {
    let current = player.0.current_frame();

    if keyboard.just_pressed(KeyCode::Space) {
        if playback.is_playing() {
            playback.pause();
        } else {
            playback.play_from(current, player.0.current_time());
        }
    }

    let step = if keyboard.just_pressed(KeyCode::ArrowRight) {
        Some(playback.step_from(current, 1))
    } else if keyboard.just_pressed(KeyCode::ArrowLeft) {
        Some(playback.step_from(current, -1))
    } else if keyboard.just_pressed(KeyCode::Home) {
        Some(0)
    } else if keyboard.just_pressed(KeyCode::End) {
        Some(player.0.frame_count().saturating_sub(1))
    } else {
        None
    };

    if let Some(index) = step {
        playback.pause();
        playback.request(index);
    }
}

/// Moves to the frame whose timestamp the playback clock has reached.
pub fn advance_playback(time: Res<Time>, player: Res<Player>, mut playback: ResMut<Playback>) {
    if !playback.is_playing() {
        return;
    }
    let clock = playback.tick(time.delta_secs_f64(), player.0.duration());
    let index = player.0.time_to_frame(clock);
    if index != player.0.current_frame() {
        playback.request(index);
    }
}
