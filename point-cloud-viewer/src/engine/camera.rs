//! Orbit camera around the recording origin.
use bevy::input::mouse::{MouseMotion, MouseScrollUnit, MouseWheel};
use bevy::prelude::*;
use constants::render_settings::CAMERA_DISTANCE;

const YAW_SENSITIVITY: f32 = 0.0035;
const PITCH_SENSITIVITY: f32 = 0.0030;
const MIN_DISTANCE: f32 = 0.05;

#[derive(Resource, Debug, Clone, PartialEq)]
pub struct ViewerCamera {
    pub focus_point: Vec3,
    pub distance: f32,
    pub yaw: f32,
    pub pitch: f32,
}

impl Default for ViewerCamera {
    fn default() -> Self {
        Self {
            focus_point: Vec3::ZERO,
            distance: CAMERA_DISTANCE,
            yaw: 0.0,
            pitch: 0.0,
        }
    }
}

impl ViewerCamera {
    pub fn transform(&self) -> Transform {
        let rotation = Quat::from_euler(EulerRot::YXZ, self.yaw, self.pitch, 0.0);
        let position = self.focus_point + rotation * Vec3::Z * self.distance;
        Transform::from_translation(position).looking_at(self.focus_point, Vec3::Y)
    }
}

pub fn spawn_camera(commands: &mut Commands) {
    commands.spawn((Camera3d::default(), ViewerCamera::default().transform()));
}

/// Right drag orbits, the wheel dollies towards the focus point.
pub fn camera_controller(
    mut camera_query: Query<&mut Transform, With<Camera3d>>,
    mut viewer: ResMut<ViewerCamera>,
    mouse_button: Res<ButtonInput<MouseButton>>,
    mut mouse_motion: EventReader<MouseMotion>,
    mut scroll_events: EventReader<MouseWheel>,
) {
    let mouse_delta: Vec2 = mouse_motion.read().map(|m| m.delta).sum();
    if mouse_button.pressed(MouseButton::Right) && mouse_delta != Vec2::ZERO {
        viewer.yaw -= mouse_delta.x * YAW_SENSITIVITY;
        viewer.pitch = (viewer.pitch - mouse_delta.y * PITCH_SENSITIVITY).clamp(-1.55, 1.55);
    }

    let scroll: f32 = scroll_events
        .read()
        .map(|ev| match ev.unit {
            MouseScrollUnit::Line => ev.y * 0.05,
            MouseScrollUnit::Pixel => ev.y * 0.002,
        })
        .sum();
    if scroll.abs() > f32::EPSILON {
        viewer.distance = (viewer.distance - scroll).max(MIN_DISTANCE);
    }

    if let Ok(mut transform) = camera_query.single_mut() {
        *transform = viewer.transform();
    }
}
