use std::path::PathBuf;

use bevy::diagnostic::{DiagnosticsStore, FrameTimeDiagnosticsPlugin};
use bevy::prelude::*;
use bevy::window::PresentMode;
use constants::render_settings::CLEAR_COLOUR;
use point_cloud_core::{PlayerConfig, PointCloudPlayer};

mod engine;

use engine::camera::{ViewerCamera, camera_controller, spawn_camera};
use engine::playback::{Playback, advance_playback, playback_input};
use engine::point_cloud::{Player, PointCloudMaterial, show_requested_frame};

struct ViewerArgs {
    record: PathBuf,
    config: Option<PathBuf>,
}

fn main() {
    let args = match parse_args() {
        Some(args) => args,
        None => {
            eprintln!("Usage: point-cloud-viewer <record.pcd> [--config <player.json>]");
            std::process::exit(1);
        }
    };

    let player = match open_player(&args) {
        Ok(player) => player,
        Err(e) => {
            eprintln!("Failed to open {}: {}", args.record.display(), e);
            std::process::exit(1);
        }
    };

    create_app(player).run();
}

fn parse_args() -> Option<ViewerArgs> {
    let mut record = None;
    let mut config = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            config = Some(PathBuf::from(args.next()?));
        } else if record.is_none() {
            record = Some(PathBuf::from(arg));
        } else {
            return None;
        }
    }
    Some(ViewerArgs {
        record: record?,
        config,
    })
}

fn open_player(args: &ViewerArgs) -> Result<PointCloudPlayer, point_cloud_core::PointCloudError> {
    let config = match &args.config {
        Some(path) => PlayerConfig::load(path)?,
        None => PlayerConfig::default(),
    };
    PointCloudPlayer::open(&args.record, config)
}

fn create_app(player: PointCloudPlayer) -> App {
    let frame_count = player.frame_count();
    let mut app = App::new();

    app.add_plugins(DefaultPlugins.set(WindowPlugin {
        primary_window: Some(Window {
            title: "Point Cloud Player".into(),
            present_mode: PresentMode::AutoVsync,
            ..default()
        }),
        ..default()
    }))
    .add_plugins(FrameTimeDiagnosticsPlugin::default())
    .insert_resource(ClearColor(Color::srgb(
        CLEAR_COLOUR[0],
        CLEAR_COLOUR[1],
        CLEAR_COLOUR[2],
    )))
    .insert_resource(Player(player))
    .insert_resource(Playback::new(frame_count))
    .init_resource::<ViewerCamera>()
    .add_systems(Startup, setup)
    .add_systems(
        Update,
        (
            playback_input,
            advance_playback,
            show_requested_frame,
            camera_controller,
            status_text_update_system,
        )
            .chain(),
    );

    app
}

#[derive(Component)]
struct StatusText;

fn setup(mut commands: Commands, mut materials: ResMut<Assets<StandardMaterial>>) {
    let material = materials.add(StandardMaterial {
        base_color: Color::WHITE,
        unlit: true,
        ..default()
    });
    commands.insert_resource(PointCloudMaterial(material));

    spawn_camera(&mut commands);
    spawn_ui(&mut commands);
}

fn spawn_ui(commands: &mut Commands) {
    commands
        .spawn(Node {
            width: Val::Percent(100.0),
            height: Val::Percent(100.0),
            ..default()
        })
        .with_children(|parent| {
            parent.spawn((
                Text::new(""),
                TextFont {
                    font_size: 16.0,
                    ..default()
                },
                TextColor(Color::srgb(0.9, 0.9, 0.9)),
                Node {
                    position_type: PositionType::Absolute,
                    bottom: Val::Px(12.0),
                    left: Val::Px(12.0),
                    ..default()
                },
                StatusText,
            ));
        });
}

fn status_text_update_system(
    diagnostics: Res<DiagnosticsStore>,
    player: Res<Player>,
    playback: Res<Playback>,
    mut query: Query<&mut Text, With<StatusText>>,
) {
    let fps = diagnostics
        .get(&FrameTimeDiagnosticsPlugin::FPS)
        .and_then(|fps| fps.smoothed())
        .unwrap_or_default();

    for mut text in &mut query {
        text.0 = format!(
            "Frame {}/{}  {:.3}s / {:.3}s  {}  FPS: {fps:.1}",
            player.0.current_frame() + 1,
            player.0.frame_count(),
            player.0.current_time(),
            player.0.duration(),
            if playback.is_playing() { "playing" } else { "paused" },
        );
    }
}
