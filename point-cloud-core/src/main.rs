//! Command line access to point cloud record files.
use std::env;
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use point_cloud_core::bounds::PointCloudBounds;
use point_cloud_core::image_io::save_depth_png;
use point_cloud_core::{FrameSink, PlayerConfig, PointCloudPlayer, RecordWriter};
use serde::Serialize;

const USAGE: &str = "Usage: vipl-pcd <command> [--config <player.json>]

Commands:
  info <file>                          Summarise a record file
  export <file> <out> <start-s> <end-s> Copy a time range into a new record file
  ply <file> <frame> <out.ply>         Write one frame as an ASCII PLY
  thumbnail <file> <out.png>           Save the first frame's colour image
  depth <file> <frame> <out.png>       Save one frame's depth as 16-bit PNG (mm)
  preload <file>                       Reconstruct every frame and report timing";

#[derive(Serialize)]
struct RecordSummary {
    frames: usize,
    duration_seconds: f64,
    interlace: usize,
    width: usize,
    height: usize,
    first_frame_vertices: usize,
    first_frame_bounds: Option<PointCloudBounds>,
    first_frame_center: Option<[f32; 3]>,
    first_frame_size: Option<[f32; 3]>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let (config_path, args) = split_config_flag(env::args().skip(1).collect());
    let config = match config_path {
        Some(path) => PlayerConfig::load(&path)?,
        None => PlayerConfig::default(),
    };

    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    match args.as_slice() {
        ["info", file] => info(file, config),
        ["export", file, out, start, end] => {
            export(file, out, start.parse()?, end.parse()?, config)
        }
        ["ply", file, frame, out] => ply(file, frame.parse()?, out, config),
        ["thumbnail", file, out] => thumbnail(file, out, config),
        ["depth", file, frame, out] => depth(file, frame.parse()?, out, config),
        ["preload", file] => preload(file, config),
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(1);
        }
    }
}

/// Removes `--config <path>` from the argument list.
fn split_config_flag(args: Vec<String>) -> (Option<PathBuf>, Vec<String>) {
    let mut config = None;
    let mut rest = Vec::with_capacity(args.len());
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            config = iter.next().map(PathBuf::from);
        } else {
            rest.push(arg);
        }
    }
    (config, rest)
}

fn progress_bar(
    len: usize,
    message: &'static str,
) -> Result<ProgressBar, Box<dyn std::error::Error>> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{bar:40.cyan/blue}] {pos}/{len} frames ({percent}%) {msg}")?
            .progress_chars("▉▊▋▌▍▎▏ "),
    );
    pb.set_message(message);
    Ok(pb)
}

fn info(file: &str, config: PlayerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let player = PointCloudPlayer::open(file, config)?;
    let calibration = player.read_frame(0)?.calibration()?;
    let cloud = player.seek_frame(0)?;
    let bounds = cloud.as_ref().map(|c| c.bounds());

    let summary = RecordSummary {
        frames: player.frame_count(),
        duration_seconds: player.duration(),
        interlace: player.interlace().stride(),
        width: calibration.width,
        height: calibration.height,
        first_frame_vertices: cloud.as_ref().map_or(0, |c| c.len()),
        first_frame_bounds: bounds,
        first_frame_center: bounds.map(|b| b.center().to_array()),
        first_frame_size: bounds.map(|b| b.dimensions().to_array()),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn export(
    file: &str,
    out: &str,
    start: f64,
    end: f64,
    config: PlayerConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let player = PointCloudPlayer::open(file, config)?;
    let (first, last) = player.export_range(start, end);
    let pb = progress_bar(last + 1 - first, "Exporting")?;

    let mut writer = RecordWriter::create(out)?;
    let copied = player.export_with_progress(&mut writer, start, end, || pb.inc(1))?;
    writer.close()?;
    pb.finish_with_message("Export complete");

    println!("Exported {} frames ({}..={}) to {}", copied, first, last, out);
    Ok(())
}

fn ply(
    file: &str,
    frame: usize,
    out: &str,
    config: PlayerConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let player = PointCloudPlayer::open(file, config)?;
    let Some(cloud) = player.seek_frame(frame)? else {
        return Err(format!("Frame {} has no usable calibration", frame).into());
    };
    std::fs::write(out, cloud.to_ply())?;
    println!("Saved {} ({} vertices)", out, cloud.len());
    Ok(())
}

fn thumbnail(
    file: &str,
    out: &str,
    config: PlayerConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let player = PointCloudPlayer::open(file, config)?;
    player.thumbnail()?.save(out)?;
    println!("Saved {}", out);
    Ok(())
}

fn depth(
    file: &str,
    frame: usize,
    out: &str,
    config: PlayerConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let player = PointCloudPlayer::open(file, config)?;
    let data = player.read_frame(frame)?;
    let calibration = data.calibration()?;
    save_depth_png(Path::new(out), &data.depths, calibration.width, calibration.height)?;
    println!("Saved {} (16-bit depth, mm)", out);
    Ok(())
}

fn preload(file: &str, config: PlayerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let player = PointCloudPlayer::open(file, config)?;
    let pb = progress_bar(player.frame_count(), "Reconstructing")?;
    let started = std::time::Instant::now();
    let built = player.preload_with_progress(|| pb.inc(1))?;
    pb.finish_with_message("Point clouds loaded");

    println!(
        "Built {} of {} frames in {} ms",
        built,
        player.frame_count(),
        started.elapsed().as_millis()
    );
    player.close();
    Ok(())
}
