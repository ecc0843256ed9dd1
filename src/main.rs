use buoykit_rs::{
    CameraIntrinsics, LocatorConfig, PoseHistory, PoseRecord, TargetLocator, TrackState,
};
use clap::Parser;
use opencv::{
    core::Mat,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTrait},
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Replay a recorded video with its camera trajectory and locate the targets
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[arg(index = 1)]
    video_path: String,
    /// Locator config (JSON)
    #[arg(long)]
    config: String,
    /// Camera poses (JSON array of {timestamp, translation, rotation})
    #[arg(long)]
    poses: String,
    #[arg(long)]
    fx: Option<f64>,
    #[arg(long)]
    fy: Option<f64>,
    #[arg(long)]
    cx: Option<f64>,
    #[arg(long)]
    cy: Option<f64>,
    #[arg(long)]
    rerun: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "buoykit_rs=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let config = LocatorConfig::load(&cli.config)?;
    info!(
        "Config loaded: {} target(s), buffer {} (estimate past {}), novelty {:.2}, max speed {:.2}",
        config.targets.len(),
        config.max_observations,
        config.min_observations,
        config.novelty_threshold,
        config.max_speed
    );

    let records: Vec<PoseRecord> = serde_json::from_str(&std::fs::read_to_string(&cli.poses)?)?;
    let history = PoseHistory::from_records(&config.world_frame, &config.camera_frame, &records);
    info!("Loaded {} poses from {}", history.len(), cli.poses);

    info!("Opening video: {}", cli.video_path);
    let mut cap = VideoCapture::from_file(&cli.video_path, videoio::CAP_ANY)?;
    if !cap.is_opened()? {
        return Err("Cannot open video".into());
    }

    let width = cap.get(videoio::CAP_PROP_FRAME_WIDTH)?;
    let height = cap.get(videoio::CAP_PROP_FRAME_HEIGHT)?;
    let fps = cap.get(videoio::CAP_PROP_FPS)?;
    info!("Resolution: {}x{} @ {:.2} fps", width, height, fps);

    let intrinsics =
        if let (Some(fx), Some(fy), Some(cx), Some(cy)) = (cli.fx, cli.fy, cli.cx, cli.cy) {
            CameraIntrinsics::new(fx, fy, cx, cy)
        } else {
            warn!("No intrinsics provided, assuming f=500 and a centered principal point");
            CameraIntrinsics::new(500.0, 500.0, width / 2.0, height / 2.0)
        };

    let tick_every = if fps > 0.0 {
        ((config.tick_period_secs * fps).round() as usize).max(1)
    } else {
        1
    };

    #[allow(unused_mut)]
    let mut locator = TargetLocator::new(config.clone(), Arc::new(history))?;

    #[cfg(feature = "rerun")]
    if cli.rerun {
        locator = locator.with_sink(Arc::new(buoykit_rs::RerunSink::spawn("buoykit-rs")?));
    }

    #[cfg(not(feature = "rerun"))]
    if cli.rerun {
        warn!("Rerun not available. Build with --features rerun");
    }

    locator.set_camera_model(intrinsics);
    locator.set_search_active(true);

    let start_time = Instant::now();
    let mut frame = Mat::default();
    let mut frame_count = 0;

    loop {
        if !cap.read(&mut frame)? || frame.empty() {
            break;
        }
        frame_count += 1;

        let timestamp = cap.get(videoio::CAP_PROP_POS_MSEC)? / 1000.0;
        locator.on_frame(frame.try_clone()?, timestamp);

        if frame_count % tick_every == 0 {
            if let Some(report) = locator.tick() {
                for (identity, estimate) in &report.estimates {
                    info!(
                        "t={:.2} {}: ({:.2}, {:.2}, {:.2}) rms {:.3}",
                        report.timestamp,
                        identity,
                        estimate.position.x,
                        estimate.position.y,
                        estimate.position.z,
                        estimate.rms_distance
                    );
                }
            }
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        "Processed {} frames in {:.2}s",
        frame_count,
        elapsed.as_secs_f64()
    );

    for &identity in config.targets.keys() {
        let state = locator.track_state(identity);
        let response = locator.get_3d(identity)?;
        if state != TrackState::Estimating {
            warn!(
                "{}: only {} observation(s)",
                identity,
                locator.observation_count(identity)
            );
        }
        println!("{}: {}", identity, serde_json::to_string(&response)?);
    }

    Ok(())
}
