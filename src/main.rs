use std::{
    io::{self, BufRead},
    path::PathBuf,
    sync::Arc,
};

use anyhow::{Context, Result, anyhow, bail};
use center_guide::{
    config::GuideConfig,
    pipeline::{FrameIngest, FrameProcessor, Orchestrator, SharedState},
    pose::PoseEstimator,
    source,
    types::Mode,
};

const USAGE: &str = "usage: center-guide [CONFIG.toml] [--images DIR] [--camera INDEX] [--model PATH] [--mode center|full]";

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    images: Option<PathBuf>,
    camera: Option<u32>,
    model: Option<PathBuf>,
    mode: Option<Mode>,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args> {
    let mut parsed = Args::default();
    while let Some(arg) = args.next() {
        let mut value = |flag: &str| args.next().ok_or_else(|| anyhow!("{flag} expects a value"));
        match arg.as_str() {
            "--images" => parsed.images = Some(PathBuf::from(value("--images")?)),
            "--camera" => {
                let raw = value("--camera")?;
                parsed.camera = Some(raw.parse().with_context(|| format!("invalid camera index {raw}"))?);
            }
            "--model" => parsed.model = Some(PathBuf::from(value("--model")?)),
            "--mode" => parsed.mode = Some(value("--mode")?.parse()?),
            "-h" | "--help" => bail!("{USAGE}"),
            flag if flag.starts_with("--") => bail!("unknown option {flag}\n{USAGE}"),
            path if parsed.config.is_none() => parsed.config = Some(PathBuf::from(path)),
            extra => bail!("unexpected argument {extra}\n{USAGE}"),
        }
    }
    Ok(parsed)
}

#[cfg(feature = "movenet")]
fn build_estimator(model: Option<&PathBuf>) -> Result<impl PoseEstimator> {
    use center_guide::pose::{MoveNetEstimator, MoveNetVariant};

    let path = model.ok_or_else(|| anyhow!("--model is required\n{USAGE}"))?;
    let variant = if path.to_string_lossy().to_ascii_lowercase().contains("thunder") {
        MoveNetVariant::Thunder
    } else {
        MoveNetVariant::Lightning
    };
    MoveNetEstimator::new(path, variant)
}

#[cfg(not(feature = "movenet"))]
fn build_estimator(_model: Option<&PathBuf>) -> Result<fn(&center_guide::types::Frame) -> Result<Vec<center_guide::pose::Person>>> {
    bail!("no pose estimator backend was compiled in; rebuild with --features movenet")
}

enum Source {
    Replay(source::SourceStream),
    #[cfg(feature = "camera-nokhwa")]
    Camera(center_guide::camera::CameraStream),
}

impl Source {
    fn stop(self) {
        match self {
            Source::Replay(stream) => stream.stop(),
            #[cfg(feature = "camera-nokhwa")]
            Source::Camera(stream) => stream.stop(),
        }
    }
}

fn start_source(args: &Args, config: &GuideConfig, ingest: FrameIngest) -> Result<Source> {
    if let Some(index) = args.camera {
        #[cfg(feature = "camera-nokhwa")]
        {
            use nokhwa::utils::CameraIndex;
            for device in center_guide::camera::available_cameras().unwrap_or_default() {
                log::info!("camera {:?}: {}", device.index, device.label);
            }
            let stream = center_guide::camera::start_camera_stream(CameraIndex::Index(index), ingest)?;
            return Ok(Source::Camera(stream));
        }
        #[cfg(not(feature = "camera-nokhwa"))]
        bail!("camera {index} requested but camera support was not compiled in; rebuild with --features camera-nokhwa");
    }

    let dir = args
        .images
        .as_ref()
        .ok_or_else(|| anyhow!("no frame source given\n{USAGE}"))?;
    let paths = source::list_images(dir)?;
    let stream = source::start_replay(paths, config.source.fps, config.source.loop_forever, ingest)?;
    Ok(Source::Replay(stream))
}

fn main() -> Result<()> {
    env_logger::init();

    let args = parse_args(std::env::args().skip(1))?;
    let config = GuideConfig::load_or_default(args.config.as_ref())?;
    let mode = args.mode.unwrap_or(config.mode);

    let estimator = build_estimator(args.model.as_ref())?;
    let processor = FrameProcessor::new(estimator, config.guidance.clone(), Arc::new(SharedState::new()))
        .with_jpeg_quality(config.image_channel.jpeg_quality)
        .with_stream_annotated(config.image_channel.stream_annotated);

    let mut orchestrator = Orchestrator::start(processor, config.streaming_settings(), mode);
    orchestrator.start_streaming();
    log::info!(
        "streaming to {} (images) and {} (commands) in {} mode",
        config.image_channel.addr,
        config.command_channel.addr,
        mode.label()
    );

    let source = start_source(&args, &config, orchestrator.ingest())?;

    for line in io::stdin().lock().lines() {
        let line = line?;
        match line.trim() {
            "" => {}
            "quit" | "exit" => break,
            "restart" => {
                let restarted = orchestrator.restart_disconnected();
                log::info!("restarted {restarted} channel(s)");
            }
            "status" => {
                let snapshot = orchestrator.guidance();
                let (image, command) = orchestrator.channel_states();
                log::info!(
                    "mode={} direction={} centered={} person={} image={image:?} command={command:?}",
                    orchestrator.mode().label(),
                    snapshot.direction,
                    snapshot.centered,
                    snapshot.check_person
                );
            }
            other => match other.parse::<Mode>() {
                Ok(mode) => orchestrator.set_mode(mode),
                Err(_) => log::warn!("unknown command {other:?} (full, center, restart, status, quit)"),
            },
        }
    }

    source.stop();
    orchestrator.shutdown();
    Ok(())
}
