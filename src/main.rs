use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use clap::{Parser, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use posecast::inference::{LandmarkEngine, NullEngine};
use posecast::landmarks::RenderMode;
use posecast::pipeline::{CapturePipeline, FrameSink, PipelineConfig, PipelineHooks};
use posecast::streamer::{PoseStreamer, StreamerConfig};
use posecast::video::format::{Resolution, Rotation};
use posecast::video::raw::{Plane, RawFrame};
use posecast::webrtc::WebRtcConfig;

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

/// posecast command line arguments
#[derive(Parser, Debug)]
#[command(name = "posecast")]
#[command(version, about = "Stream pose-annotated camera video to remote viewers", long_about = None)]
struct CliArgs {
    /// Signaling server WebSocket URL
    #[arg(short = 'u', long, value_name = "URL", default_value = "ws://127.0.0.1:8080/ws?role=sender")]
    signaling_url: String,

    /// Device identity appended to the signaling URL
    #[arg(short = 'd', long, value_name = "ID")]
    device_id: Option<String>,

    /// Overlay mode (pose, pose-hand, face, hand)
    #[arg(short = 'm', long, value_name = "MODE", default_value = "pose")]
    mode: String,

    /// Mirror the overlay (front camera)
    #[arg(long)]
    mirror: bool,

    /// Offer immediately on channel open instead of waiting for `ready`
    #[arg(long)]
    offer_on_open: bool,

    /// Capture width
    #[arg(long, value_name = "PIXELS", default_value_t = 640)]
    width: u32,

    /// Capture height
    #[arg(long, value_name = "PIXELS", default_value_t = 480)]
    height: u32,

    /// Capture frame rate
    #[arg(long, value_name = "FPS", default_value_t = 30)]
    fps: u32,

    /// STUN server URLs (repeatable)
    #[arg(long = "stun", value_name = "URL")]
    stun_servers: Vec<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_level, args.verbose);

    tracing::info!("Starting posecast v{}", env!("CARGO_PKG_VERSION"));

    let render_mode: RenderMode = args
        .mode
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;
    let resolution = Resolution::new(args.width, args.height);
    if !resolution.is_valid() {
        anyhow::bail!("invalid capture resolution {}", resolution);
    }

    let mut webrtc = WebRtcConfig::default();
    if !args.stun_servers.is_empty() {
        webrtc.stun_servers = args.stun_servers.clone();
    }

    let streamer = PoseStreamer::new(StreamerConfig {
        signaling_url: args.signaling_url.clone(),
        device_id: args.device_id.clone(),
        offer_on_open: args.offer_on_open,
        webrtc,
    });
    streamer.set_command_listener(|command| tracing::info!("command: {}", command));
    streamer.set_command_entry_listener(|entry| tracing::info!("command entry: {}", entry));
    streamer.set_command_history_listener(|entries| {
        tracing::info!("command history replay, {} entries", entries.len())
    });

    // Inference backend is an external collaborator; the stub produces no
    // landmarks. Library consumers plug a real engine here.
    let engine: Arc<dyn LandmarkEngine> = Arc::new(NullEngine::new());

    let streamer_for_pose = streamer.clone();
    let hooks = PipelineHooks {
        on_annotated_frame: None,
        on_pose_landmarks: Some(Box::new(move |landmarks| {
            streamer_for_pose.send_pose_landmarks(landmarks);
        })),
    };

    let sink: Arc<dyn FrameSink> = streamer.clone();
    let pipeline = CapturePipeline::start(
        PipelineConfig {
            render_mode,
            mirror: args.mirror,
            ..Default::default()
        },
        engine,
        sink,
        hooks,
    )?;

    let pipeline_for_label = pipeline.clone();
    streamer.set_pose_label_listener(move |label| {
        tracing::info!("pose label: {}", label);
        pipeline_for_label.set_label(label);
    });

    streamer.start().await?;

    // Stand-in for the platform camera: a moving test pattern keeps the
    // pipeline and every viewer session fed.
    let feeder = {
        let pipeline = pipeline.clone();
        let fps = args.fps.max(1);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(1) / fps);
            let mut tick = 0u32;
            loop {
                ticker.tick().await;
                match test_pattern_frame(resolution, tick) {
                    Ok(frame) => pipeline.submit_frame(frame),
                    Err(e) => tracing::warn!("test pattern generation failed: {}", e),
                }
                tick = tick.wrapping_add(1);
            }
        })
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");
    feeder.abort();
    pipeline.stop();
    streamer.stop().await;
    Ok(())
}

/// Moving gradient in semi-planar YUV 4:2:0
fn test_pattern_frame(resolution: Resolution, tick: u32) -> posecast::Result<RawFrame> {
    let width = resolution.width;
    let height = resolution.height;
    let mut y = vec![0u8; (width * height) as usize];
    for row in 0..height {
        for col in 0..width {
            y[(row * width + col) as usize] = ((col + row + tick * 3) & 0xFF) as u8;
        }
    }
    let cw = resolution.chroma_width();
    let ch = resolution.chroma_height();
    let u = vec![(96 + (tick % 64)) as u8; (cw * ch) as usize];
    let v = vec![(160u32.wrapping_sub(tick % 64)) as u8; (cw * ch) as usize];

    RawFrame::semi_planar(
        resolution,
        Rotation::Deg0,
        Plane::packed(Bytes::from(y), height, width)?,
        Plane::packed(Bytes::from(u), ch, cw)?,
        Plane::packed(Bytes::from(v), ch, cw)?,
    )
}

fn init_logging(level: LogLevel, verbose_count: u8) {
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "posecast=error",
        LogLevel::Warn => "posecast=warn",
        LogLevel::Info => "posecast=info",
        LogLevel::Debug => "posecast=debug,webrtc=info",
        LogLevel::Trace => "posecast=trace,webrtc=debug",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
