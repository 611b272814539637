//! landing-vision CLI: run the landing control loop or inspect captured telemetry.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{ArgAction, Args, Parser, Subcommand};
use landing_vision::config::{load_calibration, LandingConfig};
use landing_vision::link::{split_packets, SerialTransport};
use landing_vision::pipeline::MarkerPipeline;
use landing_vision::pose::PoseEstimator;
use landing_vision::replay::ReplayDetector;
use landing_vision::runner::ControlLoop;
use landing_vision::source::{BlankSource, FrameSource};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "landing-vision")]
#[command(about = "Fiducial-marker precision landing: pose estimation and flight-controller telemetry")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the capture → detect → send control loop.
    Run(RunArgs),

    /// Print the packets in a telemetry capture file as JSON lines.
    Decode {
        /// Capture file written by `run --capture`.
        capture: PathBuf,
    },
}

#[derive(Debug, Clone, Args)]
struct RunArgs {
    /// Landing configuration (JSON).
    #[arg(long)]
    config: PathBuf,

    /// Camera calibration (JSON); overrides `calibration_path` from the config.
    #[arg(long)]
    calibration: Option<PathBuf>,

    /// Recorded detector output to replay (JSON).
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Directory of images to use as camera frames.
    #[arg(long)]
    frames: Option<PathBuf>,

    /// Write packets to this file instead of the serial port.
    #[arg(long)]
    capture: Option<PathBuf>,

    /// Stop after this many cycles.
    #[arg(long)]
    max_cycles: Option<u64>,
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();

    #[cfg(feature = "tracing")]
    landing_vision::core::init_tracing(false);
    #[cfg(not(feature = "tracing"))]
    landing_vision::core::init_with_level(landing_vision::core::level_from_verbosity(
        cli.verbose,
    ))?;

    match cli.command {
        Commands::Run(args) => run(&args),
        Commands::Decode { capture } => decode(&capture),
    }
}

// ── run ────────────────────────────────────────────────────────────────

fn run(args: &RunArgs) -> CliResult<()> {
    let cfg = LandingConfig::load_json(&args.config).map_err(|e| -> CliError {
        format!("failed to load config {}: {e}", args.config.display()).into()
    })?;
    let registry = cfg.validate()?;

    let calibration = args
        .calibration
        .clone()
        .unwrap_or_else(|| PathBuf::from(&cfg.calibration_path));
    let camera = load_calibration(&calibration).map_err(|e| -> CliError {
        format!("failed to load calibration {}: {e}", calibration.display()).into()
    })?;

    let Some(replay) = args.replay.as_deref() else {
        return Err("no marker detector backend is built in; pass --replay <json>".into());
    };
    let detector = ReplayDetector::from_json_file(replay)?;
    let pipeline = MarkerPipeline::new(detector, registry, PoseEstimator::new(camera), cfg.retry);

    let source = open_source(args.frames.as_deref(), &cfg)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))?;

    let retry = pipeline.retry_policy();
    log::info!(
        "landing vision started: family {}, markers {:?}, cycle {} ms, retry {}x{} ms",
        pipeline.registry().family(),
        pipeline.registry().ids(),
        cfg.cycle_period_ms,
        retry.max_attempts,
        retry.delay_ms
    );

    match args.capture.as_deref() {
        Some(path) => {
            let file = BufWriter::new(File::create(path)?);
            let transport = SerialTransport::from_writer(file, path.display().to_string());
            drive(source, pipeline, transport, &cfg, args.max_cycles, shutdown)
        }
        None => {
            let transport = SerialTransport::open(&cfg.uart)?;
            drive(source, pipeline, transport, &cfg, args.max_cycles, shutdown)
        }
    }
}

fn open_source(frames: Option<&Path>, cfg: &LandingConfig) -> CliResult<Box<dyn FrameSource>> {
    match frames {
        None => Ok(Box::new(BlankSource::new(&cfg.camera))),
        #[cfg(feature = "image")]
        Some(dir) => {
            let src = landing_vision::source::ImageSequenceSource::from_dir(dir)?;
            log::info!("replaying {} frames from {}", src.len(), dir.display());
            Ok(Box::new(src))
        }
        #[cfg(not(feature = "image"))]
        Some(_) => Err("built without the `image` feature; --frames is unavailable".into()),
    }
}

fn drive<W: Write>(
    source: Box<dyn FrameSource>,
    pipeline: MarkerPipeline<ReplayDetector>,
    transport: SerialTransport<W>,
    cfg: &LandingConfig,
    max_cycles: Option<u64>,
    shutdown: Arc<AtomicBool>,
) -> CliResult<()> {
    let mut control = ControlLoop::new(
        source,
        pipeline,
        transport,
        Duration::from_millis(cfg.cycle_period_ms),
    )
    .with_shutdown(shutdown);
    control.run(max_cycles)?;
    Ok(())
}

// ── decode ─────────────────────────────────────────────────────────────

fn decode(capture: &Path) -> CliResult<()> {
    let bytes = std::fs::read(capture).map_err(|e| -> CliError {
        format!("failed to read {}: {e}", capture.display()).into()
    })?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let packets = split_packets(&bytes).map_err(|e| -> CliError {
        format!("malformed capture {}: {e}", capture.display()).into()
    })?;
    for packet in packets {
        writeln!(out, "{}", serde_json::to_string(&packet)?)?;
    }
    Ok(())
}
