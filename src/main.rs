//! All-sky Capture CLI
//!
//! Runs the capture loop until interrupted.

use allsky_capture::{
    capture::{FileConfig, SensorPort, SimulatedSensor},
    control::ExposureGainController,
    metrics::MetricsRegistry,
    orchestrator::{CaptureOrchestrator, OutputPaths, Outputs, Shutdown},
    output::{CycleLog, FitsArchive, PreviewRenderer},
};
use clap::Parser;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{info, warn};

/// Unattended all-sky camera capture.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Settings file (TOML).
    #[arg(short = 's', long)]
    settings: PathBuf,

    /// Directory for the log, archived frames and previews.
    #[arg(short = 'p', long)]
    path: PathBuf,

    /// Directory for the live preview image (defaults to --path).
    #[arg(short = 'P', long)]
    livepath: Option<PathBuf>,

    /// Show processed frames in a window.
    #[arg(short = 'l', long)]
    live: bool,

    /// Downscale factor for previews.
    #[arg(short = 'b', long, default_value_t = 1)]
    nbin: u32,

    /// Start in the nighttime regime.
    #[arg(short = 'n', long)]
    night: bool,
}

fn fail(context: &str, error: impl std::fmt::Display) -> ! {
    eprintln!("{}: {}", context, error);
    process::exit(1);
}

fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    info!("All-sky capture v{}", allsky_capture::VERSION);

    let config = FileConfig::from_file(&args.settings)
        .unwrap_or_else(|e| fail("Failed to load settings", e));

    let paths = OutputPaths {
        path: args.path.clone(),
        live_path: args.livepath.clone().unwrap_or_else(|| args.path.clone()),
        live_filename: config.capture.filename.clone(),
    };
    for dir in [&paths.path, &paths.live_path] {
        if let Err(e) = std::fs::create_dir_all(dir) {
            fail(&format!("Failed to create {}", dir.display()), e);
        }
    }

    let log = CycleLog::open(paths.log_file()).unwrap_or_else(|e| fail("Failed to open log", e));

    // Controller and initial sensor command
    let limits = config.capture.limits().unwrap_or_else(|e| fail("Invalid settings", e));
    let controller = ExposureGainController::with_dwell(
        limits,
        config.capture.initial_state(args.night),
        config.control.guard_dwell_cycles,
    );
    let command = config
        .capture
        .initial_command(&controller)
        .unwrap_or_else(|e| fail("Invalid settings", e));
    info!(
        state = %controller.state(),
        setpoint = %command.setpoint,
        auto_exposure = command.auto.exposure,
        auto_gain = command.auto.gain,
        "Controller initialized"
    );

    let settings = config
        .capture
        .sensor_settings(command)
        .unwrap_or_else(|e| fail("Invalid settings", e));
    let mut sensor = SimulatedSensor::new(config.simulator.clone());
    if let Err(e) = sensor.configure(&settings) {
        fail("Failed to configure sensor", e);
    }

    let pipeline = PreviewRenderer::new(config.overlay.clone(), config.capture.bin, args.nbin.max(1))
        .unwrap_or_else(|e| fail("Failed to set up previews", e));
    let outputs = Outputs {
        log,
        archive: Box::new(FitsArchive::new()),
        pipeline: Box::new(pipeline),
    };

    let shutdown = Shutdown::new();
    let handler = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || handler.trigger()) {
        fail("Failed to install signal handler", e);
    }

    let mut orchestrator = CaptureOrchestrator::new(sensor, controller, command.setpoint, outputs, paths)
        .with_pacing(config.capture.daytime_delay())
        .with_shutdown(shutdown);

    match MetricsRegistry::new() {
        Ok(registry) => {
            let registry = Arc::new(registry);
            start_metrics_server(config.output.metrics_port, Arc::clone(&registry));
            orchestrator = orchestrator.with_metrics(registry);
        }
        Err(e) => warn!("Metrics disabled: {}", e),
    }

    if args.live {
        orchestrator = attach_live_view(orchestrator);
    }

    match orchestrator.run() {
        Ok(summary) => info!(
            cycles = summary.cycles,
            stable = summary.stable_cycles,
            archived = summary.archived,
            commands = summary.commands,
            "Done"
        ),
        Err(e) => fail("Capture failed", e),
    }
}

#[cfg(feature = "metrics")]
fn start_metrics_server(port: u16, registry: Arc<MetricsRegistry>) {
    use allsky_capture::metrics::MetricsServer;

    if port == 0 {
        return;
    }
    MetricsServer::new(port, registry).spawn();
}

#[cfg(not(feature = "metrics"))]
fn start_metrics_server(port: u16, _registry: Arc<MetricsRegistry>) {
    if port != 0 {
        warn!(port, "Built without the metrics feature; exporter not started");
    }
}

#[cfg(feature = "live-view")]
fn attach_live_view<S: SensorPort>(orchestrator: CaptureOrchestrator<S>) -> CaptureOrchestrator<S> {
    orchestrator.with_display(Box::new(allsky_capture::output::WindowDisplay::new()))
}

#[cfg(not(feature = "live-view"))]
fn attach_live_view<S: SensorPort>(orchestrator: CaptureOrchestrator<S>) -> CaptureOrchestrator<S> {
    warn!("Built without the live-view feature; --live ignored");
    orchestrator
}
