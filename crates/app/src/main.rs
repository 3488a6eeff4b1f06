mod cli;
mod server;

use std::{net::TcpListener, path::Path, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use ml_core::Detector;
use tracing::{info, warn};
use video_ingest::{CaptureBackend, SourceHandle};
use vision::{
    PipelineConfig, PipelineController,
    pipeline::telemetry::{self, TelemetryGuard},
};

use crate::cli::{CamerasArgs, Cli, Command, ServeArgs};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => serve(args),
        Command::Cameras(args) => list_cameras(args),
    }
}

fn serve(args: ServeArgs) -> Result<()> {
    let config = PipelineConfig::try_from(args.pipeline)?;
    let _telemetry: TelemetryGuard = telemetry::init_tracing(&config.telemetry)?;
    telemetry::init_metrics_recorder();

    let taxonomy = Arc::new(config.load_taxonomy()?);
    let backend = build_backend(&config);
    let detector = build_detector(args.model.as_deref(), args.use_cpu, &config)?;
    info!(
        detector = detector.name(),
        classes = taxonomy.classes().len(),
        "pipeline configured"
    );
    let controller = Arc::new(
        PipelineController::new(config, backend, detector)?.with_taxonomy(taxonomy),
    );

    if let Some(source) = args.source.as_deref() {
        let handle: SourceHandle = source.parse()?;
        controller
            .set_source(handle)
            .with_context(|| format!("failed to open initial source {source}"))?;
    }

    let listener = TcpListener::bind(args.bind)
        .with_context(|| format!("failed to bind {}", args.bind))?;
    let server = server::spawn_server(Arc::clone(&controller), listener)?;
    info!("control surface listening on http://{}", args.bind);

    let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    })
    .context("failed to install Ctrl+C handler")?;

    let _ = shutdown_rx.recv();
    info!("shutdown requested");
    controller.stop();
    server.stop();
    Ok(())
}

fn list_cameras(args: CamerasArgs) -> Result<()> {
    let config = PipelineConfig {
        camera_probe_limit: args.limit.max(0),
        ..PipelineConfig::default()
    };
    let _telemetry = telemetry::init_tracing(&config.telemetry)?;
    let cameras = build_backend(&config).probe_cameras(config.camera_probe_limit);
    if cameras.is_empty() {
        warn!("no cameras opened in 0..{}", config.camera_probe_limit);
    }
    println!("{}", serde_json::json!({ "cameras": cameras }));
    Ok(())
}

#[cfg(feature = "opencv")]
fn build_backend(_config: &PipelineConfig) -> Arc<dyn CaptureBackend> {
    Arc::new(video_ingest::OpenCvBackend)
}

#[cfg(not(feature = "opencv"))]
fn build_backend(config: &PipelineConfig) -> Arc<dyn CaptureBackend> {
    warn!("built without `opencv`; only image files and directories can be opened");
    Arc::new(video_ingest::ImageSequenceBackend::new().with_frame_rate(config.default_fps))
}

#[cfg(feature = "with-tch")]
fn build_detector(
    model: Option<&Path>,
    use_cpu: bool,
    config: &PipelineConfig,
) -> Result<Arc<dyn Detector>> {
    use ml_core::{
        TorchDetector,
        tch::{Cuda, Device},
    };

    let Some(path) = model else {
        warn!("no --model given; frames will be streamed without detections");
        return Ok(Arc::new(ml_core::NullDetector));
    };
    let device = if use_cpu {
        Device::Cpu
    } else {
        Device::cuda_if_available()
    };
    info!(
        cuda = Cuda::is_available(),
        device = ?device,
        "loading detector from {}",
        path.display()
    );
    let detector = TorchDetector::new(path, device, config.detector_input)
        .with_context(|| format!("failed to load model {}", path.display()))?
        .with_min_confidence(config.confidence_threshold);
    Ok(Arc::new(detector))
}

#[cfg(not(feature = "with-tch"))]
fn build_detector(
    model: Option<&Path>,
    _use_cpu: bool,
    _config: &PipelineConfig,
) -> Result<Arc<dyn Detector>> {
    if let Some(path) = model {
        anyhow::bail!(
            "--model {} requires building with the `with-tch` feature",
            path.display()
        );
    }
    warn!("no detector available; frames will be streamed without detections");
    Ok(Arc::new(ml_core::NullDetector))
}
