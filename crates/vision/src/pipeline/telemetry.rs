//! Tracing subscriber, Prometheus recorder and thread helpers.

use std::{
    io,
    path::Path,
    sync::OnceLock,
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::warn;
use tracing_subscriber::{
    filter::{EnvFilter, filter_fn},
    fmt,
    prelude::*,
};

use crate::pipeline::config::TelemetryOptions;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
static PROM_UPKEEP_THREAD: OnceLock<Option<thread::JoinHandle<()>>> = OnceLock::new();

pub(crate) const FRAMES_EMITTED: &str = "vision_frames_emitted_total";
pub(crate) const READ_FAILURES: &str = "vision_read_failures_total";
pub(crate) const STAGE_FAILURES: &str = "vision_stage_failures_total";
pub(crate) const NEW_TRACKS: &str = "vision_new_tracks_total";
pub(crate) const SOURCE_CHANGES: &str = "vision_source_changes_total";
pub(crate) const STAGE_LATENCY: &str = "vision_stage_latency_seconds";
pub(crate) const PIPELINE_FPS: &str = "vision_pipeline_fps";

/// Keeps the Chrome trace writer alive; flushes on drop.
pub struct TelemetryGuard {
    chrome_guard: Option<tracing_chrome::FlushGuard>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(guard) = self.chrome_guard.take() {
            guard.flush();
        }
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the default `info` filter. When a Chrome trace path is
/// configured, spans are additionally written there.
pub fn init_tracing(opts: &TelemetryOptions) -> Result<TelemetryGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_timer(fmt::time::uptime())
        .with_filter(env_filter);

    let mut chrome_error = None;
    let (chrome_layer, chrome_guard) = match opts.chrome_trace_path.as_deref() {
        Some(path) => match build_chrome_layer(path) {
            Ok((layer, guard)) => (Some(layer), Some(guard)),
            Err(err) => {
                chrome_error = Some(format!(
                    "failed to initialise chrome trace writer at {}: {err}",
                    path.display()
                ));
                (None, None)
            }
        },
        None => (None, None),
    };
    let span_only = filter_fn(|metadata| metadata.is_span());

    tracing_subscriber::registry()
        .with(chrome_layer.map(|layer| layer.with_filter(span_only)))
        .with(fmt_layer)
        .with(tracing_error::ErrorLayer::default())
        .try_init()
        .context("tracing subscriber already installed")?;

    if let Some(message) = chrome_error {
        warn!("{message}");
    }
    Ok(TelemetryGuard { chrome_guard })
}

fn build_chrome_layer(
    path: &Path,
) -> io::Result<(
    tracing_chrome::ChromeLayer<tracing_subscriber::Registry>,
    tracing_chrome::FlushGuard,
)> {
    let file = std::fs::File::create(path)?;
    Ok(tracing_chrome::ChromeLayerBuilder::new()
        .writer(file)
        .include_args(true)
        .trace_style(tracing_chrome::TraceStyle::Threaded)
        .build())
}

/// Ensure the global metrics recorder is installed and return the Prometheus handle.
pub fn init_metrics_recorder() -> &'static PrometheusHandle {
    PROM_HANDLE.get_or_init(|| {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        if let Err(err) = metrics::set_global_recorder(recorder) {
            warn!("metrics recorder already installed; Prometheus output will be empty: {err}");
        }

        let upkeep_handle = handle.clone();
        PROM_UPKEEP_THREAD.get_or_init(|| {
            spawn_thread("prometheus-upkeep", move || {
                loop {
                    thread::sleep(Duration::from_secs(5));
                    upkeep_handle.run_upkeep();
                }
            })
            .inspect_err(|err| warn!("failed to spawn prometheus upkeep thread: {err}"))
            .ok()
        });

        handle
    })
}

/// Access the Prometheus handle when already initialised.
pub fn prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROM_HANDLE.get()
}

/// Spawn a thread that inherits the current tracing dispatcher.
pub fn spawn_thread<F, T>(name: impl Into<String>, f: F) -> io::Result<thread::JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let dispatch = tracing::dispatcher::get_default(|current| current.clone());
    thread::Builder::new()
        .name(name.into())
        .spawn(move || tracing::dispatcher::with_default(&dispatch, f))
}

/// Run `f` and record its duration under `vision_stage_latency_seconds{stage}`.
pub(crate) fn timed<T>(stage: &'static str, f: impl FnOnce() -> T) -> T {
    let start = Instant::now();
    let out = f();
    metrics::histogram!(STAGE_LATENCY, "stage" => stage).record(start.elapsed().as_secs_f64());
    out
}
