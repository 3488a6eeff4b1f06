//! Actix Web control surface over the pipeline controller.
//!
//! The server runs on a dedicated thread with its own actix system. Every
//! `/video_feed` request gets a generation thread that hands stream units to
//! the response over a bounded channel.

use std::{
    net::TcpListener,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};

use actix_web::{
    App, HttpResponse, HttpServer,
    http::header,
    web::{self, Bytes},
};
use anyhow::{Context, Result};
use async_stream::stream;
use crossbeam_channel::TryRecvError;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::oneshot;
use tracing::{debug, error, warn};
use video_ingest::SourceHandle;
use vision::{MULTIPART_CONTENT_TYPE, PipelineController, PipelineError, pipeline::telemetry};

/// Units buffered between a generation thread and its HTTP response.
const FEED_BUFFER: usize = 2;
const FEED_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Shared state backing HTTP handlers.
pub(crate) struct ServerState {
    pub(crate) controller: Arc<PipelineController>,
}

/// Handle for the server thread.
pub(crate) struct ControlServer {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ControlServer {
    /// Signal the server to stop and block until the thread exits.
    pub(crate) fn stop(self) {
        if let Some(tx) = self.shutdown {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle {
            let _ = handle.join();
        }
    }
}

#[derive(Deserialize)]
struct SetSourceRequest {
    source: String,
}

#[derive(Deserialize)]
struct StartCameraRequest {
    camera_index: i32,
}

/// Register every route on an actix app.
pub(crate) fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/video_feed", web::get().to(video_feed))
        .route("/set_source", web::post().to(set_source))
        .route("/start_camera", web::post().to(start_camera))
        .route("/stop", web::post().to(stop))
        .route("/stop", web::get().to(stop))
        .route("/stop_camera", web::post().to(stop))
        .route("/check_status", web::get().to(check_status))
        .route("/get_cameras", web::get().to(get_cameras))
        .route("/metrics", web::get().to(metrics_handler));
}

/// Spawn the server thread on an already bound listener.
pub(crate) fn spawn_server(
    controller: Arc<PipelineController>,
    listener: TcpListener,
) -> Result<ControlServer> {
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let handle = telemetry::spawn_thread("vision-control-server", move || {
        if let Err(err) = actix_web::rt::System::new().block_on(async move {
            let state = web::Data::new(ServerState { controller });
            let server = HttpServer::new(move || App::new().app_data(state.clone()).configure(configure))
                .listen(listener)?
                .run();

            let srv_handle = server.handle();
            actix_web::rt::spawn(async move {
                let _ = shutdown_rx.await;
                srv_handle.stop(true).await;
            });

            server.await
        }) {
            error!("HTTP server error: {err}");
        }
    })
    .context("Failed to spawn control server thread")?;
    Ok(ControlServer {
        shutdown: Some(shutdown_tx),
        handle: Some(handle),
    })
}

/// Stream `generate()` units as `multipart/x-mixed-replace`.
async fn video_feed(state: web::Data<ServerState>) -> HttpResponse {
    let (tx, rx) = crossbeam_channel::bounded::<Vec<u8>>(FEED_BUFFER);
    let controller = Arc::clone(&state.controller);
    let disconnected = Arc::new(AtomicBool::new(false));
    let cancel = Arc::clone(&disconnected);
    let spawned = telemetry::spawn_thread("vision-feed", move || {
        for unit in controller.generate().cancel_on(cancel) {
            if tx.send(unit).is_err() {
                debug!("feed client disconnected");
                break;
            }
        }
    });
    if let Err(err) = spawned {
        error!("failed to spawn feed thread: {err}");
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    let guard = DisconnectGuard(disconnected);
    let body = stream! {
        let _disconnect = guard;
        let mut interval = actix_web::rt::time::interval(FEED_POLL_INTERVAL);
        loop {
            match rx.try_recv() {
                Ok(unit) => yield Ok::<Bytes, actix_web::Error>(Bytes::from(unit)),
                Err(TryRecvError::Empty) => {
                    interval.tick().await;
                }
                Err(TryRecvError::Disconnected) => break,
            }
        }
    };

    HttpResponse::Ok()
        .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
        .append_header((header::CACHE_CONTROL, "no-cache"))
        .append_header((header::CONTENT_TYPE, MULTIPART_CONTENT_TYPE))
        .streaming(body)
}

/// Flags the generation thread to stop once the response body is dropped.
struct DisconnectGuard(Arc<AtomicBool>);

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

async fn set_source(
    state: web::Data<ServerState>,
    body: web::Json<SetSourceRequest>,
) -> HttpResponse {
    match body.source.parse::<SourceHandle>() {
        Ok(handle) => activate(state, handle).await,
        Err(never) => match never {},
    }
}

async fn start_camera(
    state: web::Data<ServerState>,
    body: web::Json<StartCameraRequest>,
) -> HttpResponse {
    activate(state, SourceHandle::Camera(body.camera_index)).await
}

/// Run `set_source` off the async executor; opening a device can block.
async fn activate(state: web::Data<ServerState>, handle: SourceHandle) -> HttpResponse {
    let controller = Arc::clone(&state.controller);
    let label = handle.to_string();
    match web::block(move || controller.set_source(handle)).await {
        Ok(Ok(())) => HttpResponse::Ok().json(json!({ "status": "success", "source": label })),
        Ok(Err(err @ PipelineError::SourceUnavailable { .. })) => {
            warn!("{err}");
            HttpResponse::BadRequest().json(json!({ "status": "error", "message": err.to_string() }))
        }
        Ok(Err(err)) => HttpResponse::InternalServerError()
            .json(json!({ "status": "error", "message": err.to_string() })),
        Err(err) => HttpResponse::InternalServerError()
            .json(json!({ "status": "error", "message": err.to_string() })),
    }
}

async fn stop(state: web::Data<ServerState>) -> HttpResponse {
    let controller = Arc::clone(&state.controller);
    match web::block(move || controller.stop()).await {
        Ok(()) => HttpResponse::Ok().json(json!({ "status": "success" })),
        Err(err) => HttpResponse::InternalServerError()
            .json(json!({ "status": "error", "message": err.to_string() })),
    }
}

async fn check_status(state: web::Data<ServerState>) -> HttpResponse {
    HttpResponse::Ok().json(state.controller.status())
}

async fn get_cameras(state: web::Data<ServerState>) -> HttpResponse {
    let controller = Arc::clone(&state.controller);
    match web::block(move || controller.list_available_cameras()).await {
        Ok(cameras) => HttpResponse::Ok().json(json!({ "cameras": cameras })),
        Err(err) => HttpResponse::InternalServerError()
            .json(json!({ "status": "error", "message": err.to_string() })),
    }
}

async fn metrics_handler() -> HttpResponse {
    match telemetry::prometheus_handle() {
        Some(handle) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(handle.render()),
        None => HttpResponse::ServiceUnavailable().body("metrics recorder not installed"),
    }
}
