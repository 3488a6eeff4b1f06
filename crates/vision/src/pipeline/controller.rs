//! Pipeline controller: the single current source, its lifecycle, and the
//! frame generation loop.
//!
//! One mutex guards the capture handle and the session fields. It is held for a
//! frame read or a source transition only; detection, tracking, annotation and
//! encoding all run outside it, so `stop`/`set_source` never wait on inference.

use std::{
    collections::HashSet,
    iter::FusedIterator,
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread,
};

use ml_core::{ClassTaxonomy, DetectionSet, Detector, IouTrackerFactory, Tracker, TrackerFactory};
use serde::Serialize;
use tracing::{Span, debug, info, info_span, warn};
use video_ingest::{Capture, CaptureBackend, Frame, SourceHandle, SourceKind};

use crate::pipeline::{
    annotation,
    config::PipelineConfig,
    encoding,
    error::{PipelineError, StageError},
    filter::{FilteredDetections, filter_detections},
    identity::stitch_identities,
    overlay::{ClassCounts, FrameCounters, render_overlay},
    telemetry::{self, timed},
};

/// Tracker and identity bookkeeping owned by one source activation.
struct SessionTracking {
    tracker: Box<dyn Tracker>,
    seen_track_ids: HashSet<u64>,
}

struct Session {
    id: u64,
    handle: SourceHandle,
    capture: Box<dyn Capture>,
    tracking: Arc<Mutex<SessionTracking>>,
    consecutive_failures: u32,
}

/// What the pipeline currently reads from. `None` means idle.
#[derive(Default)]
struct SourceState {
    session: Option<Session>,
}

/// Source category reported by [`PipelineController::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Camera,
    File,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineStatus {
    pub active: bool,
    pub current_source: Option<String>,
    pub source_type: SourceType,
    pub frames_emitted: u64,
    pub unique_tracks: usize,
}

/// A frame read under the lock, tagged with the session that produced it.
struct FrameTicket {
    frame: Frame,
    session_id: u64,
    source_label: String,
    tracking: Arc<Mutex<SessionTracking>>,
}

enum ReadOutcome {
    Frame(FrameTicket),
    Failed,
    Inactive,
}

/// Owns the current source and drives the frame pipeline.
pub struct PipelineController {
    config: PipelineConfig,
    backend: Arc<dyn CaptureBackend>,
    detector: Arc<dyn Detector>,
    tracker_factory: Arc<dyn TrackerFactory>,
    taxonomy: Arc<ClassTaxonomy>,
    state: Mutex<SourceState>,
    next_session: AtomicU64,
    frames_emitted: AtomicU64,
}

impl PipelineController {
    /// Build an idle controller using the default IoU tracker and taxonomy.
    pub fn new(
        config: PipelineConfig,
        backend: Arc<dyn CaptureBackend>,
        detector: Arc<dyn Detector>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let tracker_factory = Arc::new(IouTrackerFactory {
            iou_threshold: config.nms_iou_threshold,
        });
        Ok(Self {
            config,
            backend,
            detector,
            tracker_factory,
            taxonomy: Arc::new(ClassTaxonomy::default()),
            state: Mutex::new(SourceState::default()),
            next_session: AtomicU64::new(1),
            frames_emitted: AtomicU64::new(0),
        })
    }

    pub fn with_tracker_factory(mut self, factory: Arc<dyn TrackerFactory>) -> Self {
        self.tracker_factory = factory;
        self
    }

    pub fn with_taxonomy(mut self, taxonomy: Arc<ClassTaxonomy>) -> Self {
        self.taxonomy = taxonomy;
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn taxonomy(&self) -> &ClassTaxonomy {
        &self.taxonomy
    }

    fn lock_state(&self) -> MutexGuard<'_, SourceState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("source lock poisoned; recovering");
            poisoned.into_inner()
        })
    }

    /// Replace the current source.
    ///
    /// The previous capture is released before the new one is opened, under the
    /// same lock. On failure the pipeline is left idle.
    pub fn set_source(&self, handle: SourceHandle) -> Result<(), PipelineError> {
        let mut state = self.lock_state();
        if let Some(mut previous) = state.session.take() {
            debug!(session = previous.id, source = %previous.handle, "releasing previous source");
            previous.capture.release();
        }

        let mut capture = self.backend.open(&handle).map_err(|err| {
            warn!(source = %handle, "failed to open source: {err}");
            PipelineError::SourceUnavailable {
                uri: handle.to_string(),
                reason: err.to_string(),
            }
        })?;
        if !capture.is_opened() {
            capture.release();
            warn!(source = %handle, "source opened but reports closed");
            return Err(PipelineError::SourceUnavailable {
                uri: handle.to_string(),
                reason: "capture is not open".into(),
            });
        }

        let (width, height) = self.config.working_size;
        capture.set_resolution(width, height);
        let frame_rate = capture
            .frame_rate()
            .filter(|fps| fps.is_finite() && *fps > 0.0)
            .unwrap_or(self.config.default_fps);

        let id = self.next_session.fetch_add(1, Ordering::Relaxed);
        let tracking = SessionTracking {
            tracker: self.tracker_factory.create(frame_rate),
            seen_track_ids: HashSet::new(),
        };
        info!(session = id, source = %handle, fps = frame_rate, "source activated");
        metrics::counter!(telemetry::SOURCE_CHANGES).increment(1);

        state.session = Some(Session {
            id,
            handle,
            capture,
            tracking: Arc::new(Mutex::new(tracking)),
            consecutive_failures: 0,
        });
        Ok(())
    }

    /// Deactivate and release the current source. A no-op when already idle.
    pub fn stop(&self) {
        let mut state = self.lock_state();
        if let Some(mut session) = state.session.take() {
            session.capture.release();
            info!(session = session.id, source = %session.handle, "source stopped");
        }
    }

    pub fn is_active(&self) -> bool {
        self.lock_state().session.is_some()
    }

    pub fn status(&self) -> PipelineStatus {
        let state = self.lock_state();
        let frames_emitted = self.frames_emitted.load(Ordering::Relaxed);
        match state.session.as_ref() {
            Some(session) => PipelineStatus {
                active: true,
                current_source: Some(session.handle.to_string()),
                source_type: match session.handle.kind() {
                    SourceKind::Camera => SourceType::Camera,
                    SourceKind::File => SourceType::File,
                },
                frames_emitted,
                unique_tracks: lock_tracking(&session.tracking).seen_track_ids.len(),
            },
            None => PipelineStatus {
                active: false,
                current_source: None,
                source_type: SourceType::None,
                frames_emitted,
                unique_tracks: 0,
            },
        }
    }

    /// Camera indices that opened when probed. Does not touch the active source.
    pub fn list_available_cameras(&self) -> Vec<i32> {
        self.backend.probe_cameras(self.config.camera_probe_limit)
    }

    /// Lazily produce encoded stream units until the pipeline goes idle.
    ///
    /// Each call starts fresh frame counters. Calling this while idle yields an
    /// empty sequence.
    pub fn generate(self: &Arc<Self>) -> FrameStream {
        let span = info_span!("vision.session", source = tracing::field::Empty);
        if let Some(session) = self.lock_state().session.as_ref() {
            span.record("source", tracing::field::display(&session.handle));
        }
        FrameStream {
            controller: Arc::clone(self),
            counters: FrameCounters::new(),
            span,
            finished: false,
            cancelled: None,
        }
    }

    fn read_next(&self) -> ReadOutcome {
        let mut state = self.lock_state();
        let Some(session) = state.session.as_mut() else {
            return ReadOutcome::Inactive;
        };

        let result = if session.capture.is_opened() {
            session.capture.read()
        } else {
            Err(video_ingest::CaptureError::Read("capture is closed".into()))
        };

        match result {
            Ok(frame) => {
                session.consecutive_failures = 0;
                ReadOutcome::Frame(FrameTicket {
                    frame,
                    session_id: session.id,
                    source_label: session.handle.to_string(),
                    tracking: Arc::clone(&session.tracking),
                })
            }
            Err(err) => {
                session.consecutive_failures += 1;
                metrics::counter!(telemetry::READ_FAILURES).increment(1);
                debug!(
                    session = session.id,
                    failures = session.consecutive_failures,
                    "frame read failed: {err}"
                );
                if session.handle.kind() == SourceKind::File
                    && session.consecutive_failures >= self.config.file_exhaustion_reads
                {
                    info!(session = session.id, source = %session.handle, "file source exhausted");
                    session.capture.release();
                    state.session = None;
                    return ReadOutcome::Inactive;
                }
                ReadOutcome::Failed
            }
        }
    }

    fn is_current(&self, session_id: u64) -> bool {
        self.lock_state()
            .session
            .as_ref()
            .is_some_and(|session| session.id == session_id)
    }

    /// Run one frame through every stage. `None` means the unit was dropped.
    fn process(&self, ticket: FrameTicket, counters: &mut FrameCounters) -> Option<Vec<u8>> {
        let FrameTicket {
            frame,
            session_id,
            source_label,
            tracking,
        } = ticket;

        let canvas = match frame.to_rgb_image() {
            Ok(canvas) => canvas,
            Err(err) => {
                record_failure(&StageError::Encoding(format!("malformed frame: {err:#}")));
                return None;
            }
        };

        let detections = timed("detection", || {
            self.detector
                .detect(&frame)
                .map_err(|err| StageError::Detection(format!("{err:#}")))
        })
        .unwrap_or_else(|err| {
            record_failure(&err);
            DetectionSet::empty()
        });

        let mut filtered = filter_detections(
            detections,
            self.config.confidence_threshold,
            self.config.nms_iou_threshold,
            &self.taxonomy,
        );

        if filtered.any_eligible() {
            timed("tracking", || self.track(&mut filtered, &tracking, session_id));
        }

        let annotated = timed("annotation", || {
            annotation::annotate(&canvas, &filtered.detections, &self.taxonomy)
        })
        .unwrap_or_else(|err| {
            record_failure(&err);
            canvas.clone()
        });

        let fps = counters.record_frame();
        metrics::gauge!(telemetry::PIPELINE_FPS).set(fps);
        let counts = ClassCounts::tally(&filtered.detections, &self.taxonomy);
        let mut output = annotated;
        render_overlay(&mut output, &source_label, fps, &counts);

        match timed("encoding", || {
            encoding::encode_unit(&output, self.config.jpeg_quality)
        }) {
            Ok(unit) => Some(unit),
            Err(err) => {
                record_failure(&err);
                None
            }
        }
    }

    fn track(
        &self,
        filtered: &mut FilteredDetections,
        tracking: &Mutex<SessionTracking>,
        session_id: u64,
    ) {
        let mut tracking = lock_tracking(tracking);
        let SessionTracking {
            tracker,
            seen_track_ids,
        } = &mut *tracking;

        if let Err(err) = stitch_identities(filtered, tracker.as_mut()) {
            record_failure(&err);
            return;
        }

        for detection in filtered.detections.iter() {
            if let Some(id) = detection.track_id {
                if seen_track_ids.insert(id) {
                    info!(
                        session = session_id,
                        track = id,
                        class = %self.taxonomy.name(detection.class_id),
                        "new track"
                    );
                    metrics::counter!(telemetry::NEW_TRACKS).increment(1);
                }
            }
        }
    }
}

fn lock_tracking(tracking: &Mutex<SessionTracking>) -> MutexGuard<'_, SessionTracking> {
    tracking.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn record_failure(err: &StageError) {
    match err {
        StageError::Detection(_) | StageError::Encoding(_) => warn!("{err}"),
        StageError::Tracking(_) | StageError::Annotation(_) => debug!("{err}"),
    }
    metrics::counter!(telemetry::STAGE_FAILURES, "stage" => err.stage()).increment(1);
}

/// Iterator of encoded stream units returned by [`PipelineController::generate`].
///
/// Blocks on frame reads and backs off after failed ones. Ends once the
/// pipeline is idle.
pub struct FrameStream {
    controller: Arc<PipelineController>,
    counters: FrameCounters,
    span: Span,
    finished: bool,
    cancelled: Option<Arc<AtomicBool>>,
}

impl FrameStream {
    /// End the sequence once `flag` is set, even while reads keep failing.
    pub fn cancel_on(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancelled = Some(flag);
        self
    }

    pub fn frames_processed(&self) -> u64 {
        self.counters.frames_processed
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }
}

impl Iterator for FrameStream {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let _session = self.span.enter();
        let controller = &self.controller;

        loop {
            if self.is_cancelled() {
                self.finished = true;
                debug!("generation loop cancelled");
                return None;
            }
            match controller.read_next() {
                ReadOutcome::Inactive => {
                    self.finished = true;
                    info!(
                        frames = self.counters.frames_processed,
                        "generation loop finished"
                    );
                    return None;
                }
                ReadOutcome::Failed => thread::sleep(controller.config.read_backoff),
                ReadOutcome::Frame(ticket) => {
                    let session_id = ticket.session_id;
                    let frame_span = info_span!(
                        "frame",
                        session = session_id,
                        n = self.counters.frames_processed + 1
                    );
                    let unit = frame_span.in_scope(|| controller.process(ticket, &mut self.counters));
                    let Some(unit) = unit else {
                        continue;
                    };
                    if !controller.is_current(session_id) {
                        debug!(session = session_id, "dropping frame from a superseded source");
                        continue;
                    }
                    controller.frames_emitted.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!(telemetry::FRAMES_EMITTED).increment(1);
                    return Some(unit);
                }
            }
        }
    }
}

impl FusedIterator for FrameStream {}
