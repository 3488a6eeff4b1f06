#![allow(dead_code)]

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::{Result, anyhow};
use image::{Rgb, RgbImage};
use ml_core::{
    BoundingBox, Detection, DetectionSet, Detector, IouTracker, Tracker, TrackerFactory,
};
use video_ingest::{Capture, CaptureBackend, CaptureError, Frame, SourceHandle};
use vision::PipelineConfig;

pub const FRAME_WIDTH: u32 = 64;
pub const FRAME_HEIGHT: u32 = 48;

/// One scripted `read()` result.
#[derive(Clone, Copy, Debug)]
pub enum ReadStep {
    Frame,
    /// A frame whose pixel buffer is shorter than its dimensions require.
    Truncated,
    Fail,
}

#[derive(Clone)]
struct Script {
    steps: Vec<ReadStep>,
    then: ReadStep,
}

/// Backend whose sources follow scripted read results and record every
/// open/read/release in a shared event log.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    events: Arc<Mutex<Vec<String>>>,
    scripts: Arc<Mutex<HashMap<SourceHandle, Script>>>,
    reading: Arc<Mutex<HashMap<SourceHandle, Arc<AtomicBool>>>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source that yields frames forever.
    pub fn with_live(self, handle: SourceHandle) -> Self {
        self.with_script(handle, Vec::new(), ReadStep::Frame)
    }

    /// Register a source that plays `steps`, then repeats `then`.
    pub fn with_script(self, handle: SourceHandle, steps: Vec<ReadStep>, then: ReadStep) -> Self {
        self.scripts
            .lock()
            .expect("scripts lock")
            .insert(handle, Script { steps, then });
        self
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().expect("events lock").clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|e| e.as_str() == event).count()
    }
}

impl CaptureBackend for ScriptedBackend {
    fn open(&self, handle: &SourceHandle) -> Result<Box<dyn Capture>, CaptureError> {
        self.events
            .lock()
            .expect("events lock")
            .push(format!("open:{handle}"));
        let script = self
            .scripts
            .lock()
            .expect("scripts lock")
            .get(handle)
            .cloned()
            .ok_or_else(|| CaptureError::Open {
                uri: handle.to_string(),
            })?;
        let reading = self
            .reading
            .lock()
            .expect("reading lock")
            .entry(handle.clone())
            .or_default()
            .clone();
        Ok(Box::new(ScriptedCapture {
            label: handle.to_string(),
            events: self.events.clone(),
            steps: script.steps.into(),
            then: script.then,
            opened: true,
            reading,
        }))
    }
}

struct ScriptedCapture {
    label: String,
    events: Arc<Mutex<Vec<String>>>,
    steps: VecDeque<ReadStep>,
    then: ReadStep,
    opened: bool,
    reading: Arc<AtomicBool>,
}

impl ScriptedCapture {
    fn log(&self, event: &str) {
        self.events
            .lock()
            .expect("events lock")
            .push(format!("{event}:{}", self.label));
    }
}

impl Capture for ScriptedCapture {
    fn read(&mut self) -> Result<Frame, CaptureError> {
        self.log("read");
        if self.reading.swap(true, Ordering::SeqCst) {
            self.log("concurrent");
        }
        thread::sleep(Duration::from_millis(1));
        self.reading.store(false, Ordering::SeqCst);

        if !self.opened {
            return Err(CaptureError::Read("released".into()));
        }
        match self.steps.pop_front().unwrap_or(self.then) {
            ReadStep::Frame => Ok(Frame::from_rgb_image(&RgbImage::from_pixel(
                FRAME_WIDTH,
                FRAME_HEIGHT,
                Rgb([90, 120, 150]),
            ))),
            ReadStep::Truncated => {
                let mut frame = Frame::from_rgb_image(&RgbImage::from_pixel(
                    FRAME_WIDTH,
                    FRAME_HEIGHT,
                    Rgb([90, 120, 150]),
                ));
                frame.data.truncate(frame.data.len() / 2);
                Ok(frame)
            }
            ReadStep::Fail => Err(CaptureError::Read("scripted failure".into())),
        }
    }

    fn is_opened(&self) -> bool {
        self.opened
    }

    fn frame_rate(&self) -> Option<f64> {
        Some(25.0)
    }

    fn release(&mut self) {
        self.log("release");
        self.opened = false;
    }
}

/// Detector returning the same detections for every frame.
pub struct FixedDetector(pub Vec<Detection>);

impl Detector for FixedDetector {
    fn detect(&self, _frame: &Frame) -> Result<DetectionSet> {
        Ok(DetectionSet::new(self.0.clone()))
    }
}

pub struct FailingDetector;

impl Detector for FailingDetector {
    fn detect(&self, _frame: &Frame) -> Result<DetectionSet> {
        Err(anyhow!("model exploded"))
    }
}

/// Tracker factory recording `(input len, output len)` for every batch.
#[derive(Clone, Default)]
pub struct RecordingTrackerFactory {
    pub batches: Arc<Mutex<Vec<(usize, usize)>>>,
    pub frame_rates: Arc<Mutex<Vec<f64>>>,
}

impl RecordingTrackerFactory {
    pub fn batches(&self) -> Vec<(usize, usize)> {
        self.batches.lock().expect("batches lock").clone()
    }
}

impl TrackerFactory for RecordingTrackerFactory {
    fn create(&self, frame_rate: f64) -> Box<dyn Tracker> {
        self.frame_rates
            .lock()
            .expect("frame rates lock")
            .push(frame_rate);
        Box::new(RecordingTracker {
            inner: IouTracker::for_frame_rate(frame_rate, 0.3),
            batches: self.batches.clone(),
        })
    }
}

struct RecordingTracker {
    inner: IouTracker,
    batches: Arc<Mutex<Vec<(usize, usize)>>>,
}

impl Tracker for RecordingTracker {
    fn update(&mut self, detections: &[Detection]) -> Result<Vec<Detection>> {
        let out = self.inner.update(detections)?;
        self.batches
            .lock()
            .expect("batches lock")
            .push((detections.len(), out.len()));
        Ok(out)
    }
}

/// How a [`FaultyTrackerFactory`] tracker misbehaves once its healthy batches run out.
#[derive(Clone, Copy, Debug)]
pub enum TrackerFault {
    Error,
    DropsLast,
}

/// Trackers that behave like [`IouTracker`] for `healthy_batches` updates, then fail.
#[derive(Clone)]
pub struct FaultyTrackerFactory {
    pub healthy_batches: usize,
    pub fault: TrackerFault,
    pub faults: Arc<Mutex<usize>>,
}

impl FaultyTrackerFactory {
    pub fn new(healthy_batches: usize, fault: TrackerFault) -> Self {
        Self {
            healthy_batches,
            fault,
            faults: Arc::default(),
        }
    }

    pub fn faults(&self) -> usize {
        *self.faults.lock().expect("faults lock")
    }
}

impl TrackerFactory for FaultyTrackerFactory {
    fn create(&self, frame_rate: f64) -> Box<dyn Tracker> {
        Box::new(FaultyTracker {
            inner: IouTracker::for_frame_rate(frame_rate, 0.3),
            remaining: self.healthy_batches,
            fault: self.fault,
            faults: self.faults.clone(),
        })
    }
}

struct FaultyTracker {
    inner: IouTracker,
    remaining: usize,
    fault: TrackerFault,
    faults: Arc<Mutex<usize>>,
}

impl Tracker for FaultyTracker {
    fn update(&mut self, detections: &[Detection]) -> Result<Vec<Detection>> {
        let mut out = self.inner.update(detections)?;
        if self.remaining > 0 {
            self.remaining -= 1;
            return Ok(out);
        }
        *self.faults.lock().expect("faults lock") += 1;
        match self.fault {
            TrackerFault::Error => Err(anyhow!("tracker lost state")),
            TrackerFault::DropsLast => {
                out.pop();
                Ok(out)
            }
        }
    }
}

pub fn detection(x1: f32, y1: f32, confidence: f32, class_id: usize) -> Detection {
    Detection::new(
        BoundingBox::new(x1, y1, x1 + 20.0, y1 + 20.0),
        confidence,
        class_id,
    )
}

pub fn test_config() -> PipelineConfig {
    PipelineConfig {
        read_backoff: Duration::from_millis(1),
        file_exhaustion_reads: 3,
        ..PipelineConfig::default()
    }
}

/// Poll `condition` until it holds, panicking after five seconds.
pub fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(1));
    }
}
