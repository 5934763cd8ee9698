//! Capture, detect and display loops

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use camera_capture::{CameraError, FrameSource, VideoFrame};
use dms::{FrameAnalysis, LandmarkExtractor};
use frame_handoff::{processed_queue, FrameMailbox, QueueReceiver, QueueSender};
use metrics::{counter, gauge};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::context::PipelineContext;
use crate::PipelineError;

/// A classified frame on its way to the display
#[derive(Debug, Clone)]
pub struct ProcessedFrame {
    pub frame: Arc<VideoFrame>,
    pub analysis: FrameAnalysis,
}

/// Rendering collaborator. `show` runs on a dedicated blocking thread, so
/// it may block on a window or a GPU swap.
pub trait DisplaySink: Send + 'static {
    fn show(&mut self, frame: ProcessedFrame);
}

impl<F> DisplaySink for F
where
    F: FnMut(ProcessedFrame) + Send + 'static,
{
    fn show(&mut self, frame: ProcessedFrame) {
        self(frame)
    }
}

/// Cooperative stop: a flag every loop polls, plus the sentinel that wakes
/// the display loop
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    requested: Arc<AtomicBool>,
    queue: QueueSender<ProcessedFrame>,
}

impl ShutdownHandle {
    pub fn new(queue: QueueSender<ProcessedFrame>) -> Self {
        Self {
            requested: Arc::new(AtomicBool::new(false)),
            queue,
        }
    }

    /// Set the flag and push the stop sentinel. Only the first call has an effect.
    pub fn request(&self) {
        if !self.requested.swap(true, Ordering::SeqCst) {
            info!("Pipeline shutdown requested");
            // A closed queue means the display loop has already gone
            let _ = self.queue.stop();
        }
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// Result of one detect iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// No new frame in the mailbox
    Idle,
    /// Frame had no face; nothing was updated
    NoFace,
    /// Extractor failed; frame dropped
    ExtractionFailed,
    /// Frame classified and queued for display
    Processed,
}

/// Counts reported when the pipeline stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub frames_captured: u64,
    pub frames_processed: u64,
    pub frames_without_face: u64,
    pub frames_displayed: u64,
}

/// Marks capture as finished when dropped, including while unwinding from a
/// panicking source, so the detect loop can wind the pipeline down.
struct CaptureDone(Arc<AtomicBool>);

impl Drop for CaptureDone {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

fn capture_loop<S: FrameSource>(
    mut source: S,
    mailbox: Arc<FrameMailbox<VideoFrame>>,
    shutdown: ShutdownHandle,
    capture_done: Arc<AtomicBool>,
) -> u64 {
    info!("Capture loop started");
    let _done = CaptureDone(capture_done);
    let mut captured = 0u64;
    while !shutdown.is_requested() {
        match source.read_frame() {
            Ok(frame) => {
                mailbox.write(frame);
                captured += 1;
                counter!("dms_capture_frames_total").increment(1);
            }
            Err(CameraError::EndOfStream(frames)) => {
                info!("Camera stream ended after {} frames", frames);
                break;
            }
            Err(e) => {
                error!("Camera read failed: {}", e);
                break;
            }
        }
    }
    // The detect loop drains the last frame, then stops the display
    info!("Capture loop stopped after {} frames", captured);
    captured
}

/// Detect+classify stage: mailbox -> landmarks -> monitors -> queue
pub struct DetectStage<E> {
    context: PipelineContext,
    mailbox: Arc<FrameMailbox<VideoFrame>>,
    extractor: E,
    queue: QueueSender<ProcessedFrame>,
    frames_processed: u64,
    frames_without_face: u64,
}

impl<E: LandmarkExtractor> DetectStage<E> {
    pub fn new(
        context: PipelineContext,
        mailbox: Arc<FrameMailbox<VideoFrame>>,
        extractor: E,
        queue: QueueSender<ProcessedFrame>,
    ) -> Self {
        Self {
            context,
            mailbox,
            extractor,
            queue,
            frames_processed: 0,
            frames_without_face: 0,
        }
    }

    /// Run one iteration on the newest frame, if there is one. Frames
    /// overwritten in the mailbox since the last step are never seen.
    pub fn step(&mut self) -> StepOutcome {
        let Some(frame) = self.mailbox.take() else {
            return StepOutcome::Idle;
        };

        let fps = self.context.fps_counter().record_frame();
        gauge!("dms_pipeline_fps").set(fps);

        let face = match self.extractor.extract(&frame) {
            Ok(Some(face)) => face,
            Ok(None) => {
                self.frames_without_face += 1;
                counter!("dms_frames_without_face_total").increment(1);
                return StepOutcome::NoFace;
            }
            Err(e) => {
                warn!("Landmark extraction failed on frame {}: {}", frame.sequence, e);
                return StepOutcome::ExtractionFailed;
            }
        };

        let analysis = self.context.analyze(&face, fps);
        for condition in analysis.alarms_started() {
            counter!("dms_alarm_triggered_total", "condition" => condition.as_str()).increment(1);
        }
        self.frames_processed += 1;
        counter!("dms_frames_processed_total").increment(1);

        if self.queue.push(ProcessedFrame { frame, analysis }).is_err() {
            debug!("Display loop gone, dropping processed frame");
        }
        StepOutcome::Processed
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    pub fn frames_without_face(&self) -> u64 {
        self.frames_without_face
    }

    fn run(mut self, shutdown: ShutdownHandle, capture_done: Arc<AtomicBool>) -> (u64, u64) {
        info!("Detect loop started");
        let backoff = self.context.idle_backoff();
        while !shutdown.is_requested() {
            if self.step() == StepOutcome::Idle {
                if capture_done.load(Ordering::SeqCst) && !self.mailbox.is_valid() {
                    break;
                }
                std::thread::sleep(backoff);
            }
        }
        shutdown.request();
        info!(
            "Detect loop stopped: {} processed, {} without face",
            self.frames_processed, self.frames_without_face
        );
        (self.frames_processed, self.frames_without_face)
    }
}

fn display_loop<D: DisplaySink>(mut queue: QueueReceiver<ProcessedFrame>, mut display: D) -> u64 {
    let mut displayed = 0u64;
    while let Some(frame) = queue.blocking_recv() {
        display.show(frame);
        displayed += 1;
    }
    debug!("Display loop stopped after {} frames", displayed);
    displayed
}

/// Orchestrates the three loops around a shared context
#[derive(Debug, Clone)]
pub struct Pipeline {
    context: PipelineContext,
}

impl Pipeline {
    pub fn new(context: PipelineContext) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    /// Spawn the loops. Must be called from within a Tokio runtime.
    pub fn start<S, E, D>(&self, source: S, extractor: E, display: D) -> RunningPipeline
    where
        S: FrameSource + 'static,
        E: LandmarkExtractor + 'static,
        D: DisplaySink,
    {
        info!("Starting pipeline");
        let (tx, rx) = processed_queue();
        let mailbox = Arc::new(FrameMailbox::new());
        let shutdown = ShutdownHandle::new(tx.clone());
        let capture_done = Arc::new(AtomicBool::new(false));
        self.context.fps_counter().restart();

        let capture = {
            let mailbox = mailbox.clone();
            let shutdown = shutdown.clone();
            let capture_done = capture_done.clone();
            tokio::task::spawn_blocking(move || capture_loop(source, mailbox, shutdown, capture_done))
        };

        let stage = DetectStage::new(self.context.clone(), mailbox, extractor, tx);
        let detect = {
            let shutdown = shutdown.clone();
            tokio::task::spawn_blocking(move || stage.run(shutdown, capture_done))
        };

        let display = tokio::task::spawn_blocking(move || display_loop(rx, display));

        RunningPipeline {
            shutdown,
            capture,
            detect,
            display,
        }
    }
}

/// Handle to a started pipeline
pub struct RunningPipeline {
    shutdown: ShutdownHandle,
    capture: JoinHandle<u64>,
    detect: JoinHandle<(u64, u64)>,
    display: JoinHandle<u64>,
}

impl RunningPipeline {
    /// Ask every loop to stop. Loops finish their current iteration first.
    pub fn shutdown(&self) {
        self.shutdown.request();
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Wait for all three loops. A loop that panicked is reported as
    /// `PipelineError::Join` once the others have stopped.
    pub async fn join(self) -> Result<PipelineReport, PipelineError> {
        // Detect finishes once capture is done, even after a capture panic
        let detected = self.detect.await;
        if detected.is_err() {
            // A panicked detect loop never pushed the sentinel
            self.shutdown.request();
        }
        let displayed = self.display.await;
        let captured = self.capture.await;
        if captured.is_err() {
            error!("Capture loop panicked");
        }

        let frames_displayed = displayed?;
        let frames_captured = captured?;
        let (frames_processed, frames_without_face) = detected?;

        let report = PipelineReport {
            frames_captured,
            frames_processed,
            frames_without_face,
            frames_displayed,
        };
        info!("Pipeline stopped: {:?}", report);
        Ok(report)
    }
}
