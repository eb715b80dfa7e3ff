use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU8, Ordering},
    },
    thread,
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};

use super::{
    channel::{ChannelHandle, ChannelSettings, ChannelState},
    command_channel::{CommandOptions, start_command_channel},
    encoder::encode_jpeg,
    frame_slot::FrameSlot,
    image_channel::start_image_channel,
    overlay::{OverlayInput, annotate},
    state::SharedState,
};
use crate::{
    guidance::{GuidanceConfig, GuidanceEngine, GuidanceOutcome},
    pose::{Person, PoseEstimator, select_primary},
    types::{Direction, Frame, GuidanceSnapshot, Mode},
};

const WORKER_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Receives free-text guidance produced in full-body mode.
pub trait OperatorFeedback: Send + 'static {
    fn on_guidance_message(&mut self, message: &str);

    /// Score of the primary person, or `None` when nobody was detected.
    fn on_detected(&mut self, _score: Option<f32>) {}
}

/// Default feedback sink: the log.
#[derive(Debug, Default)]
pub struct LogFeedback;

impl OperatorFeedback for LogFeedback {
    fn on_guidance_message(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn on_detected(&mut self, score: Option<f32>) {
        if let Some(score) = score {
            log::trace!("person detected (score {score:.2})");
        }
    }
}

/// On-screen drawing collaborator; receives the annotated frame once per processed frame.
pub trait FrameRenderer: Send + 'static {
    fn render(&mut self, frame: &Frame, person: Option<&Person>, centered: bool, direction: Direction);
}

/// Everything done for one frame: inference, guidance, overlay, encoding.
pub struct FrameProcessor {
    estimator: Box<dyn PoseEstimator>,
    engine: GuidanceEngine,
    shared: Arc<SharedState>,
    feedback: Box<dyn OperatorFeedback>,
    renderer: Option<Box<dyn FrameRenderer>>,
    jpeg_quality: u8,
    stream_annotated: bool,
}

impl FrameProcessor {
    pub fn new<E: PoseEstimator>(
        estimator: E,
        guidance: GuidanceConfig,
        shared: Arc<SharedState>,
    ) -> Self {
        Self {
            estimator: Box::new(estimator),
            engine: GuidanceEngine::new(guidance),
            shared,
            feedback: Box::new(LogFeedback),
            renderer: None,
            jpeg_quality: 10,
            stream_annotated: true,
        }
    }

    pub fn with_feedback<F: OperatorFeedback>(mut self, feedback: F) -> Self {
        self.feedback = Box::new(feedback);
        self
    }

    pub fn with_renderer<R: FrameRenderer>(mut self, renderer: R) -> Self {
        self.renderer = Some(Box::new(renderer));
        self
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality;
        self
    }

    pub fn with_stream_annotated(mut self, annotated: bool) -> Self {
        self.stream_annotated = annotated;
        self
    }

    pub fn shared(&self) -> Arc<SharedState> {
        self.shared.clone()
    }

    pub fn process(&mut self, frame: &Frame, mode: Mode) -> GuidanceOutcome {
        let persons = self.estimator.estimate(frame).unwrap_or_else(|err| {
            log::warn!("{} pose estimation failed: {err:?}", self.estimator.label());
            Vec::new()
        });
        let person = select_primary(&persons);
        self.feedback.on_detected(person.map(|p| p.score));

        let outcome = self.engine.update(person, frame.width, frame.height, mode);
        if let Some(feedback) = &outcome.feedback {
            self.feedback.on_guidance_message(&feedback.to_string());
        }
        self.shared.set_guidance(outcome.snapshot);
        log::debug!(
            "frame {}x{} mode={} direction={} centered={} person={}",
            frame.width,
            frame.height,
            mode.label(),
            outcome.snapshot.direction,
            outcome.snapshot.centered,
            outcome.snapshot.check_person
        );

        let mut annotated = frame.clone();
        annotate(
            &mut annotated,
            &OverlayInput {
                person,
                center: outcome.center,
                centered: outcome.snapshot.centered,
                direction: outcome.snapshot.direction,
            },
        );

        let streamed = if self.stream_annotated { &annotated } else { frame };
        match encode_jpeg(streamed, self.jpeg_quality) {
            Ok(jpeg) => {
                self.shared.publish_jpeg(jpeg);
            }
            Err(err) => log::warn!("failed to encode frame: {err:?}"),
        }

        if let Some(renderer) = self.renderer.as_mut() {
            renderer.render(
                &annotated,
                person,
                outcome.snapshot.centered,
                outcome.snapshot.direction,
            );
        }

        outcome
    }
}

/// Capture-side entry point. Never blocks: the newest frame replaces any unprocessed one.
#[derive(Clone)]
pub struct FrameIngest {
    slot: Arc<FrameSlot<Frame>>,
    doorbell: Sender<()>,
}

impl FrameIngest {
    pub(crate) fn new(slot: Arc<FrameSlot<Frame>>, doorbell: Sender<()>) -> Self {
        Self { slot, doorbell }
    }

    pub fn publish(&self, frame: Frame) -> u64 {
        let sequence = self.slot.publish(frame);
        // Full means the worker already has a wake-up pending.
        let _ = self.doorbell.try_send(());
        sequence
    }
}

/// Mode shared between the operator and the processing worker.
#[derive(Clone, Debug)]
pub struct ModeCell(Arc<AtomicU8>);

impl ModeCell {
    pub fn new(mode: Mode) -> Self {
        Self(Arc::new(AtomicU8::new(mode.as_u8())))
    }

    pub fn get(&self) -> Mode {
        Mode::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, mode: Mode) {
        self.0.store(mode.as_u8(), Ordering::Release);
    }
}

#[derive(Debug)]
struct ProcessingWorker {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ProcessingWorker {
    fn start(
        mut processor: FrameProcessor,
        slot: Arc<FrameSlot<Frame>>,
        doorbell: Receiver<()>,
        mode: ModeCell,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let handle = thread::spawn(move || {
            let mut seen = 0;
            while !stop_flag.load(Ordering::Relaxed) {
                match doorbell.recv_timeout(WORKER_POLL_INTERVAL) {
                    Ok(()) => {}
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                }
                let Some((sequence, frame)) = slot.take_newer(seen) else {
                    continue;
                };
                if sequence > seen + 1 {
                    log::trace!("skipped {} stale frames", sequence - seen - 1);
                }
                seen = sequence;
                processor.process(&frame, mode.get());
            }
        });

        Self {
            stop,
            handle: Some(handle),
        }
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ProcessingWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[derive(Clone, Debug)]
pub struct StreamingSettings {
    pub image: ChannelSettings,
    pub command: ChannelSettings,
    pub command_options: CommandOptions,
}

/// Owns the processing worker, the shared state and both channel loops.
pub struct Orchestrator {
    shared: Arc<SharedState>,
    ingest: FrameIngest,
    mode: ModeCell,
    settings: StreamingSettings,
    worker: Option<ProcessingWorker>,
    image_channel: Option<ChannelHandle>,
    command_channel: Option<ChannelHandle>,
}

impl Orchestrator {
    /// Spawn the processing worker. Channels stay idle until [`Self::start_streaming`].
    pub fn start(processor: FrameProcessor, settings: StreamingSettings, mode: Mode) -> Self {
        let shared = processor.shared();
        let slot = Arc::new(FrameSlot::new());
        let (doorbell_tx, doorbell_rx) = bounded(1);
        let mode = ModeCell::new(mode);

        let worker = ProcessingWorker::start(processor, slot.clone(), doorbell_rx, mode.clone());

        Self {
            shared,
            ingest: FrameIngest::new(slot, doorbell_tx),
            mode,
            settings,
            worker: Some(worker),
            image_channel: None,
            command_channel: None,
        }
    }

    pub fn ingest(&self) -> FrameIngest {
        self.ingest.clone()
    }

    pub fn publish_frame(&self, frame: Frame) -> u64 {
        self.ingest.publish(frame)
    }

    pub fn mode(&self) -> Mode {
        self.mode.get()
    }

    pub fn set_mode(&self, mode: Mode) {
        if self.mode.get() != mode {
            log::info!("switching to {} mode", mode.label());
        }
        self.mode.set(mode);
    }

    pub fn mode_cell(&self) -> ModeCell {
        self.mode.clone()
    }

    pub fn guidance(&self) -> GuidanceSnapshot {
        self.shared.guidance()
    }

    pub fn shared(&self) -> Arc<SharedState> {
        self.shared.clone()
    }

    pub fn channel_states(&self) -> (Option<ChannelState>, Option<ChannelState>) {
        (
            self.image_channel.as_ref().map(ChannelHandle::state),
            self.command_channel.as_ref().map(ChannelHandle::state),
        )
    }

    /// Start whichever channels are not running yet.
    pub fn start_streaming(&mut self) {
        if self.image_channel.is_none() {
            self.image_channel = Some(self.spawn_image_channel());
        }
        if self.command_channel.is_none() {
            self.command_channel = Some(self.spawn_command_channel());
        }
    }

    pub fn stop_streaming(&mut self) {
        if let Some(handle) = self.image_channel.take() {
            handle.stop();
        }
        if let Some(handle) = self.command_channel.take() {
            handle.stop();
        }
    }

    /// Replace every channel that has dropped to `Disconnected`. Channels that were never
    /// started, or were stopped, stay down. Returns how many restarted.
    pub fn restart_disconnected(&mut self) -> usize {
        let mut restarted = 0;
        if take_disconnected(&mut self.image_channel) {
            self.image_channel = Some(self.spawn_image_channel());
            restarted += 1;
        }
        if take_disconnected(&mut self.command_channel) {
            self.command_channel = Some(self.spawn_command_channel());
            restarted += 1;
        }
        restarted
    }

    fn spawn_image_channel(&self) -> ChannelHandle {
        start_image_channel(self.settings.image.clone(), self.shared.clone())
    }

    fn spawn_command_channel(&self) -> ChannelHandle {
        start_command_channel(
            self.settings.command.clone(),
            self.shared.clone(),
            self.settings.command_options.clone(),
        )
    }

    /// Stop channels, then the worker.
    pub fn shutdown(mut self) {
        self.stop_streaming();
        if let Some(mut worker) = self.worker.take() {
            worker.shutdown();
        }
    }
}

/// Stop and remove the handle in `slot` if it has dropped to `Disconnected`.
fn take_disconnected(slot: &mut Option<ChannelHandle>) -> bool {
    if !slot
        .as_ref()
        .is_some_and(|h| h.state() == ChannelState::Disconnected)
    {
        return false;
    }
    if let Some(handle) = slot.take() {
        log::info!("restarting {} channel", handle.name());
        handle.stop();
    }
    true
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.stop_streaming();
    }
}
