//! Host-facing camera service.
//!
//! ```text
//!  host commands ──┐
//!  hw faults ──────┼──► coordination thread ──► SessionMachine ──► device
//!  worker results ─┘          │                                     │
//!                             ▼                                     ▼ frames
//!                      CaptureStream  ◄── FrameReady ◄── WorkerPool ◄┘
//! ```
//!
//! Every command, fault and processed frame is a message on one queue, so
//! state transitions and result delivery happen in order on a single thread.

use super::machine::{FaultOutcome, SessionMachine};
use super::pipeline::{CallbackFactory, FramePipeline, PipelineStats, ProcessedFrame};
use super::workers::{PoolHandle, WorkerPool};
use super::{CommandFailure, SessionError, SessionState};
use crate::capture::{
    CameraBackend, CameraError, CaptureConfiguration, Facing, FrameBuffer, HardwareFault,
    OutputConfig, PreviewCallbacks,
};
use crate::negotiation::{DeviceOrientation, DisplayRotation};
use crate::output::{FileRing, OptionsPayload, PreviewPayload, ResultPayload};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, RecvError, RecvTimeoutError, Sender, SyncSender, TryRecvError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

type CommandReply = SyncSender<Result<ResultPayload, CommandFailure>>;

enum Command {
    Start {
        options: Value,
        reply: SyncSender<Result<CaptureStream, CommandFailure>>,
    },
    Stop {
        reply: CommandReply,
    },
    SetFlash {
        enabled: bool,
        reply: CommandReply,
    },
    SetFacing {
        facing: Facing,
        reply: CommandReply,
    },
    AppStop {
        reply: SyncSender<()>,
    },
    Resume {
        reply: SyncSender<()>,
    },
    RotationChanged {
        rotation: DisplayRotation,
        orientation: DeviceOrientation,
        reply: SyncSender<()>,
    },
    Status {
        reply: SyncSender<ServiceStatus>,
    },
    FrameReady {
        generation: u64,
        frame: ProcessedFrame,
    },
    HardwareFault {
        generation: u64,
        fault: HardwareFault,
    },
    Destroy {
        reply: SyncSender<()>,
    },
}

/// Point-in-time view of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceStatus {
    /// Lifecycle state.
    pub state: SessionState,
    /// Current session generation.
    pub generation: u64,
    /// Current or last camera id.
    pub camera_id: u32,
    /// A `start_capture` stream is attached.
    pub streaming: bool,
}

/// Results of one `start_capture` call, one message per delivered frame.
///
/// Disconnects when capture is stopped or replaced by another
/// `start_capture`.
#[derive(Debug)]
pub struct CaptureStream {
    results: Receiver<ResultPayload>,
}

impl CaptureStream {
    /// Blocks for the next result.
    pub fn recv(&self) -> Result<ResultPayload, RecvError> {
        self.results.recv()
    }

    /// Waits up to `timeout` for the next result.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<ResultPayload, RecvTimeoutError> {
        self.results.recv_timeout(timeout)
    }

    /// Next result if one is ready.
    pub fn try_recv(&self) -> Result<ResultPayload, TryRecvError> {
        self.results.try_recv()
    }
}

/// Runs a camera session on its own coordination thread.
#[derive(Debug)]
pub struct CameraService {
    commands: Sender<Command>,
    thread: Option<JoinHandle<()>>,
    stats: Arc<PipelineStats>,
}

impl CameraService {
    /// Clears stale cached frames, starts the worker pool and the
    /// coordination thread.
    pub fn new<B: CameraBackend>(backend: B, output: &OutputConfig) -> Result<Self, SessionError> {
        match FileRing::cleanup_all(&output.cache_dir) {
            Ok(removed) if removed > 0 => info!(removed, "Removed stale cached frames"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Could not clean frame cache"),
        }

        let stats = Arc::new(PipelineStats::new());
        let workers = output.workers.max(1);
        let pool = WorkerPool::new(workers, workers * 2)?;
        let (commands, queue) = mpsc::channel();

        let factory = callback_factory(pool.handle(), commands.clone());
        let machine = SessionMachine::new(
            Arc::new(backend),
            output.cache_dir.clone(),
            Arc::clone(&stats),
            factory,
        )?;

        let coordinator = Coordinator {
            machine,
            pool,
            stream: None,
            resume_pending: false,
            cache_dir: output.cache_dir.clone(),
            stats: Arc::clone(&stats),
        };

        let thread = std::thread::Builder::new()
            .name("camera-session".into())
            .spawn(move || coordinator.run(queue))
            .map_err(|source| SessionError::Spawn {
                name: "camera-session",
                source,
            })?;

        info!(cache_dir = %output.cache_dir.display(), workers, "Camera service started");

        Ok(Self {
            commands,
            thread: Some(thread),
            stats,
        })
    }

    /// Shared frame and restart counters.
    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    fn request<T>(&self, command: impl FnOnce(SyncSender<T>) -> Command) -> Option<T> {
        let (reply, response) = mpsc::sync_channel(1);
        self.commands.send(command(reply)).ok()?;
        response.recv().ok()
    }

    fn closed() -> CommandFailure {
        CommandFailure::new(
            SessionError::ServiceClosed,
            ResultPayload::new(
                "",
                OptionsPayload::new(&CaptureConfiguration::default(), None),
                PreviewPayload::stopped(),
            ),
        )
    }

    /// Parses `options`, (re)starts the camera and returns the stream of
    /// frame results.
    ///
    /// Malformed options fail before any hardware access.
    pub fn start_capture(&self, options: &Value) -> Result<CaptureStream, CommandFailure> {
        let options = options.clone();
        self.request(|reply| Command::Start { options, reply })
            .unwrap_or_else(|| Err(Self::closed()))
    }

    /// Stops the camera and ends the current stream.
    pub fn stop_capture(&self) -> Result<ResultPayload, CommandFailure> {
        self.request(|reply| Command::Stop { reply })
            .unwrap_or_else(|| Err(Self::closed()))
    }

    /// Turns the torch on or off, restarting the preview.
    pub fn set_flash_mode(&self, enabled: bool) -> Result<ResultPayload, CommandFailure> {
        self.request(|reply| Command::SetFlash { enabled, reply })
            .unwrap_or_else(|| Err(Self::closed()))
    }

    /// Switches lens, restarting the preview.
    pub fn set_camera_facing(&self, facing: Facing) -> Result<ResultPayload, CommandFailure> {
        self.request(|reply| Command::SetFacing { facing, reply })
            .unwrap_or_else(|| Err(Self::closed()))
    }

    /// Host went to background: stop and remember whether to resume.
    pub fn on_app_stop(&self) {
        self.request(|reply| Command::AppStop { reply });
    }

    /// Host came back: restart if capture was running at app stop.
    pub fn on_resume(&self) {
        self.request(|reply| Command::Resume { reply });
    }

    /// Display rotated: restart the preview with the new orientation.
    pub fn on_rotation_changed(&self, rotation: DisplayRotation, orientation: DeviceOrientation) {
        self.request(|reply| Command::RotationChanged {
            rotation,
            orientation,
            reply,
        });
    }

    /// `None` once the service has been destroyed.
    pub fn status(&self) -> Option<ServiceStatus> {
        self.request(|reply| Command::Status { reply })
    }

    /// Stops the camera, joins every thread and clears the cache.
    pub fn destroy(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.request(|reply| Command::Destroy { reply });
            let _ = thread.join();
            info!("Camera service destroyed");
        }
    }
}

impl Drop for CameraService {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Wires hardware callbacks to the worker pool and the coordination queue.
fn callback_factory(pool: PoolHandle, events: Sender<Command>) -> CallbackFactory {
    Arc::new(move |pipeline: Arc<FramePipeline>| {
        let generation = pipeline.generation();
        let pool = pool.clone();
        let frame_events = events.clone();
        let fault_events = events.clone();

        PreviewCallbacks::new(
            move |frame: FrameBuffer<'_>| {
                pipeline.stats().record_received();
                let snapshot = frame.snapshot();
                let job = Arc::clone(&pipeline);
                let events = frame_events.clone();

                let queued = pool.try_submit(move || match job.process(&snapshot) {
                    Ok(frame) => {
                        let _ = events.send(Command::FrameReady {
                            generation: job.generation(),
                            frame,
                        });
                    }
                    Err(e) => {
                        job.stats().record_dropped();
                        warn!(generation = job.generation(), error = %e, "Frame dropped");
                    }
                });

                if !queued {
                    pipeline.stats().record_dropped();
                    trace!(generation, "Worker pool saturated, frame dropped");
                }
            },
            move |fault| {
                let _ = fault_events.send(Command::HardwareFault { generation, fault });
            },
        )
    })
}

struct Coordinator<B: CameraBackend> {
    machine: SessionMachine<B>,
    pool: WorkerPool,
    stream: Option<Sender<ResultPayload>>,
    resume_pending: bool,
    cache_dir: PathBuf,
    stats: Arc<PipelineStats>,
}

impl<B: CameraBackend> Coordinator<B> {
    fn run(mut self, queue: Receiver<Command>) {
        for command in queue {
            if !self.handle(command) {
                break;
            }
        }
        debug!("Coordination thread exiting");
    }

    fn failure(&self, error: SessionError) -> CommandFailure {
        let context = self
            .machine
            .payload("")
            .with_orientation(self.machine.display_orientation());
        CommandFailure::new(error, context)
    }

    fn result(&self, message: &str) -> ResultPayload {
        self.machine
            .payload(message)
            .with_orientation(self.machine.display_orientation())
    }

    /// Returns false when the loop should exit.
    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Start { options, reply } => {
                let _ = reply.send(self.start(&options));
            }
            Command::Stop { reply } => {
                let orientation = self.machine.display_orientation();
                self.machine.stop();
                self.stream = None;
                self.resume_pending = false;
                info!("Capture stopped");
                let _ = reply.send(Ok(self
                    .machine
                    .payload("Capture stopped.")
                    .with_orientation(orientation)));
            }
            Command::SetFlash { enabled, reply } => {
                let outcome = self
                    .check_capture()
                    .and_then(|()| self.machine.set_flash_mode(enabled));
                let _ = reply.send(self.reply(outcome));
            }
            Command::SetFacing { facing, reply } => {
                let outcome = self
                    .check_capture()
                    .and_then(|()| self.machine.set_facing(facing));
                let _ = reply.send(self.reply(outcome));
            }
            Command::AppStop { reply } => {
                self.resume_pending = self.machine.is_previewing();
                self.machine.stop();
                info!(resume_pending = self.resume_pending, "App stopped");
                let _ = reply.send(());
            }
            Command::Resume { reply } => {
                if std::mem::take(&mut self.resume_pending) && self.stream.is_some() {
                    info!("Resuming capture");
                    if let Err(e) = self.machine.restart() {
                        warn!(error = %e, "Could not resume capture");
                    }
                }
                let _ = reply.send(());
            }
            Command::RotationChanged {
                rotation,
                orientation,
                reply,
            } => {
                if let Err(e) = self.machine.set_rotation(rotation, orientation) {
                    warn!(error = %e, "Could not restart after rotation");
                }
                let _ = reply.send(());
            }
            Command::Status { reply } => {
                let _ = reply.send(ServiceStatus {
                    state: self.machine.state(),
                    generation: self.machine.generation(),
                    camera_id: self.machine.camera_id(),
                    streaming: self.stream.is_some(),
                });
            }
            Command::FrameReady { generation, frame } => self.deliver(generation, frame),
            Command::HardwareFault { generation, fault } => {
                match self.machine.handle_fault(generation, fault) {
                    FaultOutcome::Ignored => {
                        debug!(generation, %fault, "Ignoring fault from stale session")
                    }
                    FaultOutcome::Recovered => {}
                    FaultOutcome::Failed(e) => {
                        warn!(error = %e, "Camera left in error state until the next command")
                    }
                }
            }
            Command::Destroy { reply } => {
                self.machine.stop();
                self.stream = None;
                self.pool.shutdown();
                if let Err(e) = FileRing::cleanup_all(&self.cache_dir) {
                    warn!(error = %e, "Could not clean frame cache");
                }
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    fn start(&mut self, options: &Value) -> Result<CaptureStream, CommandFailure> {
        let config = CaptureConfiguration::from_options(options)
            .map_err(|e| self.failure(SessionError::Configuration(e)))?;

        info!(
            width = config.width,
            height = config.height,
            fps = config.fps,
            facing = config.camera_facing.as_str(),
            mode = config.output_mode.as_str(),
            "Starting capture"
        );

        // A new start replaces the previous stream even if the camera fails.
        self.stream = None;
        self.resume_pending = false;
        self.machine
            .start(config)
            .map_err(|e| self.failure(e))?;

        let (sender, results) = mpsc::channel();
        self.stream = Some(sender);
        Ok(CaptureStream { results })
    }

    fn check_capture(&self) -> Result<(), SessionError> {
        if !self.machine.has_device() {
            return Err(SessionError::HardwareUnavailable(CameraError::NotInitialized));
        }
        if self.stream.is_none() {
            return Err(SessionError::NoActiveCapture);
        }
        Ok(())
    }

    fn reply(&self, outcome: Result<(), SessionError>) -> Result<ResultPayload, CommandFailure> {
        match outcome {
            Ok(()) => Ok(self.result("OK")),
            Err(e) => {
                warn!(error = %e, "Command failed");
                Err(self.failure(e))
            }
        }
    }

    fn deliver(&mut self, generation: u64, frame: ProcessedFrame) {
        if !self.machine.accepts(generation) {
            self.stats.record_dropped();
            trace!(generation, frame_id = frame.frame_id, "Discarding frame from stale session");
            return;
        }
        let Some(stream) = &self.stream else {
            self.stats.record_dropped();
            return;
        };

        let payload = self.machine.payload("OK").with_images(frame.images());
        if stream.send(payload).is_ok() {
            self.stats.record_delivered();
        } else {
            debug!("Capture stream closed by receiver");
            self.stats.record_dropped();
            self.stream = None;
        }
    }
}
