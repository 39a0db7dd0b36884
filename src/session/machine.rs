//! Camera session state machine.
//!
//! Every transition takes `&mut self`; whoever owns the machine serializes
//! access to the hardware. [`CameraService`](super::CameraService) owns it
//! on a single coordination thread.

use super::opener::DeviceOpener;
use super::pipeline::{CallbackFactory, FramePipeline, PipelineStats};
use super::{SessionError, SessionState};
use crate::capture::{
    CameraBackend, CameraDevice, CameraError, CaptureConfiguration, Facing, FlashMode,
    HardwareFault,
};
use crate::negotiation::{
    display_orientation, negotiate, DeviceOrientation, DisplayRotation, NegotiatedParameters,
};
use crate::output::{OptionsPayload, OutputSink, PreviewPayload, ResultPayload};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// What happened to a hardware fault report.
#[derive(Debug)]
pub enum FaultOutcome {
    /// From a previous generation or no longer previewing.
    Ignored,
    /// The automatic restart succeeded.
    Recovered,
    /// The automatic restart failed; the session stays in `Error`. Always
    /// a [`SessionError::HardwareFault`].
    Failed(SessionError),
}

/// Owns the device handle and drives it through the session lifecycle.
pub struct SessionMachine<B: CameraBackend> {
    backend: Arc<B>,
    opener: DeviceOpener<B>,
    factory: CallbackFactory,
    cache_dir: PathBuf,
    stats: Arc<PipelineStats>,

    state: SessionState,
    device: Option<B::Device>,
    generation: u64,
    camera_id: u32,
    config: Option<CaptureConfiguration>,
    pipeline: Option<Arc<FramePipeline>>,
    rotation: DisplayRotation,
    orientation: DeviceOrientation,
}

impl<B: CameraBackend> SessionMachine<B> {
    /// Creates an idle machine. `factory` wires each new preview's frame and
    /// fault callbacks.
    pub fn new(
        backend: Arc<B>,
        cache_dir: impl Into<PathBuf>,
        stats: Arc<PipelineStats>,
        factory: CallbackFactory,
    ) -> Result<Self, SessionError> {
        let opener = DeviceOpener::spawn(Arc::clone(&backend))?;
        stats.set_state(SessionState::Idle);

        Ok(Self {
            backend,
            opener,
            factory,
            cache_dir: cache_dir.into(),
            stats,
            state: SessionState::Idle,
            device: None,
            generation: 0,
            camera_id: 0,
            config: None,
            pipeline: None,
            rotation: DisplayRotation::default(),
            orientation: DeviceOrientation::default(),
        })
    }

    /// Current lifecycle state.
    #[inline]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Incremented on every open and every stop; callbacks carry the value
    /// they were created with.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Id of the current or last opened camera.
    #[inline]
    pub fn camera_id(&self) -> u32 {
        self.camera_id
    }

    /// A device handle is held.
    #[inline]
    pub fn has_device(&self) -> bool {
        self.device.is_some()
    }

    /// Frames are streaming.
    #[inline]
    pub fn is_previewing(&self) -> bool {
        self.state == SessionState::Previewing
    }

    /// True when a result of `generation` may still be delivered.
    pub fn accepts(&self, generation: u64) -> bool {
        self.is_previewing() && self.generation == generation
    }

    /// Configuration of the current or last session.
    pub fn config(&self) -> Option<&CaptureConfiguration> {
        self.config.as_ref()
    }

    /// Parameters of the running preview.
    pub fn parameters(&self) -> Option<&NegotiatedParameters> {
        self.pipeline.as_ref().map(|p| p.parameters())
    }

    /// Last reported display rotation.
    #[inline]
    pub fn rotation(&self) -> DisplayRotation {
        self.rotation
    }

    /// Last reported device orientation.
    #[inline]
    pub fn orientation(&self) -> DeviceOrientation {
        self.orientation
    }

    /// Current display orientation in degrees, 0 when no camera is known.
    pub fn display_orientation(&self) -> u32 {
        match self.parameters() {
            Some(p) => p.display_orientation,
            None => self
                .device
                .as_ref()
                .map(|d| {
                    let info = d.info();
                    display_orientation(info.facing, info.mount_angle, self.rotation)
                })
                .unwrap_or(0),
        }
    }

    /// Session context for a result message.
    pub fn payload(&self, message: impl Into<String>) -> ResultPayload {
        let config = self.config.clone().unwrap_or_default();
        let parameters = self.parameters();
        let flash = match parameters {
            Some(p) => p.flash_mode,
            None => config.flash_mode,
        };
        let preview = match parameters {
            Some(p) => PreviewPayload::from_parameters(self.is_previewing(), self.camera_id, p),
            None => PreviewPayload::stopped(),
        };
        ResultPayload::new(message, OptionsPayload::new(&config, flash), preview)
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            info!(from = %self.state, to = %next, generation = self.generation, "Session state changed");
        }
        self.state = next;
        self.stats.set_state(next);
    }

    /// Starts a session with `config`, stopping any current one first.
    pub fn start(&mut self, config: CaptureConfiguration) -> Result<(), SessionError> {
        config.validate()?;
        self.stop();
        self.config = Some(config);
        self.open_and_preview()
    }

    /// Stops streaming and releases the device. Reaches `Idle` from any
    /// state.
    pub fn stop(&mut self) {
        if let Some(mut device) = self.device.take() {
            self.transition(SessionState::Stopping);
            if let Err(e) = device.stop_preview() {
                warn!(camera_id = self.camera_id, error = %e, "Failed to stop preview");
            }
            device.release();
            info!(camera_id = self.camera_id, "Camera released");
        }

        self.generation += 1;
        self.pipeline = None;
        self.camera_id = 0;
        self.transition(SessionState::Idle);
    }

    /// Stops and starts again with the current configuration.
    pub fn restart(&mut self) -> Result<(), SessionError> {
        if self.config.is_none() {
            return Err(SessionError::NoActiveCapture);
        }
        self.stop();
        self.open_and_preview()
    }

    /// Restarts with a new flash request. Requires an open camera.
    pub fn set_flash_mode(&mut self, enabled: bool) -> Result<(), SessionError> {
        let config = self.require_device()?.with_flash_mode(FlashMode::from_enabled(enabled));
        self.config = Some(config);
        self.restart()
    }

    /// Restarts on another lens. Requires an open camera.
    pub fn set_facing(&mut self, facing: Facing) -> Result<(), SessionError> {
        let config = self.require_device()?.with_facing(facing);
        self.config = Some(config);
        self.restart()
    }

    fn require_device(&self) -> Result<&CaptureConfiguration, SessionError> {
        match (&self.device, &self.config) {
            (Some(_), Some(config)) => Ok(config),
            _ => Err(SessionError::HardwareUnavailable(CameraError::NotInitialized)),
        }
    }

    /// Records a display rotation change. Returns true when a running
    /// preview was restarted to apply it.
    pub fn set_rotation(
        &mut self,
        rotation: DisplayRotation,
        orientation: DeviceOrientation,
    ) -> Result<bool, SessionError> {
        let changed = rotation != self.rotation;
        self.rotation = rotation;
        self.orientation = orientation;

        if changed && self.is_previewing() {
            info!(degrees = rotation.degrees(), orientation = orientation.label(), "Display rotated");
            self.restart()?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Handles an asynchronous fault reported for `generation`: releases the
    /// device and attempts exactly one restart.
    pub fn handle_fault(&mut self, generation: u64, fault: HardwareFault) -> FaultOutcome {
        if !self.accepts(generation) {
            return FaultOutcome::Ignored;
        }

        error!(camera_id = self.camera_id, code = fault.code(), %fault, "Camera fault");

        if let Some(device) = self.device.take() {
            device.release();
        }
        self.generation += 1;
        self.pipeline = None;
        self.transition(SessionState::Error);

        self.stats.record_restart();
        match self.open_and_preview() {
            Ok(()) => {
                info!(camera_id = self.camera_id, "Camera recovered after fault");
                FaultOutcome::Recovered
            }
            Err(e) => {
                self.stats.record_failed_restart();
                warn!(error = %e, "Restart after camera fault failed");
                FaultOutcome::Failed(SessionError::HardwareFault {
                    fault,
                    source: Box::new(e),
                })
            }
        }
    }

    fn open_and_preview(&mut self) -> Result<(), SessionError> {
        let config = self
            .config
            .clone()
            .ok_or(SessionError::NoActiveCapture)?;

        self.generation += 1;
        self.transition(SessionState::Opening);

        let result = self.try_open(&config);
        if let Err(e) = &result {
            warn!(error = %e, "Failed to start camera");
            if let Some(device) = self.device.take() {
                device.release();
            }
            self.pipeline = None;
            self.camera_id = 0;
            self.transition(SessionState::Error);
        }
        result
    }

    fn try_open(&mut self, config: &CaptureConfiguration) -> Result<(), SessionError> {
        let info = self
            .backend
            .devices()?
            .into_iter()
            .find(|d| d.facing == config.camera_facing)
            .ok_or_else(|| {
                CameraError::DeviceNotFound(format!("no {} camera", config.camera_facing.as_str()))
            })?;

        let device = self.device.insert(self.opener.open(info.id)?);
        self.camera_id = info.id;
        info!(camera_id = info.id, facing = config.camera_facing.as_str(), "Camera opened");

        let capabilities = device.capabilities()?;
        let parameters = negotiate(&capabilities, config, self.rotation);
        device.configure(&parameters)?;

        let sink = OutputSink::new(config.output_mode, &self.cache_dir, config.fps)?;
        let pipeline = Arc::new(FramePipeline::new(
            self.generation,
            config.clone(),
            parameters,
            self.orientation,
            Arc::new(sink),
            Arc::clone(&self.stats),
        ));

        device.start_preview((self.factory)(Arc::clone(&pipeline)))?;
        self.pipeline = Some(pipeline);
        self.transition(SessionState::Previewing);
        Ok(())
    }
}

impl<B: CameraBackend> Drop for SessionMachine<B> {
    fn drop(&mut self) {
        if self.device.is_some() {
            self.stop();
        }
    }
}

impl<B: CameraBackend> std::fmt::Debug for SessionMachine<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionMachine")
            .field("state", &self.state)
            .field("generation", &self.generation)
            .field("camera_id", &self.camera_id)
            .field("has_device", &self.device.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{MockBackend, MockControl, MockDeviceSpec, PreviewCallbacks, Size};
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct Fixture {
        machine: SessionMachine<MockBackend>,
        control: MockControl,
        frames: Arc<AtomicUsize>,
        _dir: TempDir,
    }

    fn fixture_with(backend: MockBackend) -> Fixture {
        let dir = TempDir::new().unwrap();
        let control = backend.control();
        let frames = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&frames);

        let factory: CallbackFactory = Arc::new(move |_pipeline: Arc<FramePipeline>| {
            let counter = Arc::clone(&counter);
            PreviewCallbacks::new(
                move |_frame| {
                    counter.fetch_add(1, Ordering::SeqCst);
                },
                |_fault| {},
            )
        });

        let machine = SessionMachine::new(
            Arc::new(backend),
            dir.path(),
            Arc::new(PipelineStats::new()),
            factory,
        )
        .unwrap();

        Fixture {
            machine,
            control,
            frames,
            _dir: dir,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(MockBackend::new())
    }

    #[test]
    fn test_start_and_stop() {
        let mut f = fixture();
        assert_eq!(f.machine.state(), SessionState::Idle);

        f.machine.start(CaptureConfiguration::default()).unwrap();
        assert_eq!(f.machine.state(), SessionState::Previewing);
        assert_eq!(f.control.open_handles(), 1);
        assert_eq!(
            f.machine.parameters().unwrap().preview_size,
            Some(Size::new(352, 288))
        );

        assert!(f.control.emit_frame());
        assert_eq!(f.frames.load(Ordering::SeqCst), 1);

        f.machine.stop();
        assert_eq!(f.machine.state(), SessionState::Idle);
        assert_eq!(f.control.open_handles(), 0);
        assert_eq!(f.machine.camera_id(), 0);
        assert!(!f.control.emit_frame());
    }

    #[test]
    fn test_front_facing_picks_front_device() {
        let mut f = fixture();
        f.machine
            .start(CaptureConfiguration::default().with_facing(Facing::Front))
            .unwrap();
        assert_eq!(f.machine.camera_id(), 1);
    }

    #[test]
    fn test_missing_facing_is_unavailable() {
        let mut f = fixture_with(MockBackend::with_devices(vec![MockDeviceSpec::standard(
            0,
            Facing::Back,
            90,
        )]));

        let result = f
            .machine
            .start(CaptureConfiguration::default().with_facing(Facing::Front));
        assert!(matches!(
            result,
            Err(SessionError::HardwareUnavailable(CameraError::DeviceNotFound(_)))
        ));
        assert_eq!(f.machine.state(), SessionState::Error);
        assert_eq!(f.control.open_handles(), 0);
    }

    #[test]
    fn test_preview_failure_releases_handle() {
        let mut f = fixture();
        f.control.fail_next_starts(1);

        let result = f.machine.start(CaptureConfiguration::default());
        assert!(matches!(
            result,
            Err(SessionError::HardwareUnavailable(CameraError::PreviewFailed(_)))
        ));
        assert_eq!(f.machine.state(), SessionState::Error);
        assert_eq!(f.control.open_handles(), 0);

        f.machine.stop();
        assert_eq!(f.machine.state(), SessionState::Idle);
    }

    #[test]
    fn test_invalid_config_touches_nothing() {
        let mut f = fixture();
        let config = CaptureConfiguration {
            thumbnail_ratio: 0.0,
            ..CaptureConfiguration::default()
        };
        assert!(matches!(
            f.machine.start(config),
            Err(SessionError::Configuration(_))
        ));
        assert_eq!(f.machine.state(), SessionState::Idle);
        assert_eq!(f.control.total_opens(), 0);
    }

    #[test]
    fn test_flash_requires_open_camera() {
        let mut f = fixture();
        assert!(matches!(
            f.machine.set_flash_mode(true),
            Err(SessionError::HardwareUnavailable(CameraError::NotInitialized))
        ));

        f.machine.start(CaptureConfiguration::default()).unwrap();
        f.machine.set_flash_mode(true).unwrap();
        assert_eq!(
            f.control.last_parameters().unwrap().flash_mode,
            Some(FlashMode::Torch)
        );
        assert_eq!(f.control.open_handles(), 1);
        assert!(f.machine.payload("OK").options.flash_mode);
    }

    #[test]
    fn test_facing_change_restarts_on_other_lens() {
        let mut f = fixture();
        f.machine.start(CaptureConfiguration::default()).unwrap();
        let before = f.machine.generation();

        f.machine.set_facing(Facing::Front).unwrap();
        assert_eq!(f.machine.camera_id(), 1);
        assert!(f.machine.generation() > before);
        assert_eq!(f.control.max_concurrent_handles(), 1);
    }

    #[test]
    fn test_rotation_restarts_only_when_changed() {
        let mut f = fixture_with(MockBackend::with_devices(vec![MockDeviceSpec::standard(
            0,
            Facing::Back,
            90,
        )]));
        f.machine.start(CaptureConfiguration::default()).unwrap();
        assert_eq!(f.machine.display_orientation(), 90);

        let restarted = f
            .machine
            .set_rotation(DisplayRotation::Deg90, DeviceOrientation::Landscape)
            .unwrap();
        assert!(restarted);
        assert_eq!(f.machine.display_orientation(), 0);
        assert_eq!(f.control.total_opens(), 2);

        let restarted = f
            .machine
            .set_rotation(DisplayRotation::Deg90, DeviceOrientation::Landscape)
            .unwrap();
        assert!(!restarted);
        assert_eq!(f.control.total_opens(), 2);
    }

    #[test]
    fn test_fault_restarts_once() {
        let mut f = fixture();
        f.machine.start(CaptureConfiguration::default()).unwrap();
        let generation = f.machine.generation();

        let outcome = f.machine.handle_fault(generation, HardwareFault::ServerDied);
        assert!(matches!(outcome, FaultOutcome::Recovered));
        assert_eq!(f.machine.state(), SessionState::Previewing);
        assert_eq!(f.control.total_opens(), 2);

        // The old generation is no longer acted on.
        let outcome = f.machine.handle_fault(generation, HardwareFault::ServerDied);
        assert!(matches!(outcome, FaultOutcome::Ignored));
    }

    #[test]
    fn test_fault_with_failed_restart_stays_in_error() {
        let mut f = fixture();
        f.machine.start(CaptureConfiguration::default()).unwrap();
        f.control.fail_next_opens(1);

        let outcome = f
            .machine
            .handle_fault(f.machine.generation(), HardwareFault::Evicted);
        match outcome {
            FaultOutcome::Failed(SessionError::HardwareFault { fault, source }) => {
                assert_eq!(fault, HardwareFault::Evicted);
                assert!(matches!(*source, SessionError::HardwareUnavailable(_)));
            }
            other => panic!("expected a hardware fault, got {:?}", other),
        }
        assert_eq!(f.machine.state(), SessionState::Error);
        assert_eq!(f.control.open_handles(), 0);

        // Faults in Error are not retried.
        let outcome = f
            .machine
            .handle_fault(f.machine.generation(), HardwareFault::Evicted);
        assert!(matches!(outcome, FaultOutcome::Ignored));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Start(bool),
        Stop,
        Fault,
        StaleFault,
        FailNextOpen,
        Flash(bool),
        Rotate(u32),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            any::<bool>().prop_map(Op::Start),
            Just(Op::Stop),
            Just(Op::Fault),
            Just(Op::StaleFault),
            Just(Op::FailNextOpen),
            any::<bool>().prop_map(Op::Flash),
            (0u32..4).prop_map(|q| Op::Rotate(q * 90)),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        #[test]
        fn prop_at_most_one_handle(ops in prop::collection::vec(op(), 1..24)) {
            let mut f = fixture();

            for op in ops {
                match op {
                    Op::Start(front) => {
                        let facing = if front { Facing::Front } else { Facing::Back };
                        let _ = f.machine.start(CaptureConfiguration::default().with_facing(facing));
                    }
                    Op::Stop => f.machine.stop(),
                    Op::Fault => {
                        let generation = f.machine.generation();
                        let _ = f.machine.handle_fault(generation, HardwareFault::Unknown);
                    }
                    Op::StaleFault => {
                        let generation = f.machine.generation().saturating_sub(1);
                        let _ = f.machine.handle_fault(generation, HardwareFault::Unknown);
                    }
                    Op::FailNextOpen => f.control.fail_next_opens(1),
                    Op::Flash(on) => {
                        let _ = f.machine.set_flash_mode(on);
                    }
                    Op::Rotate(degrees) => {
                        let _ = f.machine.set_rotation(
                            DisplayRotation::from_degrees(degrees),
                            DeviceOrientation::Portrait,
                        );
                    }
                }

                prop_assert!(f.control.open_handles() <= 1);
                prop_assert_eq!(f.control.open_handles() == 1, f.machine.has_device());
                prop_assert_eq!(f.machine.state().may_hold_device(), f.machine.has_device());
            }

            f.machine.stop();
            prop_assert_eq!(f.machine.state(), SessionState::Idle);
            prop_assert_eq!(f.control.open_handles(), 0);
            prop_assert!(f.control.max_concurrent_handles() <= 1);
        }
    }
}
