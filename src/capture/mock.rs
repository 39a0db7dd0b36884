//! In-process camera backend for tests and the demo binary.
//!
//! [`MockBackend`] behaves like a platform camera service: handles are
//! exclusive per device, frames arrive on whichever thread calls
//! [`MockControl::emit_frame`], and faults can be injected at any time.

use super::{
    CameraBackend, CameraDevice, CameraError, DeviceInfo, Facing, FrameBuffer, HardwareFault,
    PixelFormat, PreviewCallbacks, Size,
};
use crate::negotiation::{FpsRange, HardwareCapabilities, NegotiatedParameters};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

/// A simulated device: what `devices()` lists and what `capabilities()`
/// returns once it is open.
#[derive(Debug, Clone)]
pub struct MockDeviceSpec {
    /// Listing entry.
    pub info: DeviceInfo,
    /// Reported once opened.
    pub capabilities: HardwareCapabilities,
}

impl MockDeviceSpec {
    /// A typical phone camera with the given facing and mount angle.
    pub fn standard(id: u32, facing: Facing, mount_angle: u32) -> Self {
        let flash_modes = match facing {
            Facing::Back => Some(
                ["off", "auto", "on", "torch"]
                    .iter()
                    .map(|m| m.to_string())
                    .collect(),
            ),
            Facing::Front => None,
        };

        Self {
            info: DeviceInfo {
                id,
                facing,
                mount_angle,
            },
            capabilities: HardwareCapabilities {
                preview_sizes: vec![
                    Size::new(1920, 1080),
                    Size::new(1280, 720),
                    Size::new(640, 480),
                    Size::new(352, 288),
                    Size::new(320, 240),
                    Size::new(176, 144),
                ],
                fps_ranges: vec![FpsRange::new(7000, 30000), FpsRange::new(30000, 30000)],
                focus_modes: ["auto", "continuous-video", "infinity"]
                    .iter()
                    .map(|m| m.to_string())
                    .collect(),
                flash_modes,
                facing,
                mount_angle,
                preview_format: PixelFormat::Nv21,
            },
        }
    }
}

#[derive(Debug, Default)]
struct MockState {
    devices: Vec<MockDeviceSpec>,
    fail_opens: u32,
    fail_starts: u32,
    next_handle: u64,
    open: Vec<(u64, u32)>,
    max_concurrent: usize,
    total_opens: u64,
    frame_counter: u64,
    last_parameters: Option<NegotiatedParameters>,
    preview: Option<ActivePreview>,
}

#[derive(Debug, Clone)]
struct ActivePreview {
    handle: u64,
    callbacks: PreviewCallbacks,
    size: Size,
    format: PixelFormat,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<MockState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Simulated camera service.
#[derive(Debug, Clone)]
pub struct MockBackend {
    shared: Arc<Shared>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// A back camera (id 0) and a front camera (id 1), both unrotated.
    pub fn new() -> Self {
        Self::with_devices(vec![
            MockDeviceSpec::standard(0, Facing::Back, 0),
            MockDeviceSpec::standard(1, Facing::Front, 0),
        ])
    }

    /// Backend listing exactly `devices`.
    pub fn with_devices(devices: Vec<MockDeviceSpec>) -> Self {
        let shared = Shared::default();
        shared.lock().devices = devices;
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Test handle for injecting frames and faults.
    pub fn control(&self) -> MockControl {
        MockControl {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl CameraBackend for MockBackend {
    type Device = MockDevice;

    fn devices(&self) -> Result<Vec<DeviceInfo>, CameraError> {
        Ok(self.shared.lock().devices.iter().map(|d| d.info).collect())
    }

    fn open(&self, id: u32) -> Result<MockDevice, CameraError> {
        let mut state = self.shared.lock();

        let spec = state
            .devices
            .iter()
            .find(|d| d.info.id == id)
            .cloned()
            .ok_or_else(|| CameraError::DeviceNotFound(format!("camera {}", id)))?;

        if state.fail_opens > 0 {
            state.fail_opens -= 1;
            return Err(CameraError::OpenFailed(format!(
                "camera {} failed to connect",
                id
            )));
        }

        if state.open.iter().any(|(_, open_id)| *open_id == id) {
            return Err(CameraError::Busy(id));
        }

        state.next_handle += 1;
        let handle = state.next_handle;
        state.open.push((handle, id));
        state.total_opens += 1;
        state.max_concurrent = state.max_concurrent.max(state.open.len());

        tracing::debug!(camera_id = id, handle, "Mock camera opened");

        Ok(MockDevice {
            shared: Arc::clone(&self.shared),
            spec,
            handle,
            parameters: None,
            released: false,
        })
    }
}

/// Open handle on a [`MockBackend`] device.
#[derive(Debug)]
pub struct MockDevice {
    shared: Arc<Shared>,
    spec: MockDeviceSpec,
    handle: u64,
    parameters: Option<NegotiatedParameters>,
    released: bool,
}

impl MockDevice {
    fn close(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        let mut state = self.shared.lock();
        state.open.retain(|(handle, _)| *handle != self.handle);
        if state
            .preview
            .as_ref()
            .is_some_and(|p| p.handle == self.handle)
        {
            state.preview = None;
        }
        tracing::debug!(camera_id = self.spec.info.id, handle = self.handle, "Mock camera released");
    }
}

impl CameraDevice for MockDevice {
    fn info(&self) -> DeviceInfo {
        self.spec.info
    }

    fn capabilities(&self) -> Result<HardwareCapabilities, CameraError> {
        Ok(self.spec.capabilities.clone())
    }

    fn configure(&mut self, parameters: &NegotiatedParameters) -> Result<(), CameraError> {
        if let Some(size) = parameters.preview_size {
            if !self.spec.capabilities.preview_sizes.contains(&size) {
                return Err(CameraError::ConfigFailed(format!(
                    "unsupported preview size {}",
                    size
                )));
            }
        }
        self.parameters = Some(parameters.clone());
        self.shared.lock().last_parameters = Some(parameters.clone());
        Ok(())
    }

    fn start_preview(&mut self, callbacks: PreviewCallbacks) -> Result<(), CameraError> {
        let mut state = self.shared.lock();

        if state.fail_starts > 0 {
            state.fail_starts -= 1;
            return Err(CameraError::PreviewFailed("preview surface lost".into()));
        }

        let size = self
            .parameters
            .as_ref()
            .and_then(|p| p.preview_size)
            .or_else(|| self.spec.capabilities.preview_sizes.first().copied())
            .ok_or_else(|| CameraError::PreviewFailed("no preview size".into()))?;

        state.preview = Some(ActivePreview {
            handle: self.handle,
            callbacks,
            size,
            format: self.spec.capabilities.preview_format,
        });
        Ok(())
    }

    fn stop_preview(&mut self) -> Result<(), CameraError> {
        let mut state = self.shared.lock();
        if state
            .preview
            .as_ref()
            .is_some_and(|p| p.handle == self.handle)
        {
            state.preview = None;
        }
        Ok(())
    }

    fn release(mut self) {
        self.close();
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.close();
    }
}

/// Inspection and fault injection for a [`MockBackend`].
#[derive(Debug, Clone)]
pub struct MockControl {
    shared: Arc<Shared>,
}

impl MockControl {
    /// Delivers one synthetic frame to the active preview, on the calling
    /// thread. Returns false when no preview is running.
    pub fn emit_frame(&self) -> bool {
        let (preview, sequence) = {
            let mut state = self.shared.lock();
            let Some(preview) = state.preview.clone() else {
                return false;
            };
            state.frame_counter += 1;
            (preview, state.frame_counter)
        };

        let data = synthetic_frame(preview.size, preview.format, sequence);
        let frame = FrameBuffer::new(&data, preview.size.width, preview.size.height, preview.format);
        (preview.callbacks.on_frame)(frame);
        true
    }

    /// Delivers a raw buffer as-is, for malformed-frame tests.
    pub fn emit_raw(&self, data: &[u8], width: u32, height: u32, format: PixelFormat) -> bool {
        let Some(preview) = self.shared.lock().preview.clone() else {
            return false;
        };
        (preview.callbacks.on_frame)(FrameBuffer::new(data, width, height, format));
        true
    }

    /// Reports a fault through the active preview's error callback.
    pub fn raise_fault(&self, fault: HardwareFault) -> bool {
        let Some(preview) = self.shared.lock().preview.clone() else {
            return false;
        };
        (preview.callbacks.on_error)(fault);
        true
    }

    /// Makes the next `count` opens fail.
    pub fn fail_next_opens(&self, count: u32) {
        self.shared.lock().fail_opens = count;
    }

    /// Makes the next `count` preview starts fail.
    pub fn fail_next_starts(&self, count: u32) {
        self.shared.lock().fail_starts = count;
    }

    /// A device is streaming.
    pub fn is_previewing(&self) -> bool {
        self.shared.lock().preview.is_some()
    }

    /// Number of handles currently held.
    pub fn open_handles(&self) -> usize {
        self.shared.lock().open.len()
    }

    /// Highest number of handles ever held at once.
    pub fn max_concurrent_handles(&self) -> usize {
        self.shared.lock().max_concurrent
    }

    /// Successful opens since creation.
    pub fn total_opens(&self) -> u64 {
        self.shared.lock().total_opens
    }

    /// Parameters most recently applied to any device.
    pub fn last_parameters(&self) -> Option<NegotiatedParameters> {
        self.shared.lock().last_parameters.clone()
    }

    /// Emits frames at `fps` on a background thread until the returned
    /// source is stopped or dropped.
    pub fn spawn_frame_source(&self, fps: u32) -> FrameSource {
        let stop = Arc::new(AtomicBool::new(false));
        let interval = Duration::from_micros(1_000_000 / u64::from(fps.max(1)));
        let control = self.clone();
        let flag = Arc::clone(&stop);

        let thread = std::thread::Builder::new()
            .name("mock-frame-source".into())
            .spawn(move || {
                while !flag.load(Ordering::Relaxed) {
                    control.emit_frame();
                    std::thread::sleep(interval);
                }
            })
            .ok();

        FrameSource { stop, thread }
    }
}

/// Background frame generator returned by [`MockControl::spawn_frame_source`].
#[derive(Debug)]
pub struct FrameSource {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl FrameSource {
    /// Stops emitting and joins the thread.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Diagonal luma gradient that shifts with the sequence number, neutral
/// chroma.
fn synthetic_frame(size: Size, format: PixelFormat, sequence: u64) -> Vec<u8> {
    let len = format.frame_len(size.width, size.height).unwrap_or(0);
    let w = size.width as usize;
    let h = size.height as usize;
    let shift = (sequence % 256) as usize;

    match format {
        PixelFormat::Rgb24 => (0..len)
            .map(|i| (((i / 3) % w + (i / 3) / w + shift) % 256) as u8)
            .collect(),
        PixelFormat::Yuy2 => (0..len)
            .map(|i| {
                if i % 2 == 0 {
                    (((i / 2) % w + (i / 2) / w + shift) % 256) as u8
                } else {
                    128
                }
            })
            .collect(),
        PixelFormat::Nv21 | PixelFormat::Nv16 | PixelFormat::Yv12 => {
            let mut data = vec![128u8; len];
            for y in 0..h {
                for x in 0..w {
                    data[y * w + x] = ((x + y + shift) % 256) as u8;
                }
            }
            data
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_callbacks(frames: Arc<AtomicUsize>, faults: Arc<AtomicUsize>) -> PreviewCallbacks {
        PreviewCallbacks::new(
            move |frame| {
                assert!(frame.is_valid());
                frames.fetch_add(1, Ordering::SeqCst);
            },
            move |_| {
                faults.fetch_add(1, Ordering::SeqCst);
            },
        )
    }

    #[test]
    fn test_lists_back_and_front() {
        let backend = MockBackend::new();
        let devices = backend.devices().unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].facing, Facing::Back);
        assert_eq!(devices[1].facing, Facing::Front);
    }

    #[test]
    fn test_handles_are_exclusive() {
        let backend = MockBackend::new();
        let control = backend.control();

        let device = backend.open(0).unwrap();
        assert!(matches!(backend.open(0), Err(CameraError::Busy(0))));
        assert_eq!(control.open_handles(), 1);

        device.release();
        assert_eq!(control.open_handles(), 0);

        let device = backend.open(0).unwrap();
        drop(device);
        assert_eq!(control.open_handles(), 0);
        assert_eq!(control.total_opens(), 2);
        assert_eq!(control.max_concurrent_handles(), 1);
    }

    #[test]
    fn test_unknown_device() {
        let backend = MockBackend::new();
        assert!(matches!(backend.open(9), Err(CameraError::DeviceNotFound(_))));
    }

    #[test]
    fn test_injected_open_failure() {
        let backend = MockBackend::new();
        backend.control().fail_next_opens(1);
        assert!(matches!(backend.open(0), Err(CameraError::OpenFailed(_))));
        assert!(backend.open(0).is_ok());
    }

    #[test]
    fn test_frames_and_faults_reach_callbacks() {
        let backend = MockBackend::new();
        let control = backend.control();
        let frames = Arc::new(AtomicUsize::new(0));
        let faults = Arc::new(AtomicUsize::new(0));

        assert!(!control.emit_frame());

        let mut device = backend.open(0).unwrap();
        device
            .start_preview(counting_callbacks(Arc::clone(&frames), Arc::clone(&faults)))
            .unwrap();

        assert!(control.emit_frame());
        assert!(control.emit_frame());
        assert!(control.raise_fault(HardwareFault::ServerDied));

        device.stop_preview().unwrap();
        assert!(!control.emit_frame());

        assert_eq!(frames.load(Ordering::SeqCst), 2);
        assert_eq!(faults.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_synthetic_frame_lengths() {
        for format in [
            PixelFormat::Nv21,
            PixelFormat::Nv16,
            PixelFormat::Yv12,
            PixelFormat::Yuy2,
            PixelFormat::Rgb24,
        ] {
            let data = synthetic_frame(Size::new(64, 48), format, 3);
            assert_eq!(Some(data.len()), format.frame_len(64, 48));
        }
    }
}
