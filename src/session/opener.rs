//! Dedicated thread for blocking device opens.

use super::SessionError;
use crate::capture::{CameraBackend, CameraError};
use std::sync::mpsc::{self, Sender, SyncSender};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::debug;

struct OpenRequest<D> {
    camera_id: u32,
    reply: SyncSender<Result<D, CameraError>>,
}

/// Opens devices on its own thread; callers block on a one-shot reply.
///
/// Platform camera services may deliver callbacks to the thread that opened
/// the device, so opens never run on the coordination thread. There is no
/// open timeout.
pub struct DeviceOpener<B: CameraBackend> {
    requests: Option<Sender<OpenRequest<B::Device>>>,
    thread: Option<JoinHandle<()>>,
}

impl<B: CameraBackend> DeviceOpener<B> {
    /// Starts the opener thread.
    pub fn spawn(backend: Arc<B>) -> Result<Self, SessionError> {
        let (tx, rx) = mpsc::channel::<OpenRequest<B::Device>>();

        let thread = std::thread::Builder::new()
            .name("camera-opener".into())
            .spawn(move || {
                for request in rx {
                    debug!(camera_id = request.camera_id, "Opening camera");
                    let result = backend.open(request.camera_id);
                    // A vanished requester drops the device, which releases it.
                    let _ = request.reply.send(result);
                }
            })
            .map_err(|source| SessionError::Spawn {
                name: "camera-opener",
                source,
            })?;

        Ok(Self {
            requests: Some(tx),
            thread: Some(thread),
        })
    }

    /// Opens `camera_id` and waits for the outcome.
    pub fn open(&self, camera_id: u32) -> Result<B::Device, CameraError> {
        let closed = || CameraError::OpenFailed("camera opener thread stopped".into());
        let requests = self.requests.as_ref().ok_or_else(closed)?;

        let (reply, outcome) = mpsc::sync_channel(1);
        requests
            .send(OpenRequest { camera_id, reply })
            .map_err(|_| closed())?;

        outcome.recv().map_err(|_| closed())?
    }
}

impl<B: CameraBackend> Drop for DeviceOpener<B> {
    fn drop(&mut self) {
        self.requests.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl<B: CameraBackend> std::fmt::Debug for DeviceOpener<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceOpener")
            .field("running", &self.requests.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CameraDevice, MockBackend};

    #[test]
    fn test_open_through_thread() {
        let backend = Arc::new(MockBackend::new());
        let control = backend.control();
        let opener = DeviceOpener::spawn(Arc::clone(&backend)).unwrap();

        let device = opener.open(1).unwrap();
        assert_eq!(device.info().id, 1);
        assert_eq!(control.open_handles(), 1);

        assert!(matches!(opener.open(1), Err(CameraError::Busy(1))));
        device.release();
        assert_eq!(control.open_handles(), 0);
    }

    #[test]
    fn test_open_failure_is_returned() {
        let backend = Arc::new(MockBackend::new());
        backend.control().fail_next_opens(1);
        let opener = DeviceOpener::spawn(backend).unwrap();

        assert!(matches!(opener.open(0), Err(CameraError::OpenFailed(_))));
        assert!(opener.open(0).is_ok());
    }
}
