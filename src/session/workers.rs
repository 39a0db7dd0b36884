//! Fixed pool of frame processing threads.

use super::SessionError;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Threads pulling from one bounded job channel.
///
/// At most `capacity` jobs wait in the channel; a slow pipeline drops
/// frames instead of growing without limit.
pub struct WorkerPool {
    jobs: Sender<Job>,
    shutdown: Option<Sender<()>>,
    closed: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

/// Cloneable submission side of a [`WorkerPool`], safe to use from hardware
/// callbacks.
#[derive(Clone)]
pub struct PoolHandle {
    jobs: Sender<Job>,
    closed: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Starts `size` workers accepting up to `capacity` queued jobs.
    pub fn new(size: usize, capacity: usize) -> Result<Self, SessionError> {
        let size = size.max(1);
        let capacity = capacity.max(1);
        let (jobs, jobs_rx) = crossbeam_channel::bounded::<Job>(capacity);
        // Never sent on; dropping the sender wakes every worker.
        let (shutdown, shutdown_rx) = crossbeam_channel::bounded::<()>(0);

        let mut workers = Vec::with_capacity(size);
        for index in 0..size {
            let jobs_rx = jobs_rx.clone();
            let shutdown_rx = shutdown_rx.clone();
            let worker = std::thread::Builder::new()
                .name(format!("frame-worker-{}", index))
                .spawn(move || run_worker(index, jobs_rx, shutdown_rx))
                .map_err(|source| SessionError::Spawn {
                    name: "frame-worker",
                    source,
                })?;
            workers.push(worker);
        }

        debug!(workers = size, capacity, "Worker pool started");
        Ok(Self {
            jobs,
            shutdown: Some(shutdown),
            closed: Arc::new(AtomicBool::new(false)),
            workers,
        })
    }

    /// Returns a submission handle for frame callbacks.
    pub fn handle(&self) -> PoolHandle {
        PoolHandle {
            jobs: self.jobs.clone(),
            closed: Arc::clone(&self.closed),
        }
    }

    /// Rejects new jobs, lets queued jobs finish and joins every worker.
    pub fn shutdown(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        let Some(signal) = self.shutdown.take() else {
            return;
        };
        drop(signal);
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        debug!("Worker pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl PoolHandle {
    /// Queues `job` unless the pool is closed or its channel is full.
    pub fn try_submit<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        match self.jobs.try_send(Box::new(job)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => false,
        }
    }

    /// Jobs waiting for a worker.
    #[inline]
    pub fn queued(&self) -> usize {
        self.jobs.len()
    }
}

fn run_job(index: usize, job: Job) {
    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
        warn!(worker = index, "Frame job panicked");
    }
}

fn run_worker(index: usize, jobs: Receiver<Job>, shutdown: Receiver<()>) {
    loop {
        crossbeam_channel::select! {
            recv(jobs) -> job => match job {
                Ok(job) => run_job(index, job),
                Err(_) => break,
            },
            recv(shutdown) -> _ => {
                while let Ok(job) = jobs.try_recv() {
                    run_job(index, job);
                }
                break;
            }
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers.len())
            .field("queued", &self.jobs.len())
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

impl std::fmt::Debug for PoolHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolHandle")
            .field("queued", &self.jobs.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn test_jobs_run() {
        let mut pool = WorkerPool::new(2, 16).unwrap();
        let handle = pool.handle();
        let (tx, rx) = mpsc::channel();

        for i in 0..8 {
            let tx = tx.clone();
            assert!(handle.try_submit(move || tx.send(i).unwrap()));
        }

        let mut results: Vec<i32> = (0..8).map(|_| rx.recv_timeout(TIMEOUT).unwrap()).collect();
        results.sort();
        assert_eq!(results, (0..8).collect::<Vec<_>>());

        pool.shutdown();
        assert!(pool.workers.is_empty());
    }

    #[test]
    fn test_full_pool_rejects() {
        let pool = WorkerPool::new(1, 1).unwrap();
        let handle = pool.handle();
        let (started_tx, started) = mpsc::channel::<()>();
        let (release, gate) = mpsc::sync_channel::<()>(0);

        assert!(handle.try_submit(move || {
            started_tx.send(()).unwrap();
            let _ = gate.recv();
        }));
        started.recv_timeout(TIMEOUT).unwrap();

        // Worker busy: one job fits in the channel, the next is dropped.
        assert!(handle.try_submit(|| {}));
        assert_eq!(handle.queued(), 1);
        assert!(!handle.try_submit(|| {}));

        release.send(()).unwrap();
    }

    #[test]
    fn test_closed_pool_rejects() {
        let mut pool = WorkerPool::new(1, 4).unwrap();
        let handle = pool.handle();
        pool.shutdown();
        assert!(!handle.try_submit(|| {}));
    }

    #[test]
    fn test_shutdown_drains_queued_jobs() {
        let mut pool = WorkerPool::new(1, 4).unwrap();
        let handle = pool.handle();
        let (release, gate) = mpsc::sync_channel::<()>(0);
        let (tx, rx) = mpsc::channel();

        assert!(handle.try_submit(move || {
            let _ = gate.recv_timeout(TIMEOUT);
        }));
        for i in 0..3 {
            let tx = tx.clone();
            assert!(handle.try_submit(move || tx.send(i).unwrap()));
        }
        drop(tx);

        let releaser = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            let _ = release.send(());
        });
        pool.shutdown();
        releaser.join().unwrap();

        let results: Vec<i32> = rx.iter().collect();
        assert_eq!(results, vec![0, 1, 2]);
    }

    #[test]
    fn test_panicking_job_keeps_worker() {
        let pool = WorkerPool::new(1, 4).unwrap();
        let handle = pool.handle();
        let (tx, rx) = mpsc::channel();

        assert!(handle.try_submit(|| panic!("boom")));
        assert!(handle.try_submit(move || tx.send(1).unwrap()));
        assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), 1);
    }
}
