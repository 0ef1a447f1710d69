//! Single-shot voxelisation worker.
//!
//! Voxelising a large scene can take seconds, so it runs on one worker
//! thread beside the caller. The driver is deliberately minimal: a thread
//! handle, an atomic three-state status flag, and a mutex slot the worker
//! drops its result into. There is no cancellation; a job in flight runs to
//! completion, and dropping the worker joins it.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use log::debug;

use crate::error::Result;
use crate::lattice::VoxelLattice;

/// Status of the voxelisation worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoxelStatus {
    /// No job has been started since construction or the last reset.
    NotStarted,
    /// A job is running on the worker thread.
    Ongoing,
    /// The worker finished and its result is waiting to be collected.
    Finished,
}

const NOT_STARTED: u8 = 0;
const ONGOING: u8 = 1;
const FINISHED: u8 = 2;

type LatticeSlot = Arc<Mutex<Option<Result<VoxelLattice>>>>;

/// One-job-at-a-time worker with a pollable status flag.
pub struct VoxelWorker {
    status: Arc<AtomicU8>,
    handle: Option<JoinHandle<()>>,
    slot: LatticeSlot,
}

impl VoxelWorker {
    pub fn new() -> Self {
        Self {
            status: Arc::new(AtomicU8::new(NOT_STARTED)),
            handle: None,
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Current status. The worker publishes `Finished` with release
    /// ordering after storing its result, so a `Finished` read here means
    /// the slot is populated.
    pub fn status(&self) -> VoxelStatus {
        match self.status.load(Ordering::Acquire) {
            ONGOING => VoxelStatus::Ongoing,
            FINISHED => VoxelStatus::Finished,
            _ => VoxelStatus::NotStarted,
        }
    }

    /// Start a job, following the driver's transition table: a fresh worker
    /// spawns, a busy worker ignores the request, and a finished worker is
    /// joined and treated as fresh before spawning again.
    pub fn start<F>(&mut self, job: F)
    where
        F: FnOnce() -> Result<VoxelLattice> + Send + 'static,
    {
        match self.status() {
            VoxelStatus::Ongoing => {
                debug!("voxelisation already in flight; new request ignored");
            }
            VoxelStatus::Finished => {
                if let Some(handle) = self.handle.take() {
                    let _ = handle.join();
                }
                self.status.store(NOT_STARTED, Ordering::Release);
                self.spawn(job);
            }
            VoxelStatus::NotStarted => self.spawn(job),
        }
    }

    fn spawn<F>(&mut self, job: F)
    where
        F: FnOnce() -> Result<VoxelLattice> + Send + 'static,
    {
        self.status.store(ONGOING, Ordering::Release);
        let status = Arc::clone(&self.status);
        let slot = Arc::clone(&self.slot);
        self.handle = Some(std::thread::spawn(move || {
            let result = job();
            *lock_slot(&slot) = Some(result);
            status.store(FINISHED, Ordering::Release);
        }));
    }

    /// Join the worker (blocking if a job is running) and take its result.
    /// Returns `None` if no job has produced a result since the last take.
    pub fn join(&mut self) -> Option<Result<VoxelLattice>> {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        lock_slot(&self.slot).take()
    }

    /// Non-blocking harvest: takes the result only if the worker already
    /// finished.
    pub fn try_harvest(&mut self) -> Option<Result<VoxelLattice>> {
        if self.status() == VoxelStatus::Finished {
            self.join()
        } else {
            None
        }
    }
}

impl Default for VoxelWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for VoxelWorker {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn lock_slot(slot: &LatticeSlot) -> std::sync::MutexGuard<'_, Option<Result<VoxelLattice>>> {
    // A poisoned slot only means the worker panicked after storing; the
    // data inside is still the last coherent value.
    match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Vec3;

    fn tiny_lattice() -> Result<VoxelLattice> {
        VoxelLattice::build(Vec3::ZERO, Vec3::splat(3.0), 1.0)
    }

    #[test]
    fn test_fresh_worker_is_not_started() {
        let worker = VoxelWorker::new();
        assert_eq!(worker.status(), VoxelStatus::NotStarted);
    }

    #[test]
    fn test_job_runs_and_result_is_collected() {
        let mut worker = VoxelWorker::new();
        worker.start(tiny_lattice);
        let result = worker.join().expect("job should produce a result");
        let lattice = result.unwrap();
        assert_eq!(lattice.len(), 27);
        // The slot is drained after a take.
        assert!(worker.join().is_none());
    }

    #[test]
    fn test_finished_worker_restarts_fresh() {
        let mut worker = VoxelWorker::new();
        worker.start(tiny_lattice);
        while worker.status() != VoxelStatus::Finished {
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
        // Second start joins the finished job and spawns a new one.
        worker.start(|| VoxelLattice::build(Vec3::ZERO, Vec3::splat(4.0), 1.0));
        let lattice = worker.join().unwrap().unwrap();
        assert_eq!(lattice.len(), 64);
    }

    #[test]
    fn test_busy_worker_ignores_new_requests() {
        let mut worker = VoxelWorker::new();
        let gate = Arc::new(Mutex::new(()));
        let held = gate.lock().unwrap();
        {
            let gate = Arc::clone(&gate);
            worker.start(move || {
                let _wait = lock_gate(&gate);
                tiny_lattice()
            });
        }
        assert_eq!(worker.status(), VoxelStatus::Ongoing);
        // This request must be dropped, not queued.
        worker.start(|| VoxelLattice::build(Vec3::ZERO, Vec3::splat(9.0), 1.0));
        drop(held);
        let lattice = worker.join().unwrap().unwrap();
        assert_eq!(lattice.len(), 27);
    }

    fn lock_gate(gate: &Arc<Mutex<()>>) -> std::sync::MutexGuard<'_, ()> {
        match gate.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        }
    }

    #[test]
    fn test_error_results_travel_through_the_slot() {
        let mut worker = VoxelWorker::new();
        worker.start(|| VoxelLattice::build(Vec3::ZERO, Vec3::splat(1.0), 2.0));
        let result = worker.join().unwrap();
        assert!(result.is_err());
    }
}
