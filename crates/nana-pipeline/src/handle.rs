//! A cloneable handle for stopping and observing the orchestrator.

use parking_lot::Mutex;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio_util::sync::CancellationToken;

use crate::task::Progress;

/// A cloneable handle for stopping and observing the orchestrator from
/// external code.
///
/// All fields are `Arc`-wrapped, so cloning is cheap.
#[derive(Clone)]
pub struct OrchestratorHandle {
    pub(crate) cancel: Arc<Mutex<CancellationToken>>,
    pub(crate) progress: Arc<Mutex<Progress>>,
    pub(crate) is_running: Arc<AtomicBool>,
    pub(crate) is_busy: Arc<AtomicBool>,
}

impl OrchestratorHandle {
    pub(crate) fn new() -> Self {
        Self {
            cancel: Arc::new(Mutex::new(CancellationToken::new())),
            progress: Arc::new(Mutex::new(Progress::default())),
            is_running: Arc::new(AtomicBool::new(false)),
            is_busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Stop the generation in flight. Fan-out tasks are not affected.
    pub fn stop(&self) {
        self.cancel.lock().cancel();
    }

    /// Install a fresh token for the next task and return it.
    pub(crate) fn begin_task(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.cancel.lock() = token.clone();
        token
    }

    /// Whether a single generation is in flight.
    pub fn is_busy(&self) -> bool {
        self.is_busy.load(Ordering::Acquire)
    }

    /// Whether a run (single, batch or pipeline) is in progress.
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Acquire)
    }

    pub fn progress(&self) -> Progress {
        *self.progress.lock()
    }

    /// Claim the run slot. Returns `None` if another run holds it.
    pub(crate) fn try_begin_run(&self) -> Option<RunGuard> {
        self.is_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard {
                handle: self.clone(),
            })
    }
}

/// Releases the run slot on drop.
pub(crate) struct RunGuard {
    handle: OrchestratorHandle,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.handle.is_running.store(false, Ordering::Release);
    }
}

/// Clears the busy flag on drop, so it is reset on every exit path.
pub(crate) struct BusyGuard {
    handle: OrchestratorHandle,
}

impl BusyGuard {
    pub(crate) fn new(handle: &OrchestratorHandle) -> Self {
        handle.is_busy.store(true, Ordering::Release);
        Self {
            handle: handle.clone(),
        }
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.handle.is_busy.store(false, Ordering::Release);
    }
}
