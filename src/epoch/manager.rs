//! The epoch coordinator shared by the preprocess, typecheck and worker
//! threads.
//!
//! Three wrapping counters encode the whole protocol:
//!
//! - `committed` is the epoch of the last slow path whose results the outside
//!   world may rely on.
//! - `processing` is the epoch of the slow path currently being attempted.
//! - `invalidator` is the epoch the attempt is supposed to land on; when a
//!   cancellation is requested it is bumped past `processing`, and the two
//!   diverging is what "canceled" means.
//!
//! All writes happen under one mutex. The single lock-free read,
//! [`TypecheckEpochManager::was_typechecking_canceled`], tolerates staleness
//! in both directions, which is what lets worker threads poll it from inner
//! loops.

use std::sync::atomic::Ordering;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;
use tracing::debug;

use crate::epoch::preemption::PreemptionTaskManager;
use crate::epoch::{AtomicEpoch, Epoch};

/// Snapshot of the coordinator's state, derived from the three counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypecheckingStatus {
    /// Whether a slow path is currently in flight.
    pub slow_path_running: bool,
    /// Whether the in-flight slow path has been requested-canceled.
    pub slow_path_canceled: bool,
    /// Epoch of the last committed slow path.
    pub committed_epoch: Epoch,
    /// Epoch of the slow path currently being attempted.
    pub processing_epoch: Epoch,
}

impl TypecheckingStatus {
    /// Derive a status from counter values.
    ///
    /// `processing != committed` means a slow path is in flight;
    /// `processing != invalidator` means it has been requested-canceled.
    pub fn derive(committed: Epoch, processing: Epoch, invalidator: Epoch) -> Self {
        Self {
            slow_path_running: processing != committed,
            slow_path_canceled: processing != invalidator,
            committed_epoch: committed,
            processing_epoch: processing,
        }
    }
}

/// Thread-identity slots for the two pinned roles.
///
/// Each slot is claimed by the first thread that invokes a pinned operation
/// and is never reassigned.
#[derive(Debug, Default)]
struct ThreadSlots {
    preprocess: Option<ThreadId>,
    typecheck: Option<ThreadId>,
}

/// Pin `slot` to the calling thread, or die if another thread owns it.
///
/// Must be called with the coordinator's mutex held.
fn assert_consistent_thread(slot: &mut Option<ThreadId>, method: &str, thread_name: &str) {
    let current = thread::current().id();
    match slot {
        None => *slot = Some(current),
        Some(pinned) => {
            if *pinned != current {
                panic!("{method} can only be called by the {thread_name} thread");
            }
        }
    }
}

/// Coordinates cancelable slow-path typechecking across threads.
///
/// Exactly three roles interact with the coordinator: the typecheck thread
/// opens epochs and commits them, the preprocess thread requests
/// cancellation, and worker threads poll
/// [`was_typechecking_canceled`](Self::was_typechecking_canceled). The two
/// named roles are pinned to the first thread that uses them.
///
/// Created once per process; all counters start at zero, which is the idle
/// state (`committed == processing == invalidator`).
#[derive(Debug)]
pub struct TypecheckEpochManager {
    /// Epoch of the last committed slow path. Fast-path commits are folded
    /// in retroactively by the `from` argument of the next
    /// [`start_commit_epoch`](Self::start_commit_epoch).
    committed: AtomicEpoch,
    /// Epoch of the slow path currently being attempted.
    processing: AtomicEpoch,
    /// Epoch the current attempt is supposed to reach; diverges from
    /// `processing` once a cancellation has been requested.
    invalidator: AtomicEpoch,
    /// Guards every counter write and the thread-identity slots. The work
    /// thunk passed to [`try_commit_epoch`](Self::try_commit_epoch) is the
    /// only long-running computation, and it runs outside this lock.
    state: Mutex<ThreadSlots>,
}

impl Default for TypecheckEpochManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TypecheckEpochManager {
    /// Create an idle coordinator.
    pub fn new() -> Self {
        Self {
            committed: AtomicEpoch::new(Epoch::new(0)),
            processing: AtomicEpoch::new(Epoch::new(0)),
            invalidator: AtomicEpoch::new(Epoch::new(0)),
            state: Mutex::new(ThreadSlots::default()),
        }
    }

    /// Open a slow-path attempt at epoch `to_epoch`.
    ///
    /// `from_epoch` is the epoch of the most recent fast-path commit; the
    /// implicit `(from, to]` range acknowledges every fast path that
    /// committed since the last slow path, all at once. Tracking them here
    /// rather than after each fast path keeps the accounting in one place
    /// and makes the caller state the range explicitly.
    ///
    /// # Panics
    ///
    /// `from_epoch == to_epoch`, or `to_epoch` equal to the processing or
    /// committed epoch, is a caller bug and fatal. Note that epochs wrap, so
    /// there is no way to check that `to_epoch` is not moving backwards in
    /// time; that part of the contract stays with the caller.
    pub fn start_commit_epoch(&self, from_epoch: Epoch, to_epoch: Epoch) {
        let _slots = self.state.lock();
        assert!(
            from_epoch != to_epoch,
            "start_commit_epoch: the (from, to] commit range must be non-empty"
        );
        assert!(
            to_epoch != self.processing.load(Ordering::Acquire),
            "start_commit_epoch: epoch {to_epoch} is already being processed"
        );
        assert!(
            to_epoch != self.committed.load(Ordering::Acquire),
            "start_commit_epoch: epoch {to_epoch} is already committed"
        );
        self.processing.store(to_epoch, Ordering::Release);
        self.invalidator.store(to_epoch, Ordering::Release);
        self.committed.store(from_epoch, Ordering::Release);
    }

    /// Lock-free check used by worker threads to notice cancellation.
    ///
    /// No lock is taken, so the answer can be transiently stale in either
    /// direction; pollers simply re-check on their next iteration.
    #[inline]
    pub fn was_typechecking_canceled(&self) -> bool {
        self.invalidator.load(Ordering::Acquire) != self.processing.load(Ordering::Acquire)
    }

    /// Request cancellation of the in-flight slow path, naming `new_epoch`
    /// as the epoch the next attempt should reach.
    ///
    /// Returns `true` when a running slow path has been marked canceled.
    /// That does not mean the typecheck thread has observed it yet;
    /// observation is cooperative via
    /// [`was_typechecking_canceled`](Self::was_typechecking_canceled).
    /// Repeated requests are fine; the last `new_epoch` wins.
    ///
    /// May only be called from the preprocess thread.
    pub fn try_cancel_slow_path(&self, new_epoch: Epoch) -> bool {
        let mut slots = self.state.lock();
        assert_consistent_thread(&mut slots.preprocess, "try_cancel_slow_path", "preprocess");

        let processing = self.processing.load(Ordering::Acquire);
        // Canceling with the processing epoch would be indistinguishable
        // from the attempt having completed.
        debug_assert!(
            new_epoch != processing,
            "try_cancel_slow_path: new_epoch {new_epoch} equals the processing epoch"
        );
        let committed = self.committed.load(Ordering::Acquire);
        // The second condition is unreachable if the assert above held, but
        // guard against it in release builds.
        if processing == committed || new_epoch == processing {
            return false;
        }
        self.invalidator.store(new_epoch, Ordering::Release);
        debug!(epoch = %processing, target = %new_epoch, "slow path marked canceled");
        true
    }

    /// Run `typecheck` and publish its epoch, unless it was canceled.
    ///
    /// In non-cancelable mode (`cancelable == false`, used for the initial
    /// compile and for non-LSP runs) the thunk runs and the result is
    /// committed unconditionally, without touching the epoch counters. An
    /// open commit epoch in that mode is a caller bug and fatal.
    ///
    /// In cancelable mode, [`start_commit_epoch`](Self::start_commit_epoch)
    /// must already have opened `epoch`. The thunk runs outside the mutex so
    /// that the preprocess thread can take it for
    /// [`try_cancel_slow_path`](Self::try_cancel_slow_path) in the meantime.
    /// Afterwards, under the mutex: if no cancellation arrived the epoch is
    /// committed, otherwise all counters roll back to the last committed
    /// epoch and `false` is returned. Either way, a supplied
    /// `preemption_manager` gets one
    /// [`try_run_scheduled_preemption_task`](PreemptionTaskManager::try_run_scheduled_preemption_task)
    /// call after the mutex is released: with the slow path over, a task
    /// scheduled during it is safe to run, and no new slow path can begin
    /// before this method returns.
    ///
    /// May only be called from the typecheck thread.
    pub fn try_commit_epoch<F>(
        &self,
        epoch: Epoch,
        cancelable: bool,
        preemption_manager: Option<&PreemptionTaskManager>,
        typecheck: F,
    ) -> bool
    where
        F: FnOnce(),
    {
        {
            let mut slots = self.state.lock();
            assert_consistent_thread(&mut slots.typecheck, "try_commit_epoch", "typecheck");
            if cancelable {
                assert!(
                    self.processing.load(Ordering::Acquire) == epoch,
                    "try_commit_epoch: no start_commit_epoch(_, {epoch}) preceded this call"
                );
            } else {
                assert!(
                    self.processing.load(Ordering::Acquire)
                        == self.committed.load(Ordering::Acquire),
                    "try_commit_epoch: non-cancelable run with a commit epoch open"
                );
            }
        }

        if !cancelable {
            typecheck();
            return true;
        }

        // Runs outside the mutex; holding it here would block
        // try_cancel_slow_path for the duration of the typecheck.
        typecheck();

        let committed;
        {
            let _slots = self.state.lock();
            let processing = self.processing.load(Ordering::Acquire);
            let invalidator = self.invalidator.load(Ordering::Acquire);
            if processing == invalidator {
                assert!(
                    self.committed.load(Ordering::Acquire) != processing,
                    "try_commit_epoch: epoch {processing} is already committed"
                );
                self.committed.store(processing, Ordering::Release);
                committed = true;
            } else {
                // Canceled. Fold the attempt back into the last committed
                // epoch; the caller discards its work and waits for the next
                // start_commit_epoch.
                let last_committed = self.committed.load(Ordering::Acquire);
                self.processing.store(last_committed, Ordering::Release);
                self.invalidator.store(last_committed, Ordering::Release);
                committed = false;
            }
        }
        debug!(epoch = %epoch, committed, "slow path finished");

        if let Some(preemption_manager) = preemption_manager {
            // The slow path is over either way, so a preemption task that
            // snuck in while it was finishing up can run now. No others can
            // be scheduled until the next start_commit_epoch.
            preemption_manager.try_run_scheduled_preemption_task();
        }
        committed
    }

    /// Take a consistent status snapshot.
    pub fn get_status(&self) -> TypecheckingStatus {
        let _slots = self.state.lock();
        self.status_internal()
    }

    /// Run `f` with a consistent status snapshot while holding the mutex.
    ///
    /// Intended for compound read-then-decide logic that must not race with
    /// counter writes. `f` must not call back into the coordinator.
    pub fn with_epoch_lock<R>(&self, f: impl FnOnce(TypecheckingStatus) -> R) -> R {
        let _slots = self.state.lock();
        f(self.status_internal())
    }

    fn status_internal(&self) -> TypecheckingStatus {
        TypecheckingStatus::derive(
            self.committed.load(Ordering::Acquire),
            self.processing.load(Ordering::Acquire),
            self.invalidator.load(Ordering::Acquire),
        )
    }
}
