//! Preemption tasks that run between slow-path attempts.
//!
//! While a slow path is in flight, other threads can park exactly one task
//! here. The coordinator drains the slot once per
//! [`try_commit_epoch`](crate::epoch::TypecheckEpochManager::try_commit_epoch),
//! right after the commit or rollback, which is the first moment the task can
//! no longer race with a running slow path.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::epoch::TypecheckEpochManager;

type PreemptionTask = Box<dyn FnOnce() + Send>;

/// Single-slot scheduler for work that must wait out the current slow path.
///
/// A task may call
/// [`get_status`](TypecheckEpochManager::get_status)/
/// [`with_epoch_lock`](TypecheckEpochManager::with_epoch_lock) but no
/// mutating coordinator operation. The coordinator invokes
/// [`try_run_scheduled_preemption_task`](Self::try_run_scheduled_preemption_task)
/// at most once per attempt, so the hook is never reentered.
pub struct PreemptionTaskManager {
    epochs: Arc<TypecheckEpochManager>,
    task: Mutex<Option<PreemptionTask>>,
}

impl PreemptionTaskManager {
    /// Create a manager bound to the given coordinator.
    pub fn new(epochs: Arc<TypecheckEpochManager>) -> Self {
        Self {
            epochs,
            task: Mutex::new(None),
        }
    }

    /// Park `task` to run after the current slow path commits or rolls back.
    ///
    /// Fails when no slow path is in flight (the task would never be
    /// drained) or when a task is already parked; callers retry on their
    /// next occasion.
    pub fn try_schedule_preemption_task(&self, task: impl FnOnce() + Send + 'static) -> bool {
        let mut slot = self.task.lock();
        if slot.is_some() {
            return false;
        }
        if !self.epochs.get_status().slow_path_running {
            return false;
        }
        *slot = Some(Box::new(task));
        debug!("preemption task scheduled");
        true
    }

    /// Run the parked task, if any. Returns whether a task ran.
    pub fn try_run_scheduled_preemption_task(&self) -> bool {
        // Release the slot before running so the task itself may schedule
        // or cancel.
        let task = self.task.lock().take();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Drop the parked task without running it. Returns whether one was
    /// parked.
    pub fn try_cancel_scheduled_preemption_task(&self) -> bool {
        self.task.lock().take().is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::epoch::Epoch;

    #[test]
    fn test_schedule_requires_running_slow_path() {
        let epochs = Arc::new(TypecheckEpochManager::new());
        let preemption = PreemptionTaskManager::new(Arc::clone(&epochs));

        assert!(!preemption.try_schedule_preemption_task(|| {}));

        epochs.start_commit_epoch(Epoch::new(1), Epoch::new(2));
        assert!(preemption.try_schedule_preemption_task(|| {}));
    }

    #[test]
    fn test_only_one_task_at_a_time() {
        let epochs = Arc::new(TypecheckEpochManager::new());
        let preemption = PreemptionTaskManager::new(Arc::clone(&epochs));
        epochs.start_commit_epoch(Epoch::new(1), Epoch::new(2));

        assert!(preemption.try_schedule_preemption_task(|| {}));
        assert!(!preemption.try_schedule_preemption_task(|| {}));
    }

    #[test]
    fn test_run_drains_the_slot() {
        let epochs = Arc::new(TypecheckEpochManager::new());
        let preemption = PreemptionTaskManager::new(Arc::clone(&epochs));
        epochs.start_commit_epoch(Epoch::new(1), Epoch::new(2));

        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        assert!(preemption.try_schedule_preemption_task(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(preemption.try_run_scheduled_preemption_task());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        // Slot is empty now.
        assert!(!preemption.try_run_scheduled_preemption_task());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancel_drops_the_task() {
        let epochs = Arc::new(TypecheckEpochManager::new());
        let preemption = PreemptionTaskManager::new(Arc::clone(&epochs));
        epochs.start_commit_epoch(Epoch::new(1), Epoch::new(2));

        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        assert!(preemption.try_schedule_preemption_task(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(preemption.try_cancel_scheduled_preemption_task());
        assert!(!preemption.try_cancel_scheduled_preemption_task());
        assert!(!preemption.try_run_scheduled_preemption_task());
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_commit_drains_scheduled_task_on_success_and_rollback() {
        let epochs = Arc::new(TypecheckEpochManager::new());
        let preemption = PreemptionTaskManager::new(Arc::clone(&epochs));
        let runs = Arc::new(AtomicUsize::new(0));

        // Success path.
        epochs.start_commit_epoch(Epoch::new(10), Epoch::new(11));
        let counter = Arc::clone(&runs);
        assert!(preemption.try_schedule_preemption_task(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(epochs.try_commit_epoch(Epoch::new(11), true, Some(&preemption), || {}));
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        // Rollback path.
        epochs.start_commit_epoch(Epoch::new(11), Epoch::new(12));
        let counter = Arc::clone(&runs);
        assert!(preemption.try_schedule_preemption_task(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        epochs.try_cancel_slow_path(Epoch::new(13));
        assert!(!epochs.try_commit_epoch(Epoch::new(12), true, Some(&preemption), || {}));
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_task_may_query_status() {
        let epochs = Arc::new(TypecheckEpochManager::new());
        let preemption = PreemptionTaskManager::new(Arc::clone(&epochs));
        epochs.start_commit_epoch(Epoch::new(1), Epoch::new(2));

        let observed_running = Arc::new(AtomicUsize::new(usize::MAX));
        let cell = Arc::clone(&observed_running);
        let inner = Arc::clone(&epochs);
        assert!(preemption.try_schedule_preemption_task(move || {
            cell.store(inner.get_status().slow_path_running as usize, Ordering::SeqCst);
        }));

        assert!(epochs.try_commit_epoch(Epoch::new(2), true, Some(&preemption), || {}));
        // The task ran after the commit, with the slow path over.
        assert_eq!(observed_running.load(Ordering::SeqCst), 0);
    }
}
