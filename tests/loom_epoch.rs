//! Loom-based model-checked tests for the epoch commit/cancel protocol.
//!
//! These tests replicate the three-counter algorithm from
//! `src/epoch/manager.rs` in a self-contained test-local struct that uses
//! loom atomics and a loom mutex. This lets Loom's model checker
//! exhaustively explore thread interleavings WITHOUT modifying any
//! production code (the production type pins thread identities and uses
//! `parking_lot`, which Loom does not instrument).
//!
//! Run with:
//! ```bash
//! cargo test --test loom_epoch
//! ```

use loom::sync::Arc;
use loom::sync::Mutex;
use loom::sync::atomic::{AtomicU32, Ordering};
use loom::thread;

/// Minimal replica of `TypecheckEpochManager`'s counters and lock
/// discipline: every write happens under the mutex, the cancellation poll
/// reads lock-free.
struct TestEpochs {
    committed: AtomicU32,
    processing: AtomicU32,
    invalidator: AtomicU32,
    mutex: Mutex<()>,
}

impl TestEpochs {
    /// State right after `start_commit_epoch(from, to)`.
    fn started(from: u32, to: u32) -> Self {
        Self {
            committed: AtomicU32::new(from),
            processing: AtomicU32::new(to),
            invalidator: AtomicU32::new(to),
            mutex: Mutex::new(()),
        }
    }

    /// Mirrors `try_cancel_slow_path`.
    fn try_cancel(&self, new_epoch: u32) -> bool {
        let _guard = self.mutex.lock().unwrap();
        let processing = self.processing.load(Ordering::Acquire);
        let committed = self.committed.load(Ordering::Acquire);
        if processing == committed || new_epoch == processing {
            return false;
        }
        self.invalidator.store(new_epoch, Ordering::Release);
        true
    }

    /// Mirrors the commit half of `try_commit_epoch` (the work thunk has
    /// already returned).
    fn try_commit(&self) -> bool {
        let _guard = self.mutex.lock().unwrap();
        let processing = self.processing.load(Ordering::Acquire);
        let invalidator = self.invalidator.load(Ordering::Acquire);
        if processing == invalidator {
            assert_ne!(
                self.committed.load(Ordering::Acquire),
                processing,
                "double commit"
            );
            self.committed.store(processing, Ordering::Release);
            true
        } else {
            let last_committed = self.committed.load(Ordering::Acquire);
            self.processing.store(last_committed, Ordering::Release);
            self.invalidator.store(last_committed, Ordering::Release);
            false
        }
    }

    /// Mirrors `was_typechecking_canceled` (no lock).
    fn was_canceled(&self) -> bool {
        self.invalidator.load(Ordering::Acquire) != self.processing.load(Ordering::Acquire)
    }

    fn snapshot(&self) -> (u32, u32, u32) {
        (
            self.committed.load(Ordering::Acquire),
            self.processing.load(Ordering::Acquire),
            self.invalidator.load(Ordering::Acquire),
        )
    }
}

/// The core race: a commit and a cancellation fight for the mutex after the
/// work finished. Exactly one of them wins, and each winner leaves the
/// machine in its documented idle state.
#[test]
fn test_loom_commit_vs_cancel() {
    loom::model(|| {
        let epochs = Arc::new(TestEpochs::started(10, 11));

        let committer = {
            let epochs = Arc::clone(&epochs);
            thread::spawn(move || epochs.try_commit())
        };
        let canceler = {
            let epochs = Arc::clone(&epochs);
            thread::spawn(move || epochs.try_cancel(12))
        };

        let committed = committer.join().unwrap();
        let canceled = canceler.join().unwrap();

        // Exactly one side wins.
        assert!(committed ^ canceled);

        let (c, p, inv) = epochs.snapshot();
        if committed {
            // Published epoch 11; the late cancel was a no-op.
            assert_eq!((c, p, inv), (11, 11, 11));
        } else {
            // Rolled back to the previously committed epoch.
            assert_eq!((c, p, inv), (10, 10, 10));
        }
        // Either way the machine is idle again.
        assert!(!epochs.was_canceled());
    });
}

/// A canceled attempt rolls back and re-opens at the cancel target, like
/// the real typecheck loop; the lock-free poll settles once the machine
/// reaches its final state, whichever interleaving got it there.
#[test]
fn test_loom_poll_settles_after_outcome() {
    loom::model(|| {
        let epochs = Arc::new(TestEpochs::started(10, 11));

        let committer = {
            let epochs = Arc::clone(&epochs);
            thread::spawn(move || {
                if !epochs.try_commit() {
                    let _guard = epochs.mutex.lock().unwrap();
                    epochs.processing.store(12, Ordering::Release);
                    epochs.invalidator.store(12, Ordering::Release);
                }
            })
        };
        let canceler = {
            let epochs = Arc::clone(&epochs);
            thread::spawn(move || epochs.try_cancel(12))
        };

        committer.join().unwrap();
        canceler.join().unwrap();

        let (c, p, inv) = epochs.snapshot();
        // Committed outright, or rolled back and restarted at 12.
        assert!((c, p, inv) == (11, 11, 11) || (c, p, inv) == (10, 12, 12));
        assert!(!epochs.was_canceled());
    });
}

/// Two cancellation requests with different targets: the invalidator holds
/// the last writer's target, and the commit still observes the divergence.
#[test]
fn test_loom_repeated_cancel_then_commit() {
    loom::model(|| {
        let epochs = Arc::new(TestEpochs::started(10, 11));

        let canceler = {
            let epochs = Arc::clone(&epochs);
            thread::spawn(move || {
                assert!(epochs.try_cancel(12));
                assert!(epochs.try_cancel(13));
            })
        };
        canceler.join().unwrap();

        let committer = {
            let epochs = Arc::clone(&epochs);
            thread::spawn(move || epochs.try_commit())
        };
        assert!(!committer.join().unwrap());
        assert_eq!(epochs.snapshot(), (10, 10, 10));
    });
}
