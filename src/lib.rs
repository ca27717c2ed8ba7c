//! oxityper - Concurrency core of a static type checker for a dynamic language
//!
//! The centerpiece is the epoch-based cancellation coordinator that lets a
//! long-running whole-program typecheck (the "slow path") be preempted by
//! newly arriving edits or short incremental typechecks (the "fast path") in
//! a language-server setting.
//!
//! # Features
//!
//! - Three-counter epoch protocol with cooperative cancellation and a
//!   lock-free poll for worker threads
//! - Preemption tasks drained between slow-path attempts
//! - CFG wire-format rendering for external consumers
//! - Counter aggregation with a statsd UDP sink
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use oxityper::{Epoch, PreemptionTaskManager, TypecheckEpochManager};
//!
//! let epochs = Arc::new(TypecheckEpochManager::new());
//! let preemption = PreemptionTaskManager::new(Arc::clone(&epochs));
//!
//! // Typecheck thread: open an epoch, run the slow path, try to publish.
//! epochs.start_commit_epoch(Epoch::new(10), Epoch::new(11));
//! let committed = epochs.try_commit_epoch(Epoch::new(11), true, Some(&preemption), || {
//!     // ... whole-program typecheck, polling epochs.was_typechecking_canceled() ...
//! });
//!
//! // Preprocess thread, on a new edit:
//! // epochs.try_cancel_slow_path(Epoch::new(12));
//! ```

#![warn(missing_docs)]

pub mod cfg;
pub mod config;
pub mod epoch;
pub mod stats;

// Re-exports for convenience
pub use epoch::{
    AtomicEpoch, Epoch, PreemptionTaskManager, TypecheckEpochManager, TypecheckingStatus,
};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::config::OxityperConfig;
    pub use crate::epoch::{
        Epoch, PreemptionTaskManager, TypecheckEpochManager, TypecheckingStatus,
    };
    pub use crate::stats::{Counters, StatsdClient};
}
