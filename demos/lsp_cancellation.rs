//! Slow-path cancellation demo
//!
//! Simulates the language-server loop: a typecheck thread opens commit
//! epochs and runs slow paths, worker "inference" loops poll the lock-free
//! cancellation check, and an edit thread cancels the attempt halfway
//! through. Counters from the run are printed at the end.
//!
//! Run: cargo run --example lsp_cancellation

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use oxityper::stats::Counters;
use oxityper::{Epoch, PreemptionTaskManager, TypecheckEpochManager};

/// A slow path: "typecheck" a batch of methods, polling for cancellation
/// between methods like the real inference workers do.
fn slow_path(epochs: &TypecheckEpochManager, methods: u32, counters: &mut Counters) {
    for _ in 0..methods {
        if epochs.was_typechecking_canceled() {
            counters.inc("slow_path.methods_abandoned");
            return;
        }
        // Stand-in for typechecking one method body.
        thread::sleep(Duration::from_millis(2));
        counters.inc("slow_path.methods_checked");
    }
}

fn main() {
    let epochs = Arc::new(TypecheckEpochManager::new());
    let preemption = Arc::new(PreemptionTaskManager::new(Arc::clone(&epochs)));

    println!("=== oxityper slow-path cancellation demo ===\n");

    // Edit thread: waits until the slow path is underway, then cancels it,
    // the way the preprocess thread reacts to a keystroke.
    let editor = {
        let epochs = Arc::clone(&epochs);
        let preemption = Arc::clone(&preemption);
        thread::spawn(move || {
            while !epochs.get_status().slow_path_running {
                thread::yield_now();
            }
            thread::sleep(Duration::from_millis(20));

            let scheduled = preemption.try_schedule_preemption_task(|| {
                println!("  [preemption] hover request answered between attempts");
            });
            println!("  [editor] preemption task scheduled: {scheduled}");

            let canceled = epochs.try_cancel_slow_path(Epoch::new(12));
            println!("  [editor] edit arrived, cancel requested: {canceled}");
        })
    };

    let mut counters = Counters::new();

    // Attempt 1: canceled halfway through.
    println!("--- attempt 1: slow path at epoch 11, edit arrives ---");
    epochs.start_commit_epoch(Epoch::new(10), Epoch::new(11));
    let started = Instant::now();
    let committed = epochs.try_commit_epoch(Epoch::new(11), true, Some(&preemption), || {
        slow_path(&epochs, 500, &mut counters);
    });
    counters.timing("slow_path", started.elapsed());
    println!("  committed: {committed}");
    println!("  status: {:?}", epochs.get_status());
    editor.join().unwrap();

    // Attempt 2: the retry at the edit's epoch runs uncontested. No fast
    // path committed in between, so the from epoch is unchanged.
    println!("\n--- attempt 2: retry at epoch 12 ---");
    epochs.start_commit_epoch(Epoch::new(10), Epoch::new(12));
    let started = Instant::now();
    let committed = epochs.try_commit_epoch(Epoch::new(12), true, Some(&preemption), || {
        slow_path(&epochs, 25, &mut counters);
    });
    counters.timing("slow_path", started.elapsed());
    println!("  committed: {committed}");
    println!("  status: {:?}", epochs.get_status());

    println!("\n--- counters ---");
    for (name, value) in counters.counters() {
        println!("  {name}: {value}");
    }
    for (name, samples) in counters.timings() {
        for ns in samples {
            println!("  {name}.duration_ns: {ns}");
        }
    }
}
