use rc::{DynamicRc, SyncRc};

use crate::{build_tree, WorkerThread};

/// Parameters of the multi-thread stress run: `workers` threads each
/// build `rounds` trees of the given shape and publish every one of them
/// into slot 0 of a shared global root.
#[derive(Debug, Clone)]
pub struct StressConfig {
    pub workers: usize,
    pub rounds: usize,
    pub field_length: usize,
    pub depth: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self { workers: 8, rounds: 100, field_length: 2, depth: 10 }
    }
}

/// Stress the dynamic handle: the global root is promoted to shared mode
/// before any worker exists (the global-root publication point), so every
/// `set` on it escalates the incoming tree and every replaced tree is
/// reclaimed under the atomic protocol.
pub fn run_dynamic(config: &StressConfig) {
    let _span =
        tracing::span!(tracing::Level::DEBUG, "stress", variant = "dynamic")
            .entered();

    let global = DynamicRc::allocate(config.field_length);
    global.mark_shared();

    let workers: Vec<_> = (0..config.workers)
        .map(|worker_id| {
            let global = global.clone();
            let config = config.clone();
            WorkerThread::spawn(move || {
                for _ in 0..config.rounds {
                    let tree =
                        build_tree::<DynamicRc>(config.field_length, config.depth);
                    global.set(0, Some(tree));
                }
                tracing::debug!(worker_id, "dynamic worker finished");
            })
        })
        .collect();

    for worker in workers {
        worker.join();
    }
    global.set(0, None);
}

/// Same schedule with the always-atomic handle; no marking involved.
pub fn run_sync(config: &StressConfig) {
    let _span =
        tracing::span!(tracing::Level::DEBUG, "stress", variant = "sync")
            .entered();

    let global = SyncRc::allocate(config.field_length);

    let workers: Vec<_> = (0..config.workers)
        .map(|worker_id| {
            let global = global.clone();
            let config = config.clone();
            WorkerThread::spawn(move || {
                for _ in 0..config.rounds {
                    let tree =
                        build_tree::<SyncRc>(config.field_length, config.depth);
                    global.set(0, Some(tree));
                }
                tracing::debug!(worker_id, "sync worker finished");
            })
        })
        .collect();

    for worker in workers {
        worker.join();
    }
    global.set(0, None);
}
