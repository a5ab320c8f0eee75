//! Harness around the counting engines: tree builder, worker threads and
//! the multi-thread stress runner used by the CLI, the benchmarks and the
//! end-to-end validation tests.

mod stress;
mod tree;
mod worker;

pub use stress::{run_dynamic, run_sync, StressConfig};
pub use tree::{build_tree, TreeRef};
pub use worker::WorkerThread;
