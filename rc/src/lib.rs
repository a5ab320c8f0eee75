//! Eager reference counting over `object` heap nodes, in four protocols.
//!
//! - [`SoloRc`] — single-thread only, plain count arithmetic, no locking.
//! - [`SyncRc`] — thread-safe everywhere: atomic counts, per-node
//!   spin-lock around field access.
//! - [`DynamicRc`] — decides per operation which of the two protocols to
//!   run, based on the node's monotonic shared flag. The interesting one;
//!   `dynamic.rs` carries the correctness argument.
//! - [`ManualRef`] — no counting at all, explicit teardown. Benchmark
//!   baseline.
//!
//! Handles are values: cloning one adds a reference, dropping one removes
//! it, and the node is freed by the unique drop that takes the count from
//! one to zero. Field writes take ownership of the incoming handle and
//! release the previous occupant; field reads clone the occupant out.

mod dynamic;
mod manual;
mod solo;
mod sync;

pub use dynamic::DynamicRc;
pub use manual::ManualRef;
pub use solo::SoloRc;
pub use sync::SyncRc;

#[cfg(test)]
pub(crate) static COUNT_GATE: parking_lot::Mutex<()> =
    parking_lot::Mutex::new(());
