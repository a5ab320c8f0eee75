//! Heap node layout and raw allocation for the counting engines.
//!
//! A node is one contiguous block: a [`Node`] header followed by a
//! fixed-arity vector of pointer slots. Everything above this crate
//! (the handle protocols in `rc`) manipulates nodes exclusively through
//! the primitives exported here.

mod alloc;
mod header;

#[cfg(feature = "validation")]
pub use alloc::live_nodes;
pub use alloc::{allocate, deallocate};
pub use header::{FieldLock, Node};
