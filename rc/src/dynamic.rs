//! Reference counting that switches per node between the solo and the
//! thread-safe protocol at runtime.
//!
//! Synchronized count updates and locking are pure overhead for objects
//! that never leave their allocating thread, which in practice is most of
//! them. This handle avoids that cost by branching on a one-bit header
//! flag, `shared`: while it is false the node runs the plain protocol of
//! [`crate::SoloRc`], once it is true the node runs the atomic protocol
//! of [`crate::SyncRc`]. The flag is monotonic — false→true at most once,
//! never back.
//!
//! The host runtime embedding this engine supplies two facts that make
//! the scheme sound:
//!
//! 1. Every point where a node first becomes reachable from a second
//!    thread is statically known: process-global roots (shared from
//!    process start) and values bound to a thread-spawn argument. The
//!    host calls [`DynamicRc::mark_shared`] at exactly those points.
//! 2. Every other multi-thread exposure is indirect, by reachability
//!    through the fields of an already-shared node. The engine covers
//!    that case itself: before a node is stored into a field of a shared
//!    parent, [`DynamicRc::set`] first marks the whole incoming subtree.
//!
//! Together these give the closure invariant: if a node is shared, so is
//! everything reachable from it, and the flag is set *before* the node
//! can be observed by another thread.
//!
//! Why plain (Relaxed) loads and stores are enough for the flag:
//!
//! - Before the flag flips, only the owning thread can reach the node, so
//!   there is nothing to order.
//! - The flip happens during the propagation walk, immediately before the
//!   writer publishes the subtree by storing into a shared parent's slot
//!   under that parent's field lock. The unlock (Release) paired with a
//!   later reader's lock (Acquire) carries the flag stores along with the
//!   slot store.
//! - After publication the flag is never written again, so every
//!   subsequent load observes true.
//!
//! There is no ordering requirement left for the flag accesses
//! themselves, and no atomic read-modify-write anywhere on the solo path.

use std::ptr::{self, NonNull};
use std::sync::atomic::{fence, Ordering};

use object::{allocate, deallocate, Node};

/// Mode-switching reference-counted handle. See the module docs for the
/// protocol and its correctness argument.
pub struct DynamicRc {
    node: NonNull<Node>,
}

// SAFETY: sound only under the host contract described in the module
// docs — a handle may cross a thread boundary solely after `mark_shared`
// ran on it (or on an ancestor it was reached through); from then on the
// node runs the atomic protocol
unsafe impl Send for DynamicRc {}
// SAFETY: see Send
unsafe impl Sync for DynamicRc {}

#[inline(always)]
fn retain(node: &Node) {
    if node.is_shared() {
        node.retain_atomic();
    } else {
        node.retain_plain();
    }
}

/// Drop one reference, returning the previous count. On the final
/// decrement of a shared node the Acquire fence is already issued.
#[inline(always)]
fn release(node: &Node) -> usize {
    if node.is_shared() {
        let previous = node.release_atomic();
        if previous == 1 {
            fence(Ordering::Acquire);
        }
        previous
    } else {
        node.release_plain()
    }
}

impl DynamicRc {
    /// Allocate a fresh solo-mode node with `field_length` null slots.
    pub fn allocate(field_length: usize) -> Self {
        Self { node: allocate(field_length) }
    }

    /// Adopt an already-counted pointer without touching the count.
    ///
    /// # Safety
    ///
    /// `node` must be live and one unit of its count must belong to the
    /// caller.
    pub(crate) unsafe fn adopt(node: NonNull<Node>) -> Self {
        Self { node }
    }

    #[inline(always)]
    fn node(&self) -> &Node {
        // SAFETY: a handle keeps its node alive
        unsafe { self.node.as_ref() }
    }

    #[inline(always)]
    pub fn field_length(&self) -> usize {
        self.node().field_length()
    }

    /// Count at this quiescent point.
    #[inline(always)]
    pub fn reference_count(&self) -> usize {
        self.node().reference_count()
    }

    #[inline(always)]
    pub fn is_shared(&self) -> bool {
        self.node().is_shared()
    }

    /// Promote this node and its entire reachable subgraph to shared
    /// mode. The host calls this at its publication points: global-root
    /// initialization and thread-spawn argument binding.
    ///
    /// The subgraph must be quiescent: no other thread may be running
    /// solo-protocol operations on any node reachable from here while the
    /// walk runs. A freshly built tree that has not crossed a thread
    /// boundary satisfies this trivially.
    pub fn mark_shared(&self) {
        // SAFETY: a handle keeps its subgraph alive; quiescence is the
        // documented caller obligation
        unsafe { self.node().mark_shared() };
    }

    /// Replace slot `index` with `child`, taking ownership of the handle.
    ///
    /// The incoming child is retained under *its own* mode first (a solo
    /// child of a solo parent must not pay for an atomic add). If the
    /// parent is shared, the incoming subtree is marked shared before the
    /// parent's lock is taken, so by the time any other thread can reach
    /// the subtree every node in it already runs the atomic protocol.
    pub fn set(&self, index: usize, child: Option<DynamicRc>) {
        let node = self.node();
        let incoming = match &child {
            Some(child) => {
                retain(child.node());
                child.node.as_ptr()
            }
            None => ptr::null_mut(),
        };

        let old = if node.is_shared() {
            if let Some(child) = &child {
                child.mark_shared();
            }
            let _lock = node.lock_fields();
            // SAFETY: in range per the handle contract, lock held
            unsafe { node.swap_field(index, incoming) }
        } else {
            // SAFETY: in range; solo nodes are single-thread by contract
            unsafe { node.swap_field(index, incoming) }
        };

        if let Some(old) = NonNull::new(old) {
            // SAFETY: the slot owned one reference to the old occupant
            drop(unsafe { DynamicRc::adopt(old) });
        }
    }

    /// Clone slot `index` out into a new handle.
    pub fn get(&self, index: usize) -> Option<DynamicRc> {
        let node = self.node();
        let child = if node.is_shared() {
            let _lock = node.lock_fields();
            // SAFETY: in range per the handle contract, lock held
            let child = NonNull::new(unsafe { node.field(index) })?;
            // Closure invariant: a shared parent only ever holds shared
            // children, so no mode branch is needed here.
            // SAFETY: the slot keeps the child live while we hold the lock
            unsafe { child.as_ref() }.retain_atomic();
            child
        } else {
            // SAFETY: in range; solo nodes are single-thread by contract
            let child = NonNull::new(unsafe { node.field(index) })?;
            // A solo parent may point at a shared child (a handle read
            // from a shared node and stored here), so the child's own
            // flag picks the increment.
            // SAFETY: the slot keeps the child live
            retain(unsafe { child.as_ref() });
            child
        };
        // SAFETY: the increment above is ours to adopt
        Some(unsafe { DynamicRc::adopt(child) })
    }
}

impl Clone for DynamicRc {
    fn clone(&self) -> Self {
        retain(self.node());
        Self { node: self.node }
    }
}

impl Drop for DynamicRc {
    fn drop(&mut self) {
        if release(self.node()) == 1 {
            // SAFETY: this was the last reference; for shared nodes the
            // Acquire fence in `release` ordered all prior writes
            unsafe { release_fields(self.node) };
        }
    }
}

/// Worklist reclamation; each child is released under its own mode.
unsafe fn release_fields(root: NonNull<Node>) {
    let mut pending = vec![root];
    while let Some(current) = pending.pop() {
        // SAFETY: every pending node reached count zero
        let node = unsafe { current.as_ref() };
        for index in 0..node.field_length() {
            // SAFETY: in range; the node is unreachable except from here
            let child = unsafe { node.field(index) };
            if let Some(child) = NonNull::new(child) {
                // SAFETY: the slot still owns a reference to the child
                if release(unsafe { child.as_ref() }) == 1 {
                    pending.push(child);
                }
            }
        }
        // SAFETY: freed exactly once, by the decrement that hit zero
        unsafe { deallocate(current) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::COUNT_GATE;
    use std::thread;

    fn build_tree(field_length: usize, depth: usize) -> DynamicRc {
        let node = DynamicRc::allocate(field_length);
        if depth > 1 {
            for index in 0..field_length {
                node.set(index, Some(build_tree(field_length, depth - 1)));
            }
        }
        node
    }

    fn assert_subtree_shared(node: &DynamicRc, expected: bool) {
        assert_eq!(node.is_shared(), expected);
        for index in 0..node.field_length() {
            if let Some(child) = node.get(index) {
                assert_subtree_shared(&child, expected);
            }
        }
    }

    #[test]
    fn solo_usage_never_escalates() {
        let _g = COUNT_GATE.lock();
        let root = build_tree(2, 5);
        let copy = root.clone();
        drop(copy);
        root.set(0, Some(DynamicRc::allocate(2)));
        let _child = root.get(0);
        assert_subtree_shared(&root, false);
    }

    #[test]
    fn mark_shared_promotes_the_subgraph() {
        let _g = COUNT_GATE.lock();
        let root = build_tree(2, 4);
        root.mark_shared();
        assert_subtree_shared(&root, true);
    }

    #[test]
    fn attach_to_shared_parent_marks_the_incoming_subtree() {
        let _g = COUNT_GATE.lock();
        let global = DynamicRc::allocate(2);
        global.mark_shared();

        let subtree = build_tree(2, 5);
        let probe = subtree.clone();
        assert!(!probe.is_shared());

        global.set(0, Some(subtree));
        assert_subtree_shared(&probe, true);
    }

    #[test]
    fn attach_to_solo_parent_stays_plain() {
        let _g = COUNT_GATE.lock();
        let parent = DynamicRc::allocate(1);
        let child = build_tree(2, 3);
        let probe = child.clone();
        parent.set(0, Some(child));
        assert!(!parent.is_shared());
        assert_subtree_shared(&probe, false);
    }

    #[test]
    fn shared_flag_is_monotonic_across_operations() {
        let _g = COUNT_GATE.lock();
        let root = DynamicRc::allocate(1);
        root.mark_shared();
        root.set(0, Some(DynamicRc::allocate(0)));
        root.set(0, None);
        let copy = root.clone();
        drop(copy);
        assert!(root.is_shared());
    }

    #[test]
    fn self_reference_round_trip() {
        let _g = COUNT_GATE.lock();
        let node = DynamicRc::allocate(1);
        node.mark_shared();
        let before = node.reference_count();

        node.set(0, Some(node.clone()));
        assert_eq!(node.reference_count(), before + 1);

        node.set(0, None);
        assert_eq!(node.reference_count(), before);
    }

    #[test]
    fn replacing_a_slot_with_itself_does_not_free() {
        let _g = COUNT_GATE.lock();
        let parent = DynamicRc::allocate(1);
        let child = DynamicRc::allocate(0);
        parent.set(0, Some(child.clone()));
        assert_eq!(child.reference_count(), 2);

        // generic path: increment the incoming, swap, release the old
        let occupant = parent.get(0).expect("occupied");
        parent.set(0, Some(occupant));
        assert_eq!(child.reference_count(), 2);
        assert_eq!(child.field_length(), 0);
    }

    #[test]
    fn replacement_updates_both_counts() {
        let _g = COUNT_GATE.lock();
        let parent = DynamicRc::allocate(1);
        let first = DynamicRc::allocate(0);
        let second = DynamicRc::allocate(0);
        let first_probe = first.clone();
        let second_probe = second.clone();

        parent.set(0, Some(first));
        assert_eq!(first_probe.reference_count(), 2);

        parent.set(0, Some(second));
        assert_eq!(first_probe.reference_count(), 1);
        assert_eq!(second_probe.reference_count(), 2);
    }

    #[test]
    fn reattaching_a_marked_subtree_is_pruned_at_its_root() {
        let _g = COUNT_GATE.lock();
        let first_global = DynamicRc::allocate(1);
        first_global.mark_shared();
        let second_global = DynamicRc::allocate(1);
        second_global.mark_shared();

        let subtree = build_tree(2, 4);
        let probe = subtree.clone();
        first_global.set(0, Some(subtree));
        assert!(probe.is_shared());

        // already marked: the propagation walk stops at the root
        let moved = first_global.get(0).expect("occupied");
        second_global.set(0, Some(moved));
        first_global.set(0, None);
        assert_subtree_shared(&probe, true);
    }

    #[cfg(feature = "validation")]
    #[test]
    fn solo_tree_build_and_teardown_balances() {
        let _g = COUNT_GATE.lock();
        let before = object::live_nodes();
        {
            let root = build_tree(2, 10);
            assert_subtree_shared(&root, false);
            assert_eq!(object::live_nodes(), before + 1023);
        }
        assert_eq!(object::live_nodes(), before);
    }

    #[cfg(feature = "validation")]
    #[test]
    fn workers_publishing_into_a_shared_global_leak_nothing() {
        let _g = COUNT_GATE.lock();
        let before = object::live_nodes();
        {
            let global = DynamicRc::allocate(1);
            global.mark_shared();
            thread::scope(|scope| {
                for _ in 0..4 {
                    let global = global.clone();
                    scope.spawn(move || {
                        for _ in 0..50 {
                            let tree = build_tree(2, 6);
                            global.set(0, Some(tree));
                        }
                    });
                }
            });
            global.set(0, None);
        }
        assert_eq!(object::live_nodes(), before);
    }

    #[cfg(feature = "validation")]
    #[test]
    fn deep_shared_chain_teardown_does_not_recurse() {
        let _g = COUNT_GATE.lock();
        let before = object::live_nodes();
        {
            let root = DynamicRc::allocate(1);
            let mut tail = root.clone();
            for _ in 0..100_000 {
                let next = DynamicRc::allocate(1);
                tail.set(0, Some(next.clone()));
                tail = next;
            }
            drop(tail);
            root.mark_shared();
        }
        assert_eq!(object::live_nodes(), before);
    }
}
