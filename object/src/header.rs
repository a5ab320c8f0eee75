use std::cell::UnsafeCell;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// The header at the start of every heap node, followed in the same
/// allocation by `field_length` pointer-sized field slots.
///
/// ```text
/// word 0:  count        — live handles + in-field references
/// word 1:  field_length — slot count, immutable after allocation
/// word 2:  shared (1 byte) | lock (1 byte) | padding
/// word 3…: field slots  — *mut Node or null
/// ```
///
/// `count` is a single [`AtomicUsize`] for both modes: solo mode uses
/// Relaxed load + store pairs (plain moves on an unshared location),
/// shared mode uses fetch_add/fetch_sub. `shared` is monotonic — it
/// transitions false→true at most once and is only ever accessed with
/// Relaxed ordering; the happens-before edge that publishes the flag is
/// the destination node's field lock (see [`Node::mark_shared`]).
#[repr(C)]
pub struct Node {
    count: AtomicUsize,
    field_length: usize,
    shared: AtomicBool,
    lock: AtomicBool,
    fields: [UnsafeCell<*mut Node>; 0],
}

const _: () = assert!(size_of::<Node>() == 3 * size_of::<usize>());
const _: () = assert!(align_of::<Node>() == align_of::<*mut Node>());

impl Node {
    pub(crate) fn new(field_length: usize) -> Self {
        Self {
            count: AtomicUsize::new(1),
            field_length,
            shared: AtomicBool::new(false),
            lock: AtomicBool::new(false),
            fields: [],
        }
    }

    #[inline(always)]
    pub fn field_length(&self) -> usize {
        self.field_length
    }

    /// Current count, Relaxed. Only meaningful at quiescent points.
    #[inline(always)]
    pub fn reference_count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    // ── count protocol primitives ──────────────────────────────────

    /// Solo-mode increment: plain load + store.
    #[inline(always)]
    pub fn retain_plain(&self) {
        let count = self.count.load(Ordering::Relaxed);
        self.count.store(count + 1, Ordering::Relaxed);
    }

    /// Shared-mode increment. Relaxed is enough: the incrementing thread
    /// already holds a live reference, so this cannot race the final
    /// decrement.
    #[inline(always)]
    pub fn retain_atomic(&self) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Solo-mode decrement. Returns the previous count; the caller
    /// reclaims on 1.
    #[inline(always)]
    pub fn release_plain(&self) -> usize {
        let count = self.count.load(Ordering::Relaxed);
        self.count.store(count - 1, Ordering::Relaxed);
        count
    }

    /// Shared-mode decrement, Release. Returns the previous count; a
    /// caller that observes 1 must issue an Acquire fence before touching
    /// the fields.
    #[inline(always)]
    pub fn release_atomic(&self) -> usize {
        self.count.fetch_sub(1, Ordering::Release)
    }

    // ── mode flag ──────────────────────────────────────────────────

    #[inline(always)]
    pub fn is_shared(&self) -> bool {
        self.shared.load(Ordering::Relaxed)
    }

    /// Mark this node and everything reachable from it as shared.
    ///
    /// Depth-first over an explicit worklist; already-marked nodes are
    /// pruned both before being pushed and when popped, so the walk visits
    /// each node at most once and re-attaching an already-marked subtree
    /// costs constant work at its root.
    ///
    /// # Safety
    ///
    /// Every non-null field pointer reachable from `self` must reference a
    /// live node, and no other thread may run solo-protocol operations on
    /// the subgraph while the walk runs.
    pub unsafe fn mark_shared(&self) {
        let mut pending: Vec<NonNull<Node>> = vec![NonNull::from(self)];
        while let Some(current) = pending.pop() {
            // SAFETY: pointers on the worklist come from live field slots
            let node = unsafe { current.as_ref() };
            if node.is_shared() {
                continue;
            }
            node.shared.store(true, Ordering::Relaxed);
            for index in 0..node.field_length {
                // SAFETY: index is in range
                let child = unsafe { node.field(index) };
                if let Some(child) = NonNull::new(child) {
                    // SAFETY: non-null slots reference live nodes
                    if !unsafe { child.as_ref() }.is_shared() {
                        pending.push(child);
                    }
                }
            }
        }
    }

    // ── field slots ────────────────────────────────────────────────

    #[inline(always)]
    fn slot(&self, index: usize) -> *mut *mut Node {
        debug_assert!(index < self.field_length);
        // SAFETY: the allocation extends field_length slots past the header
        unsafe { UnsafeCell::raw_get(self.fields.as_ptr().add(index)) }
    }

    /// Plain load of a field slot.
    ///
    /// # Safety
    ///
    /// `index < field_length`, and while the node is shared the caller
    /// must hold the field lock.
    #[inline(always)]
    pub unsafe fn field(&self, index: usize) -> *mut Node {
        unsafe { self.slot(index).read() }
    }

    /// Plain load-then-store of a field slot, returning the previous
    /// occupant.
    ///
    /// # Safety
    ///
    /// Same contract as [`Node::field`].
    #[inline(always)]
    pub unsafe fn swap_field(&self, index: usize, new: *mut Node) -> *mut Node {
        let slot = self.slot(index);
        // SAFETY: in-range slot, serialization per the contract
        unsafe {
            let old = slot.read();
            slot.write(new);
            old
        }
    }

    // ── field lock ─────────────────────────────────────────────────

    /// Acquire the per-node spin-lock guarding field reads and writes in
    /// shared mode. Two-level spin: test-and-set, then read-only spinning
    /// until the flag clears.
    #[inline]
    pub fn lock_fields(&self) -> FieldLock<'_> {
        while self.lock.swap(true, Ordering::Acquire) {
            while self.lock.load(Ordering::Relaxed) {
                core::hint::spin_loop();
            }
        }
        FieldLock { node: self }
    }
}

impl core::fmt::Debug for Node {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Node")
            .field("count", &self.reference_count())
            .field("field_length", &self.field_length)
            .field("shared", &self.is_shared())
            .finish()
    }
}

/// RAII guard for a node's field lock; clears the flag with Release on
/// drop.
pub struct FieldLock<'a> {
    node: &'a Node,
}

impl Drop for FieldLock<'_> {
    #[inline]
    fn drop(&mut self) {
        self.node.lock.store(false, Ordering::Release);
    }
}
