use std::ptr::{self, NonNull};
use std::sync::atomic::{fence, Ordering};

use object::{allocate, deallocate, Node};

/// Thread-safe reference-counted handle. Counts are always atomic and
/// every field access is serialized by the node's spin-lock, so handles
/// may be cloned, dropped and used concurrently from any number of
/// threads.
///
/// Increment is Relaxed (the incrementing thread already owns a
/// reference); the final decrement is Release paired with an Acquire
/// fence before reclamation, which orders every prior mutation on other
/// threads before the reclaiming thread reads the fields.
pub struct SyncRc {
    node: NonNull<Node>,
}

// SAFETY: all count traffic is atomic and field access is lock-guarded,
// so the handle can move to and be shared with other threads freely
unsafe impl Send for SyncRc {}
// SAFETY: see Send
unsafe impl Sync for SyncRc {}

impl SyncRc {
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

    /// Count at this moment; only meaningful when no operation is in
    /// flight elsewhere.
    #[inline(always)]
    pub fn reference_count(&self) -> usize {
        self.node().reference_count()
    }

    /// Replace slot `index` with `child`, taking ownership of the handle.
    pub fn set(&self, index: usize, child: Option<SyncRc>) {
        let node = self.node();
        // The incoming increment stays outside the lock: the handle we
        // were given keeps the child alive on its own.
        let incoming = match &child {
            Some(child) => {
                child.node().retain_atomic();
                child.node.as_ptr()
            }
            None => ptr::null_mut(),
        };

        let old = {
            let _lock = node.lock_fields();
            // SAFETY: in range per the handle contract, lock held
            unsafe { node.swap_field(index, incoming) }
        };

        if let Some(old) = NonNull::new(old) {
            // SAFETY: the slot owned one reference to the old occupant
            drop(unsafe { SyncRc::adopt(old) });
        }
    }

    /// Clone slot `index` out into a new handle. The load and the child
    /// increment happen under the lock so a concurrent `set` cannot free
    /// the child in between.
    pub fn get(&self, index: usize) -> Option<SyncRc> {
        let node = self.node();
        let child = {
            let _lock = node.lock_fields();
            // SAFETY: in range per the handle contract, lock held
            let child = NonNull::new(unsafe { node.field(index) })?;
            // SAFETY: the slot keeps the child live while we hold the lock
            unsafe { child.as_ref() }.retain_atomic();
            child
        };
        // SAFETY: the increment above is ours to adopt
        Some(unsafe { SyncRc::adopt(child) })
    }
}

impl Clone for SyncRc {
    fn clone(&self) -> Self {
        self.node().retain_atomic();
        Self { node: self.node }
    }
}

impl Drop for SyncRc {
    fn drop(&mut self) {
        if self.node().release_atomic() == 1 {
            fence(Ordering::Acquire);
            // SAFETY: this thread won the race to zero; no other
            // reference exists
            unsafe { release_fields(self.node) };
        }
    }
}

/// Worklist reclamation, atomic flavor: children are released with the
/// same Release/Acquire discipline as handle drops.
unsafe fn release_fields(root: NonNull<Node>) {
    let mut pending = vec![root];
    while let Some(current) = pending.pop() {
        // SAFETY: every pending node reached count zero
        let node = unsafe { current.as_ref() };
        for index in 0..node.field_length() {
            // SAFETY: in range; nobody else can reach this node anymore
            let child = unsafe { node.field(index) };
            if let Some(child) = NonNull::new(child) {
                // SAFETY: the slot still owns a reference to the child
                if unsafe { child.as_ref() }.release_atomic() == 1 {
                    fence(Ordering::Acquire);
                    pending.push(child);
                }
            }
        }
        // SAFETY: freed exactly once, by the decrement that hit zero
        unsafe { deallocate(current) };
    }
}
