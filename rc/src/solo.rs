use std::ptr::{self, NonNull};

use object::{allocate, deallocate, Node};

/// Reference-counted handle for nodes that never leave their allocating
/// thread. Every count update is a plain load + store and field access
/// takes no lock; the type is `!Send`/`!Sync`, so the sequential
/// contract is enforced by the compiler.
pub struct SoloRc {
    node: NonNull<Node>,
}

impl SoloRc {
    /// Allocate a fresh node with `field_length` null slots. The returned
    /// handle accounts for the initial count of one.
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

    /// Replace slot `index` with `child`, taking ownership of the handle.
    /// The previous occupant loses one reference and is reclaimed if that
    /// was its last.
    pub fn set(&self, index: usize, child: Option<SoloRc>) {
        let node = self.node();
        let incoming = match &child {
            Some(child) => {
                child.node().retain_plain();
                child.node.as_ptr()
            }
            None => ptr::null_mut(),
        };

        // SAFETY: in range per the handle contract, single thread
        let old = unsafe { node.swap_field(index, incoming) };

        if let Some(old) = NonNull::new(old) {
            // SAFETY: the slot owned one reference to the old occupant
            drop(unsafe { SoloRc::adopt(old) });
        }
        // `child` drops here, releasing the caller's reference; the slot
        // keeps the one added above.
    }

    /// Clone slot `index` out into a new handle.
    pub fn get(&self, index: usize) -> Option<SoloRc> {
        // SAFETY: in range per the handle contract, single thread
        let child = NonNull::new(unsafe { self.node().field(index) })?;
        // SAFETY: the slot keeps the child live
        unsafe { child.as_ref() }.retain_plain();
        // SAFETY: the increment above is ours to adopt
        Some(unsafe { SoloRc::adopt(child) })
    }
}

impl Clone for SoloRc {
    fn clone(&self) -> Self {
        self.node().retain_plain();
        Self { node: self.node }
    }
}

impl Drop for SoloRc {
    fn drop(&mut self) {
        if self.node().release_plain() == 1 {
            // SAFETY: this was the last reference
            unsafe { release_fields(self.node) };
        }
    }
}

/// Free `root` and every node whose count reaches zero while its parents
/// release their fields. An explicit worklist instead of recursion, so
/// arbitrarily deep graphs cannot overflow the call stack.
unsafe fn release_fields(root: NonNull<Node>) {
    let mut pending = vec![root];
    while let Some(current) = pending.pop() {
        // SAFETY: every pending node has count zero but intact fields
        let node = unsafe { current.as_ref() };
        for index in 0..node.field_length() {
            // SAFETY: in range
            let child = unsafe { node.field(index) };
            if let Some(child) = NonNull::new(child) {
                // SAFETY: the slot still owns a reference to the child
                if unsafe { child.as_ref() }.release_plain() == 1 {
                    pending.push(child);
                }
            }
        }
        // SAFETY: count zero, fields released, storage freed exactly once
        unsafe { deallocate(current) };
    }
}
