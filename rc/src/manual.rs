use std::ptr::{self, NonNull};

use object::{allocate, deallocate, Node};

/// Plain pointer wrapper with the same field surface as the counted
/// handles but no count traffic at all. Reclamation is an explicit
/// [`ManualRef::release_tree`]. Exists to give the benchmarks a
/// zero-overhead baseline; real clients use the counted handles.
#[derive(Clone, Copy)]
pub struct ManualRef {
    node: NonNull<Node>,
}

impl ManualRef {
    pub fn allocate(field_length: usize) -> Self {
        Self { node: allocate(field_length) }
    }

    #[inline(always)]
    fn node(&self) -> &Node {
        // SAFETY: the caller manages lifetime; a wrapper is only used
        // while its node is live
        unsafe { self.node.as_ref() }
    }

    #[inline(always)]
    pub fn field_length(&self) -> usize {
        self.node().field_length()
    }

    /// Store `child` into slot `index`. The previous occupant is simply
    /// overwritten; the caller owns all lifetimes.
    pub fn set(&self, index: usize, child: Option<ManualRef>) {
        let incoming =
            child.map_or(ptr::null_mut(), |child| child.node.as_ptr());
        // SAFETY: in range per the wrapper contract, single thread
        unsafe { self.node().swap_field(index, incoming) };
    }

    pub fn get(&self, index: usize) -> Option<ManualRef> {
        // SAFETY: in range per the wrapper contract, single thread
        let child = NonNull::new(unsafe { self.node().field(index) })?;
        Some(Self { node: child })
    }

    /// Free this node and everything reachable from it. Assumes the
    /// graph is a tree: a node reachable twice would be freed twice.
    pub fn release_tree(self) {
        let mut pending = vec![self.node];
        while let Some(current) = pending.pop() {
            // SAFETY: tree shape means each node is visited exactly once
            let node = unsafe { current.as_ref() };
            for index in 0..node.field_length() {
                // SAFETY: in range
                let child = unsafe { node.field(index) };
                if let Some(child) = NonNull::new(child) {
                    pending.push(child);
                }
            }
            // SAFETY: visited once, freed once
            unsafe { deallocate(current) };
        }
    }
}
