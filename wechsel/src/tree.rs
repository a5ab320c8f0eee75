use rc::{DynamicRc, ManualRef, SoloRc, SyncRc};

/// Uniform surface over the four management strategies, so the tree
/// builder and the benchmarks are written once.
///
/// `release` tears down the tree rooted at the handle; the counted
/// variants do that in `Drop`, only [`ManualRef`] needs the explicit
/// recursive delete.
pub trait TreeRef: Sized {
    fn allocate(field_length: usize) -> Self;
    fn set(&self, index: usize, child: Option<Self>);
    fn get(&self, index: usize) -> Option<Self>;

    fn release(self) {}
}

impl TreeRef for SoloRc {
    fn allocate(field_length: usize) -> Self {
        SoloRc::allocate(field_length)
    }

    fn set(&self, index: usize, child: Option<Self>) {
        SoloRc::set(self, index, child);
    }

    fn get(&self, index: usize) -> Option<Self> {
        SoloRc::get(self, index)
    }
}

impl TreeRef for SyncRc {
    fn allocate(field_length: usize) -> Self {
        SyncRc::allocate(field_length)
    }

    fn set(&self, index: usize, child: Option<Self>) {
        SyncRc::set(self, index, child);
    }

    fn get(&self, index: usize) -> Option<Self> {
        SyncRc::get(self, index)
    }
}

impl TreeRef for DynamicRc {
    fn allocate(field_length: usize) -> Self {
        DynamicRc::allocate(field_length)
    }

    fn set(&self, index: usize, child: Option<Self>) {
        DynamicRc::set(self, index, child);
    }

    fn get(&self, index: usize) -> Option<Self> {
        DynamicRc::get(self, index)
    }
}

impl TreeRef for ManualRef {
    fn allocate(field_length: usize) -> Self {
        ManualRef::allocate(field_length)
    }

    fn set(&self, index: usize, child: Option<Self>) {
        ManualRef::set(self, index, child);
    }

    fn get(&self, index: usize) -> Option<Self> {
        ManualRef::get(self, index)
    }

    fn release(self) {
        self.release_tree();
    }
}

/// Build a balanced tree: every node has `field_length` children down to
/// `depth` levels. `depth == 1` is a single leaf.
pub fn build_tree<R: TreeRef>(field_length: usize, depth: usize) -> R {
    let node = R::allocate(field_length);
    if depth > 1 {
        for index in 0..field_length {
            node.set(index, Some(build_tree(field_length, depth - 1)));
        }
    }
    node
}
