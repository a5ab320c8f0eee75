use std::alloc::{handle_alloc_error, Layout};
use std::ptr::NonNull;

use crate::Node;

#[cfg(feature = "validation")]
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(feature = "validation")]
static LIVE_NODES: AtomicUsize = AtomicUsize::new(0);

/// Number of nodes currently allocated process-wide. Must return to its
/// previous value once every handle into a subgraph has been dropped.
#[cfg(feature = "validation")]
pub fn live_nodes() -> usize {
    LIVE_NODES.load(Ordering::Relaxed)
}

/// Layout of the flat block: header immediately followed by
/// `field_length` pointer slots.
pub(crate) fn required_layout(field_length: usize) -> Layout {
    let header = Layout::new::<Node>();
    let fields =
        Layout::array::<*mut Node>(field_length).expect("field vector too large");
    let (layout, offset) = header.extend(fields).expect("node layout overflow");
    debug_assert_eq!(offset, size_of::<Node>());
    layout.pad_to_align()
}

/// Allocate a fresh node: count 1 (for the returned reference), solo
/// mode, all field slots null, lock clear. Allocation failure is fatal.
pub fn allocate(field_length: usize) -> NonNull<Node> {
    let layout = required_layout(field_length);
    // SAFETY: layout has non-zero size (the header is never empty);
    // zeroing initializes every field slot to null
    let raw = unsafe { std::alloc::alloc_zeroed(layout) };
    let Some(node) = NonNull::new(raw.cast::<Node>()) else {
        handle_alloc_error(layout);
    };
    // SAFETY: freshly allocated, properly aligned for Node
    unsafe { node.as_ptr().write(Node::new(field_length)) };

    #[cfg(feature = "validation")]
    LIVE_NODES.fetch_add(1, Ordering::Relaxed);

    node
}

/// Release a node's storage. Called only by the counting engines, on the
/// unique decrement that observed the count drop from one to zero.
///
/// # Safety
///
/// `node` must come from [`allocate`], must not be freed twice, and no
/// live handle or field slot may still reference it.
pub unsafe fn deallocate(node: NonNull<Node>) {
    // SAFETY: field_length is immutable, so the layout matches allocation
    let layout = required_layout(unsafe { node.as_ref() }.field_length());
    // SAFETY: per contract the block is live and owned by the caller
    unsafe { std::alloc::dealloc(node.as_ptr().cast::<u8>(), layout) };

    #[cfg(feature = "validation")]
    LIVE_NODES.fetch_sub(1, Ordering::Relaxed);
}
