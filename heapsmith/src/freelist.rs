use core::ptr::NonNull;

use crate::{
    allocator::{
        AlignedAllocator, Allocator, BulkDeallocator, Capabilities, OwningAllocator,
    },
    block::Block,
    error::Result,
};

/// Node count sentinel for a freelist with no cache bound.
pub const UNBOUNDED: usize = usize::MAX;

/// Link header written into the first bytes of a cached block.
struct FreeSlot {
    next: Option<NonNull<Self>>,
}

/// Caches freed blocks of a bounded size range on a LIFO free list.
///
/// Requests with a size **in range** are served from the cache when possible
/// and otherwise allocated from the parent at `MAX_SIZE` bytes, so every
/// cached node is interchangeable. A size is in range iff
/// `MIN_SIZE == MAX_SIZE` and the size matches exactly, or
/// `MIN_SIZE <= size <= MAX_SIZE` (a `MIN_SIZE` of zero means no lower
/// bound). Out-of-range traffic passes straight through to the parent.
///
/// Deallocations of in-range blocks are pushed onto the list until
/// `MAX_NODES` is reached ([`UNBOUNDED`] lifts the bound); beyond that they
/// are forwarded to the parent. Cached nodes reach the parent in the reverse
/// of their allocation order, so the parent must not require strictly LIFO
/// deallocation (a bump allocator, say).
///
/// `deallocate_all` cascades to a parent that can reclaim everything at once
/// and clears the list in O(1); over any other parent, an unbounded freelist
/// walks its cache back node by node. A bounded freelist over such a parent
/// has no bulk deallocation at all (compile-time assertion).
///
/// Alignment note: a cache hit reuses the node as-is, so explicitly aligned
/// requests are only served from the cache at the parent's natural alignment.
pub struct FreelistAllocator<
    P: Allocator,
    const MIN_SIZE: usize,
    const MAX_SIZE: usize,
    const MAX_NODES: usize,
> {
    parent: P,
    head: Option<NonNull<FreeSlot>>,
    node_count: usize,
}

// SAFETY: Cached nodes are exclusively owned by the freelist; sending the
// allocator moves them along with their parent.
unsafe impl<P, const MIN_SIZE: usize, const MAX_SIZE: usize, const MAX_NODES: usize> Send
    for FreelistAllocator<P, MIN_SIZE, MAX_SIZE, MAX_NODES>
where
    P: Allocator + Send,
{
}

impl<P: Allocator, const MIN_SIZE: usize, const MAX_SIZE: usize, const MAX_NODES: usize>
    FreelistAllocator<P, MIN_SIZE, MAX_SIZE, MAX_NODES>
{
    pub const fn new(parent: P) -> Self {
        const {
            assert!(MAX_SIZE >= MIN_SIZE, "MAX_SIZE must be at least MIN_SIZE");
            assert!(
                MAX_SIZE >= size_of::<*mut u8>(),
                "cached blocks must be able to hold a link pointer"
            );
            assert!(
                P::ALIGNMENT >= align_of::<FreeSlot>(),
                "parent blocks must be aligned enough to carry a link pointer"
            );
        }

        Self {
            parent,
            head: None,
            node_count: 0,
        }
    }

    /// Whether `deallocate_all` clears the cache in O(1) by cascading to the
    /// parent, rather than walking the list.
    #[must_use]
    pub const fn has_fast_deallocate_all() -> bool {
        P::CAPS.deallocate_all
    }

    /// Number of blocks currently held on the free list.
    #[must_use]
    pub const fn cached_nodes(&self) -> usize {
        self.node_count
    }

    /// Return every cached node to the parent allocator.
    ///
    /// Nodes go back in reverse allocation order. With an unbounded freelist
    /// every in-range deallocation was cached, so this releases every block
    /// the freelist has been handed back; a bounded freelist may already have
    /// forwarded some directly.
    pub fn purge(&mut self) {
        while let Some(slot) = self.head {
            // SAFETY: Every node on the list was produced by a
            // `parent.allocate(MAX_SIZE)` and is exclusively ours.
            unsafe {
                self.head = (*slot.as_ptr()).next;
                self.parent.deallocate(Block::new(slot.cast::<u8>(), MAX_SIZE));
            }
        }
        self.node_count = 0;
    }

    const fn in_range(size: usize) -> bool {
        if MIN_SIZE == MAX_SIZE {
            size == MAX_SIZE
        } else {
            (MIN_SIZE == 0 || size >= MIN_SIZE) && size <= MAX_SIZE
        }
    }

    fn pop_cached(&mut self, size: usize) -> Option<Block> {
        let slot = self.head?;

        // SAFETY: The slot is on our free list.
        self.head = unsafe { (*slot.as_ptr()).next };
        self.node_count -= 1;

        Some(Block::new(slot.cast::<u8>(), size))
    }
}

impl<P: Allocator, const MIN_SIZE: usize, const MAX_SIZE: usize, const MAX_NODES: usize> Allocator
    for FreelistAllocator<P, MIN_SIZE, MAX_SIZE, MAX_NODES>
{
    const ALIGNMENT: usize = P::ALIGNMENT;

    const CAPS: Capabilities = Capabilities {
        aligned_allocate: P::CAPS.aligned_allocate,
        owns: P::CAPS.owns,
        deallocate_all: P::CAPS.deallocate_all || MAX_NODES == UNBOUNDED,
        state_size: size_of::<Self>(),
        alignment: Self::ALIGNMENT,
    };

    fn allocate(&mut self, size: usize) -> Result<Block> {
        if !Self::in_range(size) {
            return self.parent.allocate(size);
        }

        if let Some(block) = self.pop_cached(size) {
            return Ok(block);
        }

        // Fresh in-range allocations always reserve MAX_SIZE bytes, so any
        // node later cached can serve any in-range size.
        let backing = self.parent.allocate(MAX_SIZE)?;
        Ok(Block::new(backing.ptr(), size))
    }

    unsafe fn deallocate(&mut self, block: Block) {
        if (MAX_NODES == UNBOUNDED || self.node_count < MAX_NODES) && Self::in_range(block.len()) {
            let slot = block.ptr().cast::<FreeSlot>();
            // SAFETY: In-range blocks are at least a pointer wide (checked at
            // construction) and aligned enough for the link header.
            unsafe { slot.as_ptr().write(FreeSlot { next: self.head }) };
            self.head = Some(slot);
            self.node_count += 1;
        } else {
            // SAFETY: Out-of-range blocks passed straight through on the way
            // in, so they go straight back.
            unsafe { self.parent.deallocate(block) };
        }
    }

    unsafe fn try_deallocate_all(&mut self) -> bool {
        // SAFETY: Same contract as `deallocate_all`.
        if unsafe { self.parent.try_deallocate_all() } {
            // The parent reclaimed every backing block, cached nodes included.
            self.head = None;
            self.node_count = 0;
            true
        } else if MAX_NODES == UNBOUNDED {
            self.purge();
            true
        } else {
            false
        }
    }
}

impl<P, const MIN_SIZE: usize, const MAX_SIZE: usize, const MAX_NODES: usize> AlignedAllocator
    for FreelistAllocator<P, MIN_SIZE, MAX_SIZE, MAX_NODES>
where
    P: AlignedAllocator,
{
    fn allocate_aligned(&mut self, size: usize, align: usize) -> Result<Block> {
        if !Self::in_range(size) {
            return self.parent.allocate_aligned(size, align);
        }

        if let Some(block) = self.pop_cached(size) {
            return Ok(block);
        }

        let backing = self.parent.allocate_aligned(MAX_SIZE, align)?;
        Ok(Block::new(backing.ptr(), size))
    }
}

impl<P, const MIN_SIZE: usize, const MAX_SIZE: usize, const MAX_NODES: usize> OwningAllocator
    for FreelistAllocator<P, MIN_SIZE, MAX_SIZE, MAX_NODES>
where
    P: OwningAllocator,
{
    fn owns(&self, block: &Block) -> bool {
        // Cached nodes still live in the parent's address range.
        self.parent.owns(block)
    }
}

impl<P: Allocator, const MIN_SIZE: usize, const MAX_SIZE: usize, const MAX_NODES: usize>
    BulkDeallocator for FreelistAllocator<P, MIN_SIZE, MAX_SIZE, MAX_NODES>
{
    /// O(1) when the parent can reclaim everything at once; otherwise the
    /// unbounded cache is walked back to the parent in O(n), which releases
    /// every block the freelist was ever handed back but leaves blocks still
    /// held by callers untouched.
    unsafe fn deallocate_all(&mut self) {
        const {
            assert!(
                P::CAPS.deallocate_all || MAX_NODES == UNBOUNDED,
                "a bounded freelist cannot bulk-deallocate without parent support"
            );
        }

        // SAFETY: Same contract as this call's.
        let released = unsafe { self.try_deallocate_all() };
        debug_assert!(released);
    }
}

impl<P: Allocator, const MIN_SIZE: usize, const MAX_SIZE: usize, const MAX_NODES: usize> Drop
    for FreelistAllocator<P, MIN_SIZE, MAX_SIZE, MAX_NODES>
{
    fn drop(&mut self) {
        self.purge();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AllocError, NullAllocator, SystemAllocator};

    extern crate alloc;
    use alloc::rc::Rc;
    use alloc::vec::Vec;
    use core::cell::RefCell;

    /// Parent that registers every block it hands out and can reclaim them
    /// all at once, with the registry observable from outside.
    struct RegionParent {
        live: Rc<RefCell<Vec<Block>>>,
    }

    impl RegionParent {
        fn new(live: Rc<RefCell<Vec<Block>>>) -> Self {
            Self { live }
        }
    }

    impl Allocator for RegionParent {
        const ALIGNMENT: usize = SystemAllocator::ALIGNMENT;

        const CAPS: Capabilities = Capabilities {
            aligned_allocate: false,
            owns: false,
            deallocate_all: true,
            state_size: size_of::<Self>(),
            alignment: Self::ALIGNMENT,
        };

        fn allocate(&mut self, size: usize) -> Result<Block> {
            let block = SystemAllocator.allocate(size)?;
            self.live.borrow_mut().push(block);
            Ok(block)
        }

        unsafe fn deallocate(&mut self, block: Block) {
            let mut live = self.live.borrow_mut();
            let index = live
                .iter()
                .position(|b| b.ptr() == block.ptr())
                .expect("deallocated a block this parent never produced");
            live.swap_remove(index);
            drop(live);

            unsafe { SystemAllocator.deallocate(block) };
        }

        unsafe fn try_deallocate_all(&mut self) -> bool {
            unsafe { self.deallocate_all() };
            true
        }
    }

    impl BulkDeallocator for RegionParent {
        unsafe fn deallocate_all(&mut self) {
            for block in self.live.borrow_mut().drain(..) {
                unsafe { SystemAllocator.deallocate(block) };
            }
        }
    }

    #[test]
    fn test_freelist_reuses_freed_block() {
        let mut allocator = FreelistAllocator::<SystemAllocator, 32, 32, UNBOUNDED>::new(
            SystemAllocator,
        );

        let first = allocator.allocate(32).unwrap();
        let first_ptr = first.ptr();
        unsafe { allocator.deallocate(first) };

        let second = allocator.allocate(32).unwrap();
        assert_eq!(second.ptr(), first_ptr);

        let third = allocator.allocate(32).unwrap();
        assert_ne!(third.ptr(), first_ptr);

        unsafe {
            allocator.deallocate(second);
            allocator.deallocate(third);
        }
    }

    #[test]
    fn test_freelist_exact_match_range() {
        // MIN_SIZE == MAX_SIZE means only exact sizes are cached.
        type Exact = FreelistAllocator<SystemAllocator, 32, 32, UNBOUNDED>;

        assert!(Exact::in_range(32));
        assert!(!Exact::in_range(31));
        assert!(!Exact::in_range(33));
    }

    #[test]
    fn test_freelist_bounded_range() {
        type Ranged = FreelistAllocator<SystemAllocator, 16, 64, UNBOUNDED>;

        assert!(Ranged::in_range(16));
        assert!(Ranged::in_range(40));
        assert!(Ranged::in_range(64));
        assert!(!Ranged::in_range(15));
        assert!(!Ranged::in_range(65));

        // A zero MIN_SIZE lifts the lower bound.
        type Open = FreelistAllocator<SystemAllocator, 0, 64, UNBOUNDED>;
        assert!(Open::in_range(1));
    }

    #[test]
    fn test_freelist_out_of_range_passes_through() {
        let mut allocator = FreelistAllocator::<SystemAllocator, 32, 32, UNBOUNDED>::new(
            SystemAllocator,
        );

        let big = allocator.allocate(4096).unwrap();
        unsafe { allocator.deallocate(big) };

        assert_eq!(allocator.cached_nodes(), 0);
    }

    #[test]
    fn test_freelist_node_bound() {
        let mut allocator =
            FreelistAllocator::<SystemAllocator, 32, 32, 1>::new(SystemAllocator);

        let first = allocator.allocate(32).unwrap();
        let second = allocator.allocate(32).unwrap();

        unsafe {
            allocator.deallocate(first);
            allocator.deallocate(second);
        }

        // Exactly one block was retained; the other went back to the parent.
        assert_eq!(allocator.cached_nodes(), 1);
    }

    #[test]
    fn test_freelist_length_reports_requested_size() {
        let mut allocator = FreelistAllocator::<SystemAllocator, 0, 64, UNBOUNDED>::new(
            SystemAllocator,
        );

        // 64 bytes are reserved behind the scenes, but the block reports what
        // was asked for.
        let block = allocator.allocate(24).unwrap();
        assert_eq!(block.len(), 24);

        unsafe { allocator.deallocate(block) };
        assert_eq!(allocator.cached_nodes(), 1);

        // The cached node serves any in-range size.
        let reused = allocator.allocate(64).unwrap();
        assert_eq!(reused.len(), 64);
        unsafe { allocator.deallocate(reused) };
    }

    #[test]
    fn test_freelist_purge_empties_cache() {
        let mut allocator = FreelistAllocator::<SystemAllocator, 32, 32, UNBOUNDED>::new(
            SystemAllocator,
        );

        let blocks: Vec<Block> = (0..8).map(|_| allocator.allocate(32).unwrap()).collect();
        for block in blocks {
            unsafe { allocator.deallocate(block) };
        }
        assert_eq!(allocator.cached_nodes(), 8);

        allocator.purge();
        assert_eq!(allocator.cached_nodes(), 0);
    }

    #[test]
    fn test_freelist_lifo_order() {
        let mut allocator = FreelistAllocator::<SystemAllocator, 32, 32, UNBOUNDED>::new(
            SystemAllocator,
        );

        let a = allocator.allocate(32).unwrap();
        let b = allocator.allocate(32).unwrap();
        let a_ptr = a.ptr();
        let b_ptr = b.ptr();

        unsafe {
            allocator.deallocate(a);
            allocator.deallocate(b);
        }

        // Last freed, first served.
        let first = allocator.allocate(32).unwrap();
        let second = allocator.allocate(32).unwrap();
        assert_eq!(first.ptr(), b_ptr);
        assert_eq!(second.ptr(), a_ptr);

        unsafe {
            allocator.deallocate(first);
            allocator.deallocate(second);
        }
    }

    #[test]
    fn test_freelist_deallocate_all_manifest() {
        // O(1) only with a parent that reclaims everything at once.
        assert!(FreelistAllocator::<NullAllocator, 32, 32, UNBOUNDED>::has_fast_deallocate_all());
        assert!(
            !FreelistAllocator::<SystemAllocator, 32, 32, UNBOUNDED>::has_fast_deallocate_all()
        );

        // An unbounded cache makes bulk release available even over a plain
        // parent; a bounded one needs the parent's support.
        assert!(FreelistAllocator::<SystemAllocator, 32, 32, UNBOUNDED>::CAPS.deallocate_all);
        assert!(!FreelistAllocator::<SystemAllocator, 32, 32, 4>::CAPS.deallocate_all);
        assert!(FreelistAllocator::<NullAllocator, 32, 32, 4>::CAPS.deallocate_all);
    }

    #[test]
    fn test_freelist_unbounded_deallocate_all_walks_the_cache() {
        let mut allocator =
            FreelistAllocator::<SystemAllocator, 32, 32, UNBOUNDED>::new(SystemAllocator);

        let blocks: Vec<Block> = (0..4).map(|_| allocator.allocate(32).unwrap()).collect();
        for block in blocks {
            unsafe { allocator.deallocate(block) };
        }
        assert_eq!(allocator.cached_nodes(), 4);

        // No parent cascade behind the platform heap: every cached node goes
        // back individually.
        unsafe { allocator.deallocate_all() };
        assert_eq!(allocator.cached_nodes(), 0);

        // The allocator is still serviceable afterwards.
        let block = allocator.allocate(32).unwrap();
        unsafe { allocator.deallocate(block) };
    }

    #[test]
    fn test_freelist_bounded_cascades_through_a_bulk_parent() {
        let live = Rc::new(RefCell::new(Vec::new()));
        let mut allocator =
            FreelistAllocator::<RegionParent, 32, 32, 2>::new(RegionParent::new(live.clone()));

        let first = allocator.allocate(32).unwrap();
        let _outstanding = allocator.allocate(32).unwrap();
        unsafe { allocator.deallocate(first) };
        assert_eq!(allocator.cached_nodes(), 1);
        assert_eq!(live.borrow().len(), 2);

        // The parent reclaims everything at once, the still-outstanding
        // block included, and the cache is cleared without a walk.
        unsafe { allocator.deallocate_all() };
        assert_eq!(allocator.cached_nodes(), 0);
        assert!(live.borrow().is_empty());
    }

    #[test]
    fn test_freelist_forwards_parent_failure() {
        let mut allocator =
            FreelistAllocator::<NullAllocator, 32, 32, UNBOUNDED>::new(NullAllocator);

        assert_eq!(allocator.allocate(32), Err(AllocError::OutOfMemory));
        assert_eq!(allocator.allocate(128), Err(AllocError::OutOfMemory));
    }
}
