use crate::{
    allocator::{
        AlignedAllocator, Allocator, BulkDeallocator, Capabilities, OwningAllocator,
        StatelessAllocator,
    },
    block::Block,
    error::Result,
    utils::min_align,
};

/// Routes requests to one of two allocators by a size threshold.
///
/// A request of `size` bytes goes to the small branch iff
/// `size <= THRESHOLD`, otherwise to the large branch. Every operation makes
/// the same decision — deallocation and ownership read the size from the
/// block's recorded length — so the branch that served an allocation also
/// sees its release.
pub struct SegregateAllocator<const THRESHOLD: usize, S: Allocator, L: Allocator> {
    small: S,
    large: L,
}

impl<const THRESHOLD: usize, S: Allocator, L: Allocator> SegregateAllocator<THRESHOLD, S, L> {
    #[must_use]
    pub const fn new(small: S, large: L) -> Self {
        Self { small, large }
    }

    const fn routes_small(size: usize) -> bool {
        size <= THRESHOLD
    }
}

impl<const THRESHOLD: usize, S: Allocator, L: Allocator> Allocator
    for SegregateAllocator<THRESHOLD, S, L>
{
    const ALIGNMENT: usize = min_align(S::ALIGNMENT, L::ALIGNMENT);

    const CAPS: Capabilities = Capabilities {
        aligned_allocate: S::CAPS.aligned_allocate && L::CAPS.aligned_allocate,
        owns: S::CAPS.owns && L::CAPS.owns,
        deallocate_all: S::CAPS.deallocate_all && L::CAPS.deallocate_all,
        state_size: size_of::<Self>(),
        alignment: Self::ALIGNMENT,
    };

    fn allocate(&mut self, size: usize) -> Result<Block> {
        if Self::routes_small(size) {
            self.small.allocate(size)
        } else {
            self.large.allocate(size)
        }
    }

    unsafe fn deallocate(&mut self, block: Block) {
        if Self::routes_small(block.len()) {
            // SAFETY: The length routed this block to the small branch on
            // allocation, so the small branch produced it.
            unsafe { self.small.deallocate(block) };
        } else {
            // SAFETY: Same predicate, large branch.
            unsafe { self.large.deallocate(block) };
        }
    }

    unsafe fn try_deallocate_all(&mut self) -> bool {
        if Self::CAPS.deallocate_all {
            // SAFETY: Both branches advertise bulk support, so both probes
            // perform the release.
            unsafe {
                self.small.try_deallocate_all();
                self.large.try_deallocate_all();
            }
            true
        } else {
            false
        }
    }
}

impl<const THRESHOLD: usize, S, L> AlignedAllocator for SegregateAllocator<THRESHOLD, S, L>
where
    S: AlignedAllocator,
    L: AlignedAllocator,
{
    fn allocate_aligned(&mut self, size: usize, align: usize) -> Result<Block> {
        assert!(
            align.is_power_of_two() && align >= Self::ALIGNMENT,
            "alignment must be a power of two of at least the allocator alignment"
        );

        if Self::routes_small(size) {
            self.small.allocate_aligned(size, align)
        } else {
            self.large.allocate_aligned(size, align)
        }
    }
}

impl<const THRESHOLD: usize, S, L> OwningAllocator for SegregateAllocator<THRESHOLD, S, L>
where
    S: OwningAllocator,
    L: OwningAllocator,
{
    fn owns(&self, block: &Block) -> bool {
        if Self::routes_small(block.len()) {
            self.small.owns(block)
        } else {
            self.large.owns(block)
        }
    }
}

impl<const THRESHOLD: usize, S, L> BulkDeallocator for SegregateAllocator<THRESHOLD, S, L>
where
    S: BulkDeallocator,
    L: BulkDeallocator,
{
    unsafe fn deallocate_all(&mut self) {
        // SAFETY: Both branches together hold exactly the outstanding blocks.
        unsafe {
            self.small.deallocate_all();
            self.large.deallocate_all();
        }
    }
}

impl<const THRESHOLD: usize, S, L> StatelessAllocator for SegregateAllocator<THRESHOLD, S, L>
where
    S: StatelessAllocator,
    L: StatelessAllocator,
{
    const INSTANCE: Self = Self {
        small: S::INSTANCE,
        large: L::INSTANCE,
    };
}
