use crate::{
    allocator::{
        AlignedAllocator, Allocator, BulkDeallocator, Capabilities, OwningAllocator,
        StatelessAllocator,
    },
    block::Block,
    error::Result,
    utils::min_align,
};

/// Tries a primary allocator and retries on a fallback when it fails.
///
/// The primary must be able to answer ownership queries: that is how a
/// deallocation finds its way back to the child that served it, without the
/// combinator remembering anything. The fallback only needs ownership itself
/// when the composition as a whole is asked `owns`.
///
/// A typical use pairs a small [`InlineAllocator`] primary with a system
/// fallback, so scratch allocations stay on the stack and spills hit the
/// heap.
///
/// [`InlineAllocator`]: crate::InlineAllocator
pub struct FallbackAllocator<P: OwningAllocator, F: Allocator> {
    primary: P,
    fallback: F,
}

impl<P: OwningAllocator, F: Allocator> FallbackAllocator<P, F> {
    #[must_use]
    pub const fn new(primary: P, fallback: F) -> Self {
        Self { primary, fallback }
    }
}

impl<P: OwningAllocator, F: Allocator> Allocator for FallbackAllocator<P, F> {
    const ALIGNMENT: usize = min_align(P::ALIGNMENT, F::ALIGNMENT);

    const CAPS: Capabilities = Capabilities {
        aligned_allocate: P::CAPS.aligned_allocate && F::CAPS.aligned_allocate,
        owns: F::CAPS.owns,
        deallocate_all: P::CAPS.deallocate_all && F::CAPS.deallocate_all,
        state_size: size_of::<Self>(),
        alignment: Self::ALIGNMENT,
    };

    fn allocate(&mut self, size: usize) -> Result<Block> {
        if let Ok(block) = self.primary.allocate(size) {
            return Ok(block);
        }
        self.fallback.allocate(size)
    }

    unsafe fn deallocate(&mut self, block: Block) {
        if self.primary.owns(&block) {
            // SAFETY: The primary reported the block as its own.
            unsafe { self.primary.deallocate(block) };
        } else {
            // SAFETY: Exactly one child owns any outstanding block, so a
            // block the primary disowns came from the fallback.
            unsafe { self.fallback.deallocate(block) };
        }
    }

    unsafe fn try_deallocate_all(&mut self) -> bool {
        if Self::CAPS.deallocate_all {
            // SAFETY: Both children advertise bulk support, so both probes
            // perform the release.
            unsafe {
                self.primary.try_deallocate_all();
                self.fallback.try_deallocate_all();
            }
            true
        } else {
            false
        }
    }
}

impl<P, F> AlignedAllocator for FallbackAllocator<P, F>
where
    P: OwningAllocator + AlignedAllocator,
    F: AlignedAllocator,
{
    fn allocate_aligned(&mut self, size: usize, align: usize) -> Result<Block> {
        if let Ok(block) = self.primary.allocate_aligned(size, align) {
            return Ok(block);
        }
        self.fallback.allocate_aligned(size, align)
    }
}

impl<P, F> OwningAllocator for FallbackAllocator<P, F>
where
    P: OwningAllocator,
    F: OwningAllocator,
{
    fn owns(&self, block: &Block) -> bool {
        self.primary.owns(block) || self.fallback.owns(block)
    }
}

impl<P, F> BulkDeallocator for FallbackAllocator<P, F>
where
    P: OwningAllocator + BulkDeallocator,
    F: BulkDeallocator,
{
    unsafe fn deallocate_all(&mut self) {
        // SAFETY: Cascading invalidates each child's outstanding blocks,
        // which together are exactly this combinator's outstanding blocks.
        unsafe {
            self.primary.deallocate_all();
            self.fallback.deallocate_all();
        }
    }
}

impl<P, F> StatelessAllocator for FallbackAllocator<P, F>
where
    P: OwningAllocator + StatelessAllocator,
    F: StatelessAllocator,
{
    const INSTANCE: Self = Self {
        primary: P::INSTANCE,
        fallback: F::INSTANCE,
    };
}
