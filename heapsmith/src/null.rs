use crate::{
    allocator::{
        AlignedAllocator, Allocator, BulkDeallocator, Capabilities, OwningAllocator,
        StatelessAllocator,
    },
    block::Block,
    error::{AllocError, Result},
};

/// An allocator that always fails.
///
/// Terminates fallback chains and injects controlled allocation failure into
/// tests. It hands out nothing, so it owns nothing and `deallocate_all` has
/// nothing to do.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAllocator;

impl Allocator for NullAllocator {
    // Large enough that this leaf never constrains a sibling's alignment
    // through a combinator minimum.
    const ALIGNMENT: usize = 64 * 1024;

    const CAPS: Capabilities = Capabilities {
        aligned_allocate: true,
        owns: true,
        deallocate_all: true,
        state_size: 0,
        alignment: Self::ALIGNMENT,
    };

    fn allocate(&mut self, _size: usize) -> Result<Block> {
        Err(AllocError::OutOfMemory)
    }

    /// # Panics
    ///
    /// Always. No block can have been produced here, so receiving one is a
    /// programmer error.
    unsafe fn deallocate(&mut self, _block: Block) {
        panic!("NullAllocator::deallocate received a block it cannot have produced");
    }

    unsafe fn try_deallocate_all(&mut self) -> bool {
        // Nothing is ever outstanding.
        true
    }
}

impl AlignedAllocator for NullAllocator {
    fn allocate_aligned(&mut self, _size: usize, _align: usize) -> Result<Block> {
        Err(AllocError::OutOfMemory)
    }
}

impl OwningAllocator for NullAllocator {
    fn owns(&self, _block: &Block) -> bool {
        false
    }
}

impl BulkDeallocator for NullAllocator {
    unsafe fn deallocate_all(&mut self) {}
}

impl StatelessAllocator for NullAllocator {
    const INSTANCE: Self = Self;
}
