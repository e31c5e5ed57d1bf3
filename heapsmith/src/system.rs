//! Leaves backed by the platform's general-purpose heap.
//!
//! Neither variant can answer ownership queries, so a system leaf may only
//! sit as the final branch of a chain, or be wrapped by an allocator that
//! adds ownership (an affix header or a size-range test).

use core::ptr::NonNull;

use crate::{
    allocator::{
        AlignedAllocator, Allocator, Capabilities, PLATFORM_MAX_ALIGNMENT, StatelessAllocator,
    },
    block::Block,
    error::{AllocError, Result},
};

/// Leaf allocator delegating to the platform heap.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAllocator;

/// Leaf allocator delegating to the platform heap, with support for
/// explicitly aligned allocations.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlignedSystemAllocator;

fn system_allocate(size: usize) -> Result<Block> {
    if size == 0 {
        return Err(AllocError::InvalidSize);
    }

    // SAFETY: FFI call with a non-zero size.
    let ptr = unsafe { libc::malloc(size) };

    NonNull::new(ptr.cast::<u8>())
        .map(|ptr| Block::new(ptr, size))
        .ok_or(AllocError::OutOfMemory)
}

/// # Safety
///
/// `block` must have come from `system_allocate` or `posix_memalign` and not
/// have been freed since.
unsafe fn system_deallocate(block: Block) {
    // SAFETY: The caller guarantees the pointer came from the platform heap.
    unsafe { libc::free(block.ptr().as_ptr().cast()) };
}

impl Allocator for SystemAllocator {
    const ALIGNMENT: usize = PLATFORM_MAX_ALIGNMENT;

    fn allocate(&mut self, size: usize) -> Result<Block> {
        system_allocate(size)
    }

    unsafe fn deallocate(&mut self, block: Block) {
        // SAFETY: Caller guarantees the block was allocated by us.
        unsafe { system_deallocate(block) };
    }
}

impl StatelessAllocator for SystemAllocator {
    const INSTANCE: Self = Self;
}

impl Allocator for AlignedSystemAllocator {
    const ALIGNMENT: usize = PLATFORM_MAX_ALIGNMENT;

    const CAPS: Capabilities = Capabilities {
        aligned_allocate: true,
        owns: false,
        deallocate_all: false,
        state_size: 0,
        alignment: Self::ALIGNMENT,
    };

    fn allocate(&mut self, size: usize) -> Result<Block> {
        system_allocate(size)
    }

    unsafe fn deallocate(&mut self, block: Block) {
        // SAFETY: Caller guarantees the block was allocated by us.
        unsafe { system_deallocate(block) };
    }
}

impl AlignedAllocator for AlignedSystemAllocator {
    fn allocate_aligned(&mut self, size: usize, align: usize) -> Result<Block> {
        assert!(
            align.is_power_of_two() && align >= Self::ALIGNMENT,
            "alignment must be a power of two of at least the allocator alignment"
        );

        if size == 0 {
            return Err(AllocError::InvalidSize);
        }

        let mut ptr: *mut libc::c_void = core::ptr::null_mut();
        // SAFETY: `align` is a power of two and, being at least the platform
        // maximum, a multiple of the pointer size.
        let rc = unsafe { libc::posix_memalign(&mut ptr, align, size) };
        if rc != 0 {
            return Err(AllocError::OutOfMemory);
        }

        NonNull::new(ptr.cast::<u8>())
            .map(|ptr| Block::new(ptr, size))
            .ok_or(AllocError::OutOfMemory)
    }
}

impl StatelessAllocator for AlignedSystemAllocator {
    const INSTANCE: Self = Self;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_allocate_deallocate() {
        let mut allocator = SystemAllocator;

        let block = allocator.allocate(128).unwrap();
        assert_eq!(block.len(), 128);
        assert_eq!(block.addr() % SystemAllocator::ALIGNMENT, 0);

        // The memory is writable.
        unsafe {
            block.ptr().as_ptr().write_bytes(0xAB, block.len());
            allocator.deallocate(block);
        }
    }

    #[test]
    fn test_system_rejects_zero_size() {
        let mut allocator = SystemAllocator;
        assert_eq!(allocator.allocate(0), Err(AllocError::InvalidSize));
    }

    #[test]
    fn test_aligned_system_allocate_aligned() {
        let mut allocator = AlignedSystemAllocator;

        for align in [64, 128, 4096] {
            let block = allocator.allocate_aligned(100, align).unwrap();
            assert_eq!(block.addr() % align, 0);
            assert_eq!(block.len(), 100);

            unsafe { allocator.deallocate(block) };
        }
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn test_aligned_system_rejects_small_alignment() {
        // A power of two below the allocator's own alignment is still a
        // contract violation.
        let mut allocator = AlignedSystemAllocator;
        let _ = allocator.allocate_aligned(64, 1);
    }

    #[test]
    fn test_system_is_stateless() {
        assert_eq!(size_of::<SystemAllocator>(), 0);
        assert_eq!(size_of::<AlignedSystemAllocator>(), 0);

        let mut allocator = SystemAllocator::INSTANCE;
        let block = allocator.allocate(16).unwrap();
        unsafe { allocator.deallocate(block) };
    }
}
