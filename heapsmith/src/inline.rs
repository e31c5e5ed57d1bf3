use core::mem::MaybeUninit;
use core::ptr::NonNull;

use crate::{
    allocator::{
        AlignedAllocator, Allocator, Capabilities, OwningAllocator, PLATFORM_MAX_ALIGNMENT,
    },
    block::Block,
    error::{AllocError, Result},
    utils::align_up,
};

/// Allocates out of an `N`-byte buffer embedded in the allocator itself.
///
/// No bookkeeping is done: whenever a request fits, the buffer start is
/// handed out, even if a previous allocation is still live. A second
/// allocation made before the first is abandoned will alias it. The client
/// guarantees at most one live allocation at a time, which is the typical
/// pattern for small short-lived scratch memory placed as the primary of a
/// [`FallbackAllocator`] or behind a [`SegregateAllocator`] threshold.
///
/// `deallocate` is a no-op; ownership is a pointer-range test over the
/// buffer.
///
/// [`FallbackAllocator`]: crate::FallbackAllocator
/// [`SegregateAllocator`]: crate::SegregateAllocator
#[repr(C)]
pub struct InlineAllocator<const N: usize> {
    // Zero-sized, but raises the struct alignment to the platform maximum so
    // the buffer start is a valid unaligned-path pointer.
    _align: [usize; 0],
    buffer: [MaybeUninit<u8>; N],
}

crate::static_assert!(align_of::<InlineAllocator<1>>() == PLATFORM_MAX_ALIGNMENT);

impl<const N: usize> InlineAllocator<N> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _align: [],
            buffer: [MaybeUninit::uninit(); N],
        }
    }

    #[inline]
    fn buffer_start(&mut self) -> NonNull<u8> {
        NonNull::from(&mut self.buffer).cast::<u8>()
    }
}

impl<const N: usize> Default for InlineAllocator<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> Allocator for InlineAllocator<N> {
    const ALIGNMENT: usize = PLATFORM_MAX_ALIGNMENT;

    const CAPS: Capabilities = Capabilities {
        aligned_allocate: true,
        owns: true,
        deallocate_all: false,
        state_size: size_of::<Self>(),
        alignment: Self::ALIGNMENT,
    };

    fn allocate(&mut self, size: usize) -> Result<Block> {
        if size <= N {
            Ok(Block::new(self.buffer_start(), size))
        } else {
            Err(AllocError::OutOfMemory)
        }
    }

    unsafe fn deallocate(&mut self, _block: Block) {}
}

impl<const N: usize> AlignedAllocator for InlineAllocator<N> {
    fn allocate_aligned(&mut self, size: usize, align: usize) -> Result<Block> {
        assert!(
            align.is_power_of_two() && align >= Self::ALIGNMENT,
            "alignment must be a power of two of at least the allocator alignment"
        );

        let base = self.buffer_start();
        let offset = align_up(base.as_ptr().addr(), align) - base.as_ptr().addr();

        let Some(end) = offset.checked_add(size) else {
            return Err(AllocError::OutOfMemory);
        };
        if end > N {
            return Err(AllocError::OutOfMemory);
        }

        // SAFETY: offset + size fits in the buffer, so the pointer stays in
        // bounds and is non-null.
        let ptr = unsafe { NonNull::new_unchecked(base.as_ptr().add(offset)) };
        Ok(Block::new(ptr, size))
    }
}

impl<const N: usize> OwningAllocator for InlineAllocator<N> {
    fn owns(&self, block: &Block) -> bool {
        let start = self.buffer.as_ptr().addr();
        block.addr() >= start && block.end_addr() <= start + N
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inline_allocate_fits() {
        let mut allocator = InlineAllocator::<64>::new();

        let block = allocator.allocate(64).unwrap();
        assert_eq!(block.len(), 64);
        assert_eq!(block.addr() % PLATFORM_MAX_ALIGNMENT, 0);
        assert!(allocator.owns(&block));
    }

    #[test]
    fn test_inline_allocate_too_large() {
        let mut allocator = InlineAllocator::<16>::new();

        assert_eq!(allocator.allocate(17), Err(AllocError::OutOfMemory));
    }

    #[test]
    fn test_inline_reuses_buffer_start() {
        // The documented aliasing contract: no tracking, so both allocations
        // begin at the buffer start.
        let mut allocator = InlineAllocator::<32>::new();

        let first = allocator.allocate(8).unwrap();
        let second = allocator.allocate(16).unwrap();
        assert_eq!(first.ptr(), second.ptr());
    }

    #[test]
    fn test_inline_owns_is_a_range_test() {
        let mut allocator = InlineAllocator::<32>::new();
        let block = allocator.allocate(32).unwrap();
        assert!(allocator.owns(&block));

        let mut outside = 0u8;
        let foreign = Block::new(NonNull::from(&mut outside), 1);
        assert!(!allocator.owns(&foreign));
    }

    #[test]
    fn test_inline_aligned_allocate() {
        let mut allocator = InlineAllocator::<256>::new();

        let block = allocator.allocate_aligned(64, 64).unwrap();
        assert_eq!(block.addr() % 64, 0);
        assert!(allocator.owns(&block));
    }

    #[test]
    fn test_inline_aligned_allocate_out_of_space() {
        // Either the rounding or the size itself can push past the buffer end.
        let mut allocator = InlineAllocator::<64>::new();

        assert!(allocator.allocate_aligned(65, 8).is_err());
    }

    #[test]
    #[should_panic(expected = "power of two")]
    fn test_inline_aligned_rejects_bad_alignment() {
        let mut allocator = InlineAllocator::<64>::new();
        let _ = allocator.allocate_aligned(8, 3);
    }

    #[test]
    fn test_inline_deallocate_is_noop() {
        let mut allocator = InlineAllocator::<32>::new();
        let block = allocator.allocate(8).unwrap();

        unsafe { allocator.deallocate(block) };

        // The buffer is still fully available.
        assert!(allocator.allocate(32).is_ok());
    }
}
