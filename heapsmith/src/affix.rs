use core::marker::PhantomData;
use core::ptr::NonNull;

use crate::{
    allocator::{Allocator, Capabilities, OwningAllocator, StatelessAllocator},
    block::Block,
    error::Result,
    utils::align_up,
};

/// Reserves a typed header before and a typed footer after every allocation.
///
/// The caller sees a block that starts past the prefix and spans exactly the
/// requested length; the metadata slots are hidden. Either affix may be the
/// empty type `()`, which reserves nothing. On deallocation the original
/// parent block is reconstructed from the visible block alone, so no
/// per-allocation bookkeeping exists.
///
/// Typical prefixes: corruption canaries, per-allocation size or type-id
/// headers, links in an outstanding-allocations list for leak reports.
pub struct AffixAllocator<P: Allocator, Prefix, Suffix = ()> {
    parent: P,
    _affixes: PhantomData<(Prefix, Suffix)>,
}

impl<P: Allocator, Prefix, Suffix> AffixAllocator<P, Prefix, Suffix> {
    pub const fn new(parent: P) -> Self {
        const {
            assert!(
                size_of::<Prefix>() == 0 || P::ALIGNMENT >= align_of::<Prefix>(),
                "parent alignment cannot carry the prefix type"
            );
            assert!(
                size_of::<Suffix>() == 0 || P::ALIGNMENT >= align_of::<Suffix>(),
                "parent alignment cannot carry the suffix type"
            );
        }

        Self {
            parent,
            _affixes: PhantomData,
        }
    }

    /// Size of the parent allocation backing a request of `size` bytes.
    #[must_use]
    pub const fn total_allocation_size(size: usize) -> usize {
        if size_of::<Suffix>() == 0 {
            size + size_of::<Prefix>()
        } else {
            align_up(size + size_of::<Prefix>(), align_of::<Suffix>()) + size_of::<Suffix>()
        }
    }

    /// Pointer to the prefix slot of a live block produced by this allocator.
    ///
    /// The slot sits in the `size_of::<Prefix>()` bytes immediately below the
    /// block's pointer. Dereferencing is up to the caller; the slot is
    /// uninitialized until written.
    #[must_use]
    pub fn prefix(block: &Block) -> NonNull<Prefix> {
        let ptr = block.ptr().as_ptr().wrapping_sub(size_of::<Prefix>());
        // SAFETY: Live blocks from this allocator start a prefix past their
        // backing allocation, so the slot address cannot wrap to null.
        unsafe { NonNull::new_unchecked(ptr.cast::<Prefix>()) }
    }

    /// Pointer to the suffix slot of a live block produced by this allocator.
    ///
    /// The slot is the suffix-aligned reservation at the end of the backing
    /// allocation, at or past the block's last byte.
    #[must_use]
    pub fn suffix(block: &Block) -> NonNull<Suffix> {
        let offset = align_up(size_of::<Prefix>() + block.len(), align_of::<Suffix>())
            - size_of::<Prefix>();
        let ptr = block.ptr().as_ptr().wrapping_add(offset);
        // SAFETY: The offset stays within the backing allocation, which is
        // non-null.
        unsafe { NonNull::new_unchecked(ptr.cast::<Suffix>()) }
    }

    /// Rebuild the parent-level block backing a visible block.
    fn actual_allocation(block: &Block) -> Block {
        let raw = block.ptr().as_ptr().wrapping_sub(size_of::<Prefix>());
        // SAFETY: Allocation addresses sit far above the prefix size, so the
        // shifted pointer cannot be null.
        let ptr = unsafe { NonNull::new_unchecked(raw) };
        Block::new(ptr, Self::total_allocation_size(block.len()))
    }
}

impl<P: Allocator, Prefix, Suffix> Allocator for AffixAllocator<P, Prefix, Suffix> {
    const ALIGNMENT: usize = if size_of::<Prefix>() != 0 {
        align_of::<Prefix>()
    } else {
        P::ALIGNMENT
    };

    const CAPS: Capabilities = Capabilities {
        aligned_allocate: false,
        owns: P::CAPS.owns,
        deallocate_all: false,
        state_size: size_of::<Self>(),
        alignment: Self::ALIGNMENT,
    };

    fn allocate(&mut self, size: usize) -> Result<Block> {
        let backing = self.parent.allocate(Self::total_allocation_size(size))?;

        // SAFETY: The backing block spans at least prefix + size bytes.
        let user = unsafe { backing.ptr().as_ptr().add(size_of::<Prefix>()) };
        // SAFETY: Derived from a non-null pointer by an in-bounds offset.
        Ok(Block::new(unsafe { NonNull::new_unchecked(user) }, size))
    }

    unsafe fn deallocate(&mut self, block: Block) {
        // SAFETY: The reconstructed block is exactly what the parent handed
        // out for this allocation.
        unsafe { self.parent.deallocate(Self::actual_allocation(&block)) };
    }
}

impl<P, Prefix, Suffix> OwningAllocator for AffixAllocator<P, Prefix, Suffix>
where
    P: OwningAllocator,
{
    fn owns(&self, block: &Block) -> bool {
        self.parent.owns(&Self::actual_allocation(block))
    }
}

impl<P, Prefix, Suffix> StatelessAllocator for AffixAllocator<P, Prefix, Suffix>
where
    P: StatelessAllocator,
{
    const INSTANCE: Self = Self {
        parent: P::INSTANCE,
        _affixes: PhantomData,
    };
}
