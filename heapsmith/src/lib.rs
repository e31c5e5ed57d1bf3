//! # Heapsmith: Composable Memory Allocator Toolkit
//!
//! Heapsmith is a family of `no_std` allocators that all speak the same
//! block-based contract and can be nested into each other at compile time.
//! Leaves produce memory; combinators wrap one or two inner allocators and
//! add a policy. A composed allocator's size is the sum of its stateful
//! parts, dispatch is fully static, and a composition of stateless pieces is
//! itself a zero-sized stateless allocator.
//!
//! ## Architecture
//!
//! Every allocation returns a [`Block`]: the pointer handed out together with
//! the length the caller asked for. Releasing a block is decided by
//! *ownership queries* ("does this allocator manage this address range?"),
//! never by remembering where an allocation came from, which is what makes
//! the combinators freely stackable.
//!
//! Leaves:
//! - [`NullAllocator`]: always fails; terminates fallback chains and injects
//!   allocation failure into tests.
//! - [`InlineAllocator`]: serves from an embedded buffer with zero
//!   bookkeeping.
//! - [`SystemAllocator`] / [`AlignedSystemAllocator`]: delegate to the
//!   platform heap.
//!
//! Combinators:
//! - [`FallbackAllocator`]: tries a primary, retries on a fallback.
//! - [`FreelistAllocator`]: caches freed blocks of a size range on a LIFO
//!   free list.
//! - [`AffixAllocator`]: reserves typed header/footer metadata slots around
//!   every allocation.
//! - [`SegregateAllocator`]: routes by a size threshold.
//!
//! Optional operations (aligned allocation, ownership, bulk deallocation)
//! live on their own traits; a combinator implements one exactly when its
//! children support what the operation needs, so an unsupported composition
//! fails to compile instead of failing at runtime. The same information is
//! available as a constant [`Capabilities`] record per type.
//!
//! ## Usage
//!
//! ```rust
//! use heapsmith::{Allocator, FallbackAllocator, FreelistAllocator, SystemAllocator, UNBOUNDED};
//!
//! // A small-object cache in front of the platform heap.
//! let mut allocator =
//!     FreelistAllocator::<SystemAllocator, 0, 64, UNBOUNDED>::new(SystemAllocator);
//!
//! let block = allocator.allocate(48).unwrap();
//! assert!(block.len() >= 48);
//!
//! // Freed in-range blocks are cached and served again.
//! unsafe { allocator.deallocate(block) };
//! let reused = allocator.allocate(48).unwrap();
//! # unsafe { allocator.deallocate(reused) };
//! ```
//!
//! ## Thread Safety
//!
//! Allocators are not intrinsically thread-safe: every operation takes
//! `&mut self`, and cross-thread sharing requires an external synchronizing
//! wrapper.
#![warn(clippy::pedantic, clippy::nursery)]
#![forbid(unsafe_op_in_unsafe_fn)]
#![no_std]

mod affix;
mod allocator;
mod block;
mod error;
mod fallback;
mod freelist;
mod inline;
mod null;
mod segregate;
mod system;
mod utils;

pub use affix::AffixAllocator;
pub use allocator::{
    AlignedAllocator, Allocator, BulkDeallocator, Capabilities, OwningAllocator,
    PLATFORM_MAX_ALIGNMENT, StatelessAllocator, allocate_array_of, allocate_of,
};
pub use block::Block;
pub use error::{AllocError, Result};
pub use fallback::FallbackAllocator;
pub use freelist::{FreelistAllocator, UNBOUNDED};
pub use inline::InlineAllocator;
pub use null::NullAllocator;
pub use segregate::SegregateAllocator;
pub use system::{AlignedSystemAllocator, SystemAllocator};

/// A ready-made general-purpose policy: small objects are recycled through a
/// freelist in front of the platform heap, everything else goes straight
/// through.
pub type SmallObjectAllocator = FreelistAllocator<SystemAllocator, 0, 256, UNBOUNDED>;

#[macro_export]
macro_rules! static_assert {
    ($condition:expr $(, $($arg:tt)+)?) => {
        const _: () = assert!($condition $(, $($arg)+)?);
    };
}
