use thiserror::Error;

/// Errors that can occur during allocator operations.
///
/// Failure is a value, never a panic: combinators react to an `Err` (a
/// fallback retries on its second child, a freelist refills from its parent).
/// Contract violations such as a bad alignment argument are programmer errors
/// and assert instead.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// The allocator cannot serve the request
    #[error("Out of memory")]
    OutOfMemory,
    /// The requested size is zero or overflows
    #[error("Invalid allocation size")]
    InvalidSize,
}

pub type Result<T> = core::result::Result<T, AllocError>;
