// =============================================================================
// Error handling
// =============================================================================
//
// Internally every fallible core operation returns `Result<_, AllocError>` so
// call sites can match on the specific failure. The public API (ops.rs)
// collapses `Ok` / `Err` to the C-style "absent" return (`Option::None`) at
// the boundary, matching the allocator's documented failure semantics: the
// caller never sees an error code, only a null-equivalent.

/// Failure reasons for the core's internal operations.
///
/// Only [`AllocError::OutOfMemory`] and [`AllocError::InvalidRequest`] are
/// reachable from the public API (as an absent return); [`AllocError::Corruption`]
/// is only constructible by the validator, which itself only exists under
/// the `debug-validate` feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// Growing the heap would exceed `HeapConfig::limit`, or the host's
    /// `HeapOps::grow` primitive itself failed.
    OutOfMemory,
    /// The requested size is below the allocator's minimum, or a
    /// `zero_allocate` element-count/size product overflowed.
    InvalidRequest,
    /// The heap validator found a broken invariant. Only ever produced
    /// under the `debug-validate` feature.
    #[cfg(feature = "debug-validate")]
    Corruption,
}
