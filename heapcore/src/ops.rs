// =============================================================================
// Host collaborator trait & public API
// =============================================================================
//
// `HeapOps` is exactly the four external primitives the core requires from
// its host (grow/low/high/size) — the core never assumes anything about how
// bytes are physically backed; it only ever reads/writes through raw
// pointers derived from `HeapOps::low()` plus an offset. This lets the same
// `SegHeap` run over a static arena (the `heapdrv` driver crate), an
// OS-provided `sbrk`-style growth primitive (a kernel integration), or a
// plain `Vec<u8>` (tests, below).
//
// The four public operations (`allocate`/`free`/`reallocate`/`zero_allocate`)
// are thin wrappers over `Result`-returning `try_*` methods: internal
// failures are typed (`AllocError`), but only ever surface to a caller of
// the public API as an absent (null) return, exactly matching the
// reference implementation's contract.

use crate::block::{self, BlockFlags, OVERHEAD};
use crate::coalesce;
use crate::error::AllocError;
use crate::heap::SegHeap;
use crate::search;
use crate::size_class;

#[cfg(feature = "debug-validate")]
use log::{debug, warn};

/// The four primitives `SegHeap` needs from its host environment.
///
/// Implementors back a single, monotonically-growing heap: `grow` only
/// ever appends at the current high-water mark. `SegHeap::init` asserts
/// (in debug builds) that `low()` never changes afterwards — see the
/// crate-level Design Notes on why a moving base would silently alias
/// every stored offset.
pub trait HeapOps {
    /// Extend the heap by `n` bytes (always a multiple of 4). Returns the
    /// *previous* high-water mark (the address of the first newly-acquired
    /// byte) or `None` if the host could not grow.
    fn grow(&mut self, n: u32) -> Option<usize>;
    /// The heap's fixed base address.
    fn low(&self) -> usize;
    /// The current last valid address in the heap (inclusive).
    fn high(&self) -> usize;
    /// Current heap size in bytes: `high() - low() + 1`.
    fn size(&self) -> u32;
}

impl<H: HeapOps> SegHeap<H> {
    /// Allocate `n` bytes, 8-byte aligned. Returns a null pointer on
    /// failure (size below minimum, or the heap would need to grow past
    /// its configured limit).
    pub fn allocate(&mut self, n: usize) -> *mut u8 {
        match self.try_allocate(n) {
            Ok(addr) => addr as *mut u8,
            Err(_) => core::ptr::null_mut(),
        }
    }

    /// Free a payload previously returned by `allocate`/`reallocate`/
    /// `zero_allocate`. A null `p` is a no-op.
    pub fn free(&mut self, p: *mut u8) {
        if p.is_null() {
            return;
        }
        unsafe {
            coalesce::free_coalesce(self, block::header_addr_of_payload(p as usize));
        }
    }

    /// Resize the allocation at `p` to `n` bytes, preserving its contents
    /// up to `min(old_size, n)`. Behaves as `allocate(n)` when `p` is null
    /// and as `free(p)` (returning null) when `n == 0`.
    pub fn reallocate(&mut self, p: *mut u8, n: usize) -> *mut u8 {
        match self.try_reallocate(p, n) {
            Ok(addr) => addr as *mut u8,
            Err(_) => core::ptr::null_mut(),
        }
    }

    /// Allocate space for `nmemb` elements of `size` bytes each, zeroed.
    /// Returns null if the product overflows or the underlying allocation
    /// fails.
    pub fn zero_allocate(&mut self, nmemb: usize, size: usize) -> *mut u8 {
        match self.try_zero_allocate(nmemb, size) {
            Ok(addr) => addr as *mut u8,
            Err(_) => core::ptr::null_mut(),
        }
    }

    fn try_allocate(&mut self, n: usize) -> Result<usize, AllocError> {
        let rounded = size_class::round_up(n).ok_or(AllocError::InvalidRequest)?;
        let rounded = rounded as u32;
        let class = size_class::classify(rounded);

        if let Some(addr) = unsafe {
            search::searchlist(&self.lists, self.base, class, rounded, self.config.lookahead)
        } {
            return Ok(self.place(addr, rounded));
        }

        if !class.is_large() {
            if let Some(addr) = unsafe {
                search::searchlist(
                    &self.lists,
                    self.base,
                    size_class::SizeClass::SIZEN,
                    rounded,
                    self.config.lookahead,
                )
            } {
                return Ok(self.place(addr, rounded));
            }
        }

        let grown = self.grow(rounded + OVERHEAD as u32)?;
        Ok(block::payload_addr(grown))
    }

    /// Carve or hand out `addr` (already selected by `searchlist`) whole,
    /// per the residual threshold in `self.config`.
    fn place(&mut self, addr: usize, requested: u32) -> usize {
        let residual = unsafe { block::block_size(addr) } - requested;
        unsafe {
            if residual >= self.config.min_split_residual {
                let s1 = residual - OVERHEAD as u32;
                coalesce::carve(self, addr, requested, s1)
            } else {
                coalesce::found(self, addr)
            }
        }
    }

    fn try_free_inner(&mut self, payload: usize) {
        unsafe {
            coalesce::free_coalesce(self, block::header_addr_of_payload(payload));
        }
    }

    fn try_reallocate(&mut self, p: *mut u8, n: usize) -> Result<usize, AllocError> {
        if n == 0 {
            self.free(p);
            return Err(AllocError::InvalidRequest);
        }
        if p.is_null() {
            return self.try_allocate(n);
        }

        let b = block::header_addr_of_payload(p as usize);
        let rounded = size_class::round_up(n).ok_or(AllocError::InvalidRequest)? as u32;
        let old_size = unsafe { block::block_size(b) };
        if old_size == rounded {
            return Ok(p as usize);
        }

        unsafe {
            let left = self.prev_of(b).filter(|&l| block::block_free(l));
            let right = self.next_of(b).filter(|&r| block::block_free(r));

            if let (Some(l), Some(r)) = (left, right) {
                let combined = block::block_size(l) + old_size + block::block_size(r) + 2 * OVERHEAD as u32;
                if combined >= rounded {
                    return Ok(self.grow_in_place_both(b, l, r, old_size));
                }
            }
            if let Some(r) = right {
                if old_size + block::block_size(r) + OVERHEAD as u32 >= rounded {
                    return Ok(self.grow_in_place_right(b, r));
                }
            }
            if let Some(l) = left {
                if block::block_size(l) + old_size + OVERHEAD as u32 >= rounded {
                    return Ok(self.grow_in_place_left(b, l, old_size));
                }
            }
        }

        // Fallback: relocate.
        let new_payload = self.try_allocate(n)?;
        unsafe {
            let copy_len = core::cmp::min(old_size as usize, n);
            core::ptr::copy_nonoverlapping(p, new_payload as *mut u8, copy_len);
        }
        self.try_free_inner(p as usize);
        Ok(new_payload)
    }

    /// # Safety
    /// `b` must be allocated, `l` and `r` must be its free neighbours.
    unsafe fn grow_in_place_both(&mut self, b: usize, l: usize, r: usize, old_size: u32) -> usize {
        let old_payload = block::payload_addr(b);
        self.list_remove(l);
        self.list_remove(r);
        let merged = block::block_size(l) + old_size + block::block_size(r) + 2 * OVERHEAD as u32;
        let preserved = block::block_flags(l) & (BlockFlags::PFIXED | BlockFlags::SZCLASS);
        block::set_header(l, merged, preserved | BlockFlags::ALLOC);
        block::block_mark(l);
        let new_payload = block::payload_addr(l);
        core::ptr::copy(old_payload as *const u8, new_payload as *mut u8, old_size as usize);
        new_payload
    }

    /// # Safety
    /// `b` must be allocated, `r` must be its free right neighbour.
    unsafe fn grow_in_place_right(&mut self, b: usize, r: usize) -> usize {
        self.list_remove(r);
        let merged = block::block_size(b) + block::block_size(r) + OVERHEAD as u32;
        let preserved = block::block_flags(b) & (BlockFlags::PFIXED | BlockFlags::SZCLASS);
        block::set_header(b, merged, preserved | BlockFlags::ALLOC);
        block::block_mark(b);
        block::payload_addr(b)
    }

    /// # Safety
    /// `b` must be allocated, `l` must be its free left neighbour.
    unsafe fn grow_in_place_left(&mut self, b: usize, l: usize, old_size: u32) -> usize {
        let old_payload = block::payload_addr(b);
        self.list_remove(l);
        let merged = block::block_size(l) + old_size + OVERHEAD as u32;
        let preserved = block::block_flags(l) & (BlockFlags::PFIXED | BlockFlags::SZCLASS);
        block::set_header(l, merged, preserved | BlockFlags::ALLOC);
        block::block_mark(l);
        let new_payload = block::payload_addr(l);
        core::ptr::copy(old_payload as *const u8, new_payload as *mut u8, old_size as usize);
        new_payload
    }

    fn try_zero_allocate(&mut self, nmemb: usize, size: usize) -> Result<usize, AllocError> {
        let total = nmemb.checked_mul(size).ok_or(AllocError::InvalidRequest)?;
        let addr = self.try_allocate(total)?;
        unsafe {
            core::ptr::write_bytes(addr as *mut u8, 0, total);
        }
        Ok(addr)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! A `std`-backed mock `HeapOps` over a growable `Vec<u8>`, used by every
    //! unit test in this crate and the integration tests in `tests/`.
    extern crate std;
    use super::HeapOps;
    use std::vec::Vec;

    pub struct VecArena {
        buf: Vec<u8>,
    }

    impl VecArena {
        pub fn new(capacity: usize) -> Self {
            Self {
                buf: Vec::with_capacity(capacity),
            }
        }

        pub fn base_addr(&self) -> usize {
            self.buf.as_ptr() as usize
        }
    }

    impl HeapOps for VecArena {
        fn grow(&mut self, n: u32) -> Option<usize> {
            let old_len = self.buf.len();
            let old_base = self.buf.as_ptr() as usize;
            self.buf.resize(old_len + n as usize, 0);
            // A reallocation would move every stored offset's target out
            // from under it; the tests size the arena up front to avoid
            // this entirely (see `HeapConfig::limit` vs `with_capacity`).
            assert_eq!(
                self.buf.as_ptr() as usize,
                old_base,
                "VecArena reallocated — grow test capacity up front"
            );
            Some(old_base + old_len)
        }

        fn low(&self) -> usize {
            self.buf.as_ptr() as usize
        }

        fn high(&self) -> usize {
            self.buf.as_ptr() as usize + self.buf.len() - 1
        }

        fn size(&self) -> u32 {
            self.buf.len() as u32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::VecArena;
    use super::*;
    use crate::config::HeapConfig;

    fn fresh(capacity: usize) -> SegHeap<VecArena> {
        SegHeap::init(VecArena::new(capacity), HeapConfig::default()).unwrap()
    }

    #[test]
    fn three_distinct_allocations() {
        let mut heap = fresh(4096);
        let a = heap.allocate(1);
        let b = heap.allocate(1);
        let c = heap.allocate(1);
        assert!(!a.is_null() && !b.is_null() && !c.is_null());
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_eq!(a as usize % 8, 0);
        assert_eq!(b as usize % 8, 0);
        assert_eq!(c as usize % 8, 0);
    }

    #[test]
    fn free_then_reallocate_reuses_address() {
        let mut heap = fresh(4096);
        let a = heap.allocate(24);
        let _b = heap.allocate(24);
        heap.free(a);
        let c = heap.allocate(24);
        assert_eq!(a, c);
    }

    #[test]
    fn realloc_grow_into_free_right_neighbour_preserves_bytes() {
        let mut heap = fresh(4096);
        let a = heap.allocate(100);
        let spacer = heap.allocate(16);
        unsafe {
            core::ptr::write_bytes(a, 0xAB, 100);
        }
        heap.free(spacer);
        let grown = heap.reallocate(a, 200);
        assert_eq!(grown, a);
        unsafe {
            for i in 0..100 {
                assert_eq!(*grown.add(i), 0xAB);
            }
        }
    }

    #[test]
    fn free_middle_then_first_coalesces() {
        let mut heap = fresh(4096);
        let a = heap.allocate(16);
        let b = heap.allocate(16);
        let _c = heap.allocate(16);
        heap.free(b);
        heap.free(a);
        // a and b are now one free block spanning both payloads + one
        // overhead gap: 16 + 16 + 8 = 40 bytes of payload.
        let reused = heap.allocate(40);
        assert_eq!(reused, a);
    }

    #[test]
    fn zero_allocate_is_zero_filled() {
        let mut heap = fresh(4096);
        let p = heap.zero_allocate(8, 4);
        assert!(!p.is_null());
        unsafe {
            for i in 0..32 {
                assert_eq!(*p.add(i), 0);
            }
        }
    }

    #[test]
    fn allocate_beyond_limit_fails() {
        let mut heap = SegHeap::init(
            VecArena::new(256),
            HeapConfig {
                limit: 64,
                ..HeapConfig::default()
            },
        )
        .unwrap();
        let p = heap.allocate(1);
        assert!(p.is_null());
    }

    #[test]
    fn calloc_overflow_rejected() {
        let mut heap = fresh(4096);
        let p = heap.zero_allocate(usize::MAX, 2);
        assert!(p.is_null());
    }

    #[test]
    fn realloc_with_null_behaves_as_allocate() {
        let mut heap = fresh(4096);
        let p = heap.reallocate(core::ptr::null_mut(), 32);
        assert!(!p.is_null());
    }

    #[test]
    fn realloc_with_zero_size_frees_and_returns_null() {
        let mut heap = fresh(4096);
        let p = heap.allocate(32);
        let r = heap.reallocate(p, 0);
        assert!(r.is_null());
        // the freed block should be reusable afterwards.
        let q = heap.allocate(32);
        assert_eq!(p, q);
    }

    #[test]
    fn two_large_frees_coalesce_to_single_block() {
        let mut heap = fresh(8192);
        let a = heap.allocate(300);
        let b = heap.allocate(300);
        heap.free(a);
        heap.free(b);
        // 300 -> rounds to 304 each; merged payload = 304+304+8 = 616.
        let reused = heap.allocate(600);
        assert_eq!(reused, a);
    }
}
