// =============================================================================
// SegHeap: the allocator context
// =============================================================================
//
// The 13 free-list heads, the prolog/epilog addresses and the heap base
// together form the allocator's process-wide state, initialised once by
// `init` and torn down with the host. This module defines that state as a
// single `SegHeap<H>` context, generic over the host collaborator `H:
// HeapOps` (ops.rs), so the same core runs over a static arena, an OS
// `sbrk`-style primitive, or a test-only growable `Vec<u8>`.

use crate::block::{self, BlockFlags, OVERHEAD, WSIZE};
use crate::config::HeapConfig;
use crate::error::AllocError;
use crate::freelist::FreeLists;
use crate::hc_debug;
use crate::ops::HeapOps;

/// The allocator's full process-wide state: heap bounds, sentinels, the 13
/// free-list heads, and the host collaborator that actually backs the
/// bytes.
///
/// `SegHeap` itself has no internal locking — see the crate-level docs and
/// the `heapdrv` driver crate for the `GlobalAlloc` wrapper that adds one.
pub struct SegHeap<H: HeapOps> {
    pub(crate) ops: H,
    pub(crate) config: HeapConfig,
    /// Fixed heap base, captured once at `init` and asserted never to move
    /// (see Design Notes: `HeapOps::low()` must be stable post-init).
    pub(crate) base: usize,
    pub(crate) prolog: usize,
    pub(crate) epilog: usize,
    pub(crate) lists: FreeLists,
}

impl<H: HeapOps> SegHeap<H> {
    /// Initialise a fresh heap over `ops`: reserve the first `4 * WSIZE`
    /// (16) bytes, place the prolog and epilog sentinels, and start all 13
    /// free lists empty.
    ///
    /// The very first word is left as unaddressable padding so that heap
    /// offset 0 stays reserved for "absent" (no live header ever sits
    /// there).
    pub fn init(mut ops: H, config: HeapConfig) -> Result<Self, AllocError> {
        let base = ops.low();
        let start = ops.grow((4 * WSIZE) as u32).ok_or(AllocError::OutOfMemory)?;
        debug_assert_eq!(start, base, "HeapOps::low() must be stable across grow()");

        // Layout of the reserved 16 bytes: [padding][prolog header][prolog
        // footer][epilog], mirroring mm_init's p[0]=0, p[1..2]=ALLOC size-0
        // header+footer, p[3]=ALLOC. The prolog carries a real footer (like
        // any class->=6 block) rather than PFIXED/SZCLASS bits, so the
        // first real block's `block_prev` finds it via the ordinary
        // footer-read path with no special-casing.
        let prolog = base + WSIZE;
        let epilog = base + 3 * WSIZE;
        unsafe {
            block::set_header(prolog, 0, BlockFlags::ALLOC);
            block::set_header(prolog + WSIZE, 0, BlockFlags::ALLOC); // prolog's footer
            block::set_header(epilog, 0, BlockFlags::ALLOC);
        }

        Ok(Self {
            ops,
            config,
            base,
            prolog,
            epilog,
            lists: FreeLists::new(),
        })
    }

    pub fn config(&self) -> HeapConfig {
        self.config
    }

    pub fn base(&self) -> usize {
        self.base
    }

    /// # Safety
    /// `header_addr` must be a live header address within this heap.
    pub(crate) unsafe fn next_of(&self, header_addr: usize) -> Option<usize> {
        block::block_next(header_addr, self.epilog)
    }

    /// # Safety
    /// `header_addr` must be a live header address within this heap.
    pub(crate) unsafe fn prev_of(&self, header_addr: usize) -> Option<usize> {
        block::block_prev(header_addr, self.prolog)
    }

    /// # Safety
    /// `block_addr` must be a free block's header address within this heap,
    /// not currently a member of any list.
    pub(crate) unsafe fn list_add(&mut self, block_addr: usize) {
        self.lists.add(self.base, block_addr);
    }

    /// # Safety
    /// `block_addr` must be a live member of the list for its current size
    /// class.
    pub(crate) unsafe fn list_remove(&mut self, block_addr: usize) {
        self.lists.remove(self.base, block_addr);
    }

    /// Grow the heap by `n` bytes (a multiple of `WSIZE`), placing a new
    /// free block of payload `n - OVERHEAD` immediately before a relocated
    /// epilog, and inheriting the PFIXED/SZCLASS bits the old epilog
    /// carried (they describe the new block's left neighbour, unchanged by
    /// growth).
    ///
    /// Returns the new block's header address. The block is already marked
    /// allocated and is never inserted into a free list — growth only ever
    /// happens as malloc's last resort, producing a block sized exactly to
    /// the request.
    pub(crate) fn grow(&mut self, n: u32) -> Result<usize, AllocError> {
        if (n as u64) + self.ops.size() as u64 > self.config.limit as u64 {
            hc_debug!("heapcore: grow({n}) would exceed limit {}", self.config.limit);
            return Err(AllocError::OutOfMemory);
        }
        let old_high_plus_one = self.ops.grow(n).ok_or(AllocError::OutOfMemory)?;
        hc_debug!("heapcore: growing heap by {n} bytes (new size {})", self.ops.size());

        // The old epilog occupied the last word before growth; its bits
        // describe the block that will become this new block's left
        // neighbour.
        let old_epilog = self.epilog;
        let inherited = unsafe { block::block_flags(old_epilog) }
            & (BlockFlags::PFIXED | BlockFlags::SZCLASS);

        let new_block = old_epilog; // the old epilog's word becomes the new block's header
        let payload = n as usize - OVERHEAD;
        unsafe {
            // A block grown to satisfy a miss against every free list is
            // handed straight to the caller as allocated — it is never
            // inserted into a free list first.
            block::set_header(new_block, payload as u32, inherited | BlockFlags::ALLOC);
        }
        self.epilog = old_high_plus_one + n as usize - WSIZE;
        unsafe {
            block::set_header(self.epilog, 0, BlockFlags::ALLOC);
        }
        unsafe {
            block::block_mark(new_block);
        }
        Ok(new_block)
    }

    /// Log `(address, size, alloc-flag)` for every block from prolog to
    /// epilog, at `log::debug!`. A faithful but non-core analogue of the
    /// reference implementation's `printheap` — dead code eliminated
    /// entirely unless the `log` feature is enabled.
    #[cfg(feature = "log")]
    pub fn dump_heap(&self) {
        let mut cursor = self.prolog;
        loop {
            let size = unsafe { block::block_size(cursor) };
            let alloc = unsafe { !block::block_free(cursor) };
            hc_debug!("heapcore: block {cursor:#x} size={size} alloc={alloc}");
            match unsafe { self.next_of(cursor) } {
                Some(next) => cursor = next,
                None => break,
            }
        }
    }

    #[cfg(not(feature = "log"))]
    pub fn dump_heap(&self) {}

    /// Log every free list's membership, one line per class, at
    /// `log::debug!`. A faithful but non-core analogue of the reference
    /// implementation's `printflist`/`printallflist`.
    #[cfg(feature = "log")]
    pub fn dump_free_lists(&self) {
        use crate::size_class::{SizeClass, NUM_CLASSES};
        for idx in 0..NUM_CLASSES {
            let class = SizeClass::from_index(idx);
            let head = self.lists.head(class);
            if head == crate::offset::NULL {
                hc_debug!("heapcore: class {idx} empty");
                continue;
            }
            let head_addr = crate::offset::decode(self.base, head);
            let mut cursor = head_addr;
            loop {
                let size = unsafe { block::block_size(cursor) };
                hc_debug!("heapcore: class {idx} member {cursor:#x} size={size}");
                cursor = unsafe { FreeLists::next_in_list(self.base, cursor) };
                if cursor == head_addr {
                    break;
                }
            }
        }
    }

    #[cfg(not(feature = "log"))]
    pub fn dump_free_lists(&self) {}
}
