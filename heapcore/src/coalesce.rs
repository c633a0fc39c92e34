// =============================================================================
// Splitting and coalescing
// =============================================================================
//
// `carve` splits a chosen free block into an allocated prefix and a freed
// remainder (called only when the residual is large enough to be worth
// keeping as its own block — see `HeapConfig::min_split_residual`).
// `found` hands out a chosen block whole, with no split. `free_coalesce`
// merges a newly-freed block with up to two free neighbours.

use crate::block::{self, BlockFlags, OVERHEAD};
use crate::hc_debug;
use crate::heap::SegHeap;
use crate::ops::HeapOps;

/// Hand out `block_addr` (already selected by `searchlist`) whole: remove it
/// from its free list, mark it allocated, and return its payload address.
///
/// # Safety
/// `block_addr` must be a live member of the free list matching its current
/// size class.
pub unsafe fn found<H: HeapOps>(heap: &mut SegHeap<H>, block_addr: usize) -> usize {
    heap.list_remove(block_addr);
    let size = block::block_size(block_addr);
    let flags = block::block_flags(block_addr) | BlockFlags::ALLOC;
    block::set_header(block_addr, size, flags);
    block::block_mark(block_addr);
    block::payload_addr(block_addr)
}

/// Split `block_addr` (currently free, on its class's list) into an
/// allocated prefix of payload `s0` and a free remainder of payload `s1`,
/// where `s0 + OVERHEAD + s1 == size(block_addr)`. Returns the prefix's
/// payload address.
///
/// # Safety
/// `block_addr` must be a live free-list member and `s0 + OVERHEAD + s1`
/// must exactly equal its current payload size.
pub unsafe fn carve<H: HeapOps>(heap: &mut SegHeap<H>, block_addr: usize, s0: u32, s1: u32) -> usize {
    debug_assert_eq!(
        s0 as usize + OVERHEAD + s1 as usize,
        block::block_size(block_addr) as usize
    );
    heap.list_remove(block_addr);

    let preserved = block::block_flags(block_addr) & (BlockFlags::PFIXED | BlockFlags::SZCLASS);
    let right_addr = block_addr + OVERHEAD + s0 as usize;

    // Write R's header first (free, no PFIXED/SZCLASS yet) so that marking
    // B right after can safely read-modify-write the word at R's address
    // without touching garbage left over from B's old payload.
    block::set_header(right_addr, s1, BlockFlags::empty());

    block::set_header(block_addr, s0, preserved | BlockFlags::ALLOC);
    block::block_mark(block_addr); // stamps R's PFIXED/SZCLASS per B's new class

    block::block_mark(right_addr); // propagates R's class to whatever follows it
    heap.list_add(right_addr);

    block::payload_addr(block_addr)
}

/// Coalesce on free: clear `block_addr`'s ALLOC bit and merge with up to two
/// free adjacent neighbours, reinserting the (possibly merged) result into
/// the appropriate free list. Returns the header address of the resulting
/// free block (== `block_addr` unless the left neighbour absorbed it).
///
/// # Safety
/// `block_addr` must currently be an allocated block's header address.
pub unsafe fn free_coalesce<H: HeapOps>(heap: &mut SegHeap<H>, block_addr: usize) -> usize {
    let size = block::block_size(block_addr);
    let flags = block::block_flags(block_addr) & !BlockFlags::ALLOC;
    block::set_header(block_addr, size, flags);
    block::block_mark(block_addr);

    let left = heap.prev_of(block_addr).filter(|&l| block::block_free(l));
    let right = heap.next_of(block_addr).filter(|&r| block::block_free(r));

    match (left, right) {
        (Some(l), Some(r)) => {
            hc_debug!("heapcore: coalescing {block_addr:#x} with both neighbours {l:#x}/{r:#x}");
            heap.list_remove(l);
            heap.list_remove(r);
            let merged = block::block_size(l) + block::block_size(block_addr) + block::block_size(r)
                + 2 * OVERHEAD as u32;
            let preserved = block::block_flags(l); // l's own PFIXED/SZCLASS, describing l's predecessor
            block::set_header(l, merged, preserved & !BlockFlags::ALLOC);
            block::block_mark(l);
            heap.list_add(l);
            l
        }
        (None, Some(r)) => {
            hc_debug!("heapcore: coalescing {block_addr:#x} with right neighbour {r:#x}");
            heap.list_remove(r);
            let merged = block::block_size(block_addr) + block::block_size(r) + OVERHEAD as u32;
            let preserved = block::block_flags(block_addr) & (BlockFlags::PFIXED | BlockFlags::SZCLASS);
            block::set_header(block_addr, merged, preserved);
            block::block_mark(block_addr);
            heap.list_add(block_addr);
            block_addr
        }
        (Some(l), None) => {
            hc_debug!("heapcore: coalescing {block_addr:#x} with left neighbour {l:#x}");
            heap.list_remove(l);
            let merged = block::block_size(l) + block::block_size(block_addr) + OVERHEAD as u32;
            let preserved = block::block_flags(l);
            block::set_header(l, merged, preserved & !BlockFlags::ALLOC);
            block::block_mark(l);
            heap.list_add(l);
            l
        }
        (None, None) => {
            heap.list_add(block_addr);
            block_addr
        }
    }
}
