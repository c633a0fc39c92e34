// =============================================================================
// Heap validator
// =============================================================================
//
// Gated behind the `debug-validate` feature: the core is too slow to
// validate after every call outside of debug builds and tests. Two passes:
// (1) walk prolog -> epilog checking alignment and neighbour symmetry,
// counting free blocks as we go; (2) walk every free list checking
// doubly-linked symmetry and the ALLOC bit, decrementing the same tally.
// Success iff the tally lands exactly on zero — every free block the first
// pass counted was found on exactly one list in the second.

use log::error;

use crate::block;
use crate::error::AllocError;
use crate::freelist::FreeLists;
use crate::heap::SegHeap;
use crate::ops::HeapOps;
use crate::size_class::NUM_CLASSES;

/// Walk the whole heap and every free list, checking every invariant listed
/// in the crate's module docs. Returns `Ok(())` if they all hold.
pub fn validate<H: HeapOps>(heap: &SegHeap<H>) -> Result<(), AllocError> {
    let free_count = walk_blocks(heap)?;
    walk_free_lists(heap, free_count)
}

fn walk_blocks<H: HeapOps>(heap: &SegHeap<H>) -> Result<usize, AllocError> {
    let mut free_count = 0usize;
    let mut cursor = heap.prolog;
    loop {
        let next = unsafe { heap.next_of(cursor) };
        match next {
            Some(n) => {
                let payload = block::payload_addr(n);
                if payload % 8 != 0 {
                    error!("heapcore: validator: block {n:#x} payload not 8-aligned");
                    return Err(AllocError::Corruption);
                }
                if unsafe { heap.prev_of(n) } != Some(cursor) {
                    error!("heapcore: validator: block_prev(block_next({cursor:#x})) != {cursor:#x}");
                    return Err(AllocError::Corruption);
                }
                if unsafe { block::block_free(n) } {
                    free_count += 1;
                }
                cursor = n;
            }
            None => break, // cursor is the epilog
        }
    }
    Ok(free_count)
}

fn walk_free_lists<H: HeapOps>(heap: &SegHeap<H>, mut tally: usize) -> Result<(), AllocError> {
    for idx in 0..NUM_CLASSES {
        let class = crate::size_class::SizeClass::from_index(idx);
        let head = heap.lists.head(class);
        if head == crate::offset::NULL {
            continue;
        }
        let base = heap.base;
        let head_addr = crate::offset::decode(base, head);
        let mut cursor = head_addr;
        loop {
            if !unsafe { block::block_free(cursor) } {
                error!("heapcore: validator: free-list member {cursor:#x} has ALLOC set");
                return Err(AllocError::Corruption);
            }
            if cursor < heap.base || cursor > heap.epilog {
                error!("heapcore: validator: free-list member {cursor:#x} out of heap bounds");
                return Err(AllocError::Corruption);
            }
            let next = unsafe { FreeLists::next_in_list(base, cursor) };
            let prev = unsafe { FreeLists::prev_in_list(base, cursor) };
            if unsafe { FreeLists::next_in_list(base, prev) } != cursor {
                error!("heapcore: validator: next(prev({cursor:#x})) != {cursor:#x}");
                return Err(AllocError::Corruption);
            }
            tally = tally.checked_sub(1).ok_or_else(|| {
                error!("heapcore: validator: more free-list members than free blocks counted");
                AllocError::Corruption
            })?;
            cursor = next;
            if cursor == head_addr {
                break;
            }
        }
    }
    if tally != 0 {
        error!("heapcore: validator: {tally} free block(s) unaccounted for in any free list");
        return Err(AllocError::Corruption);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HeapConfig;
    use crate::ops::test_support::VecArena;

    fn fresh(capacity: usize) -> SegHeap<VecArena> {
        SegHeap::init(VecArena::new(capacity), HeapConfig::default()).unwrap()
    }

    #[test]
    fn fresh_heap_validates() {
        let heap = fresh(4096);
        assert!(validate(&heap).is_ok());
    }

    #[test]
    fn after_alloc_free_pattern_validates() {
        let mut heap = fresh(4096);
        let a = heap.allocate(16);
        let b = heap.allocate(16);
        let _c = heap.allocate(16);
        heap.free(b);
        heap.free(a);
        assert!(validate(&heap).is_ok());
    }

    #[test]
    fn corrupted_alloc_bit_is_detected() {
        let mut heap = fresh(4096);
        let p = heap.allocate(16);
        heap.free(p);
        // Directly corrupt the free block's ALLOC bit without going
        // through list_remove — simulates a stray out-of-bounds write.
        let header_addr = block::header_addr_of_payload(p as usize);
        unsafe {
            let size = block::block_size(header_addr);
            block::set_header(header_addr, size, crate::block::BlockFlags::ALLOC);
        }
        assert_eq!(validate(&heap), Err(AllocError::Corruption));
    }
}
