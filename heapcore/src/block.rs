// =============================================================================
// Block layout & metadata
// =============================================================================
//
// Every block is a 4-byte header, a payload, and a trailing 4-byte slot that
// is a real footer for classes >= 6 and unused padding (still physically
// reserved, so `block_next` arithmetic stays uniform) for classes < 6:
//
//   class >= 6:  ┌────────┬───────────────────────┬────────┐
//                │ header │        payload        │ footer │
//                └────────┴───────────────────────┴────────┘
//
//   class <  6:  ┌────────┬────────┐ (slot unused; PFIXED/SZCLASS on the
//                │ header │ payload│  *next* block's header describe this
//                └────────┴────────┘  block's shape instead — see block_mark)
//
// All functions here take the block's *header address* and operate through
// raw pointers — the block layout is agnostic to how the bytes are backed.

use bitflags::bitflags;

/// Machine word size in bytes. Header and footer are each one word.
pub const WSIZE: usize = 4;
/// Double-word: the minimum payload granularity (8-byte alignment).
pub const DSIZE: usize = 8;
/// Fixed per-block metadata overhead: one header word plus one trailing
/// slot word, present on every block regardless of class.
pub const OVERHEAD: usize = 2 * WSIZE;

/// Total physical size of a SIZE4 block (header + 8-byte payload + slot).
pub const FIXED4_BLOCK: usize = OVERHEAD + 8;
/// Total physical size of a SIZE5 block (header + 16-byte payload + slot).
pub const FIXED5_BLOCK: usize = OVERHEAD + 16;

bitflags! {
    /// Status bits packed into the low 3 bits of a block header, alongside
    /// the payload size in the upper 29 bits (safe because payload size is
    /// always an 8-byte multiple, so those low bits are otherwise zero).
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BlockFlags: u32 {
        /// Set iff this block is currently allocated.
        const ALLOC   = 1 << 0;
        /// Set iff this block's *previous* neighbour is footerless (a
        /// SIZE4 or SIZE5 block) — `SZCLASS` then says which.
        const PFIXED  = 1 << 1;
        /// Meaningful only alongside `PFIXED`: clear for a SIZE4
        /// predecessor, set for a SIZE5 predecessor.
        const SZCLASS = 1 << 2;
    }
}

const SIZE_MASK: u32 = !0x7;
const FLAGS_MASK: u32 = 0x7;

#[inline]
unsafe fn read_u32(addr: usize) -> u32 {
    core::ptr::read(addr as *const u32)
}

#[inline]
unsafe fn write_u32(addr: usize, value: u32) {
    core::ptr::write(addr as *mut u32, value);
}

/// Pack a payload size and status flags into a header/footer word.
pub fn pack(size: u32, flags: BlockFlags) -> u32 {
    debug_assert!(size & FLAGS_MASK == 0, "payload size must be a multiple of 8");
    size | flags.bits()
}

/// Read the raw header word at `header_addr`.
///
/// # Safety
/// `header_addr` must be a live header address within the heap.
pub unsafe fn header(header_addr: usize) -> u32 {
    read_u32(header_addr)
}

/// Write a raw header/footer word at `addr` (used for both headers and
/// footer slots — they share the same encoding).
///
/// # Safety
/// `addr` must be a valid header or footer-slot address within the heap.
pub unsafe fn set_header(addr: usize, size: u32, flags: BlockFlags) {
    write_u32(addr, pack(size, flags));
}

/// # Safety
/// `header_addr` must be a live header address within the heap.
pub unsafe fn block_size(header_addr: usize) -> u32 {
    header(header_addr) & SIZE_MASK
}

/// # Safety
/// `header_addr` must be a live header address within the heap.
pub unsafe fn block_flags(header_addr: usize) -> BlockFlags {
    BlockFlags::from_bits_truncate(header(header_addr) & FLAGS_MASK)
}

/// # Safety
/// `header_addr` must be a live header address within the heap.
pub unsafe fn block_free(header_addr: usize) -> bool {
    !block_flags(header_addr).contains(BlockFlags::ALLOC)
}

/// Address of this block's payload (immediately after its header).
pub const fn payload_addr(header_addr: usize) -> usize {
    header_addr + WSIZE
}

/// Address of the header owning a given payload address.
pub const fn header_addr_of_payload(payload_addr: usize) -> usize {
    payload_addr - WSIZE
}

/// Address of the first byte past this block's payload (its trailing slot).
///
/// # Safety
/// `header_addr` must be a live header address within the heap.
pub unsafe fn footer_slot_addr(header_addr: usize) -> usize {
    header_addr + WSIZE + block_size(header_addr) as usize
}

/// Address of the next adjacent block's header, or `None` if `header_addr`
/// is the epilog (the heap's rightmost sentinel).
///
/// # Safety
/// `header_addr` must be a live header address within the heap.
pub unsafe fn block_next(header_addr: usize, epilog_addr: usize) -> Option<usize> {
    if header_addr == epilog_addr {
        return None;
    }
    Some(header_addr + OVERHEAD + block_size(header_addr) as usize)
}

/// Address of the previous adjacent block's header, or `None` if
/// `header_addr` is the prolog (the heap's leftmost sentinel).
///
/// Reads `header_addr`'s own PFIXED/SZCLASS bits, which describe the shape
/// of *this* block's left neighbour (set by that neighbour's own
/// `block_mark` call), to decide whether to step back a fixed offset or to
/// read a real footer.
///
/// # Safety
/// `header_addr` must be a live header address within the heap.
pub unsafe fn block_prev(header_addr: usize, prolog_addr: usize) -> Option<usize> {
    if header_addr == prolog_addr {
        return None;
    }
    let flags = block_flags(header_addr);
    if flags.contains(BlockFlags::PFIXED) {
        let step = if flags.contains(BlockFlags::SZCLASS) {
            FIXED5_BLOCK
        } else {
            FIXED4_BLOCK
        };
        Some(header_addr - step)
    } else {
        let footer_addr = header_addr - WSIZE;
        let prev_size = read_u32(footer_addr) & SIZE_MASK;
        Some(header_addr - OVERHEAD - prev_size as usize)
    }
}

/// Write the footer-or-next-header metadata that `block_prev` of the block
/// *after* this one will read. Must be called after any change to this
/// block's size, class, or ALLOC bit.
///
/// For SIZE4/SIZE5 blocks (no footer): stamps PFIXED=1 and the SZCLASS bit
/// onto the next block's header, leaving that header's own ALLOC/size bits
/// untouched. For every other class: clears PFIXED/SZCLASS on the next
/// header (this block now carries a real footer) and mirrors this block's
/// header into its own trailing slot.
///
/// # Safety
/// `header_addr` must be a live header address within the heap, and the
/// block immediately following it (possibly the epilog) must be valid.
pub unsafe fn block_mark(header_addr: usize) {
    let size = block_size(header_addr);
    let flags = block_flags(header_addr);
    let class = crate::size_class::classify(size.max(8));
    let next_addr = header_addr + OVERHEAD + size as usize;
    let next_word = read_u32(next_addr);
    let next_size_and_alloc = next_word & !(BlockFlags::PFIXED.bits() | BlockFlags::SZCLASS.bits());
    let next_word = if class.is_footerless() {
        let szclass_bit = if class.szclass_bit() {
            BlockFlags::SZCLASS.bits()
        } else {
            0
        };
        next_size_and_alloc | BlockFlags::PFIXED.bits() | szclass_bit
    } else {
        write_u32(header_addr + WSIZE + size as usize, size | flags.bits());
        next_size_and_alloc
    };
    write_u32(next_addr, next_word);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_arena<F: FnOnce(usize)>(len: usize, f: F) {
        extern crate std;
        let mut buf = std::vec![0u8; len];
        f(buf.as_mut_ptr() as usize);
    }

    #[test]
    fn pack_and_read_roundtrip() {
        with_arena(64, |base| unsafe {
            set_header(base, 32, BlockFlags::ALLOC);
            assert_eq!(block_size(base), 32);
            assert!(block_flags(base).contains(BlockFlags::ALLOC));
            assert!(!block_free(base));
        });
    }

    #[test]
    fn mark_footerless_sets_next_pfixed() {
        with_arena(64, |base| unsafe {
            // block at base: SIZE4 (payload 8), allocated.
            set_header(base, 8, BlockFlags::ALLOC);
            let next = base + OVERHEAD + 8;
            set_header(next, 16, BlockFlags::ALLOC); // pretend-allocated next block
            block_mark(base);
            let nf = block_flags(next);
            assert!(nf.contains(BlockFlags::PFIXED));
            assert!(!nf.contains(BlockFlags::SZCLASS));
            assert!(nf.contains(BlockFlags::ALLOC));
            assert_eq!(block_size(next), 16);
        });
    }

    #[test]
    fn mark_footered_writes_footer_and_clears_next_pfixed() {
        with_arena(96, |base| unsafe {
            set_header(base, 32, BlockFlags::empty()); // class SIZE7, free
            let next = base + OVERHEAD + 32;
            set_header(next, 8, BlockFlags::ALLOC | BlockFlags::PFIXED);
            block_mark(base);
            let footer = header(base + WSIZE + 32);
            assert_eq!(footer, pack(32, BlockFlags::empty()));
            let nf = block_flags(next);
            assert!(!nf.contains(BlockFlags::PFIXED));
        });
    }

    #[test]
    fn prev_next_are_mutual_inverses() {
        with_arena(96, |base| unsafe {
            set_header(base, 8, BlockFlags::ALLOC); // SIZE4
            block_mark(base);
            let next = base + OVERHEAD + 8;
            set_header(next, 32, BlockFlags::ALLOC);
            block_mark(next);

            assert_eq!(block_next(base, usize::MAX), Some(next));
            assert_eq!(block_prev(next, 0), Some(base));
        });
    }
}
