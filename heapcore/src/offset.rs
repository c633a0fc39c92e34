// =============================================================================
// Offset codec
// =============================================================================
//
// Free-list links are stored on-heap as 4-byte offsets from the heap base
// rather than full pointers, so every block pays 8 bytes for both links
// instead of 16. Offset 0 is reserved for "absent" — the first live header
// never sits there because `SegHeap::init` reserves the first word of the
// heap as unaddressable padding before placing the prolog (see heap.rs).

/// A 4-byte offset from the heap base. `NULL` ("absent") is never a valid
/// offset to a live block.
pub type Offset = u32;

/// Sentinel meaning "no block" — mirrors a null pointer without costing
/// the full pointer width.
pub const NULL: Offset = 0;

/// Encode an absolute heap address as an offset from `base`.
///
/// # Panics
/// In debug builds, panics if `addr < base` or the distance does not fit
/// in 32 bits — both indicate the host gave the core an address outside
/// its own heap, which is always a caller bug.
pub fn encode(base: usize, addr: usize) -> Offset {
    debug_assert!(addr >= base, "address below heap base");
    let delta = addr - base;
    debug_assert!(delta <= u32::MAX as usize, "heap span exceeds 2^32 bytes");
    delta as Offset
}

/// Decode an offset back into an absolute heap address.
pub fn decode(base: usize, offset: Offset) -> usize {
    base + offset as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let base = 0x1000;
        for off in [0u32, 8, 16, 4096, 0xFFFF_FFF0] {
            let addr = decode(base, off);
            assert_eq!(encode(base, addr), off);
        }
    }

    #[test]
    fn zero_is_base() {
        assert_eq!(encode(0x2000, 0x2000), 0);
    }
}
