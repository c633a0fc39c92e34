// =============================================================================
// Size-class map
// =============================================================================
//
// Maps an (already 8-aligned) payload byte count to one of 13 size classes:
// three fixed-size buckets (SIZE4/5/6), several tight contiguous ranges, and
// one unbounded "large" class (SIZEN). The boundaries below are authoritative
// — both `searchlist`'s small-class fast path and the carve/coalesce split
// policy assume them exactly as written here.

/// Number of distinct size classes, including the unbounded large class.
pub const NUM_CLASSES: usize = 13;

/// First size class considered "large": below this, `searchlist` can return
/// a list's head unconditionally because every member is guaranteed to fit
/// a request that was rounded up to the class's own floor.
const FIRST_BOUNDED_BEST_FIT_INDEX: u8 = 7; // class index of SIZE11

/// One of the allocator's 13 size-class buckets, addressed by a zero-based
/// list index 0..=12 (index 0 = class "4" = SIZE4, ..., index 12 = class
/// "N" = SIZEN) — matching the reference implementation's 13-entry list
/// array (`LISTBOUND = 13`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeClass(u8);

impl SizeClass {
    pub const SIZE4: SizeClass = SizeClass(0);
    pub const SIZE5: SizeClass = SizeClass(1);
    pub const SIZE6: SizeClass = SizeClass(2);
    pub const SIZE7: SizeClass = SizeClass(3);
    pub const SIZE8: SizeClass = SizeClass(4);
    pub const SIZE9: SizeClass = SizeClass(5);
    pub const SIZE10: SizeClass = SizeClass(6);
    pub const SIZE11: SizeClass = SizeClass(7);
    pub const SIZE12: SizeClass = SizeClass(8);
    pub const SIZE13: SizeClass = SizeClass(9);
    pub const SIZE14: SizeClass = SizeClass(10);
    pub const SIZE15: SizeClass = SizeClass(11);
    pub const SIZEN: SizeClass = SizeClass(12);

    /// Zero-based index into a 13-element free-list array.
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub const fn from_index(index: usize) -> Self {
        debug_assert!(index < NUM_CLASSES);
        SizeClass(index as u8)
    }

    /// Classes below SIZE11 are "small": fixed (SIZE4/5/6) or tight enough
    /// that any member satisfies a request rounded up to the class floor,
    /// so `searchlist` can skip the best-fit scan entirely.
    pub const fn is_small(self) -> bool {
        self.0 < FIRST_BOUNDED_BEST_FIT_INDEX
    }

    /// The unbounded fallback class.
    pub const fn is_large(self) -> bool {
        self.0 == SizeClass::SIZEN.0
    }

    /// `true` for SIZE4/SIZE5 — the two classes with no footer, whose
    /// previous-neighbour shape is instead threaded through PFIXED/SZCLASS
    /// bits on the *next* block's header.
    pub const fn is_footerless(self) -> bool {
        self.0 < SizeClass::SIZE6.0
    }

    /// The SZCLASS bit value a footerless block's header leaves for its
    /// successor to read back via `block_prev`. Only meaningful when
    /// `is_footerless()`.
    pub const fn szclass_bit(self) -> bool {
        self.0 == SizeClass::SIZE5.0
    }
}

/// Round a requested byte count up to an 8-byte multiple, collapsing the
/// reference implementation's awkward small-request clamps onto the 8- and
/// 16-byte buckets. Returns `None` if the request cannot be satisfied at
/// all (zero, or overflowed past usize on rounding).
pub fn round_up(n: usize) -> Option<usize> {
    let aligned = n.checked_add(7)? & !7;
    let rounded = if aligned <= 12 {
        8
    } else if aligned <= 20 {
        16
    } else {
        aligned
    };
    if rounded < 8 {
        None
    } else {
        Some(rounded)
    }
}

/// Classify an already-rounded payload size into its size class.
///
/// # Panics
/// Debug-asserts the input is 8-aligned and non-zero — every caller in this
/// crate rounds through [`round_up`] first.
pub fn classify(payload_size: u32) -> SizeClass {
    debug_assert!(payload_size >= 8 && payload_size % 8 == 0);
    match payload_size {
        8 => SizeClass::SIZE4,
        16 => SizeClass::SIZE5,
        24 => SizeClass::SIZE6,
        25..=36 => SizeClass::SIZE7,
        37..=40 => SizeClass::SIZE8,
        41..=48 => SizeClass::SIZE9,
        49..=56 => SizeClass::SIZE10,
        57..=72 => SizeClass::SIZE11,
        73..=104 => SizeClass::SIZE12,
        105..=304 => SizeClass::SIZE13,
        305..=504 => SizeClass::SIZE14,
        505..=1000 => SizeClass::SIZE15,
        _ => SizeClass::SIZEN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_table() {
        assert_eq!(classify(8), SizeClass::SIZE4);
        assert_eq!(classify(16), SizeClass::SIZE5);
        assert_eq!(classify(24), SizeClass::SIZE6);
        assert_eq!(classify(32), SizeClass::SIZE7);
        assert_eq!(classify(36), SizeClass::SIZE7);
        assert_eq!(classify(40), SizeClass::SIZE8);
        assert_eq!(classify(48), SizeClass::SIZE9);
        assert_eq!(classify(56), SizeClass::SIZE10);
        assert_eq!(classify(72), SizeClass::SIZE11);
        assert_eq!(classify(104), SizeClass::SIZE12);
        assert_eq!(classify(304), SizeClass::SIZE13);
        assert_eq!(classify(504), SizeClass::SIZE14);
        assert_eq!(classify(1000), SizeClass::SIZE15);
        assert_eq!(classify(1008), SizeClass::SIZEN);
        assert_eq!(classify(1_000_000), SizeClass::SIZEN);
    }

    #[test]
    fn small_classes_match_spec_shortcut() {
        // classes 4..10 (indices 0..6) are "small"; 11 and up are not.
        for idx in 0..7 {
            assert!(SizeClass::from_index(idx).is_small());
        }
        for idx in 7..NUM_CLASSES {
            assert!(!SizeClass::from_index(idx).is_small());
        }
    }

    #[test]
    fn round_up_clamps() {
        assert_eq!(round_up(1), Some(8));
        assert_eq!(round_up(8), Some(8));
        assert_eq!(round_up(12), Some(8));
        assert_eq!(round_up(13), Some(16));
        assert_eq!(round_up(20), Some(16));
        assert_eq!(round_up(21), Some(24));
        assert_eq!(round_up(100), Some(104));
    }

    #[test]
    fn every_size_in_range_classifies_consistently() {
        for s in 1u32..10_000 {
            let rounded = round_up(s as usize).unwrap() as u32;
            let class = classify(rounded);
            assert!(class.index() < NUM_CLASSES);
        }
    }
}
