// =============================================================================
// heapdrv — GlobalAlloc driver over heapcore
// =============================================================================
//
// Wires `heapcore::SegHeap` up as a `#[global_allocator]`: a fixed-capacity
// static byte arena stands in for `HeapOps`, growing by bumping a high-water
// mark within that storage, and a ticket spinlock (same design as the
// teacher kernel's `sync::spinlock::SpinLock`, reimplemented here rather than
// pulled in as a dependency — see DESIGN.md) serializes access across
// threads.
//
// The arena's storage is a `static mut` byte array sized at construction
// time; `ArenaOps::grow` never moves it, satisfying `HeapOps`'s stability
// requirement for free.

#![no_std]

use core::alloc::{GlobalAlloc, Layout};
use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicU32, Ordering};

use heapcore::{AllocError, HeapConfig, HeapOps, SegHeap};

/// Every block this allocator hands out is 8-byte aligned (`block::DSIZE`
/// in heapcore). A `Layout` asking for more cannot be satisfied.
const NATIVE_ALIGN: usize = 8;

/// A fixed-capacity byte arena implementing `HeapOps` by bumping a
/// high-water mark within `storage`. `N` is the arena's total capacity in
/// bytes, chosen by the caller of [`LockedSegHeap::new`].
pub struct ArenaOps<const N: usize> {
    storage: *mut u8,
    base: usize,
    high_water: usize,
}

// SAFETY: the arena is only ever touched while `LockedSegHeap`'s spinlock is
// held, which is the only way to reach `ArenaOps` methods.
unsafe impl<const N: usize> Send for ArenaOps<N> {}

impl<const N: usize> ArenaOps<N> {
    /// # Safety
    /// `storage` must point to `N` bytes of storage valid for the `'static`
    /// lifetime of this allocator, and must not be accessed by anything
    /// other than the `LockedSegHeap` that owns this `ArenaOps`.
    unsafe fn new(storage: *mut u8) -> Self {
        let base = storage as usize;
        Self {
            storage,
            base,
            high_water: base,
        }
    }
}

impl<const N: usize> HeapOps for ArenaOps<N> {
    fn grow(&mut self, n: u32) -> Option<usize> {
        let old = self.high_water;
        let new = old.checked_add(n as usize)?;
        if new > self.base + N {
            return None;
        }
        self.high_water = new;
        Some(old)
    }

    fn low(&self) -> usize {
        self.base
    }

    fn high(&self) -> usize {
        self.high_water - 1
    }

    fn size(&self) -> u32 {
        (self.high_water - self.base) as u32
    }
}

/// A ticket spinlock guarding a `SegHeap`. Reimplements the teacher kernel's
/// `sync::spinlock::SpinLock` design (FIFO ticket counters, `spin_loop` hint)
/// standalone within this crate rather than depending on the kernel crate,
/// so `heapdrv` stays usable outside this workspace's kernel (see
/// DESIGN.md).
struct Ticket<T> {
    next_ticket: AtomicU32,
    now_serving: AtomicU32,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Sync for Ticket<T> {}

impl<T> Ticket<T> {
    const fn new(value: T) -> Self {
        Self {
            next_ticket: AtomicU32::new(0),
            now_serving: AtomicU32::new(0),
            data: UnsafeCell::new(value),
        }
    }

    fn lock(&self) -> TicketGuard<'_, T> {
        let my_ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        while self.now_serving.load(Ordering::Acquire) != my_ticket {
            core::hint::spin_loop();
        }
        TicketGuard { lock: self }
    }
}

struct TicketGuard<'a, T> {
    lock: &'a Ticket<T>,
}

impl<T> core::ops::Deref for TicketGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> core::ops::DerefMut for TicketGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for TicketGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.now_serving.fetch_add(1, Ordering::Release);
    }
}

enum LazyHeap<const N: usize> {
    Uninit,
    Ready(SegHeap<ArenaOps<N>>),
}

/// A `GlobalAlloc` wrapper over `heapcore::SegHeap<ArenaOps<N>>`, backed by a
/// `static mut [u8; N]` arena owned by the caller and guarded by a ticket
/// spinlock.
///
/// # Example
/// ```ignore
/// static mut ARENA: [u8; 1 << 20] = [0; 1 << 20];
///
/// #[global_allocator]
/// static ALLOCATOR: LockedSegHeap<{ 1 << 20 }> =
///     LockedSegHeap::new(core::ptr::addr_of_mut!(ARENA) as *mut u8);
/// ```
pub struct LockedSegHeap<const N: usize> {
    storage: *mut u8,
    inner: Ticket<LazyHeap<N>>,
    config: HeapConfig,
}

// SAFETY: `storage` is only dereferenced from within `inner`'s locked
// section, and the pointee is required (see `new`'s docs) to be valid for
// `'static` and exclusively owned by this allocator.
unsafe impl<const N: usize> Sync for LockedSegHeap<N> {}

impl<const N: usize> LockedSegHeap<N> {
    /// Build an allocator over `storage`, using [`HeapConfig::default`].
    ///
    /// # Safety
    /// `storage` must point to `N` bytes valid for `'static` and not
    /// accessed by anything else — typically the address of a `static mut`
    /// byte array of length `N` owned by the caller.
    pub const unsafe fn new(storage: *mut u8) -> Self {
        Self::with_config(storage, HeapConfig::reference())
    }

    /// As [`Self::new`], with an explicit [`HeapConfig`].
    ///
    /// # Safety
    /// Same requirements as [`Self::new`].
    pub const unsafe fn with_config(storage: *mut u8, config: HeapConfig) -> Self {
        Self {
            storage,
            inner: Ticket::new(LazyHeap::Uninit),
            config,
        }
    }

    /// Run `f` with exclusive access to the backing heap, lazily
    /// initialising it on first use.
    fn with_heap<R>(&self, f: impl FnOnce(&mut SegHeap<ArenaOps<N>>) -> R) -> R {
        let mut guard = self.inner.lock();
        if matches!(&*guard, LazyHeap::Uninit) {
            // SAFETY: `storage` meets `ArenaOps::new`'s contract per this
            // type's own construction safety requirement, and this is the
            // only place `ArenaOps` is ever constructed over it.
            let ops = unsafe { ArenaOps::<N>::new(self.storage) };
            let heap = SegHeap::init(ops, self.config).expect("arena too small to initialise");
            *guard = LazyHeap::Ready(heap);
        }
        match &mut *guard {
            LazyHeap::Ready(heap) => f(heap),
            LazyHeap::Uninit => unreachable!("initialised above"),
        }
    }
}

unsafe impl<const N: usize> GlobalAlloc for LockedSegHeap<N> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        if layout.align() > NATIVE_ALIGN {
            return core::ptr::null_mut();
        }
        self.with_heap(|heap| heap.allocate(layout.size()))
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        self.with_heap(|heap| heap.free(ptr));
    }

    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        if layout.align() > NATIVE_ALIGN {
            return core::ptr::null_mut();
        }
        self.with_heap(|heap| heap.reallocate(ptr, new_size))
    }

    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        if layout.align() > NATIVE_ALIGN {
            return core::ptr::null_mut();
        }
        self.with_heap(|heap| heap.zero_allocate(1, layout.size()))
    }
}

/// Result alias matching `heapcore`'s, re-exported so downstream crates do
/// not need a direct `heapcore` dependency just to name the error type.
pub type Result<T> = core::result::Result<T, AllocError>;
