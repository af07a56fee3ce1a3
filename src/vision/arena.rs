//! Tensor arena: backing storage, memory pools and the offset planner.

use core::ops::{Deref, DerefMut};

use crate::error::VisionError;

/// Offsets handed out by the planner are multiples of this.
pub const ARENA_ALIGN: usize = 16;

// ── Storage ───────────────────────────────────────────────────

/// One contiguous, zero-initialised scratch region.
pub struct ArenaStorage {
    inner: Inner,
}

enum Inner {
    Heap(Box<[u8]>),
    #[cfg(target_os = "espidf")]
    Caps {
        ptr: core::ptr::NonNull<u8>,
        len: usize,
    },
}

impl ArenaStorage {
    /// Allocate from the global heap; `None` if the allocator refuses.
    pub fn heap(size: usize) -> Option<Self> {
        let mut v: Vec<u8> = Vec::new();
        v.try_reserve_exact(size).ok()?;
        v.resize(size, 0);
        Some(Self {
            inner: Inner::Heap(v.into_boxed_slice()),
        })
    }

    /// Allocate with ESP-IDF capability flags (`MALLOC_CAP_*`).
    #[cfg(target_os = "espidf")]
    pub fn with_caps(size: usize, caps: u32) -> Option<Self> {
        // SAFETY: heap_caps_calloc returns null or a zeroed block of `size`
        // bytes that we own until heap_caps_free in Drop.
        let raw = unsafe { esp_idf_svc::sys::heap_caps_calloc(1, size, caps) };
        let ptr = core::ptr::NonNull::new(raw.cast::<u8>())?;
        Some(Self {
            inner: Inner::Caps { ptr, len: size },
        })
    }
}

impl Deref for ArenaStorage {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match &self.inner {
            Inner::Heap(b) => b,
            #[cfg(target_os = "espidf")]
            // SAFETY: ptr/len describe the live allocation from with_caps.
            Inner::Caps { ptr, len } => unsafe { core::slice::from_raw_parts(ptr.as_ptr(), *len) },
        }
    }
}

impl DerefMut for ArenaStorage {
    fn deref_mut(&mut self) -> &mut [u8] {
        match &mut self.inner {
            Inner::Heap(b) => b,
            #[cfg(target_os = "espidf")]
            // SAFETY: exclusive borrow of self gives exclusive access.
            Inner::Caps { ptr, len } => unsafe {
                core::slice::from_raw_parts_mut(ptr.as_ptr(), *len)
            },
        }
    }
}

#[cfg(target_os = "espidf")]
impl Drop for ArenaStorage {
    fn drop(&mut self) {
        if let Inner::Caps { ptr, .. } = self.inner {
            // SAFETY: allocated by heap_caps_calloc, freed exactly once.
            unsafe { esp_idf_svc::sys::heap_caps_free(ptr.as_ptr().cast()) };
        }
    }
}

// SAFETY: the Caps variant uniquely owns its allocation like a Box.
unsafe impl Send for ArenaStorage {}

// ── Pools ─────────────────────────────────────────────────────

/// Memory regions an arena may come from, in preference order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryPool {
    /// External PSRAM: large, slower.
    External,
    /// Internal byte-addressable SRAM.
    Internal,
}

pub trait MemoryPools {
    fn allocate(&mut self, pool: MemoryPool, size: usize) -> Option<ArenaStorage>;
}

/// The platform allocator.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPools;

impl MemoryPools for SystemPools {
    #[cfg(target_os = "espidf")]
    fn allocate(&mut self, pool: MemoryPool, size: usize) -> Option<ArenaStorage> {
        use esp_idf_svc::sys::{MALLOC_CAP_8BIT, MALLOC_CAP_SPIRAM};
        let caps = match pool {
            MemoryPool::External => MALLOC_CAP_SPIRAM | MALLOC_CAP_8BIT,
            MemoryPool::Internal => MALLOC_CAP_8BIT,
        };
        ArenaStorage::with_caps(size, caps)
    }

    #[cfg(not(target_os = "espidf"))]
    fn allocate(&mut self, _pool: MemoryPool, size: usize) -> Option<ArenaStorage> {
        ArenaStorage::heap(size)
    }
}

/// Allocate `size` bytes from the preferred pool, falling back once.
pub fn allocate_arena(pools: &mut impl MemoryPools, size: usize) -> Result<(ArenaStorage, MemoryPool), VisionError> {
    for pool in [MemoryPool::External, MemoryPool::Internal] {
        if let Some(storage) = pools.allocate(pool, size) {
            log::info!("tensor arena: {} bytes from {:?} pool", size, pool);
            return Ok((storage, pool));
        }
        log::warn!("tensor arena: {:?} pool refused {} bytes", pool, size);
    }
    log::error!("failed to allocate tensor arena ({} bytes)", size);
    Err(VisionError::OutOfMemory { requested: size })
}

// ── Planner ───────────────────────────────────────────────────

/// A buffer to place: byte size and the inclusive range of operator
/// indices during which it must stay intact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferRequest {
    pub size: usize,
    pub first_use: usize,
    pub last_use: usize,
}

impl BufferRequest {
    fn overlaps_in_time(&self, other: &Self) -> bool {
        self.first_use <= other.last_use && other.first_use <= self.last_use
    }
}

/// Greedy-by-size placement: largest buffers first, each at the lowest
/// aligned offset that does not collide with a time-overlapping neighbour.
///
/// Returns the offsets (in request order) and the total bytes used.
pub fn plan_offsets(requests: &[BufferRequest]) -> (Vec<usize>, usize) {
    let mut order: Vec<usize> = (0..requests.len()).collect();
    order.sort_by(|&a, &b| requests[b].size.cmp(&requests[a].size).then(a.cmp(&b)));

    let mut offsets = vec![0usize; requests.len()];
    let mut placed: Vec<usize> = Vec::with_capacity(requests.len());
    let mut high_water = 0usize;

    for &idx in &order {
        let req = &requests[idx];
        let mut live: Vec<(usize, usize)> = placed
            .iter()
            .filter(|&&p| requests[p].overlaps_in_time(req))
            .map(|&p| (offsets[p], offsets[p] + requests[p].size))
            .collect();
        live.sort_unstable();

        let mut candidate = 0usize;
        for (start, end) in live {
            if candidate + req.size <= start {
                break;
            }
            candidate = candidate.max(align_up(end));
        }
        offsets[idx] = candidate;
        high_water = high_water.max(candidate + req.size);
        placed.push(idx);
    }
    (offsets, high_water)
}

pub const fn align_up(n: usize) -> usize {
    (n + ARENA_ALIGN - 1) & !(ARENA_ALIGN - 1)
}

/// Reinterpret an arena region as signed bytes.
pub fn as_i8_mut(bytes: &mut [u8]) -> &mut [i8] {
    // SAFETY: u8 and i8 share size, alignment and every bit pattern.
    unsafe { core::slice::from_raw_parts_mut(bytes.as_mut_ptr().cast::<i8>(), bytes.len()) }
}
