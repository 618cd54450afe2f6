//! A single process-wide pool behind a reference-counted init/teardown
//! guard, with a C-style allocation surface over it.
//!
//! The first [`MemoryInit`] guard builds the pool, later guards only bump a
//! counter, and the last guard to drop tears the pool down, releasing every
//! dynamically acquired region. The lock below only serializes access to the
//! shared instance; it does not make the allocator concurrent. Callers still
//! own the ordering of their alloc/free traffic, as with a private [`Pool`].

use core::ptr::{self, NonNull};

use spin::Mutex;

use crate::config;
use crate::pool::{Pool, PoolKind};
use crate::raw_heap::GlobalHeap;

cfg_if::cfg_if! {
    if #[cfg(feature = "static-pool")] {
        const BOOTSTRAP_KIND: PoolKind = PoolKind::Static;
    } else if #[cfg(feature = "dynamic-pool")] {
        const BOOTSTRAP_KIND: PoolKind = PoolKind::Dynamic;
    } else {
        const BOOTSTRAP_KIND: PoolKind = PoolKind::OnDemand;
    }
}

static MEMORY: Mutex<Memory> = Mutex::new(Memory { refs: 0, pool: None });

struct Memory {
    refs: usize,
    pool: Option<Pool<GlobalHeap>>,
}

/// Reference-counted handle on the process-wide pool.
///
/// Independent subsystems each hold their own guard; the pool exists from the
/// first live guard to the last. Dropping the last guard invalidates every
/// pointer still outstanding from [`alloc`]/[`realloc`].
#[must_use = "the pool is torn down when every guard is dropped"]
pub struct MemoryInit(());

impl MemoryInit {
    pub fn new() -> Self {
        let mut memory = MEMORY.lock();
        if memory.refs == 0 {
            log::debug!(
                "initializing process-wide pool ({BOOTSTRAP_KIND:?}, up to {} banks of {} blocks)",
                config::MAX_BANKS,
                config::BLOCKS_PER_BANK
            );
            memory.pool = Some(Pool::new(GlobalHeap, BOOTSTRAP_KIND, config::BLOCKS_PER_BANK));
        }
        memory.refs += 1;
        MemoryInit(())
    }
}

impl Default for MemoryInit {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MemoryInit {
    fn drop(&mut self) {
        let mut memory = MEMORY.lock();
        memory.refs -= 1;
        if memory.refs == 0 {
            log::debug!("tearing down process-wide pool");
            memory.pool = None;
        }
    }
}

fn with_pool<T>(f: impl FnOnce(&mut Pool<GlobalHeap>) -> T) -> T {
    let mut memory = MEMORY.lock();
    let pool = memory
        .pool
        .as_mut()
        .expect("process-wide pool is not initialized");
    f(pool)
}

/// Allocates `size` bytes, or returns null if no bank can serve the request.
///
/// # Panics
///
/// Panics if no [`MemoryInit`] guard is alive.
pub fn alloc(size: usize) -> *mut u8 {
    with_pool(|pool| {
        pool.allocate(size)
            .map_or(ptr::null_mut(), |block| block.as_ptr())
    })
}

/// Frees a block obtained from [`alloc`] or [`realloc`]. Freeing null is a
/// no-op.
///
/// # Safety
///
/// A non-null `ptr` must have come from [`alloc`]/[`realloc`] and must not
/// have been freed since.
pub unsafe fn free(ptr: *mut u8) {
    let Some(ptr) = NonNull::new(ptr) else { return };
    with_pool(|pool| unsafe { pool.deallocate(ptr) })
}

/// Resizes a block with the C `realloc` contract: a null `ptr` allocates, a
/// zero `size` frees and returns null, and on failure the old block is left
/// untouched and null is returned.
///
/// # Safety
///
/// A non-null `ptr` must have come from [`alloc`]/[`realloc`] and must not
/// have been freed since; it must not be used again unless this returns null.
pub unsafe fn realloc(ptr: *mut u8, size: usize) -> *mut u8 {
    with_pool(|pool| {
        unsafe { pool.reallocate(NonNull::new(ptr), size) }
            .ok()
            .flatten()
            .map_or(ptr::null_mut(), |block| block.as_ptr())
    })
}

/// Bytes currently handed out, counted in whole blocks.
pub fn total_used() -> usize {
    with_pool(|pool| pool.usage().used)
}

/// Bytes managed across all banks, handed out or not.
pub fn total_available() -> usize {
    with_pool(|pool| pool.usage().total)
}

/// Whether a bank with exactly this block size exists.
pub fn is_size_available(block_size: usize) -> bool {
    with_pool(|pool| pool.is_size_available(block_size))
}

/// Whether a bank with exactly this block size can still hand out a block.
pub fn has_free_block(block_size: usize) -> bool {
    with_pool(|pool| pool.has_free_block(block_size))
}

/// Blocks still available in the bank with exactly this block size.
pub fn free_blocks_of(block_size: usize) -> usize {
    with_pool(|pool| pool.free_blocks_of(block_size))
}

/// Capacity of each bank in the process-wide pool.
pub fn num_blocks_per_bank() -> usize {
    config::BLOCKS_PER_BANK
}

/// Maximum number of banks the process-wide registry can hold.
pub fn max_banks() -> usize {
    config::MAX_BANKS
}

/// Block size of the smallest bank.
pub fn smallest_block_size() -> usize {
    with_pool(|pool| pool.smallest_block_size())
}
