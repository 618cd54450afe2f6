use core::cmp;
use core::fmt;
use core::ptr::NonNull;

use crate::bank::Bank;
use crate::error::AllocError;
use crate::raw_heap::RawHeap;
use crate::registry::Registry;
use crate::{align_word, MIN_BLOCK_SIZE, WORD};

pub const DEFAULT_MAX_BANKS: usize = crate::config::MAX_BANKS;

/// How a pool's banks come into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    /// Every bank is built at construction with its full byte region
    /// reserved up front.
    Static,
    /// Every bank is built at construction but draws blocks from the raw
    /// heap as they are first handed out.
    Dynamic,
    /// The registry starts empty; a dynamic bank is created the first time a
    /// request rounds to its bucket.
    OnDemand,
}

/// Bytes handed out and bytes managed, both counted in whole blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolUsage {
    pub used: usize,
    pub total: usize,
}

/// A fixed-block allocator: a registry of banks ordered by block size, with
/// requests routed to the smallest fitting bank and spilled to the next one
/// up when that bank is exhausted.
///
/// Every block returned by [`allocate`][Pool::allocate] is preceded by one
/// word holding the index of its owning bank, which is how
/// [`deallocate`][Pool::deallocate] finds the way back without a size
/// argument. Client pointers are word-aligned; alignment beyond one word is
/// not supported.
///
/// The pool performs no internal synchronization. Concurrent use must be
/// serialized by the caller.
pub struct Pool<H: RawHeap, const MAX_BANKS: usize = DEFAULT_MAX_BANKS> {
    registry: Registry<MAX_BANKS>,
    raw: H,
    kind: PoolKind,
    blocks_per_bank: usize,
}

// Safety: the pool owns its banks and every region they carve blocks from;
// moving it to another thread moves that ownership wholesale.
unsafe impl<H: RawHeap + Send, const MAX_BANKS: usize> Send for Pool<H, MAX_BANKS> {}

impl<H: RawHeap, const MAX_BANKS: usize> Pool<H, MAX_BANKS> {
    /// Builds a pool over `raw`.
    ///
    /// For [`PoolKind::Static`] and [`PoolKind::Dynamic`] the registry is
    /// filled with `MAX_BANKS` banks of `blocks_per_bank` blocks each, with
    /// block sizes doubling from the smallest legal size and the 512/1024/2048
    /// buckets clamped down to 300/400/500 bytes (word-rounded) to bound
    /// worst-case waste. [`PoolKind::OnDemand`] starts with an empty registry.
    pub fn new(raw: H, kind: PoolKind, blocks_per_bank: usize) -> Self {
        assert!(blocks_per_bank > 0, "banks must hold at least one block");

        let mut registry = Registry::new();
        if kind != PoolKind::OnDemand {
            for i in 0..MAX_BANKS as u32 {
                let block_size = bucket_for_exponent(START_POW + i);
                let bank = match kind {
                    PoolKind::Static => Bank::new_static(block_size, blocks_per_bank),
                    PoolKind::Dynamic => Bank::new_dynamic(block_size, blocks_per_bank),
                    PoolKind::OnDemand => unreachable!(),
                };
                registry
                    .insert(bank)
                    .ok()
                    .expect("registry is sized to hold every bootstrap bank");
            }
        }

        Self { registry, raw, kind, blocks_per_bank }
    }

    /// Allocates `size` bytes out of the smallest bucket that fits, spilling
    /// to larger banks if it is exhausted.
    ///
    /// A zero-size request is served from the smallest bucket so the returned
    /// pointer can still be passed to [`deallocate`][Pool::deallocate].
    ///
    /// # Errors
    ///
    /// [`AllocError::SizeTooLarge`] if no bank can ever fit the request,
    /// [`AllocError::Exhausted`] if every fitting bank is out of blocks, and
    /// [`AllocError::RegistryFull`] if an on-demand bank could not be
    /// registered. The pool is unchanged on every error path.
    pub fn allocate(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        let total = size
            .checked_add(WORD)
            .ok_or(AllocError::SizeTooLarge(size))?;

        let start = match self.kind {
            PoolKind::OnDemand => self.demand_bank_index(total)?,
            _ => self
                .registry
                .find(total)
                .ok_or(AllocError::SizeTooLarge(size))?,
        };

        let (registry, raw) = (&mut self.registry, &mut self.raw);
        for (idx, bank) in registry.banks_mut().iter_mut().enumerate().skip(start) {
            if let Some(block) = bank.allocate(&mut *raw) {
                if idx != start {
                    log::trace!(
                        "request for {size} bytes spilled up to the {} byte bank",
                        bank.block_size()
                    );
                }
                // The link word of the free block becomes the provenance tag.
                unsafe { block.cast::<usize>().as_ptr().write(idx) };
                return Ok(unsafe { NonNull::new_unchecked(block.as_ptr().add(WORD)) });
            }
        }

        Err(AllocError::Exhausted)
    }

    /// Returns a block to its owning bank.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by [`allocate`][Pool::allocate] or
    /// [`reallocate`][Pool::reallocate] on this pool and must not have been
    /// freed since.
    pub unsafe fn deallocate(&mut self, ptr: NonNull<u8>) {
        let (block, idx) = unsafe { read_provenance(ptr) };
        assert!(
            idx < self.registry.len(),
            "freed pointer carries an invalid bank tag"
        );
        unsafe { self.registry.banks_mut()[idx].deallocate(block) };
    }

    /// Resizes an allocation, with the usual realloc contract: `None` grows a
    /// fresh block, a zero `size` frees `ptr` and returns `Ok(None)`, and on
    /// error the old block is left untouched.
    ///
    /// # Safety
    ///
    /// A `Some` pointer must have been returned by this pool and not freed
    /// since; it must not be used again after a successful call.
    pub unsafe fn reallocate(
        &mut self,
        ptr: Option<NonNull<u8>>,
        size: usize,
    ) -> Result<Option<NonNull<u8>>, AllocError> {
        let Some(old) = ptr else {
            return self.allocate(size).map(Some);
        };
        if size == 0 {
            unsafe { self.deallocate(old) };
            return Ok(None);
        }

        let (_, old_idx) = unsafe { read_provenance(old) };
        assert!(
            old_idx < self.registry.len(),
            "reallocated pointer carries an invalid bank tag"
        );
        let old_usable = self.registry.banks()[old_idx].block_size() - WORD;

        let new = self.allocate(size)?;
        unsafe {
            core::ptr::copy_nonoverlapping(old.as_ptr(), new.as_ptr(), cmp::min(old_usable, size));
            self.deallocate(old);
        }
        Ok(Some(new))
    }

    /// Bytes handed out and bytes managed across all banks.
    pub fn usage(&self) -> PoolUsage {
        let mut usage = PoolUsage { used: 0, total: 0 };
        for bank in self.registry.banks() {
            usage.used += bank.in_use() * bank.block_size();
            usage.total += bank.capacity() * bank.block_size();
        }
        usage
    }

    /// Whether a bank with exactly this block size exists.
    pub fn is_size_available(&self, block_size: usize) -> bool {
        self.registry.find_exact(block_size).is_some()
    }

    /// Whether a bank with exactly this block size can still hand out a block.
    pub fn has_free_block(&self, block_size: usize) -> bool {
        self.free_blocks_of(block_size) > 0
    }

    /// Blocks still available in the bank with exactly this block size.
    pub fn free_blocks_of(&self, block_size: usize) -> usize {
        self.registry
            .find_exact(block_size)
            .map_or(0, |idx| self.registry.banks()[idx].free_count())
    }

    /// Block size of the smallest bank, or the smallest legal block size
    /// while the registry is still empty.
    pub fn smallest_block_size(&self) -> usize {
        self.registry
            .banks()
            .first()
            .map_or(MIN_BLOCK_SIZE, Bank::block_size)
    }

    /// Registered bank block sizes, in ascending order.
    pub fn bank_sizes(&self) -> impl Iterator<Item = usize> + '_ {
        self.registry.banks().iter().map(Bank::block_size)
    }

    pub fn blocks_per_bank(&self) -> usize {
        self.blocks_per_bank
    }

    pub fn max_banks(&self) -> usize {
        MAX_BANKS
    }

    /// Looks up the on-demand bucket for `total` bytes, creating and
    /// registering its bank if this is the first request to round there.
    fn demand_bank_index(&mut self, total: usize) -> Result<usize, AllocError> {
        let bucket = demand_bucket(total).ok_or(AllocError::SizeTooLarge(total - WORD))?;
        if let Some(idx) = self.registry.find_exact(bucket) {
            return Ok(idx);
        }

        log::trace!("creating {bucket} byte bank on demand");
        let bank = Bank::new_dynamic(bucket, self.blocks_per_bank);
        // A full registry hands the transient bank back; dropping it here is
        // what keeps the failure side-effect free.
        self.registry.insert(bank).map_err(|_| AllocError::RegistryFull)
    }
}

impl<H: RawHeap, const MAX_BANKS: usize> Drop for Pool<H, MAX_BANKS> {
    fn drop(&mut self) {
        let (registry, raw) = (&mut self.registry, &mut self.raw);
        for bank in registry.banks_mut() {
            bank.release(&mut *raw);
        }
    }
}

impl<H: RawHeap, const MAX_BANKS: usize> fmt::Debug for Pool<H, MAX_BANKS> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("kind", &self.kind)
            .field("banks", &self.registry.banks())
            .field("blocks_per_bank", &self.blocks_per_bank)
            .finish()
    }
}

/// Smallest power-of-two exponent a bank may use: one above the word size.
const START_POW: u32 = WORD.trailing_zeros() + 1;

/// Exponents whose power-of-two sizes are clamped down in pool mode, keyed by
/// offset from [`CLAMP_BASE_POW`].
const CLAMPED_SIZES: [usize; 3] = [300, 400, 500];
const CLAMP_BASE_POW: u32 = 9;

fn bucket_for_exponent(pow: u32) -> usize {
    let offset = pow.wrapping_sub(CLAMP_BASE_POW) as usize;
    let size = match CLAMPED_SIZES.get(offset) {
        Some(&clamped) => clamped,
        None => 1usize << pow,
    };
    align_word(size)
}

/// Rounds a total request (provenance word included) to its on-demand
/// bucket: the next power of two, with two mid-range buckets carved out to
/// bound waste.
fn demand_bucket(total: usize) -> Option<usize> {
    let bucket = if total > 256 && total <= 396 {
        396
    } else if total > 512 && total <= 768 {
        768
    } else {
        total.checked_next_power_of_two()?
    };
    Some(align_word(cmp::max(bucket, MIN_BLOCK_SIZE)))
}

/// Steps back from a client pointer to the raw block and reads the bank
/// index out of the provenance word.
///
/// # Safety
///
/// `ptr` must be a live client pointer produced by [`Pool::allocate`].
unsafe fn read_provenance(ptr: NonNull<u8>) -> (NonNull<u8>, usize) {
    unsafe {
        let block = NonNull::new_unchecked(ptr.as_ptr().sub(WORD));
        let idx = block.cast::<usize>().as_ptr().read();
        (block, idx)
    }
}
