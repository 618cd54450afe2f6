use std::alloc::{alloc, dealloc, Layout};
use std::collections::HashMap;
use std::ptr::NonNull;

use blockpool::RawHeap;

const WORD: usize = std::mem::size_of::<usize>();

/// A [`RawHeap`] over the host allocator that records every outstanding
/// region, so tests can prove teardown releases all of them.
pub struct TrackingHeap {
    outstanding: HashMap<usize, usize>,
    acquires: usize,
}

impl TrackingHeap {
    pub fn new() -> Self {
        Self { outstanding: HashMap::new(), acquires: 0 }
    }

    pub fn outstanding_regions(&self) -> usize {
        self.outstanding.len()
    }

    pub fn outstanding_bytes(&self) -> usize {
        self.outstanding.values().sum()
    }

    pub fn acquires(&self) -> usize {
        self.acquires
    }
}

unsafe impl RawHeap for TrackingHeap {
    fn acquire(&mut self, size: usize) -> Option<NonNull<u8>> {
        let layout = Layout::from_size_align(size, WORD).ok()?;
        let region = NonNull::new(unsafe { alloc(layout) })?;
        self.acquires += 1;
        self.outstanding.insert(region.as_ptr() as usize, size);
        Some(region)
    }

    unsafe fn release(&mut self, region: NonNull<u8>, size: usize) {
        let recorded = self.outstanding.remove(&(region.as_ptr() as usize));
        assert_eq!(recorded, Some(size), "released a region that was not outstanding");
        let layout = Layout::from_size_align(size, WORD).unwrap();
        unsafe { dealloc(region.as_ptr(), layout) };
    }
}
