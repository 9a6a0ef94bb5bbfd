//! Heap-backed frame pool for unit tests: allocator and mapper in one.

use crate::{FrameAlloc, FrameFreeError, PhysMapper};
use core::cell::{Cell, RefCell, UnsafeCell};
use kernel_memory_addresses::{PAGE_BYTES, PAGE_SIZE, PhysicalAddress};

/// Physical address of the pool's first frame.
pub const POOL_BASE: u32 = 0x0010_0000;

#[derive(Copy, Clone, Eq, PartialEq)]
enum Slot {
    Free,
    Head,
    Tail,
}

pub struct FramePool {
    words: Box<[UnsafeCell<u64>]>,
    slots: RefCell<Vec<Slot>>,
    /// Successful allocations left before the pool starts refusing.
    budget: Cell<Option<usize>>,
}

impl FramePool {
    pub fn new(frames: usize) -> Self {
        Self {
            words: (0..frames * PAGE_BYTES / 8).map(|_| UnsafeCell::new(0)).collect(),
            slots: RefCell::new(vec![Slot::Free; frames]),
            budget: Cell::new(None),
        }
    }

    /// Allow `n` more allocations, then fail every one.
    pub fn fail_after(&self, n: usize) {
        self.budget.set(Some(n));
    }

    pub fn fail_never(&self) {
        self.budget.set(None);
    }

    /// Frames currently allocated.
    pub fn live(&self) -> usize {
        self.slots.borrow().iter().filter(|s| **s != Slot::Free).count()
    }

    pub fn fill(&self, byte: u8) {
        let len = self.words.len() * 8;
        unsafe { core::ptr::write_bytes(self.phys_to_ptr(PhysicalAddress::new(POOL_BASE)), byte, len) }
    }

    pub fn read(&self, pa: PhysicalAddress) -> u8 {
        unsafe { *self.phys_to_ptr(pa) }
    }

    pub fn write(&self, pa: PhysicalAddress, byte: u8) {
        unsafe { *self.phys_to_ptr(pa) = byte }
    }

    fn index(&self, pa: PhysicalAddress) -> Option<usize> {
        let offset = pa.checked_offset_from(PhysicalAddress::new(POOL_BASE))?;
        let index = (offset / PAGE_SIZE) as usize;
        (index < self.slots.borrow().len()).then_some(index)
    }
}

impl FrameAlloc for FramePool {
    fn alloc_frames(&self, n: usize) -> Option<PhysicalAddress> {
        if n == 0 {
            return None;
        }
        if let Some(left) = self.budget.get() {
            self.budget.set(Some(left.checked_sub(1)?));
        }

        let mut slots = self.slots.borrow_mut();
        let last = slots.len().checked_sub(n)?;
        let start = (0..=last).find(|&i| slots[i..i + n].iter().all(|s| *s == Slot::Free))?;
        slots[start] = Slot::Head;
        slots[start + 1..start + n].fill(Slot::Tail);
        Some(PhysicalAddress::new(POOL_BASE + u32::try_from(start).ok()? * PAGE_SIZE))
    }

    fn free_frames(&self, base: PhysicalAddress) -> Result<(), FrameFreeError> {
        if !base.is_page_aligned() {
            return Err(FrameFreeError::Unaligned(base));
        }
        let index = self.index(base).ok_or(FrameFreeError::Unmanaged(base))?;
        let mut slots = self.slots.borrow_mut();
        match slots[index] {
            Slot::Free => return Err(FrameFreeError::NotAllocated(base)),
            Slot::Tail => return Err(FrameFreeError::NotRunStart(base)),
            Slot::Head => {}
        }
        slots[index] = Slot::Free;
        for slot in slots[index + 1..].iter_mut().take_while(|s| **s == Slot::Tail) {
            *slot = Slot::Free;
        }
        Ok(())
    }
}

impl PhysMapper for FramePool {
    fn phys_to_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
        let offset = pa
            .checked_offset_from(PhysicalAddress::new(POOL_BASE))
            .map(|o| o as usize)
            .filter(|&o| o < self.words.len() * 8)
            .unwrap_or_else(|| panic!("{pa} is outside the test pool"));
        UnsafeCell::raw_get(self.words.as_ptr()).cast::<u8>().wrapping_add(offset)
    }
}

#[test]
fn pool_frees_whole_runs_only() {
    let pool = FramePool::new(8);
    let a = pool.alloc_frames(3).unwrap();
    assert_eq!(pool.live(), 3);
    assert_eq!(pool.free_frames(a + PAGE_SIZE), Err(FrameFreeError::NotRunStart(a + PAGE_SIZE)));
    pool.free_frames(a).unwrap();
    assert_eq!(pool.live(), 0);
}
