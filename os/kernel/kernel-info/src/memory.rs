//! # Memory Layout

use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, VirtualAddress};

/// Top of the user stack; the first address *above* the stack window.
pub const USERSTACK: u32 = 0x8000_0000;

/// Number of pages in every user stack (48 KiB).
pub const STACK_PAGES: u32 = 12;

/// Lowest address of the fixed user stack window.
pub const USERSTACK_BASE: u32 = USERSTACK - STACK_PAGES * PAGE_SIZE;

/// Base of the direct-mapped kernel segment.
pub const KSEG0_BASE: u32 = 0x8000_0000;

/// Size of the direct-mapped kernel segment.
pub const KSEG0_SIZE: u32 = 0x2000_0000;

/// Number of slots in the hardware translation cache.
pub const NUM_TLB: usize = 64;

/// Kernel virtual address of a physical address (via KSEG0).
///
/// Returns `None` for physical addresses at or past `KSEG0_SIZE`.
#[inline]
#[must_use]
pub const fn paddr_to_kvaddr(pa: PhysicalAddress) -> Option<VirtualAddress> {
    if pa.as_u32() < KSEG0_SIZE {
        Some(VirtualAddress::new(pa.as_u32() + KSEG0_BASE))
    } else {
        None
    }
}

/// Physical address behind a KSEG0 kernel virtual address.
///
/// Returns `None` for addresses outside KSEG0.
#[inline]
#[must_use]
pub const fn kvaddr_to_paddr(va: VirtualAddress) -> Option<PhysicalAddress> {
    let v = va.as_u32();
    if v >= KSEG0_BASE && v - KSEG0_BASE < KSEG0_SIZE {
        Some(PhysicalAddress::new(v - KSEG0_BASE))
    } else {
        None
    }
}

const _: () = {
    assert!(USERSTACK.is_multiple_of(PAGE_SIZE));
    assert!(USERSTACK_BASE < USERSTACK);
    assert!(USERSTACK <= KSEG0_BASE);
    assert!(NUM_TLB > 0);
    assert!(KSEG0_SIZE <= u32::MAX - KSEG0_BASE + 1);
};
