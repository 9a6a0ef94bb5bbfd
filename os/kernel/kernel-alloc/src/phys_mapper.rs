//! # Physical mappers
//!
//! [`PhysMapper`] implementations for the two places the core runs:
//!
//! - [`Kseg0PhysMapper`]: on the machine. All of physical RAM is visible at
//!   `KSEG0_BASE + pa`, unmapped and cached, so converting is one addition.
//! - [`SimulatedRam`] (feature `sim`): hosted. A heap buffer stands in for RAM
//!   at a chosen physical base.
//!
//! ## Example
//! ```rust
//! use kernel_alloc::phys_mapper::Kseg0PhysMapper;
//! use kernel_vmem::PhysMapper;
//! use kernel_vmem::addresses::PhysicalAddress;
//!
//! let ptr = Kseg0PhysMapper.phys_to_ptr(PhysicalAddress::new(0x0001_2000));
//! assert_eq!(ptr.addr(), 0x8001_2000);
//! ```

use kernel_info::memory::paddr_to_kvaddr;
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_vmem::PhysMapper;

/// [`PhysMapper`] for the KSEG0 direct map.
///
/// # Panics
/// Only physical addresses below `KSEG0_SIZE` are reachable this way; others
/// panic.
#[derive(Debug, Copy, Clone, Default)]
pub struct Kseg0PhysMapper;

impl PhysMapper for Kseg0PhysMapper {
    #[inline]
    fn phys_to_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
        let kva = paddr_to_kvaddr(pa);
        assert!(kva.is_some(), "{pa} is outside KSEG0");
        let kva = kva.map_or(0, VirtualAddress::as_u32);
        core::ptr::with_exposed_provenance_mut(kva as usize)
    }
}

#[cfg(any(test, feature = "sim"))]
pub use sim::SimulatedRam;

#[cfg(any(test, feature = "sim"))]
mod sim {
    use alloc::boxed::Box;
    use core::cell::UnsafeCell;
    use kernel_info::boot::RamRange;
    use kernel_memory_addresses::{PAGE_BYTES, PhysicalAddress};
    use kernel_vmem::PhysMapper;

    /// Heap-backed stand-in for physical RAM.
    pub struct SimulatedRam {
        base: PhysicalAddress,
        words: Box<[UnsafeCell<u64>]>,
    }

    impl SimulatedRam {
        /// `frames` zeroed frames starting at physical address `base`.
        #[must_use]
        pub fn new(base: PhysicalAddress, frames: usize) -> Self {
            debug_assert!(base.is_page_aligned());
            Self {
                base,
                words: (0..frames * PAGE_BYTES / size_of::<u64>())
                    .map(|_| UnsafeCell::new(0))
                    .collect(),
            }
        }

        #[must_use]
        pub fn len_bytes(&self) -> usize {
            self.words.len() * size_of::<u64>()
        }

        /// The range to hand to the frame allocator, as a RAM probe would.
        #[must_use]
        pub fn ram_range(&self) -> RamRange {
            #[allow(clippy::cast_possible_truncation)]
            let end = self.base + self.len_bytes() as u32;
            RamRange::new(self.base, end)
        }

        #[must_use]
        pub fn read_u8(&self, pa: PhysicalAddress) -> u8 {
            // SAFETY: in range (checked by phys_to_ptr); plain bytes.
            unsafe { self.phys_to_ptr(pa).read() }
        }

        pub fn write_u8(&self, pa: PhysicalAddress, value: u8) {
            // SAFETY: as above.
            unsafe { self.phys_to_ptr(pa).write(value) }
        }

        /// Fill all of RAM with `byte`.
        pub fn fill(&self, byte: u8) {
            // SAFETY: exactly the buffer.
            unsafe { core::ptr::write_bytes(self.phys_to_ptr(self.base), byte, self.len_bytes()) }
        }
    }

    impl PhysMapper for SimulatedRam {
        fn phys_to_ptr(&self, pa: PhysicalAddress) -> *mut u8 {
            let offset = pa.checked_offset_from(self.base).map(|o| o as usize);
            assert!(
                offset.is_some_and(|o| o < self.len_bytes()),
                "{pa} is outside simulated RAM"
            );
            let offset = offset.unwrap_or_default();
            UnsafeCell::raw_get(self.words.as_ptr())
                .cast::<u8>()
                .wrapping_add(offset)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn range_matches_the_buffer() {
            let ram = SimulatedRam::new(PhysicalAddress::new(0x0010_0000), 3);
            let range = ram.ram_range();
            assert_eq!(range.start, PhysicalAddress::new(0x0010_0000));
            assert_eq!(range.end, PhysicalAddress::new(0x0010_3000));
        }

        #[test]
        fn bytes_round_trip_through_physical_addresses() {
            let ram = SimulatedRam::new(PhysicalAddress::new(0x0010_0000), 2);
            ram.write_u8(PhysicalAddress::new(0x0010_1fff), 0xEE);
            assert_eq!(ram.read_u8(PhysicalAddress::new(0x0010_1fff)), 0xEE);
            assert_eq!(ram.read_u8(PhysicalAddress::new(0x0010_0000)), 0);
        }

        #[test]
        #[should_panic(expected = "outside simulated RAM")]
        fn out_of_range_access_panics() {
            let ram = SimulatedRam::new(PhysicalAddress::new(0x0010_0000), 1);
            let _ = ram.read_u8(PhysicalAddress::new(0x0010_1000));
        }
    }
}
