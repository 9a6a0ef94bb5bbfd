//! # Translation cache (TLB) model
//!
//! A slot holds a pair of words: [`TlbHi`] (which virtual page) and [`TlbLo`]
//! (which physical frame, plus the valid and dirty bits).
//!
//! ### Bit layout
//!
//! ```text
//! TlbHi: | 31 ........ 12 | 11 ..... 0 |
//!        |      VPN       |  reserved  |
//!
//! TlbLo: | 31 ........ 12 | 11 | 10 | 9 | 8 | 7 .. 0 |
//!        |      PFN       | N  | D  | V | G |  rsvd  |
//! ```
//!
//! - `V` (valid): the slot takes part in lookups.
//! - `D` (dirty): despite the name, this is the *write enable* bit. A store
//!   through an entry with `D` clear traps as a write to a read-only page.
//! - `G` (global) and `N` (no-cache) are carried but not used by the core.

use crate::fault::FaultKind;
use crate::info::{KSEG0_BASE, NUM_TLB};
use bitfield_struct::bitfield;
use kernel_memory_addresses::{PAGE_SHIFT, PhysicalAddress, VirtualAddress};

/// High word of a translation: the virtual page number.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct TlbHi {
    #[bits(12)]
    __: u16,

    /// Virtual page number (address bits 31..12).
    #[bits(20)]
    pub vpn: u32,
}

impl TlbHi {
    /// High word matching the page that contains `va`.
    #[inline]
    #[must_use]
    pub const fn for_page(va: VirtualAddress) -> Self {
        Self::new().with_vpn(va.as_u32() >> PAGE_SHIFT)
    }

    /// A distinct, never-matching high word for `slot`.
    ///
    /// Points into KSEG0, which is never translated, so no user access can
    /// hit it; distinct per slot so that no two invalid slots alias.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn invalid(slot: usize) -> Self {
        Self::new().with_vpn((KSEG0_BASE >> PAGE_SHIFT) + slot as u32)
    }

    #[inline]
    #[must_use]
    pub const fn page(self) -> VirtualAddress {
        VirtualAddress::new(self.vpn() << PAGE_SHIFT)
    }
}

/// Low word of a translation: physical frame plus permission bits.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct TlbLo {
    #[bits(8)]
    __: u8,

    /// Global: match regardless of address-space identifier.
    pub global: bool,

    /// Slot participates in lookups.
    pub valid: bool,

    /// Write enable.
    pub dirty: bool,

    /// Bypass the data cache.
    pub nocache: bool,

    /// Physical frame number (address bits 31..12).
    #[bits(20)]
    pub pfn: u32,
}

impl TlbLo {
    /// A valid mapping of `frame`, writable if `writable` is set.
    #[inline]
    #[must_use]
    pub const fn mapping(frame: PhysicalAddress, writable: bool) -> Self {
        Self::new()
            .with_pfn(frame.frame_number())
            .with_valid(true)
            .with_dirty(writable)
    }

    /// The low word written into flushed slots.
    #[inline]
    #[must_use]
    pub const fn invalid() -> Self {
        Self::new()
    }

    #[inline]
    #[must_use]
    pub const fn frame(self) -> PhysicalAddress {
        PhysicalAddress::new(self.pfn() << PAGE_SHIFT)
    }
}

/// Control surface of the hardware translation cache.
///
/// Callers must hold the interrupt level raised across a read-modify-write
/// sequence; [`Mmu`](crate::Mmu) does that for the core.
pub trait Tlb {
    /// Number of slots.
    fn slots(&self) -> usize {
        NUM_TLB
    }

    /// Read slot `slot`.
    fn read(&self, slot: usize) -> (TlbHi, TlbLo);

    /// Overwrite slot `slot`.
    fn write(&mut self, slot: usize, hi: TlbHi, lo: TlbLo);

    /// Overwrite a slot picked by the hardware's free-running random index.
    fn write_random(&mut self, hi: TlbHi, lo: TlbLo);

    /// Index of the valid slot translating `hi`'s page, if any.
    fn probe(&self, hi: TlbHi) -> Option<usize> {
        (0..self.slots()).find(|&slot| {
            let (h, l) = self.read(slot);
            l.valid() && h.vpn() == hi.vpn()
        })
    }
}

/// Software implementation of the translation cache.
///
/// Models the hardware closely enough for hosted runs: a fixed array of
/// slots, a free-running random index that steps on every random write, and
/// [`translate`](SoftTlb::translate) which performs the lookup a load or
/// store would, reporting the fault the hardware would raise.
#[derive(Debug, Clone)]
pub struct SoftTlb {
    entries: [(TlbHi, TlbLo); NUM_TLB],
    random: usize,
}

impl Default for SoftTlb {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftTlb {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: core::array::from_fn(|slot| (TlbHi::invalid(slot), TlbLo::invalid())),
            random: NUM_TLB - 1,
        }
    }

    /// Look up `va` the way a load (`write == false`) or store would.
    ///
    /// # Errors
    /// - [`FaultKind::Read`] / [`FaultKind::Write`] on a miss.
    /// - [`FaultKind::ReadOnly`] on a store through a non-writable entry.
    pub fn translate(&self, va: VirtualAddress, write: bool) -> Result<PhysicalAddress, FaultKind> {
        let miss = if write { FaultKind::Write } else { FaultKind::Read };
        let slot = self.probe(TlbHi::for_page(va)).ok_or(miss)?;
        let lo = self.entries[slot].1;
        if write && !lo.dirty() {
            return Err(FaultKind::ReadOnly);
        }
        Ok(PhysicalAddress::new(lo.frame().as_u32() | va.page_offset()))
    }

    /// Number of slots currently marked valid.
    #[must_use]
    pub fn valid_count(&self) -> usize {
        self.entries.iter().filter(|(_, lo)| lo.valid()).count()
    }
}

impl Tlb for SoftTlb {
    fn read(&self, slot: usize) -> (TlbHi, TlbLo) {
        self.entries[slot]
    }

    fn write(&mut self, slot: usize, hi: TlbHi, lo: TlbLo) {
        self.entries[slot] = (hi, lo);
    }

    fn write_random(&mut self, hi: TlbHi, lo: TlbLo) {
        let slot = self.random;
        self.random = slot.checked_sub(1).unwrap_or(NUM_TLB - 1);
        self.entries[slot] = (hi, lo);
    }
}
