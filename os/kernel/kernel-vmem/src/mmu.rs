//! Per-execution-unit translation cache control.

use crate::tlb::{Tlb, TlbHi, TlbLo};
use kernel_memory_addresses::VirtualAddress;
use kernel_sync::{InterruptLevel, SplGuard};
use log::{debug, error};

/// The translation cache of one execution unit together with that unit's
/// interrupt-priority control.
///
/// Every update of the cache happens with the interrupt level raised, so a
/// fault taken by an interrupt handler on the same unit cannot interleave with
/// a half-finished slot write. There is no cross-unit coordination.
pub struct Mmu<T: Tlb, I: InterruptLevel> {
    tlb: T,
    irq: I,
}

/// Where [`Mmu::install`] put a translation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Installed {
    /// An invalid slot was reused.
    Slot(usize),
    /// No slot was free; a random victim was evicted.
    Evicted,
}

/// Cross-unit translation cache shootdown was requested.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
#[error("translation cache shootdown is not supported")]
pub struct ShootdownUnsupported;

impl<T: Tlb, I: InterruptLevel> Mmu<T, I> {
    pub const fn new(tlb: T, irq: I) -> Self {
        Self { tlb, irq }
    }

    #[inline]
    pub const fn tlb(&self) -> &T {
        &self.tlb
    }

    #[inline]
    pub const fn irq(&self) -> &I {
        &self.irq
    }

    /// Flush every slot of the translation cache.
    ///
    /// Called whenever the active address space changes: entries carry no
    /// address-space identifier, so nothing may survive the switch.
    pub fn activate(&mut self) {
        let _spl = SplGuard::new(&self.irq);
        for slot in 0..self.tlb.slots() {
            self.tlb.write(slot, TlbHi::invalid(slot), TlbLo::invalid());
        }
    }

    /// Counterpart of [`activate`](Self::activate); nothing to do.
    pub const fn deactivate(&mut self) {}

    /// Install one translation: first invalid slot, else a random victim.
    pub fn install(&mut self, page: VirtualAddress, lo: TlbLo) -> Installed {
        let hi = TlbHi::for_page(page);
        let _spl = SplGuard::new(&self.irq);

        let free = (0..self.tlb.slots()).find(|&slot| !self.tlb.read(slot).1.valid());
        let installed = if let Some(slot) = free {
            self.tlb.write(slot, hi, lo);
            Installed::Slot(slot)
        } else {
            self.tlb.write_random(hi, lo);
            Installed::Evicted
        };

        debug!(
            "vm: {} -> {} ({installed:?}, writable={})",
            hi.page(),
            lo.frame(),
            lo.dirty()
        );
        installed
    }

    /// Shoot down one page on other execution units.
    ///
    /// # Errors
    /// Always; there is no cross-unit protocol.
    pub fn shootdown(&mut self, page: VirtualAddress) -> Result<(), ShootdownUnsupported> {
        error!("vm: shootdown of {page} requested, but shootdown is not supported");
        Err(ShootdownUnsupported)
    }

    /// Shoot down every translation on other execution units.
    ///
    /// # Errors
    /// Always; there is no cross-unit protocol.
    pub fn shootdown_all(&mut self) -> Result<(), ShootdownUnsupported> {
        error!("vm: full shootdown requested, but shootdown is not supported");
        Err(ShootdownUnsupported)
    }
}
