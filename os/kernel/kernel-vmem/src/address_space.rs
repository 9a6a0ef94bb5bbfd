//! # Address Space (software-managed, segment based)
//!
//! One process's view of user memory: up to two variable-length segments and
//! a fixed stack window just below [`USERSTACK`](crate::info::USERSTACK).
//!
//! ## Highlights
//!
//! - [`AddressSpace::define_region`] to register a segment (at most two).
//! - [`AddressSpace::prepare_load`] to back every page with a zeroed frame.
//! - [`AddressSpace::complete_load`] to freeze segment 1 and flush the TLB.
//! - [`AddressSpace::try_clone`] to duplicate an address space for fork.
//!
//! ## Design
//!
//! - A [`Region`] owns one physical frame per virtual page. Frames are
//!   allocated one at a time and need not be contiguous.
//! - There is no page table. The fault handler reads the frame arrays directly.
//! - Frames are released when the address space is dropped; [`AddressSpace::destroy`]
//!   is the explicit spelling of that.
//!
//! ## Lifecycle
//!
//! ```text
//! new ──► define_region ×≤2 ──► prepare_load ──► (loader writes) ──► complete_load
//!                                    │
//!                                    └──► define_stack
//! ```

use crate::errno::Errno;
use crate::info::{STACK_PAGES, USERSTACK, USERSTACK_BASE};
use crate::mmu::Mmu;
use crate::tlb::Tlb;
use crate::{FrameAlloc, PhysMapper};
use alloc::vec::Vec;
use bitfield_struct::bitfield;
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, VirtualAddress};
use kernel_sync::InterruptLevel;
use log::{debug, warn};

/// Number of variable-length segments an address space can hold.
pub const MAX_SEGMENTS: usize = 2;

/// Access rights requested for a region.
///
/// Recorded as given. Protection is enforced by the fault handler only for
/// segment 1 after [`AddressSpace::complete_load`].
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct RegionPermissions {
    pub readable: bool,
    pub writeable: bool,
    pub executable: bool,
    #[bits(5)]
    __: u8,
}

impl RegionPermissions {
    /// Read, write and execute.
    #[must_use]
    pub const fn all() -> Self {
        Self::new()
            .with_readable(true)
            .with_writeable(true)
            .with_executable(true)
    }
}

/// Failures of address-space operations.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum AddressSpaceError {
    #[error("out of physical frames")]
    OutOfMemory,
    #[error("both segments are already defined")]
    TooManyRegions,
    #[error("the stack has no backing frames yet")]
    StackNotPrepared,
}

impl AddressSpaceError {
    #[must_use]
    pub const fn errno(self) -> Errno {
        match self {
            Self::OutOfMemory => Errno::NoMemory,
            Self::TooManyRegions => Errno::Unimplemented,
            Self::StackNotPrepared => Errno::Invalid,
        }
    }
}

/// A page-aligned window of user memory and the frames backing it.
#[derive(Debug)]
pub struct Region {
    base: VirtualAddress,
    pages: u32,
    perms: RegionPermissions,
    frames: Vec<PhysicalAddress>,
}

impl Region {
    fn new(base: VirtualAddress, pages: u32, perms: RegionPermissions) -> Self {
        debug_assert!(base.is_page_aligned());
        Self {
            base,
            pages,
            perms,
            frames: Vec::with_capacity(pages as usize),
        }
    }

    /// Same geometry, no frames.
    fn unbacked_copy(&self) -> Self {
        Self::new(self.base, self.pages, self.perms)
    }

    #[inline]
    #[must_use]
    pub const fn base(&self) -> VirtualAddress {
        self.base
    }

    #[inline]
    #[must_use]
    pub const fn pages(&self) -> u32 {
        self.pages
    }

    #[inline]
    #[must_use]
    pub const fn permissions(&self) -> RegionPermissions {
        self.perms
    }

    /// Size of the window in bytes. May reach past the 32-bit space.
    #[inline]
    #[must_use]
    pub fn len_bytes(&self) -> u64 {
        u64::from(self.pages) * u64::from(PAGE_SIZE)
    }

    /// Backing frames, indexed by page. Empty until the region is prepared.
    #[inline]
    #[must_use]
    pub fn frames(&self) -> &[PhysicalAddress] {
        &self.frames
    }

    /// Whether every page has a frame.
    #[inline]
    #[must_use]
    pub fn is_backed(&self) -> bool {
        self.frames.len() == self.pages as usize
    }

    /// Whether `va` lies in `[base, base + pages * PAGE_SIZE)`.
    #[must_use]
    pub fn contains(&self, va: VirtualAddress) -> bool {
        va.checked_offset_from(self.base)
            .is_some_and(|offset| u64::from(offset) < self.len_bytes())
    }

    /// The frame backing the page that contains `va`.
    #[must_use]
    pub fn frame_for(&self, va: VirtualAddress) -> Option<PhysicalAddress> {
        let offset = va.checked_offset_from(self.base)?;
        self.frames.get((offset / PAGE_SIZE) as usize).copied()
    }

    /// Give every page a zeroed frame. On failure, frames taken so far are released.
    fn populate<A: FrameAlloc, M: PhysMapper>(
        &mut self,
        alloc: &A,
        mapper: &M,
    ) -> Result<(), AddressSpaceError> {
        debug_assert!(self.frames.is_empty());
        for _ in 0..self.pages {
            let Some(frame) = alloc.alloc_frame() else {
                self.release(alloc);
                return Err(AddressSpaceError::OutOfMemory);
            };
            // SAFETY: freshly allocated, owned by this region.
            unsafe { mapper.zero_frame(frame) };
            self.frames.push(frame);
        }
        Ok(())
    }

    fn release<A: FrameAlloc>(&mut self, alloc: &A) {
        for frame in self.frames.drain(..) {
            if let Err(e) = alloc.free_frames(frame) {
                warn!("vm: leaking frame {frame} of region at {}: {e}", self.base);
            }
        }
    }
}

/// A process's address space.
///
/// Holds the frame allocator and physical mapper it draws from; all frames it
/// owns go back to that allocator when it is dropped.
pub struct AddressSpace<'a, A: FrameAlloc, M: PhysMapper> {
    alloc: &'a A,
    mapper: &'a M,
    segments: [Option<Region>; MAX_SEGMENTS],
    stack: Region,
    load_complete: bool,
}

impl<'a, A: FrameAlloc, M: PhysMapper> AddressSpace<'a, A, M> {
    /// An empty address space. No frames are owned yet.
    pub fn new(alloc: &'a A, mapper: &'a M) -> Self {
        Self {
            alloc,
            mapper,
            segments: [None, None],
            stack: Region::new(
                VirtualAddress::new(USERSTACK_BASE),
                STACK_PAGES,
                RegionPermissions::new().with_readable(true).with_writeable(true),
            ),
            load_complete: false,
        }
    }

    /// Register a segment covering every byte of `[vaddr, vaddr + size)`.
    ///
    /// The base is rounded down to its page; the size is extended by the
    /// in-page offset of `vaddr` and rounded up to whole pages. No frames are
    /// allocated.
    ///
    /// # Errors
    /// [`AddressSpaceError::TooManyRegions`] if both segments are taken; the
    /// existing segments are left untouched.
    pub fn define_region(
        &mut self,
        vaddr: VirtualAddress,
        size: u32,
        perms: RegionPermissions,
    ) -> Result<(), AddressSpaceError> {
        let Some(slot) = self.segments.iter_mut().find(|s| s.is_none()) else {
            warn!("vm: rejecting region at {vaddr} (+{size:#x}): both segments in use");
            return Err(AddressSpaceError::TooManyRegions);
        };

        let base = vaddr.page_base();
        let bytes = u64::from(size) + u64::from(vaddr.page_offset());
        #[allow(clippy::cast_possible_truncation)]
        let pages = bytes.div_ceil(u64::from(PAGE_SIZE)) as u32;
        debug!("vm: region at {base}, {pages} pages");

        *slot = Some(Region::new(base, pages, perms));
        Ok(())
    }

    /// Back every page of both segments and of the stack with a zeroed frame.
    ///
    /// Regions that are already backed are left alone.
    ///
    /// # Errors
    /// [`AddressSpaceError::OutOfMemory`] if a frame cannot be had. Every frame
    /// acquired by this call is released again before returning.
    pub fn prepare_load(&mut self) -> Result<(), AddressSpaceError> {
        let (alloc, mapper) = (self.alloc, self.mapper);

        let mut fresh = [false; MAX_SEGMENTS + 1];
        let mut result = Ok(());
        for (i, region) in self.regions_mut().enumerate() {
            if region.is_backed() {
                continue;
            }
            if let Err(e) = region.populate(alloc, mapper) {
                result = Err(e);
                break;
            }
            fresh[i] = true;
        }

        if result.is_err() {
            warn!("vm: out of frames while preparing address space, rolling back");
            for (region, fresh) in self.regions_mut().zip(fresh) {
                if fresh {
                    region.release(alloc);
                }
            }
        }
        result
    }

    /// Mark loading as done and flush the translation cache.
    ///
    /// Translations installed from now on map segment 1 read-only.
    pub fn complete_load<T: Tlb, I: InterruptLevel>(&mut self, mmu: &mut Mmu<T, I>) {
        self.load_complete = true;
        mmu.activate();
    }

    /// The initial user stack pointer.
    ///
    /// # Errors
    /// [`AddressSpaceError::StackNotPrepared`] before [`prepare_load`](Self::prepare_load).
    pub fn define_stack(&self) -> Result<VirtualAddress, AddressSpaceError> {
        if self.stack.frames.is_empty() || !self.stack.is_backed() {
            return Err(AddressSpaceError::StackNotPrepared);
        }
        Ok(VirtualAddress::new(USERSTACK))
    }

    /// Duplicate this address space.
    ///
    /// The copy has the same geometry and load state, and its own frames whose
    /// contents equal this space's at the time of the call. Pages of this space
    /// that were never backed come out zeroed in the copy.
    ///
    /// A copy of a fully loaded space is loaded too: segment 1 stays read-only
    /// in the child.
    ///
    /// The source is read without locking; it must not change during the copy.
    ///
    /// # Errors
    /// [`AddressSpaceError::OutOfMemory`]; nothing of the copy survives.
    pub fn try_clone(&self) -> Result<Self, AddressSpaceError> {
        let mut copy = Self {
            alloc: self.alloc,
            mapper: self.mapper,
            segments: self
                .segments
                .each_ref()
                .map(|s| s.as_ref().map(Region::unbacked_copy)),
            stack: self.stack.unbacked_copy(),
            load_complete: self.load_complete,
        };
        copy.prepare_load()?;

        for (dst, src) in copy.regions().zip(self.regions()) {
            for (&to, &from) in dst.frames.iter().zip(&src.frames) {
                // SAFETY: `to` is owned by the copy, `from` by `self`; never the same frame.
                unsafe { self.mapper.copy_frame(to, from) };
            }
        }
        Ok(copy)
    }

    /// Release every frame and the descriptor.
    pub fn destroy(self) {
        drop(self);
    }

    /// Segment `index` (0 or 1), if defined.
    #[must_use]
    pub fn segment(&self, index: usize) -> Option<&Region> {
        self.segments.get(index)?.as_ref()
    }

    #[inline]
    #[must_use]
    pub const fn stack(&self) -> &Region {
        &self.stack
    }

    /// Defined segments in order, then the stack.
    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.segments.iter().flatten().chain(core::iter::once(&self.stack))
    }

    #[inline]
    #[must_use]
    pub const fn is_load_complete(&self) -> bool {
        self.load_complete
    }

    fn regions_mut(&mut self) -> impl Iterator<Item = &mut Region> {
        self.segments
            .iter_mut()
            .flatten()
            .chain(core::iter::once(&mut self.stack))
    }
}

impl<A: FrameAlloc, M: PhysMapper> Drop for AddressSpace<'_, A, M> {
    fn drop(&mut self) {
        let alloc = self.alloc;
        for region in self.regions_mut() {
            region.release(alloc);
        }
    }
}

impl<A: FrameAlloc, M: PhysMapper> core::fmt::Debug for AddressSpace<'_, A, M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AddressSpace")
            .field("segments", &self.segments)
            .field("stack", &self.stack)
            .field("load_complete", &self.load_complete)
            .finish_non_exhaustive()
    }
}
