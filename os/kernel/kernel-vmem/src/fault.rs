//! # Page fault handling
//!
//! Resolves a translation miss against the current process's address space
//! and installs the result into the translation cache.
//!
//! ## Order of checks
//!
//! 1. A store to a read-only entry is a protection error. Never upgraded.
//! 2. There must be a current process with an address space.
//! 3. The page is classified against segment 1, segment 2 and the stack
//!    window, in that order. No match is a segmentation fault.
//! 4. The backing frame is installed: writable, except for segment 1 once
//!    loading is complete.

use crate::address_space::AddressSpace;
use crate::errno::Errno;
use crate::mmu::Mmu;
use crate::tlb::{Tlb, TlbLo};
use crate::{FrameAlloc, PhysMapper};
use kernel_memory_addresses::VirtualAddress;
use kernel_sync::InterruptLevel;
use log::debug;

/// What kind of access trapped.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum FaultKind {
    /// Load with no valid translation.
    Read,
    /// Store with no valid translation.
    Write,
    /// Store through a translation without write permission.
    ReadOnly,
}

impl FaultKind {
    /// Raw trap code for this kind.
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::Read => 0,
            Self::Write => 1,
            Self::ReadOnly => 2,
        }
    }

    /// One-line description for logs.
    #[must_use]
    pub const fn explain(self) -> &'static str {
        match self {
            Self::Read => "Read access to an untranslated page",
            Self::Write => "Write access to an untranslated page",
            Self::ReadOnly => "Write access to a read-only page",
        }
    }
}

impl TryFrom<u32> for FaultKind {
    type Error = FaultError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Read),
            1 => Ok(Self::Write),
            2 => Ok(Self::ReadOnly),
            other => Err(FaultError::UnsupportedKind(other)),
        }
    }
}

/// Why a fault could not be resolved.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum FaultError {
    #[error("write to read-only page at {address}")]
    ReadOnly { address: VirtualAddress },
    #[error("no region maps {address}")]
    Segmentation { address: VirtualAddress },
    #[error("fault with no current process")]
    NoProcess,
    #[error("fault in a process without an address space")]
    NoAddressSpace,
    #[error("unknown fault code {0}")]
    UnsupportedKind(u32),
    #[error("region containing {address} has no frames")]
    Unbacked { address: VirtualAddress },
}

impl FaultError {
    #[must_use]
    pub const fn errno(self) -> Errno {
        match self {
            Self::UnsupportedKind(_) => Errno::Invalid,
            Self::ReadOnly { .. }
            | Self::Segmentation { .. }
            | Self::NoProcess
            | Self::NoAddressSpace
            | Self::Unbacked { .. } => Errno::Fault,
        }
    }
}

/// The process running on the faulting execution unit, as far as the fault
/// handler cares.
///
/// `'a` is how long the process's allocator and mapper are borrowed.
pub trait CurrentProcess<'a> {
    type Alloc: FrameAlloc + 'a;
    type Mapper: PhysMapper + 'a;

    /// The process's address space; `None` while it has none (e.g. mid-exec).
    fn address_space(&self) -> Option<&AddressSpace<'a, Self::Alloc, Self::Mapper>>;
}

impl<T: Tlb, I: InterruptLevel> Mmu<T, I> {
    /// Resolve a fault of `kind` at `address` for `process`.
    ///
    /// On success one translation has been installed and the faulting
    /// instruction may be restarted.
    ///
    /// # Errors
    /// See [`FaultError`]; every error is final for this access.
    pub fn vm_fault<'a, P: CurrentProcess<'a>>(
        &mut self,
        process: Option<&P>,
        kind: FaultKind,
        address: VirtualAddress,
    ) -> Result<(), FaultError> {
        let page = address.page_base();
        debug!("vm: fault at {address}: {}", kind.explain());

        if kind == FaultKind::ReadOnly {
            return Err(FaultError::ReadOnly { address });
        }

        // No process this early; retrying would fault forever.
        let space = process
            .ok_or(FaultError::NoProcess)?
            .address_space()
            .ok_or(FaultError::NoAddressSpace)?;

        let seg1 = space.segment(0).map(|r| (r, space.is_load_complete()));
        let seg2 = space.segment(1).map(|r| (r, false));
        let stack = Some((space.stack(), false));
        let (region, read_only) = [seg1, seg2, stack]
            .into_iter()
            .flatten()
            .find(|(region, _)| region.contains(page))
            .ok_or(FaultError::Segmentation { address })?;

        debug_assert!(region.frames().is_empty() || region.is_backed());
        let frame = region
            .frame_for(page)
            .ok_or(FaultError::Unbacked { address })?;
        debug_assert!(frame.is_page_aligned());

        self.install(page, TlbLo::mapping(frame, !read_only));
        Ok(())
    }

    /// [`vm_fault`](Self::vm_fault) for a raw trap code.
    ///
    /// # Errors
    /// [`FaultError::UnsupportedKind`] for a code other than 0, 1 or 2, else as
    /// [`vm_fault`](Self::vm_fault).
    pub fn vm_fault_code<'a, P: CurrentProcess<'a>>(
        &mut self,
        process: Option<&P>,
        code: u32,
        address: VirtualAddress,
    ) -> Result<(), FaultError> {
        let kind = FaultKind::try_from(code)?;
        self.vm_fault(process, kind, address)
    }
}
