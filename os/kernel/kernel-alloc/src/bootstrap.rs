//! # VM bootstrap
//!
//! Hands the unstolen part of boot RAM over to a [`Coremap`] that lives at the
//! start of that same range:
//!
//! ```text
//! ram.start          next (after stealing)                             ram.end
//!   │ stolen frames  │ coremap entries │ managed frames ...                 │
//!   └────────────────┴─────────────────┴────────────────────────────────────┘
//!                     ◄─ meta pages ──► ◄─ one u32 entry per frame here ───►
//! ```

use crate::frame_alloc::{Backend, Coremap, FrameAllocator};
use kernel_memory_addresses::{PAGE_BYTES, PAGE_SIZE};
use kernel_vmem::{Errno, PhysMapper};
use log::{error, info};

/// Why the coremap could not be built.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum BootstrapError {
    #[error("the coremap is already in place")]
    AlreadyBootstrapped,
    #[error("{available} frames left, but the coremap alone needs {required}")]
    InsufficientMemory { available: usize, required: usize },
}

impl BootstrapError {
    #[must_use]
    pub const fn errno(self) -> Errno {
        match self {
            Self::AlreadyBootstrapped => Errno::Invalid,
            Self::InsufficientMemory { .. } => Errno::NoMemory,
        }
    }
}

/// Pages of coremap entries needed to describe `frames` frames.
#[must_use]
pub const fn coremap_pages(frames: usize) -> usize {
    (frames * size_of::<u32>()).div_ceil(PAGE_BYTES)
}

impl<'m> FrameAllocator<'m> {
    /// Build the coremap over what is left of RAM and route every later
    /// request through it.
    ///
    /// # Errors
    /// - [`BootstrapError::AlreadyBootstrapped`] on a second call.
    /// - [`BootstrapError::InsufficientMemory`] if nothing would be left to
    ///   manage once the entries are placed.
    pub fn bootstrap<M: PhysMapper>(&self, mapper: &'m M) -> Result<(), BootstrapError> {
        let mut backend = self.state.lock();
        let Backend::Steal(steal) = &*backend else {
            return Err(BootstrapError::AlreadyBootstrapped);
        };

        let rest = steal.remaining();
        let available = rest.pages() as usize;
        let meta = coremap_pages(available);
        if available <= meta {
            return Err(BootstrapError::InsufficientMemory {
                available,
                required: meta + 1,
            });
        }

        let frames = available - meta;
        #[allow(clippy::cast_possible_truncation)]
        let base = rest.start + (meta as u32) * PAGE_SIZE;

        // SAFETY: [rest.start, base) is unstolen RAM nobody else references,
        // and the mapper keeps it addressable for 'm.
        let entries = unsafe { mapper.phys_to_slice_mut::<u32>(rest.start, frames) };
        let coremap = Coremap::new(entries, base);

        info!(
            "vm: coremap at {} ({meta} page(s)) managing {frames} frames from {base} to {}",
            rest.start, rest.end
        );
        *backend = Backend::Coremap(coremap);
        Ok(())
    }
}

/// Bring up the frame allocator, logging the outcome.
///
/// # Errors
/// As [`FrameAllocator::bootstrap`].
pub fn vm_bootstrap<'m, M: PhysMapper>(
    alloc: &FrameAllocator<'m>,
    mapper: &'m M,
) -> Result<(), BootstrapError> {
    alloc.bootstrap(mapper).inspect_err(|e| {
        error!("vm: bootstrap failed: {e}");
    })
}
