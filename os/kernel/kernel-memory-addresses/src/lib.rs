//! # Virtual and Physical Memory Address Types
//!
//! Strongly typed wrappers for the 32-bit addresses handled by the software
//! managed MMU path.
//!
//! ## Overview
//!
//! The translation cache, the frame allocator and the address-space model all
//! juggle raw 32-bit values that are either *virtual* (what a user program
//! touches) or *physical* (what a frame allocator hands out). Mixing the two is
//! the classic bug of a teaching kernel, so both get their own type:
//!
//! | Type | Meaning |
//! |------|---------|
//! | [`MemoryAddress`] | A raw 32-bit address, either physical or virtual. |
//! | [`VirtualAddress`] | A user or kernel virtual address (translated by the TLB). |
//! | [`PhysicalAddress`] | A physical RAM address (a frame base, or a byte within one). |
//!
//! ## Pages
//!
//! There is a single page size, [`PAGE_SIZE`] (4 KiB). [`PAGE_FRAME`] masks an
//! address down to its containing page, which is exactly what the fault
//! handler does with the faulting address before classifying it.
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let va = VirtualAddress::new(0x0040_1234);
//! assert_eq!(va.page_base().as_u32(), 0x0040_1000);
//! assert_eq!(va.page_offset(), 0x234);
//! assert!(!va.is_page_aligned());
//!
//! let pa = PhysicalAddress::new(0x0020_3000);
//! assert!(pa.is_page_aligned());
//! assert_eq!(pa.frame_number(), 0x203);
//! ```
//!
//! ## Design Notes
//!
//! - The types are `#[repr(transparent)]` and implement `Copy`, `Eq`, `Ord`, and
//!   `Hash`.
//! - Alignment helpers are `const fn`. Rounding *up* can overflow at the top of
//!   the 32-bit space and is therefore checked.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(clippy::inline_always)]

mod memory_address;
mod physical_address;
mod virtual_address;

pub use memory_address::MemoryAddress;
pub use physical_address::PhysicalAddress;
pub use virtual_address::VirtualAddress;

/// log2 of [`PAGE_SIZE`].
pub const PAGE_SHIFT: u32 = 12;

/// Size of a page (and of a physical frame) in bytes.
pub const PAGE_SIZE: u32 = 1 << PAGE_SHIFT;

/// Mask selecting the page-number bits of an address.
pub const PAGE_FRAME: u32 = !(PAGE_SIZE - 1);

/// [`PAGE_SIZE`] as a `usize`, for slice lengths and byte counts.
#[allow(clippy::cast_possible_truncation)]
pub const PAGE_BYTES: usize = PAGE_SIZE as usize;
