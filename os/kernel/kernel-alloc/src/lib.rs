//! # Kernel Physical Memory Allocation
//!
//! Owns physical RAM for the virtual-memory core: which frames are free, and
//! how the kernel reaches a frame's bytes.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │            kernel-vmem (AddressSpace, Mmu)          │
//! │    • one frame per user page, fault handling        │
//! └─────────────────┬───────────────────────────────────┘
//!                   │ FrameAlloc / PhysMapper
//! ┌─────────────────▼───────────────────────────────────┐
//! │           Physical Frame Allocator                  │
//! │    • bump stealing until the coremap exists         │
//! │    • first-fit contiguous runs afterwards           │
//! │    • one spin lock around every scan                │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │              Physical Mapper                        │
//! │    • KSEG0 direct map on the machine                │
//! │    • heap-backed RAM when hosted (feature `sim`)    │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Boot sequence
//!
//! 1. The boot RAM probe yields a [`RamRange`](kernel_info::boot::RamRange).
//! 2. [`FrameAllocator::new`](frame_alloc::FrameAllocator::new) starts in
//!    stealing mode; early kernel allocations bump through the range.
//! 3. [`vm_bootstrap`](bootstrap::vm_bootstrap) places the coremap at the
//!    start of what is left and switches over.
//!
//! ## Usage
//! ```rust
//! use kernel_alloc::frame_alloc::FrameAllocator;
//! use kernel_info::boot::RamRange;
//! use kernel_vmem::FrameAlloc;
//! use kernel_vmem::addresses::PhysicalAddress;
//!
//! let alloc = FrameAllocator::new(RamRange::new(
//!     PhysicalAddress::new(0x0010_0000),
//!     PhysicalAddress::new(0x0020_0000),
//! ));
//! let early = alloc.alloc_frames(2).unwrap();
//! assert_eq!(early, PhysicalAddress::new(0x0010_0000));
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

pub mod bootstrap;
pub mod frame_alloc;
pub mod phys_mapper;

pub use bootstrap::{BootstrapError, vm_bootstrap};
pub use frame_alloc::{Coremap, FrameAllocator, FrameStats};
