//! # Kernel Memory Layout and Boot Records
//!
//! This crate defines the compile-time layout of the 32-bit address space the
//! virtual-memory core works in, plus the record the boot path hands over after
//! probing physical RAM.
//!
//! ## Virtual Address Space Layout
//!
//! ```text
//! 0x0000_0000 ┌─────────────────────────────────┐
//!             │        User Space (kuseg)       │
//!             │  segment 1 (text), segment 2    │
//!             │  (data) ... fixed user stack    │
//! USERSTACK   ├─────────────────────────────────┤ 0x8000_0000
//!             │   KSEG0: direct-mapped kernel   │
//!             │   view of physical memory       │
//!             │   (kernel VA = PA + KSEG0_BASE) │
//! 0xA000_0000 ├─────────────────────────────────┤
//!             │   KSEG1 / KSEG2 (unused here)   │
//! 0xFFFF_FFFF └─────────────────────────────────┘
//! ```
//!
//! User addresses are only reachable through the software-refilled
//! translation cache; kernel addresses in KSEG0 bypass it. That is why
//! physical-to-kernel-virtual translation is plain arithmetic
//! ([`memory::paddr_to_kvaddr`]) and never allocates.
//!
//! ## Boot Protocol
//!
//! The boot path probes RAM once and records the usable range in a
//! [`RamRange`](boot::RamRange). The frame allocator is constructed from it.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod boot;
pub mod memory;
