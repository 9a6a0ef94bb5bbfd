//! # Kernel synchronization primitives
//!
//! Two primitives back the virtual-memory core:
//!
//! - [`SpinLock`] serializes every scan of the shared frame table.
//! - [`InterruptLevel`] / [`SplGuard`] bracket translation-cache updates so an
//!   interrupt on the same execution unit cannot observe a half-written slot.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod irq;
mod spin_lock;

pub use irq::{InterruptLevel, SoftInterrupts, SplGuard};
pub use spin_lock::{SpinLock, SpinLockGuard};
