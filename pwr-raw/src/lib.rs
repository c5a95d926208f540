//! # pwr-raw
//!
//! Hardware register definitions for Intel CPU power management.
//!
//! This crate provides type-safe layouts for the fixed-format MSRs used
//! to inspect and steer per-core and per-package power state: platform
//! info, turbo ratio limits, HWP enablement, uncore frequency limits and
//! the RAPL energy counters. It also provides one-shot MSR read/write
//! primitives over `/dev/cpu/<n>/msr`.
//!
//! ## Usage
//!
//! ```ignore
//! use pwr_raw::pstate::{self, PlatformInfo};
//! use pwr_raw::{read_msr, RegisterLayout};
//!
//! let word = read_msr(0, pstate::msr::MSR_PLATFORM_INFO)?;
//! let info = PlatformInfo::from_msr_value(word);
//! println!("base frequency: {} MHz", info.base_freq_mhz());
//! ```

pub mod msr;
pub mod pstate;
pub mod rapl;
pub mod register;
pub mod uncore;

// Re-export for convenience
pub use msr::{read_msr, read_msr_at, write_msr, write_msr_at, MsrError, Result};
pub use register::RegisterLayout;
