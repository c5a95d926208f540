//! CPU power-state discovery, validation and commit engine.
//!
//! Models per-core and per-package power state (frequency limits, EPP,
//! uncore frequency, turbo/HWP flags) exposed through Linux sysfs and
//! raw MSR access, and tracks package power telemetry. Discovery is
//! performed once into an owned [`System`] value; callers read
//! capabilities, mutate desired state and commit it back to hardware.
//!
//! All I/O is synchronous and blocking; the engine holds no locks over
//! hardware state and assumes exclusive single-writer ownership.

pub mod common;
pub mod config;
pub mod error;
pub mod model;
pub mod power;
pub mod sstbf;

pub use config::{parse_cpu_list, SysPaths};
pub use error::{PwrError, Result};
pub use model::{Core, Package, Profile, System};
pub use power::PowerMeter;
