pub mod cpuinfo;
pub mod msr;
pub mod sysfs;

pub use msr::{Msr, MsrHandle, MsrIo};
