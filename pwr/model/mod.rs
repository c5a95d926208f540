pub mod core;
pub mod package;
pub mod system;

pub use core::{Core, Profile};
pub use package::Package;
pub use system::System;

#[cfg(test)]
pub mod testrig;
