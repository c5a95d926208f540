//! MSR (Model-Specific Register) read/write primitives
//!
//! This module provides low-level MSR access through `/dev/cpu/*/msr`.
//! Each call is a single open+seek+read or open+seek+write of exactly
//! eight bytes. For cached/pooled access, use the handle pool in the
//! `pwr` crate.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

pub type Result<T> = std::result::Result<T, MsrError>;

/// Errors that can occur during MSR operations
#[derive(Debug, thiserror::Error)]
pub enum MsrError {
    #[error("Failed to open MSR device for CPU {cpu}: {source}")]
    OpenFailed { cpu: u32, source: std::io::Error },

    #[error("Failed to read MSR 0x{msr:X} on CPU {cpu}: {source}")]
    ReadFailed {
        cpu: u32,
        msr: u64,
        source: std::io::Error,
    },

    #[error("Failed to write MSR 0x{msr:X} on CPU {cpu}: {source}")]
    WriteFailed {
        cpu: u32,
        msr: u64,
        source: std::io::Error,
    },

    #[error("Failed to seek to MSR 0x{msr:X} on CPU {cpu}: {source}")]
    SeekFailed {
        cpu: u32,
        msr: u64,
        source: std::io::Error,
    },
}

impl MsrError {
    /// True when the failure was a permission problem on the device
    /// node. Callers use this to suggest running with elevated
    /// privilege rather than `modprobe msr`.
    pub fn is_permission_denied(&self) -> bool {
        let source = match self {
            MsrError::OpenFailed { source, .. }
            | MsrError::ReadFailed { source, .. }
            | MsrError::WriteFailed { source, .. }
            | MsrError::SeekFailed { source, .. } => source,
        };
        source.kind() == std::io::ErrorKind::PermissionDenied
    }
}

/// Read a 64-bit value from an MSR
///
/// # Arguments
///
/// * `cpu` - CPU core number (0-indexed)
/// * `msr` - MSR address (e.g., 0xCE for PLATFORM_INFO)
///
/// # Errors
///
/// Returns an error if:
/// - The MSR device cannot be opened (requires root or the msr module)
/// - The MSR address is invalid
/// - The MSR is not readable
pub fn read_msr(cpu: u32, msr: u64) -> Result<u64> {
    let path = format!("/dev/cpu/{cpu}/msr");
    read_msr_at(Path::new(&path), cpu, msr)
}

/// Read a 64-bit value from an MSR through an explicit device path.
pub fn read_msr_at(path: &Path, cpu: u32, msr: u64) -> Result<u64> {
    let mut file = File::open(path).map_err(|e| MsrError::OpenFailed { cpu, source: e })?;

    file.seek(SeekFrom::Start(msr))
        .map_err(|e| MsrError::SeekFailed {
            cpu,
            msr,
            source: e,
        })?;

    let mut buffer = [0u8; 8];
    file.read_exact(&mut buffer)
        .map_err(|e| MsrError::ReadFailed {
            cpu,
            msr,
            source: e,
        })?;

    Ok(u64::from_le_bytes(buffer))
}

/// Write a 64-bit value to an MSR
///
/// # Safety
///
/// Writing incorrect values to MSRs can cause system instability.
/// Registers that pack multiple settings must be updated through a
/// read-modify-write (see `UncoreRatioLimit::merge_into`), never by
/// writing a freshly built word.
pub fn write_msr(cpu: u32, msr: u64, value: u64) -> Result<()> {
    let path = format!("/dev/cpu/{cpu}/msr");
    write_msr_at(Path::new(&path), cpu, msr, value)
}

/// Write a 64-bit value to an MSR through an explicit device path.
pub fn write_msr_at(path: &Path, cpu: u32, msr: u64, value: u64) -> Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .custom_flags(libc::O_SYNC) // Ensure synchronous writes
        .open(path)
        .map_err(|e| MsrError::OpenFailed { cpu, source: e })?;

    file.seek(SeekFrom::Start(msr))
        .map_err(|e| MsrError::SeekFailed {
            cpu,
            msr,
            source: e,
        })?;

    file.write_all(&value.to_le_bytes())
        .map_err(|e| MsrError::WriteFailed {
            cpu,
            msr,
            source: e,
        })?;

    Ok(())
}
