use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PwrError {
    #[error("MSR driver not loaded, run 'modprobe msr': {0}")]
    MsrDriverNotLoaded(String),

    #[error("MSR device not accessible, run with elevated privilege: {0}")]
    MsrPermissionDenied(String),

    #[error("Failed to {op} MSR 0x{msr:X} on core {core}: {source}")]
    Msr {
        core: u32,
        msr: u64,
        op: &'static str,
        source: io::Error,
    },

    #[error("Scaling driver not loaded: {0}")]
    ScalingDriverMissing(String),

    #[error("Failed to read {path}: {source}")]
    SysfsRead { path: PathBuf, source: io::Error },

    #[error("Failed to write '{value}' to {path}: {source}")]
    SysfsWrite {
        path: PathBuf,
        value: String,
        source: io::Error,
    },

    #[error("Could not parse '{value}' from {path}")]
    Parse { path: PathBuf, value: String },

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl PwrError {
    /// True when an underlying sysfs write was rejected with EINVAL.
    /// The cpufreq driver returns EINVAL when a min-frequency write
    /// momentarily exceeds the currently stored max; the commit path
    /// retries once in max-then-min order on exactly this condition.
    pub fn is_einval_write(&self) -> bool {
        matches!(
            self,
            PwrError::SysfsWrite { source, .. }
                if source.raw_os_error() == Some(libc::EINVAL)
        )
    }
}

pub type Result<T> = std::result::Result<T, PwrError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_einval_detection() {
        let err = PwrError::SysfsWrite {
            path: PathBuf::from("/sys/x"),
            value: "1200000".into(),
            source: io::Error::from_raw_os_error(libc::EINVAL),
        };
        assert!(err.is_einval_write());

        let err = PwrError::SysfsWrite {
            path: PathBuf::from("/sys/x"),
            value: "1200000".into(),
            source: io::Error::from_raw_os_error(libc::EACCES),
        };
        assert!(!err.is_einval_write());
    }

    #[test]
    fn test_messages_carry_context() {
        let err = PwrError::Msr {
            core: 3,
            msr: 0x620,
            op: "read",
            source: io::Error::from(io::ErrorKind::UnexpectedEof),
        };
        let msg = err.to_string();
        assert!(msg.contains("0x620"));
        assert!(msg.contains("core 3"));
    }
}
