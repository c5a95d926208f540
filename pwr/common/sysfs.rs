//! Single-line sysfs file access with path context on every failure.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::error::{PwrError, Result};

/// Read the first line of a sysfs file, trailing newline stripped.
pub fn read_line(path: &Path) -> Result<String> {
    let raw = fs::read_to_string(path).map_err(|e| PwrError::SysfsRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(raw.lines().next().unwrap_or("").trim().to_string())
}

/// Read a sysfs file and parse its single line.
pub fn read_parse<T: FromStr>(path: &Path) -> Result<T> {
    let value = read_line(path)?;
    value.parse().map_err(|_| PwrError::Parse {
        path: path.to_path_buf(),
        value,
    })
}

/// Read a per-core frequency file expressed in kHz, returning MHz.
pub fn read_freq_mhz(path: &Path) -> Result<u32> {
    Ok(read_parse::<u32>(path)? / 1000)
}

/// Write a value to a sysfs file.
pub fn write_value<T: ToString>(path: &Path, value: T) -> Result<()> {
    let text = value.to_string();
    fs::write(path, &text).map_err(|e| PwrError::SysfsWrite {
        path: path.to_path_buf(),
        value: text,
        source: e,
    })
}

/// Sysfs write backend. The kernel can reject a value against state it
/// already holds (cpufreq refuses scaling_min_freq above the stored
/// scaling_max_freq), so commit paths go through this seam rather than
/// bare [`write_value`], letting tests stand in a backend with the
/// driver's rejection behavior.
pub trait SysWrite: Send + Sync {
    fn write_str(&self, path: &Path, value: &str) -> Result<()>;
}

/// The real backend: plain file writes.
pub struct DirectWrite;

impl SysWrite for DirectWrite {
    fn write_str(&self, path: &Path, value: &str) -> Result<()> {
        write_value(path, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_line_strips_newline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scaling_min_freq");
        std::fs::write(&path, "1200000\n").unwrap();
        assert_eq!(read_line(&path).unwrap(), "1200000");
        assert_eq!(read_freq_mhz(&path).unwrap(), 1200);
    }

    #[test]
    fn test_parse_failure_carries_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad");
        std::fs::write(&path, "not-a-number\n").unwrap();
        match read_parse::<u32>(&path) {
            Err(PwrError::Parse { value, .. }) => assert_eq!(value, "not-a-number"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            read_line(&dir.path().join("absent")),
            Err(PwrError::SysfsRead { .. })
        ));
    }

    #[test]
    fn test_write_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scaling_max_freq");
        std::fs::write(&path, "").unwrap();
        write_value(&path, 2400000u32).unwrap();
        assert_eq!(read_line(&path).unwrap(), "2400000");
    }
}
