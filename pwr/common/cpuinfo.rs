//! `/proc/cpuinfo` feature-flag lookup.
//!
//! Used once during discovery to decide whether the platform supports
//! EPP (the `hwp_epp` CPUID flag surfaces here).

use std::path::Path;

use crate::error::Result;

/// Check whether the given processor entry carries a feature flag.
///
/// Entries are delimited by `processor\t: <n>` lines; the flags line
/// is a space-separated token list.
pub fn has_flag(cpuinfo: &Path, core: u32, flag: &str) -> Result<bool> {
    let raw = std::fs::read_to_string(cpuinfo).map_err(|e| crate::error::PwrError::SysfsRead {
        path: cpuinfo.to_path_buf(),
        source: e,
    })?;

    let mut in_entry = false;
    for line in raw.lines() {
        if let Some(rest) = line.strip_prefix("processor") {
            let id = rest.trim_start_matches([' ', '\t', ':']).trim();
            in_entry = id.parse::<u32>() == Ok(core);
            continue;
        }
        if in_entry && line.starts_with("flags") {
            if let Some((_, tokens)) = line.split_once(':') {
                return Ok(tokens.split_whitespace().any(|t| t == flag));
            }
        }
    }

    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fake_cpuinfo(flags0: &str, flags1: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let mut f = std::fs::File::create(dir.path().join("cpuinfo")).unwrap();
        writeln!(f, "processor\t: 0").unwrap();
        writeln!(f, "model name\t: Intel(R) Xeon(R) Gold 6230N CPU @ 2.30GHz").unwrap();
        writeln!(f, "flags\t\t: {flags0}").unwrap();
        writeln!(f).unwrap();
        writeln!(f, "processor\t: 1").unwrap();
        writeln!(f, "flags\t\t: {flags1}").unwrap();
        dir
    }

    #[test]
    fn test_flag_lookup_per_processor() {
        let dir = fake_cpuinfo("fpu vme hwp hwp_epp", "fpu vme hwp");
        let path = dir.path().join("cpuinfo");
        assert!(has_flag(&path, 0, "hwp_epp").unwrap());
        assert!(!has_flag(&path, 1, "hwp_epp").unwrap());
    }

    #[test]
    fn test_flag_needs_exact_token() {
        let dir = fake_cpuinfo("hwp_epp_extra", "hwp");
        let path = dir.path().join("cpuinfo");
        assert!(!has_flag(&path, 0, "hwp_epp").unwrap());
    }

    #[test]
    fn test_missing_cpuinfo_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(has_flag(&dir.path().join("cpuinfo"), 0, "hwp_epp").is_err());
    }
}
