use std::path::{Path, PathBuf};

/// Filesystem roots for every kernel interface the engine touches.
///
/// Defaults point at the real kernel paths; tests point them at a
/// staged directory tree instead of patching globals.
#[derive(Debug, Clone)]
pub struct SysPaths {
    /// Per-cpu sysfs tree, normally `/sys/devices/system/cpu`
    pub cpu_root: PathBuf,

    /// RAPL powercap tree, normally `/sys/devices/virtual/powercap/intel-rapl`
    pub powercap_root: PathBuf,

    /// MSR device tree, normally `/dev/cpu`
    pub msr_root: PathBuf,

    /// Processor identification data, normally `/proc/cpuinfo`
    pub cpuinfo: PathBuf,
}

impl Default for SysPaths {
    fn default() -> Self {
        Self {
            cpu_root: PathBuf::from("/sys/devices/system/cpu"),
            powercap_root: PathBuf::from("/sys/devices/virtual/powercap/intel-rapl"),
            msr_root: PathBuf::from("/dev/cpu"),
            cpuinfo: PathBuf::from("/proc/cpuinfo"),
        }
    }
}

impl SysPaths {
    /// Root all paths under a single directory (test trees)
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            cpu_root: root.join("sys/devices/system/cpu"),
            powercap_root: root.join("sys/devices/virtual/powercap/intel-rapl"),
            msr_root: root.join("dev/cpu"),
            cpuinfo: root.join("proc/cpuinfo"),
        }
    }

    pub fn cpu_dir(&self, core: u32) -> PathBuf {
        self.cpu_root.join(format!("cpu{core}"))
    }

    pub fn cpufreq_file(&self, core: u32, name: &str) -> PathBuf {
        self.cpu_dir(core).join("cpufreq").join(name)
    }

    pub fn topology_file(&self, core: u32, name: &str) -> PathBuf {
        self.cpu_dir(core).join("topology").join(name)
    }

    pub fn online_file(&self, core: u32) -> PathBuf {
        self.cpu_dir(core).join("online")
    }

    pub fn scaling_driver_file(&self) -> PathBuf {
        self.cpufreq_file(0, "scaling_driver")
    }

    pub fn rapl_dir(&self, package_id: usize) -> PathBuf {
        self.powercap_root.join(format!("intel-rapl:{package_id}"))
    }

    pub fn msr_device(&self, core: u32) -> PathBuf {
        self.msr_root.join(core.to_string()).join("msr")
    }
}

/// Parse a CPU list like "0-3,8-11" into ids.
///
/// This is the format of `topology/thread_siblings_list` and of the
/// `--core`/`--package` CLI arguments.
pub fn parse_cpu_list(s: &str) -> Option<Vec<u32>> {
    let mut cpus = Vec::new();
    for part in s.trim().split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        if let Some((start, end)) = part.split_once('-') {
            let start: u32 = start.trim().parse().ok()?;
            let end: u32 = end.trim().parse().ok()?;
            cpus.extend(start..=end);
        } else {
            cpus.push(part.parse().ok()?);
        }
    }
    cpus.sort_unstable();
    cpus.dedup();
    Some(cpus)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cpu_list_formats() {
        assert_eq!(parse_cpu_list("0,4"), Some(vec![0, 4]));
        assert_eq!(parse_cpu_list("0-3"), Some(vec![0, 1, 2, 3]));
        assert_eq!(parse_cpu_list("8-9,0,8"), Some(vec![0, 8, 9]));
        assert_eq!(parse_cpu_list("1 \n"), Some(vec![1]));
        assert_eq!(parse_cpu_list("x"), None);
    }

    #[test]
    fn test_path_builders() {
        let paths = SysPaths::default();
        assert_eq!(
            paths.cpufreq_file(2, "scaling_min_freq"),
            PathBuf::from("/sys/devices/system/cpu/cpu2/cpufreq/scaling_min_freq")
        );
        assert_eq!(
            paths.rapl_dir(1),
            PathBuf::from("/sys/devices/virtual/powercap/intel-rapl/intel-rapl:1")
        );
        assert_eq!(paths.msr_device(7), PathBuf::from("/dev/cpu/7/msr"));
    }
}
