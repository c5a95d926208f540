//! Staged sysfs tree plus an in-memory register map, enough for full
//! discovery to run against a temporary directory.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::TempDir;

use crate::common::msr::testing::FakeMsr;
use crate::common::msr::MsrIo;
use crate::common::sysfs::{self, SysWrite};
use crate::config::SysPaths;
use crate::error::{PwrError, Result};
use crate::model::System;

/// Two-tier machine description: four cores over two packages, sibling
/// pairs (0,1) and (2,3).
pub struct RigSpec {
    /// Per-core SST-BF base frequency (MHz)
    pub sst_bf_bases: Vec<u32>,
    /// Flags line of every /proc/cpuinfo entry
    pub cpuinfo_flags: &'static str,
    /// Expose a powercap directory per package
    pub powercap: bool,
    /// Create the scaling_driver file
    pub scaling_driver: bool,
}

impl RigSpec {
    pub fn two_packages() -> Self {
        Self {
            // one high-priority tier (2700 > base 2300), one low
            sst_bf_bases: vec![2700, 2100, 2700, 2100],
            cpuinfo_flags: "fpu vme hwp hwp_epp",
            powercap: false,
            scaling_driver: true,
        }
    }
}

pub struct Rig {
    _dir: TempDir,
    pub paths: SysPaths,
    pub msr: Arc<FakeMsr>,
}

const CORES: u32 = 4;

impl Rig {
    pub fn build(spec: RigSpec) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let paths = SysPaths::rooted_at(dir.path());
        let msr = Arc::new(FakeMsr::new());

        for core in 0..CORES {
            let cpufreq = paths.cpu_dir(core).join("cpufreq");
            let topology = paths.cpu_dir(core).join("topology");
            fs::create_dir_all(&cpufreq).unwrap();
            fs::create_dir_all(&topology).unwrap();

            write(&topology.join("physical_package_id"), (core / 2).to_string());
            let siblings = if core < 2 { "0,1" } else { "2,3" };
            write(&topology.join("thread_siblings_list"), siblings);

            write(&cpufreq.join("cpuinfo_min_freq"), "1000000");
            write(&cpufreq.join("cpuinfo_max_freq"), "3700000");
            write(&cpufreq.join("scaling_min_freq"), "1000000");
            write(&cpufreq.join("scaling_max_freq"), "3700000");
            write(
                &cpufreq.join("base_frequency"),
                (spec.sst_bf_bases[core as usize] * 1000).to_string(),
            );
            write(&cpufreq.join("energy_performance_preference"), "balance_performance");
            write(
                &cpufreq.join("energy_performance_available_preferences"),
                "default performance balance_performance balance_power power",
            );
            if core > 0 {
                write(&paths.online_file(core), "1");
            }

            // register words: base ratio 23 (2300 MHz), HWP on, turbo
            // on, all-core turbo ratio 27 (2700 MHz), current ratio 12
            msr.set(core, 0xCE, 0x17 << 8);
            msr.set(core, 0x770, 1);
            msr.set(core, 0x1A0, 0);
            msr.set(core, 0x1AD, (0x1B << 56) | 0x25);
            msr.set(core, 0x198, 0x0C << 8);
            // uncore: max 2400, min 1200, reserved bytes carry noise
            msr.set(core, 0x620, 0x1122_3344_5566_0C18);
            msr.set(core, 0x621, 0x14);
            // RAPL: power unit 1/8 W, energy unit 1/16384 J,
            // raw TDP 0x460 -> 140 W, counter at 2 J
            msr.set(core, 0x606, 3 | (14 << 8));
            msr.set(core, 0x614, 0x460);
            msr.set(core, 0x611, 2 << 14);
        }

        if spec.scaling_driver {
            write(&paths.scaling_driver_file(), "intel_pstate");
        }

        if spec.powercap {
            for package in 0..2 {
                let rapl = paths.rapl_dir(package);
                fs::create_dir_all(&rapl).unwrap();
                write(&rapl.join("constraint_0_power_limit_uw"), "125000000");
                write(&rapl.join("max_energy_range_uj"), "262143328850");
                write(&rapl.join("energy_uj"), "48000000");
            }
        }

        fs::create_dir_all(paths.cpuinfo.parent().unwrap()).unwrap();
        let mut cpuinfo = fs::File::create(&paths.cpuinfo).unwrap();
        for core in 0..CORES {
            writeln!(cpuinfo, "processor\t: {core}").unwrap();
            writeln!(cpuinfo, "flags\t\t: {}", spec.cpuinfo_flags).unwrap();
            writeln!(cpuinfo).unwrap();
        }

        Self {
            _dir: dir,
            paths,
            msr,
        }
    }

    pub fn discover(&self) -> Result<System> {
        let msr: Arc<dyn MsrIo> = Arc::clone(&self.msr) as Arc<dyn MsrIo>;
        System::discover_with_io(self.paths.clone(), msr)
    }

    pub fn read_cpufreq(&self, core: u32, name: &str) -> String {
        fs::read_to_string(self.paths.cpufreq_file(core, name))
            .unwrap()
            .trim()
            .to_string()
    }
}

fn write(path: &Path, contents: impl AsRef<str>) {
    fs::write(path, format!("{}\n", contents.as_ref())).unwrap();
}

/// Write backend with the cpufreq driver's ordering constraint: a
/// scaling_min_freq above the stored scaling_max_freq (or a max below
/// the stored min) is rejected with EINVAL, anything else lands in the
/// staged file. Every attempt is logged by file name, rejected ones
/// included.
pub struct CpufreqDriver {
    log: Mutex<Vec<String>>,
}

impl CpufreqDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            log: Mutex::new(Vec::new()),
        })
    }

    pub fn writes(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    fn reject(path: &Path, value: &str) -> PwrError {
        PwrError::SysfsWrite {
            path: path.to_path_buf(),
            value: value.to_string(),
            source: std::io::Error::from_raw_os_error(libc::EINVAL),
        }
    }

    fn stored_khz(path: &Path, name: &str) -> u32 {
        fs::read_to_string(path.with_file_name(name))
            .unwrap()
            .trim()
            .parse()
            .unwrap()
    }
}

impl SysWrite for CpufreqDriver {
    fn write_str(&self, path: &Path, value: &str) -> Result<()> {
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        self.log.lock().push(name.clone());

        if name == "scaling_min_freq"
            && value.parse::<u32>().unwrap() > Self::stored_khz(path, "scaling_max_freq")
        {
            return Err(Self::reject(path, value));
        }
        if name == "scaling_max_freq"
            && value.parse::<u32>().unwrap() < Self::stored_khz(path, "scaling_min_freq")
        {
            return Err(Self::reject(path, value));
        }
        sysfs::write_value(path, value)
    }
}
