use std::collections::BTreeSet;
use std::fs::File;
use std::io::ErrorKind;
use std::sync::Arc;

use crate::common::cpuinfo;
use crate::common::msr::{Msr, MsrIo};
use crate::common::sysfs;
use crate::config::{parse_cpu_list, SysPaths};
use crate::error::{PwrError, Result};
use crate::model::{Core, Package, Profile};
use crate::sstbf;

/// The whole machine: every package, and through them every core.
///
/// Constructed once per process by [`System::discover`]; topology and
/// capability fields are never recomputed afterwards. There is no
/// internal locking; callers sharing one instance across threads must
/// serialize their own commits.
pub struct System {
    pub packages: Vec<Package>,

    /// Two base-frequency tiers exist across the system
    pub sst_bf_enabled: bool,

    /// Every core of every package is pinned to its tier base
    pub sst_bf_configured: bool,

    /// Platform reports the hwp_epp feature and exposes the
    /// preference file
    pub epp_enabled: bool,

    paths: SysPaths,
}

impl System {
    /// Discover the real machine through the default kernel paths.
    pub fn discover() -> Result<Self> {
        Self::discover_with(SysPaths::default())
    }

    /// Discover through explicit filesystem roots.
    pub fn discover_with(paths: SysPaths) -> Result<Self> {
        check_msr_driver(&paths)?;
        let msr = Arc::new(Msr::new(paths.msr_root.clone()));
        Self::discover_with_io(paths, msr)
    }

    /// Discover with a caller-provided register backend. The MSR
    /// device check is skipped; the scaling-driver check is not.
    pub fn discover_with_io(paths: SysPaths, msr: Arc<dyn MsrIo>) -> Result<Self> {
        check_scaling_driver(&paths)?;

        let mut system = Self {
            packages: Vec::new(),
            sst_bf_enabled: false,
            sst_bf_configured: false,
            epp_enabled: false,
            paths,
        };
        system.populate(msr)?;
        system.refresh_all()?;
        Ok(system)
    }

    fn populate(&mut self, msr: Arc<dyn MsrIo>) -> Result<()> {
        let core_ids = enumerate_cores(&self.paths)?;
        tracing::info!("Discovered {} logical cores", core_ids.len());

        let mut sibling_map: Vec<(u32, Vec<u32>)> = Vec::with_capacity(core_ids.len());
        let mut physical_ids: Vec<i32> = Vec::new();

        for &core_id in &core_ids {
            let physical_id: i32 =
                sysfs::read_parse(&self.paths.topology_file(core_id, "physical_package_id"))?;

            let siblings_path = self.paths.topology_file(core_id, "thread_siblings_list");
            let raw = sysfs::read_line(&siblings_path)?;
            let mut siblings = parse_cpu_list(&raw).ok_or_else(|| PwrError::Parse {
                path: siblings_path,
                value: raw,
            })?;
            siblings.retain(|&s| s != core_id);
            sibling_map.push((core_id, siblings));

            let package_id = match physical_ids.iter().position(|&p| p == physical_id) {
                Some(idx) => idx,
                None => {
                    physical_ids.push(physical_id);
                    self.packages.push(Package::new(
                        self.packages.len(),
                        physical_id,
                        self.paths.clone(),
                        Arc::clone(&msr),
                    ));
                    self.packages.len() - 1
                }
            };

            self.packages[package_id].cores.push(Core::new(
                core_id,
                package_id,
                self.paths.clone(),
                Arc::clone(&msr),
            ));
        }

        tracing::info!("Grouped cores into {} packages", self.packages.len());

        // Siblings resolve by id once the full core list exists
        for (core_id, siblings) in sibling_map {
            if let Some(core) = self.core_mut(core_id) {
                core.thread_siblings = siblings;
            }
        }

        for package in &mut self.packages {
            package.read_capabilities()?;

            let base_freq = package.base_freq;
            let all_core_turbo_freq = package.all_core_turbo_freq;
            let highest_freq = package.highest_freq;
            let lowest_freq = package.lowest_freq;
            for core in &mut package.cores {
                core.base_freq = base_freq;
                core.all_core_turbo_freq = all_core_turbo_freq;
                core.highest_freq = highest_freq;
                core.lowest_freq = lowest_freq;
                core.read_capabilities();
            }
        }

        self.sst_bf_enabled = self.check_sst_bf_enabled();
        self.epp_enabled = self.check_epp_enabled();
        tracing::info!(
            "System flags: sst_bf_enabled={}, epp_enabled={}",
            self.sst_bf_enabled,
            self.epp_enabled
        );

        let (sst_bf_enabled, epp_enabled) = (self.sst_bf_enabled, self.epp_enabled);
        for core in self.cores_mut() {
            core.apply_system_flags(sst_bf_enabled, epp_enabled);
        }
        Ok(())
    }

    /// SST-BF is enabled when the per-core base frequencies split into
    /// exactly two tiers across the whole system.
    fn check_sst_bf_enabled(&self) -> bool {
        let tiers: BTreeSet<u32> = self
            .cores()
            .filter_map(|c| c.sst_bf_base_freq)
            .collect();
        tiers.len() == 2
    }

    /// EPP is enabled when CPUID reports hwp_epp and the preference
    /// sysfs entry exists. An unreadable cpuinfo means no EPP, not a
    /// discovery failure.
    fn check_epp_enabled(&self) -> bool {
        let Some(first_core) = self.cores().next().map(|c| c.core_id) else {
            return false;
        };
        let has_flag = cpuinfo::has_flag(&self.paths.cpuinfo, first_core, "hwp_epp")
            .unwrap_or(false);
        has_flag
            && self
                .paths
                .cpufreq_file(first_core, "energy_performance_preference")
                .is_file()
    }

    /// All cores across all packages, in discovery order.
    pub fn cores(&self) -> impl Iterator<Item = &Core> {
        self.packages.iter().flat_map(|p| p.cores.iter())
    }

    pub fn cores_mut(&mut self) -> impl Iterator<Item = &mut Core> {
        self.packages.iter_mut().flat_map(|p| p.cores.iter_mut())
    }

    pub fn core(&self, core_id: u32) -> Option<&Core> {
        self.cores().find(|c| c.core_id == core_id)
    }

    pub fn core_mut(&mut self, core_id: u32) -> Option<&mut Core> {
        self.cores_mut().find(|c| c.core_id == core_id)
    }

    /// Sibling cores of `core_id`, resolved through the id list.
    pub fn thread_siblings(&self, core_id: u32) -> Vec<&Core> {
        let Some(core) = self.core(core_id) else {
            return Vec::new();
        };
        core.thread_siblings
            .iter()
            .filter_map(|&id| self.core(id))
            .collect()
    }

    /// Commit every core, then every package.
    pub fn commit_all(&mut self, profile: Option<Profile>) -> Result<()> {
        for package in &mut self.packages {
            for core in &mut package.cores {
                core.commit(profile)?;
            }
            package.commit()?;
        }
        Ok(())
    }

    /// Refresh live state on every package and core, then the
    /// system-wide configured flag.
    pub fn refresh_all(&mut self) -> Result<()> {
        for package in &mut self.packages {
            for core in &mut package.cores {
                core.refresh()?;
            }
            package.refresh()?;
        }
        self.sst_bf_configured = self
            .packages
            .iter()
            .all(|p| p.sst_bf_configured);
        Ok(())
    }

    /// Dry-run stability check of the requested frequencies; see
    /// [`sstbf::request_config`]. Empty slice means all packages.
    pub fn request_config(&self, package_ids: &[usize]) -> Result<bool> {
        sstbf::request_config(self, package_ids)
    }
}

/// The msr kernel module must be loaded and accessible before any
/// capability read. Permission problems get a distinct message from a
/// missing driver.
fn check_msr_driver(paths: &SysPaths) -> Result<()> {
    let device = paths.msr_device(0);
    match File::open(&device) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => Err(PwrError::MsrPermissionDenied(
            device.display().to_string(),
        )),
        Err(_) => Err(PwrError::MsrDriverNotLoaded(device.display().to_string())),
    }
}

fn check_scaling_driver(paths: &SysPaths) -> Result<()> {
    let driver = paths.scaling_driver_file();
    if driver.is_file() {
        Ok(())
    } else {
        Err(PwrError::ScalingDriverMissing(
            driver.display().to_string(),
        ))
    }
}

/// Logical core ids from `cpu<N>` directory entries, sorted.
fn enumerate_cores(paths: &SysPaths) -> Result<Vec<u32>> {
    let mut ids = Vec::new();
    let entries = std::fs::read_dir(&paths.cpu_root).map_err(|e| PwrError::SysfsRead {
        path: paths.cpu_root.clone(),
        source: e,
    })?;
    for entry in entries {
        let entry = entry.map_err(|e| PwrError::SysfsRead {
            path: paths.cpu_root.clone(),
            source: e,
        })?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let Some(id) = name.strip_prefix("cpu").and_then(|n| n.parse::<u32>().ok()) {
            ids.push(id);
        }
    }
    ids.sort_unstable();
    Ok(ids)
}
