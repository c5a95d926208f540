use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use pwr_raw::pstate::{self, MiscEnables, PlatformInfo, PmEnable, TurboRatioLimit};
use pwr_raw::rapl::{self, PkgEnergyStatus, PkgPowerInfo, RaplPowerUnit};
use pwr_raw::uncore::{self, UncorePerfStatus, UncoreRatioLimit};
use pwr_raw::RegisterLayout;

use crate::common::msr::MsrIo;
use crate::common::sysfs;
use crate::config::SysPaths;
use crate::error::{PwrError, Result};
use crate::model::Core;
use crate::power::PowerMeter;
use crate::sstbf;

/// Where package energy and TDP come from: the RAPL powercap sysfs
/// tree when the kernel exposes one for this package, raw RAPL MSRs
/// otherwise.
enum EnergySource {
    Sysfs { energy_file: PathBuf },
    Msr { energy_unit: f64 },
}

/// One physical socket: its cores, package-wide capabilities, desired
/// uncore state and power telemetry.
pub struct Package {
    pub package_id: usize,
    pub physical_id: i32,
    pub cores: Vec<Core>,

    // capabilities, set once at discovery
    pub turbo_enabled: bool,
    pub hwp_enabled: bool,
    pub base_freq: u32,
    pub all_core_turbo_freq: u32,
    pub highest_freq: u32,
    pub lowest_freq: u32,
    pub tdp: f64,
    pub freq_budget: u32,

    // desired uncore state
    pub uncore_min_freq: u32,
    pub uncore_max_freq: u32,

    // observed state
    pub sst_bf_configured: bool,
    pub uncore_freq: u32,
    pub power_consumption: f64,

    energy_source: EnergySource,
    meter: PowerMeter,
    paths: SysPaths,
    msr: Arc<dyn MsrIo>,
}

impl Package {
    pub(crate) fn new(
        package_id: usize,
        physical_id: i32,
        paths: SysPaths,
        msr: Arc<dyn MsrIo>,
    ) -> Self {
        Self {
            package_id,
            physical_id,
            cores: Vec::new(),
            turbo_enabled: false,
            hwp_enabled: false,
            base_freq: 0,
            all_core_turbo_freq: 0,
            highest_freq: 0,
            lowest_freq: 0,
            tdp: 0.0,
            freq_budget: 0,
            uncore_min_freq: 0,
            uncore_max_freq: 0,
            sst_bf_configured: false,
            uncore_freq: 0,
            power_consumption: 0.0,
            energy_source: EnergySource::Msr { energy_unit: 0.0 },
            meter: PowerMeter::new(0.0),
            paths,
            msr,
        }
    }

    /// Id of the core all package-scoped MSR traffic goes through.
    /// `cores` is public, so a package may legitimately be observed
    /// empty.
    pub fn first_core(&self) -> Result<u32> {
        self.cores
            .first()
            .map(|c| c.core_id)
            .ok_or_else(|| PwrError::InvalidValue(format!("package {} has no cores", self.package_id)))
    }

    /// One-time capability reads. Called once per package by
    /// discovery; cores must already be attached.
    pub(crate) fn read_capabilities(&mut self) -> Result<()> {
        let core = self.first_core()?;

        self.lowest_freq =
            sysfs::read_freq_mhz(&self.paths.cpufreq_file(core, "cpuinfo_min_freq"))?;
        self.highest_freq =
            sysfs::read_freq_mhz(&self.paths.cpufreq_file(core, "cpuinfo_max_freq"))?;

        let word = self.msr.read(core, pstate::msr::MSR_PLATFORM_INFO)?;
        self.base_freq = PlatformInfo::from_msr_value(word).base_freq_mhz();

        let word = self.msr.read(core, pstate::msr::MSR_IA32_PM_ENABLE)?;
        self.hwp_enabled = PmEnable::from_msr_value(word).hwp_enabled;

        let word = self.msr.read(core, pstate::msr::MSR_IA32_MISC_ENABLES)?;
        self.turbo_enabled = MiscEnables::from_msr_value(word).turbo_enabled();

        let word = self.msr.read(core, pstate::msr::MSR_TURBO_RATIO_LIMIT)?;
        self.all_core_turbo_freq = TurboRatioLimit::from_msr_value(word).all_core_turbo_mhz();

        // Stable-performance budget: every core running its base
        // frequency at once.
        self.freq_budget = self.base_freq * self.cores.len() as u32;

        let rapl_dir = self.paths.rapl_dir(self.package_id);
        let wrap_joules;
        if rapl_dir.is_dir() {
            // uW -> W, uJ -> J
            let tdp_uw: f64 = sysfs::read_parse(&rapl_dir.join("constraint_0_power_limit_uw"))?;
            self.tdp = tdp_uw / 1_000_000.0;
            let max_uj: f64 = sysfs::read_parse(&rapl_dir.join("max_energy_range_uj"))?;
            wrap_joules = max_uj / 1_000_000.0;
            self.energy_source = EnergySource::Sysfs {
                energy_file: rapl_dir.join("energy_uj"),
            };
            tracing::debug!("package {}: RAPL via powercap sysfs", self.package_id);
        } else {
            let word = self.msr.read(core, rapl::msr::MSR_RAPL_POWER_UNIT)?;
            let units = RaplPowerUnit::from_msr_value(word);
            let power_unit = units.power_unit_multiplier();
            let energy_unit = units.energy_unit_multiplier();

            let word = self.msr.read(core, rapl::msr::MSR_PKG_POWER_INFO)?;
            self.tdp = PkgPowerInfo::from_msr_value(word).tdp_watts(power_unit);

            // the energy counter is a 32-bit register, so it wraps at
            // 2^32 energy units
            wrap_joules = PkgEnergyStatus::WRAP_COUNT as f64 * energy_unit;
            self.energy_source = EnergySource::Msr { energy_unit };
            tracing::debug!("package {}: RAPL via MSR", self.package_id);
        }
        self.meter = PowerMeter::new(wrap_joules);

        Ok(())
    }

    /// Cumulative package energy in joules.
    fn read_energy(&self) -> Result<f64> {
        match &self.energy_source {
            EnergySource::Sysfs { energy_file } => {
                let uj: f64 = sysfs::read_parse(energy_file)?;
                Ok(uj / 1_000_000.0)
            }
            EnergySource::Msr { energy_unit } => {
                let word = self
                    .msr
                    .read(self.first_core()?, rapl::msr::MSR_PKG_ENERGY_STATUS)?;
                Ok(PkgEnergyStatus::from_msr_value(word).joules(*energy_unit))
            }
        }
    }

    /// Sample the energy counter and update the average power figure.
    pub fn refresh_power(&mut self) -> Result<f64> {
        let energy = self.read_energy()?;
        self.power_consumption = self.meter.update(Instant::now(), energy, self.tdp);
        Ok(self.power_consumption)
    }

    /// Refresh package-wide observed state.
    pub fn refresh(&mut self) -> Result<()> {
        let core = self.first_core()?;

        let word = self.msr.read(core, uncore::msr::MSR_UNCORE_PERF_STATUS)?;
        self.uncore_freq = UncorePerfStatus::from_msr_value(word).current_freq_mhz();

        let word = self.msr.read(core, uncore::msr::MSR_UNCORE_RATIO_LIMIT)?;
        let limit = UncoreRatioLimit::from_msr_value(word);
        self.uncore_min_freq = limit.min_freq_mhz();
        self.uncore_max_freq = limit.max_freq_mhz();

        let enabled = self.cores.first().map_or(false, |c| c.sst_bf_enabled);
        self.sst_bf_configured = sstbf::is_configured(self, enabled);

        self.refresh_power()?;
        Ok(())
    }

    /// Validate and write the desired uncore limits.
    ///
    /// The ratio-limit register packs other package settings in its
    /// upper bytes, so the update is a read-modify-write that only
    /// touches the min/max ratio bytes. There is no lock between the
    /// read and the write; exclusive single-writer ownership of the
    /// hardware is assumed.
    pub fn commit(&mut self) -> Result<()> {
        let limit = UncoreRatioLimit::from_freq_mhz(self.uncore_min_freq, self.uncore_max_freq);
        limit.validate().map_err(|msg| {
            PwrError::InvalidValue(format!(
                "package {}: {msg} ({} / {} MHz)",
                self.package_id, self.uncore_min_freq, self.uncore_max_freq
            ))
        })?;

        let core = self.first_core()?;
        let current = self.msr.read(core, uncore::msr::MSR_UNCORE_RATIO_LIMIT)?;
        self.msr
            .write(core, uncore::msr::MSR_UNCORE_RATIO_LIMIT, limit.merge_into(current))
    }
}
