use std::str::FromStr;
use std::sync::Arc;

use pwr_raw::pstate::{self, PerfStatus};
use pwr_raw::RegisterLayout;

use crate::common::msr::MsrIo;
use crate::common::sysfs;
use crate::config::SysPaths;
use crate::error::{PwrError, Result};

/// Frequency grid granularity in MHz
pub const FREQ_STEP_MHZ: u32 = 100;

/// Named (min, max) frequency presets resolved against a core's
/// capability fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Pin to the lowest active frequency
    Minimum,
    /// Pin to the single-core turbo frequency
    Maximum,
    /// Pin to the out-of-the-box base frequency
    Base,
    /// Full range: lowest to highest
    Default,
    /// Lowest up to base, never entering turbo
    NoTurbo,
    /// Pin to the core's SST-BF tier base frequency
    SstBf,
}

impl Profile {
    pub fn name(&self) -> &'static str {
        match self {
            Profile::Minimum => "minimum",
            Profile::Maximum => "maximum",
            Profile::Base => "base",
            Profile::Default => "default",
            Profile::NoTurbo => "no_turbo",
            Profile::SstBf => "sst_bf",
        }
    }

    pub fn all() -> Vec<Profile> {
        vec![
            Profile::Minimum,
            Profile::Maximum,
            Profile::Base,
            Profile::Default,
            Profile::NoTurbo,
            Profile::SstBf,
        ]
    }

    /// Resolve to a concrete (min, max) pair for the given core.
    pub fn freq_range(&self, core: &Core) -> Result<(u32, u32)> {
        match self {
            Profile::Minimum => Ok((core.lowest_freq, core.lowest_freq)),
            Profile::Maximum => Ok((core.highest_freq, core.highest_freq)),
            Profile::Base => Ok((core.base_freq, core.base_freq)),
            Profile::Default => Ok((core.lowest_freq, core.highest_freq)),
            Profile::NoTurbo => Ok((core.lowest_freq, core.base_freq)),
            Profile::SstBf => {
                if !core.sst_bf_enabled {
                    return Err(PwrError::InvalidValue(
                        "cannot apply sst_bf profile, SST-BF is not enabled".into(),
                    ));
                }
                let base = core.sst_bf_base_freq.ok_or_else(|| {
                    PwrError::InvalidValue(format!(
                        "core {} has no SST-BF base frequency",
                        core.core_id
                    ))
                })?;
                Ok((base, base))
            }
        }
    }
}

impl FromStr for Profile {
    type Err = PwrError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "minimum" => Ok(Profile::Minimum),
            "maximum" => Ok(Profile::Maximum),
            "base" => Ok(Profile::Base),
            "default" => Ok(Profile::Default),
            "no_turbo" => Ok(Profile::NoTurbo),
            "sst_bf" => Ok(Profile::SstBf),
            other => Err(PwrError::InvalidValue(format!(
                "unknown profile '{other}', available profiles are \
                 minimum, maximum, base, default, no_turbo, sst_bf"
            ))),
        }
    }
}

/// One logical core: discovered capabilities, desired state and
/// last-observed live state.
///
/// Relations are held by id, not reference: `package_id` indexes
/// `System::packages`, `thread_siblings` lists sibling core ids
/// (never including this core).
pub struct Core {
    pub core_id: u32,
    pub online: bool,
    pub package_id: usize,
    pub thread_siblings: Vec<u32>,

    // capabilities, set once at discovery
    pub high_priority: bool,
    pub base_freq: u32,
    pub sst_bf_base_freq: Option<u32>,
    pub all_core_turbo_freq: u32,
    pub highest_freq: u32,
    pub lowest_freq: u32,

    // desired state, mutated by callers between commits
    pub min_freq: u32,
    pub max_freq: u32,
    pub epp: Option<String>,

    // observed state
    pub curr_freq: u32,

    epp_available: Vec<String>,
    pub(crate) epp_enabled: bool,
    pub(crate) sst_bf_enabled: bool,
    paths: SysPaths,
    msr: Arc<dyn MsrIo>,
    writer: Arc<dyn sysfs::SysWrite>,
}

impl Core {
    pub(crate) fn new(
        core_id: u32,
        package_id: usize,
        paths: SysPaths,
        msr: Arc<dyn MsrIo>,
    ) -> Self {
        // EPP may not be available; a missing preference list simply
        // means no preference can ever validate.
        let epp_available =
            match sysfs::read_line(&paths.cpufreq_file(core_id, "energy_performance_available_preferences")) {
                Ok(line) => line.split_whitespace().map(str::to_string).collect(),
                Err(_) => Vec::new(),
            };

        Self {
            core_id,
            online: false,
            package_id,
            thread_siblings: Vec::new(),
            high_priority: false,
            base_freq: 0,
            sst_bf_base_freq: None,
            all_core_turbo_freq: 0,
            highest_freq: 0,
            lowest_freq: 0,
            min_freq: 0,
            max_freq: 0,
            epp: None,
            curr_freq: 0,
            epp_available,
            epp_enabled: false,
            sst_bf_enabled: false,
            paths,
            msr,
            writer: Arc::new(sysfs::DirectWrite),
        }
    }

    #[cfg(test)]
    pub(crate) fn set_writer(&mut self, writer: Arc<dyn sysfs::SysWrite>) {
        self.writer = writer;
    }

    /// EPP strings the driver will accept for this core.
    pub fn epp_available(&self) -> &[String] {
        &self.epp_available
    }

    /// Read the per-core capability that is not inherited from the
    /// package: the SST-BF tier base frequency, when exposed.
    pub(crate) fn read_capabilities(&mut self) {
        let path = self.paths.cpufreq_file(self.core_id, "base_frequency");
        self.sst_bf_base_freq = sysfs::read_freq_mhz(&path).ok();
    }

    /// Finalize discovery once the system-wide flags are known.
    pub(crate) fn apply_system_flags(&mut self, sst_bf_enabled: bool, epp_enabled: bool) {
        self.sst_bf_enabled = sst_bf_enabled;
        self.epp_enabled = epp_enabled;
        self.high_priority = sst_bf_enabled
            && self
                .sst_bf_base_freq
                .map_or(false, |f| f > self.base_freq);
    }

    /// True when `freq` lies on the 100 MHz grid anchored at
    /// `lowest_freq` inside [lowest_freq, highest_freq].
    pub fn freq_in_range(&self, freq: u32) -> bool {
        freq >= self.lowest_freq
            && freq <= self.highest_freq
            && (freq - self.lowest_freq) % FREQ_STEP_MHZ == 0
    }

    fn require_in_range(&self, what: &str, freq: u32) -> Result<()> {
        if self.freq_in_range(freq) {
            Ok(())
        } else {
            Err(PwrError::InvalidValue(format!(
                "core {}: {what} {freq} MHz outside valid range [{}, {}] on {} MHz steps",
                self.core_id, self.lowest_freq, self.highest_freq, FREQ_STEP_MHZ
            )))
        }
    }

    /// Refresh regularly changing or user defined state from hardware.
    pub fn refresh(&mut self) -> Result<()> {
        let min = sysfs::read_freq_mhz(&self.paths.cpufreq_file(self.core_id, "scaling_min_freq"))?;
        self.require_in_range("scaling_min_freq", min)?;

        let max = sysfs::read_freq_mhz(&self.paths.cpufreq_file(self.core_id, "scaling_max_freq"))?;
        self.require_in_range("scaling_max_freq", max)?;

        let epp = if self.epp_enabled {
            let value = sysfs::read_line(&self.paths.cpufreq_file(self.core_id, "energy_performance_preference"))?;
            if !self.epp_available.contains(&value) {
                return Err(PwrError::InvalidValue(format!(
                    "core {}: unexpected EPP '{value}' in sysfs entry",
                    self.core_id
                )));
            }
            Some(value)
        } else {
            None
        };

        let word = self
            .msr
            .read(self.core_id, pstate::msr::MSR_IA32_PERF_STATUS)?;

        self.min_freq = min;
        self.max_freq = max;
        self.epp = epp;
        self.curr_freq = PerfStatus::from_msr_value(word).current_freq_mhz();
        self.online = self.check_online()?;
        Ok(())
    }

    fn check_online(&self) -> Result<bool> {
        // cpu0 has no online file; absence means the core cannot be
        // taken offline
        match sysfs::read_parse::<u32>(&self.paths.online_file(self.core_id)) {
            Ok(v) => Ok(v == 1),
            Err(PwrError::SysfsRead { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    /// Validate desired state and push it to hardware.
    ///
    /// With a profile, the desired (min, max) pair is replaced by the
    /// profile's mapping first. Validation failures abort before any
    /// write. Writes go min-then-max; a min write rejected with EINVAL
    /// (its value momentarily above the stored max) is retried once in
    /// max-then-min order, which is the only rejection the driver's
    /// ordering constraint can produce.
    pub fn commit(&mut self, profile: Option<Profile>) -> Result<()> {
        if let Some(profile) = profile {
            let (min, max) = profile.freq_range(self)?;
            self.min_freq = min;
            self.max_freq = max;
        }

        if self.min_freq > self.max_freq {
            return Err(PwrError::InvalidValue(format!(
                "core {}: desired min freq ({}) is greater than desired max freq ({})",
                self.core_id, self.min_freq, self.max_freq
            )));
        }
        self.require_in_range("min freq", self.min_freq)?;
        self.require_in_range("max freq", self.max_freq)?;

        self.write_min_max()?;
        self.write_epp()
    }

    fn write_min_max(&self) -> Result<()> {
        let min_path = self.paths.cpufreq_file(self.core_id, "scaling_min_freq");
        let max_path = self.paths.cpufreq_file(self.core_id, "scaling_max_freq");
        let min_khz = (self.min_freq * 1000).to_string();
        let max_khz = (self.max_freq * 1000).to_string();

        let attempt = self
            .writer
            .write_str(&min_path, &min_khz)
            .and_then(|()| self.writer.write_str(&max_path, &max_khz));

        match attempt {
            Ok(()) => Ok(()),
            Err(err) if err.is_einval_write() => {
                tracing::debug!(
                    "core {}: min/max write rejected, retrying max-first",
                    self.core_id
                );
                self.writer.write_str(&max_path, &max_khz)?;
                self.writer.write_str(&min_path, &min_khz)
            }
            Err(err) => Err(err),
        }
    }

    fn write_epp(&mut self) -> Result<()> {
        let Some(requested) = self.epp.clone() else {
            // nothing requested; unsupported platforms stay a no-op
            return Ok(());
        };

        if !self.epp_enabled {
            return Err(PwrError::InvalidValue(format!(
                "cannot set epp to '{requested}', EPP is not enabled"
            )));
        }

        if !self.epp_available.contains(&requested) {
            return Err(PwrError::InvalidValue(format!(
                "cannot set epp to '{requested}', available options are {:?}",
                self.epp_available
            )));
        }

        let path = self.paths.cpufreq_file(self.core_id, "energy_performance_preference");
        self.writer.write_str(&path, &requested)?;

        // The driver substitutes a concrete value for "default", so
        // read back what it actually chose.
        if requested == "default" {
            self.epp = Some(sysfs::read_line(&path)?);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_parsing() {
        assert_eq!("no_turbo".parse::<Profile>().unwrap(), Profile::NoTurbo);
        assert_eq!("sst_bf".parse::<Profile>().unwrap(), Profile::SstBf);
        assert!(matches!(
            "Turbo".parse::<Profile>(),
            Err(PwrError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_profile_names_round_trip() {
        for profile in Profile::all() {
            assert_eq!(profile.name().parse::<Profile>().unwrap(), profile);
        }
    }
}
