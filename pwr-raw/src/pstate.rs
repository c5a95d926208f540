//! P-state and turbo register definitions
//!
//! Frequencies in these registers are expressed as ratios of the
//! 100 MHz bus clock: a ratio byte of 0x18 means 2400 MHz.
//!
//! ## References
//!
//! - Intel® 64 and IA-32 Architectures Software Developer's Manual, Volume 4

use crate::register::RegisterLayout;

/// Bus clock granularity of every ratio field, in MHz
pub const RATIO_STEP_MHZ: u32 = 100;

/// MSR addresses for P-state control and status
pub mod msr {
    /// Platform Info - maximum non-turbo (base) ratio
    pub const MSR_PLATFORM_INFO: u64 = 0xCE;

    /// Turbo Ratio Limit - per-core-count turbo ratios
    pub const MSR_TURBO_RATIO_LIMIT: u64 = 0x1AD;

    /// Perf Status - currently resolved core ratio
    pub const MSR_IA32_PERF_STATUS: u64 = 0x198;

    /// Misc Enables - assorted feature toggles, including turbo disable
    pub const MSR_IA32_MISC_ENABLES: u64 = 0x1A0;

    /// PM Enable - HWP (Hardware-Controlled Performance) enable flag
    pub const MSR_IA32_PM_ENABLE: u64 = 0x770;
}

/// PLATFORM_INFO register layout
///
/// | Bits   | Field            | Description                     |
/// |--------|------------------|---------------------------------|
/// | 8-15   | base_ratio       | Maximum non-turbo ratio         |
#[derive(Debug, Clone, Copy, Default)]
pub struct PlatformInfo {
    /// Maximum non-turbo ratio (byte 1)
    pub base_ratio: u8,
}

impl RegisterLayout for PlatformInfo {
    fn to_msr_value(&self) -> u64 {
        (self.base_ratio as u64) << 8
    }

    fn from_msr_value(value: u64) -> Self {
        Self {
            base_ratio: ((value >> 8) & 0xFF) as u8,
        }
    }
}

impl PlatformInfo {
    /// Out-of-the-box guaranteed frequency in MHz
    pub fn base_freq_mhz(&self) -> u32 {
        self.base_ratio as u32 * RATIO_STEP_MHZ
    }
}

/// TURBO_RATIO_LIMIT register layout
///
/// One ratio byte per active-core group. Byte 0 is the single-core
/// limit; byte 7 is the limit with all core groups active, i.e. the
/// all-core turbo frequency.
#[derive(Debug, Clone, Copy, Default)]
pub struct TurboRatioLimit {
    /// Ratio limits indexed by active-core group (byte 0 = 1 core)
    pub ratios: [u8; 8],
}

impl RegisterLayout for TurboRatioLimit {
    fn to_msr_value(&self) -> u64 {
        u64::from_le_bytes(self.ratios)
    }

    fn from_msr_value(value: u64) -> Self {
        Self {
            ratios: value.to_le_bytes(),
        }
    }
}

impl TurboRatioLimit {
    /// Frequency every core can sustain in turbo simultaneously, in MHz
    pub fn all_core_turbo_mhz(&self) -> u32 {
        self.ratios[7] as u32 * RATIO_STEP_MHZ
    }
}

/// IA32_PERF_STATUS register layout
///
/// | Bits   | Field            | Description                     |
/// |--------|------------------|---------------------------------|
/// | 8-15   | current_ratio    | Currently resolved core ratio   |
#[derive(Debug, Clone, Copy, Default)]
pub struct PerfStatus {
    /// Currently resolved ratio (byte 1)
    pub current_ratio: u8,
}

impl RegisterLayout for PerfStatus {
    fn to_msr_value(&self) -> u64 {
        (self.current_ratio as u64) << 8
    }

    fn from_msr_value(value: u64) -> Self {
        Self {
            current_ratio: ((value >> 8) & 0xFF) as u8,
        }
    }
}

impl PerfStatus {
    /// Current core frequency in MHz
    pub fn current_freq_mhz(&self) -> u32 {
        self.current_ratio as u32 * RATIO_STEP_MHZ
    }
}

/// IA32_MISC_ENABLES register layout
///
/// Only the turbo-disable bit is modelled; the register packs many
/// unrelated toggles, so it must never be written from this layout.
///
/// | Bits   | Field            | Description                     |
/// |--------|------------------|---------------------------------|
/// | 38     | turbo_disabled   | Set when turbo mode is disabled |
#[derive(Debug, Clone, Copy, Default)]
pub struct MiscEnables {
    /// IDA/turbo disable flag (byte 4, bit 6)
    pub turbo_disabled: bool,
}

impl RegisterLayout for MiscEnables {
    fn to_msr_value(&self) -> u64 {
        if self.turbo_disabled {
            1 << 38
        } else {
            0
        }
    }

    fn from_msr_value(value: u64) -> Self {
        Self {
            turbo_disabled: (value & (1 << 38)) != 0,
        }
    }
}

impl MiscEnables {
    /// True when turbo mode is available
    pub fn turbo_enabled(&self) -> bool {
        !self.turbo_disabled
    }
}

/// IA32_PM_ENABLE register layout
///
/// | Bits   | Field            | Description                     |
/// |--------|------------------|---------------------------------|
/// | 0      | hwp_enabled      | HWP mode enabled                |
#[derive(Debug, Clone, Copy, Default)]
pub struct PmEnable {
    /// Hardware-controlled performance states enabled
    pub hwp_enabled: bool,
}

impl RegisterLayout for PmEnable {
    fn to_msr_value(&self) -> u64 {
        u64::from(self.hwp_enabled)
    }

    fn from_msr_value(value: u64) -> Self {
        Self {
            hwp_enabled: (value & 1) != 0,
        }
    }
}
