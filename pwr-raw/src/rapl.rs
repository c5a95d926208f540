//! RAPL (Running Average Power Limit) register definitions
//!
//! RAPL exposes package energy accounting through a free-running,
//! wrapping counter scaled by platform-reported units.
//!
//! ## References
//!
//! - Intel® 64 and IA-32 Architectures Software Developer's Manual, Volume 3B
//! - Section 14.9: Platform Specific Power Management Support

use crate::register::RegisterLayout;

/// MSR addresses for RAPL
pub mod msr {
    /// RAPL Power Unit MSR - defines energy and power units
    pub const MSR_RAPL_POWER_UNIT: u64 = 0x606;

    /// Package Power Info - package TDP and limits
    pub const MSR_PKG_POWER_INFO: u64 = 0x614;

    /// Package Energy Status - cumulative package energy consumption
    pub const MSR_PKG_ENERGY_STATUS: u64 = 0x611;
}

/// RAPL Power Unit register layout
///
/// | Bits   | Field        | Description                      |
/// |--------|--------------|----------------------------------|
/// | 0-3    | power_units  | Power units (1/2^n watts)        |
/// | 8-11   | energy_units | Energy units (1/2^n joules)      |
#[derive(Debug, Clone, Copy, Default)]
pub struct RaplPowerUnit {
    /// Power units: watts = value * (1.0 / 2^power_units)
    pub power_units: u8,

    /// Energy units: joules = value * (1.0 / 2^energy_units)
    pub energy_units: u8,
}

impl RegisterLayout for RaplPowerUnit {
    fn to_msr_value(&self) -> u64 {
        (self.power_units as u64 & 0x0F) | ((self.energy_units as u64 & 0x0F) << 8)
    }

    fn from_msr_value(value: u64) -> Self {
        Self {
            power_units: (value & 0x0F) as u8,
            energy_units: ((value >> 8) & 0x0F) as u8,
        }
    }
}

impl RaplPowerUnit {
    /// Get power unit multiplier (watts per LSB)
    pub fn power_unit_multiplier(&self) -> f64 {
        1.0 / (1u64 << self.power_units) as f64
    }

    /// Get energy unit multiplier (joules per LSB)
    pub fn energy_unit_multiplier(&self) -> f64 {
        1.0 / (1u64 << self.energy_units) as f64
    }
}

/// Package Power Info register layout
///
/// | Bits   | Field    | Description                             |
/// |--------|----------|-----------------------------------------|
/// | 0-14   | tdp_raw  | Thermal design power, in power units    |
#[derive(Debug, Clone, Copy, Default)]
pub struct PkgPowerInfo {
    /// Thermal design power in raw power units (bits 0-13 significant)
    pub tdp_raw: u16,
}

impl RegisterLayout for PkgPowerInfo {
    fn to_msr_value(&self) -> u64 {
        self.tdp_raw as u64 & 0x3FFF
    }

    fn from_msr_value(value: u64) -> Self {
        Self {
            tdp_raw: (value & 0x3FFF) as u16,
        }
    }
}

impl PkgPowerInfo {
    /// TDP in watts, given the platform power unit multiplier
    pub fn tdp_watts(&self, power_unit: f64) -> f64 {
        self.tdp_raw as f64 * power_unit
    }
}

/// Package Energy Status register layout
///
/// The counter is 32 bits wide, monotonically increasing and wraps at
/// 2^32 energy units. The upper dword of the register is reserved.
#[derive(Debug, Clone, Copy, Default)]
pub struct PkgEnergyStatus {
    /// Cumulative energy in raw energy units (low dword)
    pub energy_raw: u32,
}

impl RegisterLayout for PkgEnergyStatus {
    fn to_msr_value(&self) -> u64 {
        self.energy_raw as u64
    }

    fn from_msr_value(value: u64) -> Self {
        Self {
            energy_raw: (value & 0xFFFF_FFFF) as u32,
        }
    }
}

impl PkgEnergyStatus {
    /// Counter modulus in raw energy units
    pub const WRAP_COUNT: u64 = 1 << 32;

    /// Cumulative energy in joules, given the energy unit multiplier
    pub fn joules(&self, energy_unit: f64) -> f64 {
        self.energy_raw as f64 * energy_unit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_unit_round_trip() {
        let unit = RaplPowerUnit {
            power_units: 3,
            energy_units: 14,
        };

        let decoded = RaplPowerUnit::from_msr_value(unit.to_msr_value());
        assert_eq!(decoded.power_units, 3);
        assert_eq!(decoded.energy_units, 14);
    }

    #[test]
    fn test_power_unit_multipliers() {
        let unit = RaplPowerUnit {
            power_units: 3,
            energy_units: 14,
        };

        assert_eq!(unit.power_unit_multiplier(), 1.0 / 8.0);
        assert_eq!(unit.energy_unit_multiplier(), 1.0 / 16384.0);
    }

    #[test]
    fn test_pkg_power_info_tdp() {
        // 0x460 raw at 1/8 W per unit = 140 W
        let info = PkgPowerInfo::from_msr_value(0x460);
        assert_eq!(info.tdp_raw, 0x460);
        assert_eq!(info.tdp_watts(1.0 / 8.0), 140.0);
    }

    #[test]
    fn test_pkg_power_info_masks_high_bits() {
        let info = PkgPowerInfo::from_msr_value(0xFFFF_FFFF_FFFF_FFFF);
        assert_eq!(info.tdp_raw, 0x3FFF);
    }

    #[test]
    fn test_energy_status_ignores_upper_dword() {
        let status = PkgEnergyStatus::from_msr_value(0xDEAD_BEEF_0000_0100);
        assert_eq!(status.energy_raw, 0x100);
        assert_eq!(status.joules(1.0 / 16384.0), 256.0 / 16384.0);
    }
}
