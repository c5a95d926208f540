//! Uncore frequency register definitions
//!
//! The uncore (interconnect, LLC) frequency is controlled per package
//! through a ratio-limit MSR and observed through a status MSR.

use crate::pstate::RATIO_STEP_MHZ;
use crate::register::RegisterLayout;

/// MSR addresses for uncore frequency control
pub mod msr {
    /// Uncore Ratio Limit - desired min/max uncore ratios
    pub const MSR_UNCORE_RATIO_LIMIT: u64 = 0x620;

    /// Uncore Perf Status - current uncore ratio
    pub const MSR_UNCORE_PERF_STATUS: u64 = 0x621;
}

/// UNCORE_RATIO_LIMIT register layout
///
/// | Bits   | Field      | Description                  |
/// |--------|------------|------------------------------|
/// | 0-6    | max_ratio  | Maximum uncore ratio         |
/// | 8-14   | min_ratio  | Minimum uncore ratio         |
/// | 16-63  | reserved   | Must be preserved on write   |
///
/// Bytes 2-7 carry unrelated package settings on some parts, so the
/// register must be written through [`UncoreRatioLimit::merge_into`],
/// never from a freshly built word.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UncoreRatioLimit {
    /// Maximum uncore ratio (bits 0-6)
    pub max_ratio: u8,

    /// Minimum uncore ratio (bits 8-14)
    pub min_ratio: u8,
}

impl RegisterLayout for UncoreRatioLimit {
    fn to_msr_value(&self) -> u64 {
        (self.max_ratio as u64 & 0x7F) | ((self.min_ratio as u64 & 0x7F) << 8)
    }

    fn from_msr_value(value: u64) -> Self {
        Self {
            max_ratio: (value & 0x7F) as u8,
            min_ratio: ((value >> 8) & 0x7F) as u8,
        }
    }

    /// [`UncoreRatioLimit::from_freq_mhz`] does not mask, so a
    /// too-large frequency surfaces here instead of truncating on
    /// encode.
    fn validate(&self) -> Result<(), &'static str> {
        if self.max_ratio > 0x7F {
            return Err("max uncore ratio does not fit in 7 bits");
        }
        if self.min_ratio > 0x7F {
            return Err("min uncore ratio does not fit in 7 bits");
        }
        if self.min_ratio > self.max_ratio {
            return Err("min uncore ratio exceeds max uncore ratio");
        }
        Ok(())
    }
}

impl UncoreRatioLimit {
    /// Build a layout from min/max frequencies in MHz
    pub fn from_freq_mhz(min_mhz: u32, max_mhz: u32) -> Self {
        Self {
            max_ratio: (max_mhz / RATIO_STEP_MHZ) as u8,
            min_ratio: (min_mhz / RATIO_STEP_MHZ) as u8,
        }
    }

    /// Maximum uncore frequency in MHz
    pub fn max_freq_mhz(&self) -> u32 {
        self.max_ratio as u32 * RATIO_STEP_MHZ
    }

    /// Minimum uncore frequency in MHz
    pub fn min_freq_mhz(&self) -> u32 {
        self.min_ratio as u32 * RATIO_STEP_MHZ
    }

    /// Overlay the min/max ratio bytes onto a previously read register
    /// word, preserving bytes 2-7 verbatim.
    pub fn merge_into(&self, current: u64) -> u64 {
        (current & !0xFFFF) | (self.max_ratio as u64) | ((self.min_ratio as u64) << 8)
    }
}

/// UNCORE_PERF_STATUS register layout
///
/// | Bits   | Field          | Description            |
/// |--------|----------------|------------------------|
/// | 0-6    | current_ratio  | Current uncore ratio   |
#[derive(Debug, Clone, Copy, Default)]
pub struct UncorePerfStatus {
    /// Current uncore ratio (bits 0-6)
    pub current_ratio: u8,
}

impl RegisterLayout for UncorePerfStatus {
    fn to_msr_value(&self) -> u64 {
        self.current_ratio as u64 & 0x7F
    }

    fn from_msr_value(value: u64) -> Self {
        Self {
            current_ratio: (value & 0x7F) as u8,
        }
    }
}

impl UncorePerfStatus {
    /// Current uncore frequency in MHz
    pub fn current_freq_mhz(&self) -> u32 {
        self.current_ratio as u32 * RATIO_STEP_MHZ
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_limit_decode() {
        // max 0x18 (2400 MHz), min 0x0C (1200 MHz)
        let limit = UncoreRatioLimit::from_msr_value(0x0C18);
        assert_eq!(limit.max_freq_mhz(), 2400);
        assert_eq!(limit.min_freq_mhz(), 1200);
    }

    #[test]
    fn test_merge_preserves_upper_bytes() {
        let current = 0x1122_3344_5566_0C18u64;
        let limit = UncoreRatioLimit::from_freq_mhz(1400, 2000);

        let merged = limit.merge_into(current);
        assert_eq!(merged & 0xFFFF_FFFF_FFFF_0000, 0x1122_3344_5566_0000);
        assert_eq!(merged & 0xFF, 20); // 2000 MHz max ratio
        assert_eq!((merged >> 8) & 0xFF, 14); // 1400 MHz min ratio
    }

    #[test]
    fn test_validate_rejects_inverted_limits() {
        let limit = UncoreRatioLimit {
            max_ratio: 12,
            min_ratio: 24,
        };
        assert!(limit.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_oversized_ratio() {
        assert!(UncoreRatioLimit::from_freq_mhz(1200, 20000)
            .validate()
            .is_err());
    }

    #[test]
    fn test_perf_status_masks_high_bits() {
        let status = UncorePerfStatus::from_msr_value(0xFFFF_FF94);
        assert_eq!(status.current_ratio, 0x14);
        assert_eq!(status.current_freq_mhz(), 2000);
    }
}
