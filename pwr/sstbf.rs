//! SST-BF (Speed Select Technology - Base Frequency) detection rules.
//!
//! With SST-BF enabled in firmware, cores split into two base-frequency
//! tiers; a package is "configured" when every core is pinned to its
//! own tier base. These are pure predicates over the entity model;
//! nothing here touches hardware.

use crate::error::{PwrError, Result};
use crate::model::{Core, Package, System};

/// True iff SST-BF is enabled and every core of the package has both
/// desired frequencies pinned to its own SST-BF base frequency.
pub fn is_configured(package: &Package, sst_bf_enabled: bool) -> bool {
    if !sst_bf_enabled {
        return false;
    }
    package.cores.iter().all(core_pinned_to_tier_base)
}

fn core_pinned_to_tier_base(core: &Core) -> bool {
    match core.sst_bf_base_freq {
        Some(base) => core.min_freq == base && core.max_freq == base,
        None => false,
    }
}

/// Dry-run check of the currently requested per-core frequencies.
///
/// An empty `package_ids` slice means all packages. With SST-BF
/// enabled, the request passes outright when every selected core is
/// pinned to its tier base; otherwise the request has to fit the
/// per-package budget: the minimum frequencies must sum to no more
/// than `freq_budget`, and no single minimum may exceed the all-core
/// turbo frequency. Never mutates state.
pub fn request_config(system: &System, package_ids: &[usize]) -> Result<bool> {
    let selected: Vec<&Package> = if package_ids.is_empty() {
        system.packages.iter().collect()
    } else {
        package_ids
            .iter()
            .map(|&id| {
                system.packages.get(id).ok_or_else(|| {
                    PwrError::InvalidValue(format!("no such package: {id}"))
                })
            })
            .collect::<Result<_>>()?
    };

    if system.sst_bf_enabled {
        for package in &selected {
            for core in &package.cores {
                check_valid_core_freq(core)?;
            }
        }
        if selected
            .iter()
            .all(|p| p.cores.iter().all(core_pinned_to_tier_base))
        {
            return Ok(true);
        }
    }

    for package in &selected {
        let mins: Vec<u32> = package.cores.iter().map(|c| c.min_freq).collect();
        let requested_budget: u32 = mins.iter().sum();
        let over_turbo = mins
            .iter()
            .any(|&f| f > package.all_core_turbo_freq);
        if over_turbo || requested_budget > package.freq_budget {
            return Ok(false);
        }
    }
    Ok(true)
}

fn check_valid_core_freq(core: &Core) -> Result<()> {
    if core.min_freq > core.max_freq {
        return Err(PwrError::InvalidValue(format!(
            "invalid config, core {}: desired min freq ({}) is greater than desired max freq ({})",
            core.core_id, core.min_freq, core.max_freq
        )));
    }
    if !core.freq_in_range(core.min_freq) || !core.freq_in_range(core.max_freq) {
        return Err(PwrError::InvalidValue(format!(
            "invalid config, core {}: desired frequency must be in range {} to {}",
            core.core_id, core.lowest_freq, core.highest_freq
        )));
    }
    Ok(())
}
