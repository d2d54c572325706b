//! The logarithmic bin engine.
//!
//! Log-m/z peaks are rasterized into a dense bitset. For every charge `c`
//! the theoretical log-mass is `log_mz + ln(c)`, a constant offset, so each
//! charge contributes a shifted copy of the m/z bitset to the log-mass bin
//! space. Mass bins are qualified by the number of continuous charge pairs
//! hitting them, harmonic (fractional-charge) artifacts disqualify a bin
//! permanently, and for every m/z bin only the best-supported mass bin
//! survives.

use fixedbitset::FixedBitSet;

use crate::deconv::config::DeconvConfig;

/// Center value of a bin
pub fn bin_value(bin: usize, min_value: f64, bin_width: f64) -> f64 {
    min_value + bin as f64 / bin_width
}

/// Bin number of a value (0 for values below the minimum)
pub fn bin_number(value: f64, min_value: f64, bin_width: f64) -> usize {
    if value < min_value {
        return 0;
    }
    ((value - min_value) * bin_width + 0.5) as usize
}

/// First set bit at or after `from`
pub fn next_set_bit(bits: &FixedBitSet, from: usize) -> Option<usize> {
    if from >= bits.len() {
        return None;
    }
    let blocks = bits.as_slice();
    let mut block_index = from / 32;
    let mut block = blocks[block_index] & (u32::MAX << (from % 32));
    loop {
        if block != 0 {
            let index = block_index * 32 + block.trailing_zeros() as usize;
            return (index < bits.len()).then_some(index);
        }
        block_index += 1;
        if block_index >= blocks.len() {
            return None;
        }
        block = blocks[block_index];
    }
}

/// Per-charge log filters and harmonic artifact offsets
#[derive(Debug, Clone)]
pub struct ChargeFilters {
    /// `filter[j] = ln(1 / (min_charge + j))`, descending and negative
    pub filter: Vec<f64>,
    /// m/z bin offsets of the half-charge artifacts, per charge and
    /// harmonic denominator
    pub harmonic_offsets: Vec<Vec<i64>>,
}

impl ChargeFilters {
    /// Precompute filters for the configured charge range
    pub fn new(config: &DeconvConfig) -> Self {
        let bin_width = config.bin_width();
        let charge_range = config.charge_range();
        let mut filter = Vec::with_capacity(charge_range);
        let mut harmonic_offsets = Vec::with_capacity(charge_range);
        for j in 0..charge_range {
            let charge_filter = (1.0 / (j as f64 + config.min_charge as f64)).ln();
            filter.push(charge_filter);
            let mut offsets = Vec::with_capacity(config.harmonic_charges.len());
            for &hc in &config.harmonic_charges {
                let n = (hc / 2) as f64;
                let harmonic_filter =
                    (1.0 / (j as f64 - n / hc as f64 + config.min_charge as f64)).ln();
                offsets.push(((charge_filter - harmonic_filter) * bin_width).floor() as i64);
            }
            harmonic_offsets.push(offsets);
        }
        Self {
            filter,
            harmonic_offsets,
        }
    }

    /// Mass-bin offset per charge for the given bin space bounds
    pub fn bin_offsets(&self, mz_bin_min: f64, mass_bin_min: f64, bin_width: f64) -> Vec<i64> {
        self.filter
            .iter()
            .map(|f| ((mz_bin_min - f - mass_bin_min) * bin_width).round() as i64)
            .collect()
    }
}

/// Rasterize log-m/z values into a bitset
pub fn mz_bins(log_mzs: &[f64], mz_bin_min: f64, bin_count: usize, bin_width: f64) -> FixedBitSet {
    let mut bins = FixedBitSet::with_capacity(bin_count);
    for &log_mz in log_mzs {
        let bin = bin_number(log_mz, mz_bin_min, bin_width);
        if bin < bin_count {
            bins.insert(bin);
        }
    }
    bins
}

/// Result of the initial mass bin qualification scan
#[derive(Debug, Clone)]
pub struct MassBinScan {
    /// Bins with enough continuous charge pairs and no harmonic artifact
    pub is_qualified: FixedBitSet,
    /// Continuous charge pair count per bin
    pub continuous: Vec<u8>,
    /// Non-continuous charge pair count per bin
    pub noncontinuous: Vec<u8>,
}

/// Qualify mass bins by continuous charge pairs.
///
/// A pair of adjacent charges hitting the same mass bin counts as
/// continuous, unless an m/z peak sits at one of the half-charge harmonic
/// offsets (within +-2 bins), which disqualifies the mass bin permanently.
pub fn initial_mass_bins(
    mz_bin_set: &FixedBitSet,
    bin_offsets: &[i64],
    filters: &ChargeFilters,
    bin_start: i64,
    mass_bin_count: usize,
    config: &DeconvConfig,
) -> MassBinScan {
    let charge_range = config.charge_range();
    let min_continuous = config.min_continuous_charge_peak_pairs;
    let mz_bin_count = mz_bin_set.len() as i64;

    let mut scan = MassBinScan {
        is_qualified: FixedBitSet::with_capacity(mass_bin_count),
        continuous: vec![0; mass_bin_count],
        noncontinuous: vec![0; mass_bin_count],
    };
    let mut has_harmony = FixedBitSet::with_capacity(mass_bin_count);
    let mut prev_charges: Vec<u8> = vec![(charge_range + 2) as u8; mass_bin_count];

    for mz_bin in mz_bin_set.ones() {
        for j in 0..charge_range {
            let mass_bin = mz_bin as i64 + bin_offsets[j];
            if mass_bin < bin_start {
                continue;
            }
            if mass_bin >= mass_bin_count as i64 {
                break;
            }
            let mi = mass_bin as usize;
            if has_harmony.contains(mi) {
                continue;
            }

            let charge_delta = prev_charges[mi] as i32 - j as i32;
            prev_charges[mi] = j as u8;

            if charge_delta == 1 {
                for harmonic in &filters.harmonic_offsets[j] {
                    let hbi = mz_bin as i64 - harmonic;
                    for delta in -2i64..=2 {
                        let bin = hbi + delta;
                        if bin < 0 || bin >= mz_bin_count {
                            continue;
                        }
                        if mz_bin_set.contains(bin as usize) {
                            has_harmony.insert(mi);
                            scan.is_qualified.set(mi, false);
                            break;
                        }
                    }
                    if has_harmony.contains(mi) {
                        break;
                    }
                }
                if has_harmony.contains(mi) {
                    continue;
                }

                scan.continuous[mi] = scan.continuous[mi].saturating_add(1);
                if scan.continuous[mi] as usize >= min_continuous {
                    scan.is_qualified.insert(mi);
                }
            } else {
                scan.noncontinuous[mi] = scan.noncontinuous[mi].saturating_add(1);
            }
        }
    }
    scan
}

/// Per-mass-bin charge range chosen by the final selection
#[derive(Debug, Clone)]
pub struct ChargeRanges {
    /// Smallest selected charge index per mass bin
    pub min: Vec<u8>,
    /// Largest selected charge index per mass bin
    pub max: Vec<u8>,
}

/// Final mass bin selection.
///
/// For every m/z bin, among all charges whose mass bin is qualified or
/// present in the prior-scan union, the single mass bin maximizing
/// `continuous - noncontinuous` is kept and its charge range recorded.
pub fn final_mass_bins(
    mass_bins: &mut FixedBitSet,
    mz_bin_set: &FixedBitSet,
    scan: &MassBinScan,
    union_prev: &FixedBitSet,
    bin_offsets: &[i64],
    bin_start: i64,
    config: &DeconvConfig,
) -> ChargeRanges {
    let charge_range = config.charge_range();
    let mass_bin_count = mass_bins.len();
    let mut ranges = ChargeRanges {
        min: vec![200; mass_bin_count],
        max: vec![0; mass_bin_count],
    };

    for mz_bin in mz_bin_set.ones() {
        let mut max_index: i64 = -1;
        let mut max_score: i32 = -1;
        let mut max_charge: u8 = 0;

        for j in 0..charge_range {
            let mass_bin = mz_bin as i64 + bin_offsets[j];
            if mass_bin < bin_start {
                continue;
            }
            if mass_bin >= mass_bin_count as i64 {
                break;
            }
            let mi = mass_bin as usize;
            if !scan.is_qualified.contains(mi) && !union_prev.contains(mi) {
                continue;
            }
            let score = scan.continuous[mi] as i32 - scan.noncontinuous[mi] as i32;
            if max_score <= score {
                max_score = score;
                max_index = mass_bin;
                max_charge = j as u8;
            }
        }

        if max_index > 0 {
            let mi = max_index as usize;
            if scan.is_qualified.contains(mi) {
                mass_bins.insert(mi);
            }
            ranges.max[mi] = ranges.max[mi].max(max_charge);
            ranges.min[mi] = ranges.min[mi].min(max_charge);
        }
    }
    ranges
}
