//! The per-spectrum deconvolution driver.
//!
//! Each MS1 spectrum is processed on its own bin spaces (the bounds depend
//! on its peaks); mass bins seen in up to `num_overlapped_scans` previous
//! spectra are shifted into the current bin space and reinforce borderline
//! masses. The loop is sequential by design: the ring buffer carries state
//! across spectra.

use std::collections::VecDeque;

use fixedbitset::FixedBitSet;

use crate::deconv::bins::{
    bin_number, final_mass_bins, initial_mass_bins, mz_bins, next_set_bit, ChargeFilters,
    ChargeRanges,
};
use crate::deconv::config::DeconvConfig;
use crate::deconv::error::DeconvError;
use crate::deconv::report::DeconvSummary;
use crate::deconv::score::score_and_filter;
use crate::deconv::types::{LogMzPeak, PeakGroup};
use crate::isotopes::{DeconvAveragineTable, C13C12_MASS_DIFF, PROTON_MASS};
use crate::map::PeakMap;

/// Default number of previous spectra whose mass bins carry over
pub const DEFAULT_NUM_OVERLAPPED_SCANS: usize = 10;

/// Result of a deconvolution run
#[derive(Debug, Clone, Default)]
pub struct DeconvRun {
    /// All qualified peak groups, in spectrum order
    pub groups: Vec<PeakGroup>,
    /// Run counters
    pub summary: DeconvSummary,
}

/// Mass bins of a previous spectrum, remembered for carry-over
struct PrevMassBins {
    bins: Vec<usize>,
    mass_bin_min: f64,
}

/// The per-spectrum deconvolution engine
#[derive(Debug, Clone)]
pub struct Deconvoluter {
    config: DeconvConfig,
    averagine: DeconvAveragineTable,
    num_overlapped_scans: usize,
}

impl Deconvoluter {
    /// Create an engine; the configuration is validated and the averagine
    /// table precomputed here
    pub fn new(config: DeconvConfig) -> Result<Self, DeconvError> {
        config.validate()?;
        let averagine =
            DeconvAveragineTable::build(config.min_mass, config.max_mass, config.max_isotope_count);
        Ok(Self {
            config,
            averagine,
            num_overlapped_scans: DEFAULT_NUM_OVERLAPPED_SCANS,
        })
    }

    /// Override the number of overlapped scans (default 10)
    pub fn with_num_overlapped_scans(mut self, scans: usize) -> Self {
        self.num_overlapped_scans = scans;
        self
    }

    /// The active configuration
    pub fn config(&self) -> &DeconvConfig {
        &self.config
    }

    /// Deconvolute all MS1 spectra of a map
    pub fn run(&self, map: &PeakMap) -> Result<DeconvRun, DeconvError> {
        let config = &self.config;
        let filters = ChargeFilters::new(config);

        let mut run = DeconvRun::default();
        let mut prev_mass_bins: VecDeque<PrevMassBins> = VecDeque::new();
        let mut mass_counter = 0usize;
        let mut qualified_spectra = 0usize;

        for (spectrum_index, spectrum) in map.spectra().iter().enumerate() {
            if spectrum.ms_level != 1 {
                continue;
            }
            run.summary.spectra += 1;

            let log_mz_peaks: Vec<LogMzPeak> = spectrum
                .peaks()
                .iter()
                .filter(|p| p.intensity as f64 > config.min_intensity)
                .map(LogMzPeak::new)
                .collect();
            if log_mz_peaks.len() < 2 {
                continue;
            }

            let groups = self.peak_groups_from_spectrum(
                &log_mz_peaks,
                &filters,
                &mut prev_mass_bins,
            );
            if groups.is_empty() {
                continue;
            }

            let filtered = score_and_filter(groups, &self.averagine, config);
            if filtered.is_empty() {
                continue;
            }

            qualified_spectra += 1;
            let mass_count = filtered.len();
            for mut group in filtered {
                mass_counter += 1;
                group.mass_index = mass_counter;
                group.spec_index = qualified_spectra;
                group.mass_count_in_spec = mass_count;
                group.spectrum_index = spectrum_index;
                group.spectrum_rt = spectrum.rt;
                group.native_id = spectrum.native_id.clone();
                run.groups.push(group);
            }
        }

        run.summary.qualified_spectra = qualified_spectra;
        run.summary.masses = mass_counter;
        log::info!(
            "Found {} masses in {} spectra out of {}",
            run.summary.masses,
            run.summary.qualified_spectra,
            run.summary.spectra
        );
        Ok(run)
    }

    /// Deconvolute one spectrum given its log-m/z peaks
    fn peak_groups_from_spectrum(
        &self,
        log_mz_peaks: &[LogMzPeak],
        filters: &ChargeFilters,
        prev_mass_bins: &mut VecDeque<PrevMassBins>,
    ) -> Vec<PeakGroup> {
        let config = &self.config;
        let bin_width = config.bin_width();
        let charge_range = config.charge_range();
        let min_continuous = config.min_continuous_charge_peak_pairs;

        let first_log_mz = log_mz_peaks[0].log_mz;
        let last_log_mz = log_mz_peaks[log_mz_peaks.len() - 1].log_mz;

        // bin space bounds; the high mass bound is limited by the highest
        // charge that can still contribute a continuous pair run
        let mass_bin_max =
            (last_log_mz - filters.filter[charge_range - min_continuous - 1]).min(config.max_mass.ln());
        let mass_bin_min = first_log_mz - filters.filter[min_continuous];
        if mass_bin_max <= mass_bin_min {
            return Vec::new();
        }
        let mass_bin_count = bin_number(mass_bin_max, mass_bin_min, bin_width) + 1;
        let mz_bin_count = bin_number(last_log_mz, first_log_mz, bin_width) + 1;

        let bin_offsets = filters.bin_offsets(first_log_mz, mass_bin_min, bin_width);

        let log_mzs: Vec<f64> = log_mz_peaks.iter().map(|p| p.log_mz).collect();
        let mz_bin_set = mz_bins(&log_mzs, first_log_mz, mz_bin_count, bin_width);

        let union_prev = self.union_previous_mass_bins(prev_mass_bins, mass_bin_min, mass_bin_count);

        let bin_start = bin_number(config.min_mass.ln(), mass_bin_min, bin_width) as i64;
        let scan = initial_mass_bins(
            &mz_bin_set,
            &bin_offsets,
            filters,
            bin_start,
            mass_bin_count,
            config,
        );
        let mut mass_bins = FixedBitSet::with_capacity(mass_bin_count);
        let charge_ranges = final_mass_bins(
            &mut mass_bins,
            &mz_bin_set,
            &scan,
            &union_prev,
            &bin_offsets,
            bin_start,
            config,
        );

        let mut unioned_mass_bins = union_prev;
        unioned_mass_bins.union_with(&mass_bins);

        let groups = self.extract_peak_groups(
            log_mz_peaks,
            &mut unioned_mass_bins,
            &mut mass_bins,
            first_log_mz,
            &bin_offsets,
            &charge_ranges,
        );

        // remember this spectrum's mass bins for the following scans
        if prev_mass_bins.len() >= self.num_overlapped_scans {
            prev_mass_bins.pop_front();
        }
        prev_mass_bins.push_back(PrevMassBins {
            bins: mass_bins.ones().collect(),
            mass_bin_min,
        });

        groups
    }

    /// Shift the remembered mass bins of previous spectra into the current
    /// bin space and OR them together
    fn union_previous_mass_bins(
        &self,
        prev_mass_bins: &VecDeque<PrevMassBins>,
        mass_bin_min: f64,
        mass_bin_count: usize,
    ) -> FixedBitSet {
        let bin_width = self.config.bin_width();
        let mut union = FixedBitSet::with_capacity(mass_bin_count);
        for prev in prev_mass_bins {
            if prev.bins.is_empty() {
                continue;
            }
            let shift = ((mass_bin_min - prev.mass_bin_min) * bin_width).round() as i64;
            for &index in &prev.bins {
                let shifted = index as i64 - shift;
                if shifted < 0 {
                    continue;
                }
                if shifted as usize >= mass_bin_count {
                    break;
                }
                union.insert(shifted as usize);
            }
        }
        union
    }

    /// Collect the member peaks of every selected mass bin.
    ///
    /// For each charge in the bin's selected range, the most intense peak
    /// mapping to the bin anchors the isotopologue walk in both directions;
    /// isotope peaks mapping to other mass bins clear those bins so that
    /// neighboring isotopologues are not double-counted as separate masses.
    /// The iteration order over `unioned_mass_bins` is load-bearing: the
    /// bitset is mutated while being walked.
    fn extract_peak_groups(
        &self,
        log_mz_peaks: &[LogMzPeak],
        unioned_mass_bins: &mut FixedBitSet,
        mass_bins: &mut FixedBitSet,
        mz_bin_min: f64,
        bin_offsets: &[i64],
        charge_ranges: &ChargeRanges,
    ) -> Vec<PeakGroup> {
        let config = &self.config;
        let bin_width = config.bin_width();
        let tolerance = config.tolerance();
        let peak_count = log_mz_peaks.len();
        let mass_bin_count = unioned_mass_bins.len() as i64;

        let mut current_peak_index = vec![0usize; config.charge_range()];
        let mut groups = Vec::new();

        let mut mass_bin_index = next_set_bit(unioned_mass_bins, 0);
        while let Some(mass_bin) = mass_bin_index {
            let mut group = PeakGroup::default();
            let mut iso_off = 0i32;
            let min_charge_range = charge_ranges.min[mass_bin] as usize;
            let max_charge_range = charge_ranges.max[mass_bin] as usize;

            for j in min_charge_range..=max_charge_range.min(config.charge_range() - 1) {
                let charge = j as i32 + config.min_charge;
                let bin_offset = bin_offsets[j];
                let cursor = &mut current_peak_index[j];

                // the most intense peak of this charge mapping to the bin
                let mut max_intensity = 0.0f32;
                let mut anchor = 0usize;
                while *cursor + 1 < peak_count {
                    let bin =
                        bin_number(log_mz_peaks[*cursor].log_mz, mz_bin_min, bin_width) as i64
                            + bin_offset;
                    if bin == mass_bin as i64 {
                        let intensity = log_mz_peaks[*cursor].intensity;
                        if intensity > max_intensity {
                            max_intensity = intensity;
                            anchor = *cursor;
                        }
                    } else if bin > mass_bin as i64 {
                        break;
                    }
                    *cursor += 1;
                }
                if anchor == 0 {
                    continue;
                }

                let anchor_mz = log_mz_peaks[anchor].mz - PROTON_MASS;
                let anchor_log_mz = log_mz_peaks[anchor].log_mz;
                let isotope_step = C13C12_MASS_DIFF / charge as f64 / anchor_mz;

                for direction in [-1i64, 1] {
                    let mut peak_index =
                        anchor as i64 + if direction < 0 { -1 } else { 0 };
                    let mut i = 0i64;
                    while peak_index >= 0 && peak_index < peak_count as i64 {
                        let center_log_mz =
                            anchor_log_mz + isotope_step * (i * direction) as f64;
                        let center_min = center_log_mz - tolerance;
                        let center_max = center_log_mz + tolerance;
                        let mut isotope_present = false;
                        while peak_index >= 0 && peak_index < peak_count as i64 {
                            let observed = &log_mz_peaks[peak_index as usize];
                            // peaks below the window end a downward walk but
                            // are skipped on the way up, and vice versa
                            if observed.log_mz < center_min {
                                if direction < 0 {
                                    break;
                                }
                                peak_index += direction;
                                continue;
                            }
                            if observed.log_mz > center_max {
                                if direction > 0 {
                                    break;
                                }
                                peak_index += direction;
                                continue;
                            }
                            isotope_present = true;
                            let mut member = *observed;
                            member.charge = charge;
                            member.isotope_index = (i * direction) as i32;
                            group.peaks.push(member);

                            // clear foreign isotopologue bins from both masks
                            let bin = bin_number(member.log_mz, mz_bin_min, bin_width) as i64
                                + bin_offset;
                            if bin != mass_bin as i64 && bin >= 0 && bin < mass_bin_count {
                                unioned_mass_bins.set(bin as usize, false);
                                mass_bins.set(bin as usize, false);
                            }
                            peak_index += direction;
                        }
                        if !isotope_present {
                            break;
                        }
                        if direction < 0 {
                            iso_off = iso_off.min(-(i as i32));
                        }
                        i += 1;
                    }
                }
            }

            if !group.peaks.is_empty() {
                for peak in &mut group.peaks {
                    peak.isotope_index -= iso_off;
                }
                groups.push(group);
            }
            mass_bin_index = next_set_bit(unioned_mass_bins, mass_bin + 1);
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::{Peak, Spectrum};

    /// Spectrum of one species across a charge range with averagine-shaped
    /// isotope envelopes
    fn species_spectrum(
        rt: f64,
        mass: f64,
        charges: std::ops::RangeInclusive<i32>,
        averagine: &DeconvAveragineTable,
    ) -> Spectrum {
        let center = (*charges.start() + *charges.end()) as f64 / 2.0;
        let distribution = averagine.get(mass).to_vec();
        let mut peaks = Vec::new();
        for charge in charges {
            let charge_weight = 1.0 / (1.0 + (charge as f64 - center).powi(2) / 10.0);
            for (iso, &weight) in distribution.iter().enumerate() {
                if weight < 1e-3 {
                    continue;
                }
                let neutral = mass + iso as f64 * C13C12_MASS_DIFF;
                let mz = neutral / charge as f64 + PROTON_MASS;
                peaks.push(Peak {
                    mz,
                    intensity: (10000.0 * charge_weight * weight) as f32,
                });
            }
        }
        let mut spectrum = Spectrum::new(rt, format!("scan={rt}"));
        spectrum.set_peaks(peaks);
        spectrum
    }

    fn test_config() -> DeconvConfig {
        let mut config = DeconvConfig::default();
        config.min_charge = 2;
        config.max_charge = 30;
        config.tolerance_ppm = 10.0;
        config.max_mass = 50000.0;
        config
    }

    #[test]
    fn test_single_species_is_recovered() {
        let config = test_config();
        let engine = Deconvoluter::new(config).unwrap();
        let averagine = DeconvAveragineTable::build(1000.0, 50000.0, 100);
        let map = PeakMap::new(vec![species_spectrum(1.0, 10000.0, 5..=20, &averagine)]);

        let run = engine.run(&map).unwrap();
        assert_eq!(run.summary.spectra, 1);
        assert!(!run.groups.is_empty(), "no peak groups found");
        let best = run
            .groups
            .iter()
            .max_by(|a, b| a.intensity.total_cmp(&b.intensity))
            .unwrap();
        assert!(
            (best.monoisotopic_mass - 10000.0).abs() < 1.0,
            "mass {}",
            best.monoisotopic_mass
        );
        assert!(best.isotope_cosine_score > 0.9);
        assert!(best.charge_distribution_score >= 10);
    }

    #[test]
    fn test_ms2_spectra_skipped() {
        let config = test_config();
        let engine = Deconvoluter::new(config).unwrap();
        let averagine = DeconvAveragineTable::build(1000.0, 50000.0, 100);
        let mut ms2 = species_spectrum(1.0, 10000.0, 5..=20, &averagine);
        ms2.ms_level = 2;
        let map = PeakMap::new(vec![ms2]);
        let run = engine.run(&map).unwrap();
        assert_eq!(run.summary.spectra, 0);
        assert!(run.groups.is_empty());
    }

    #[test]
    fn test_carry_over_ring_is_bounded() {
        let config = test_config();
        let engine = Deconvoluter::new(config).unwrap().with_num_overlapped_scans(2);
        let averagine = DeconvAveragineTable::build(1000.0, 50000.0, 100);
        let spectra: Vec<Spectrum> = (0..5)
            .map(|i| species_spectrum(i as f64, 10000.0, 5..=20, &averagine))
            .collect();
        let map = PeakMap::new(spectra);
        let run = engine.run(&map).unwrap();
        // every spectrum sees the species again
        assert_eq!(run.summary.spectra, 5);
        assert!(run.summary.qualified_spectra >= 4);
    }

    #[test]
    fn test_mass_indices_are_sequential() {
        let config = test_config();
        let engine = Deconvoluter::new(config).unwrap();
        let averagine = DeconvAveragineTable::build(1000.0, 50000.0, 100);
        let spectra: Vec<Spectrum> = (0..3)
            .map(|i| species_spectrum(i as f64, 12000.0, 6..=22, &averagine))
            .collect();
        let map = PeakMap::new(spectra);
        let run = engine.run(&map).unwrap();
        for (expected, group) in run.groups.iter().enumerate() {
            assert_eq!(group.mass_index, expected + 1);
            assert!(group.spec_index >= 1);
            assert!(group.mass_count_in_spec >= 1);
        }
    }
}
