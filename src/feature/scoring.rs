//! Per-peak evidence scores: local intensity significance, mass-trace
//! evidence, and per-charge isotope pattern evidence.
//!
//! All scores live in `[0, 1]` and are stored in the per-spectrum score
//! tracks. The precomputation over spectra is parallel; the per-charge
//! pattern stage is sequential because matches update peaks in adjacent
//! spectra.

use rayon::prelude::*;

use crate::feature::config::FeatureFinderConfig;
use crate::feature::types::{ObservedPattern, PeakRef};
use crate::isotopes::{IsotopePatternTable, TheoreticalIsotopePattern};
use crate::map::{PeakMap, Spectrum};

/// Score for the distance between an expected and an observed position.
///
/// 1.0 at zero deviation, 0.9 at half the allowed deviation, linearly
/// falling to 0 at the full deviation.
pub fn position_score(pos1: f64, pos2: f64, allowed_deviation: f64) -> f64 {
    let diff = (pos1 - pos2).abs();
    if diff <= 0.5 * allowed_deviation {
        0.1 * (0.5 * allowed_deviation - diff) / (0.5 * allowed_deviation) + 0.9
    } else if diff <= allowed_deviation {
        0.9 * (allowed_deviation - diff) / (0.5 * allowed_deviation)
    } else {
        0.0
    }
}

/// Pearson correlation coefficient; NaN on constant input
pub fn pearson(x: &[f64], y: &[f64]) -> f64 {
    debug_assert_eq!(x.len(), y.len());
    let n = x.len() as f64;
    if x.is_empty() {
        return f64::NAN;
    }
    let mean_x: f64 = x.iter().sum::<f64>() / n;
    let mean_y: f64 = y.iter().sum::<f64>() / n;
    let mut num = 0.0;
    let mut den_x = 0.0;
    let mut den_y = 0.0;
    for (&xi, &yi) in x.iter().zip(y) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        num += dx * dy;
        den_x += dx * dx;
        den_y += dy * dy;
    }
    num / (den_x * den_y).sqrt()
}

/// Quantile-binned local intensity significance map.
///
/// The map area is divided into an NxN grid; each cell stores 21 quantiles
/// (0%, 5%, ..., 100%) of its peak intensities. Scores interpolate within
/// the vigintiles of the four cells around a position, weighted by distance
/// to the cell centers.
#[derive(Debug, Clone)]
pub struct IntensityScorer {
    thresholds: Vec<Vec<[f64; 21]>>,
    bins: usize,
    rt_min: f64,
    mz_min: f64,
    rt_step: f64,
    mz_step: f64,
}

impl IntensityScorer {
    /// Collect the quantile grid from a map
    pub fn new(map: &PeakMap, bins: usize) -> Self {
        let bins = bins.max(1);
        let rt_min = map.min_rt();
        let mz_min = map.min_mz();
        let rt_step = (map.max_rt() - rt_min) / bins as f64;
        let mz_step = (map.max_mz() - mz_min) / bins as f64;

        let thresholds = (0..bins)
            .into_par_iter()
            .map(|rt_bin| {
                let min_rt = rt_min + rt_bin as f64 * rt_step;
                let max_rt = rt_min + (rt_bin + 1) as f64 * rt_step;
                let mut row = Vec::with_capacity(bins);
                let mut intensities: Vec<f64> = Vec::new();
                for mz_bin in 0..bins {
                    let min_mz = mz_min + mz_bin as f64 * mz_step;
                    let max_mz = mz_min + (mz_bin + 1) as f64 * mz_step;
                    intensities.clear();
                    intensities.extend(
                        map.area_iter(min_rt, max_rt, min_mz, max_mz)
                            .map(|p| p.intensity as f64),
                    );
                    let mut quantiles = [0.0; 21];
                    if !intensities.is_empty() {
                        intensities.sort_unstable_by(f64::total_cmp);
                        for (i, slot) in quantiles.iter_mut().enumerate() {
                            let index =
                                (0.05 * i as f64 * (intensities.len() - 1) as f64).floor() as usize;
                            *slot = intensities[index];
                        }
                    }
                    row.push(quantiles);
                }
                row
            })
            .collect();

        Self {
            thresholds,
            bins,
            rt_min,
            mz_min,
            rt_step,
            mz_step,
        }
    }

    /// Quantiles of one grid cell (for tests and diagnostics)
    pub fn cell_quantiles(&self, rt_bin: usize, mz_bin: usize) -> &[f64; 21] {
        &self.thresholds[rt_bin][mz_bin]
    }

    /// Intensity significance of a peak at (rt, mz), in `[0, 1]`
    pub fn score(&self, rt: f64, mz: f64, intensity: f64) -> f64 {
        // half-bin positions; each peak lies between four half-bin centers
        let rt_bin = (((rt - self.rt_min) / self.rt_step * 2.0).floor() as usize)
            .min(2 * self.bins - 1);
        let mz_bin = (((mz - self.mz_min) / self.mz_step * 2.0).floor() as usize)
            .min(2 * self.bins - 1);

        let (ml, mh) = Self::neighbor_bins(mz_bin, self.bins);
        let (rl, rh) = Self::neighbor_bins(rt_bin, self.bins);

        // distances to the surrounding cell centers, normalized to [0, 1]
        let drl = ((self.rt_min + (0.5 + rl as f64) * self.rt_step - rt) / self.rt_step).abs();
        let drh = ((self.rt_min + (0.5 + rh as f64) * self.rt_step - rt) / self.rt_step).abs();
        let dml = ((self.mz_min + (0.5 + ml as f64) * self.mz_step - mz) / self.mz_step).abs();
        let dmh = ((self.mz_min + (0.5 + mh as f64) * self.mz_step - mz) / self.mz_step).abs();

        let d1 = ((1.0 - drl).powi(2) + (1.0 - dml).powi(2)).sqrt();
        let d2 = ((1.0 - drh).powi(2) + (1.0 - dml).powi(2)).sqrt();
        let d3 = ((1.0 - drl).powi(2) + (1.0 - dmh).powi(2)).sqrt();
        let d4 = ((1.0 - drh).powi(2) + (1.0 - dmh).powi(2)).sqrt();
        let d_sum = d1 + d2 + d3 + d4;

        let score = self.cell_score(rl, ml, intensity) * (d1 / d_sum)
            + self.cell_score(rh, ml, intensity) * (d2 / d_sum)
            + self.cell_score(rl, mh, intensity) * (d3 / d_sum)
            + self.cell_score(rh, mh, intensity) * (d4 / d_sum);
        score.clamp(0.0, 1.0)
    }

    fn neighbor_bins(half_bin: usize, bins: usize) -> (usize, usize) {
        if half_bin == 0 || half_bin == 2 * bins - 1 {
            (half_bin / 2, half_bin / 2)
        } else if half_bin % 2 == 1 {
            (half_bin / 2, half_bin / 2 + 1)
        } else {
            (half_bin / 2 - 1, half_bin / 2)
        }
    }

    /// Vigintile interpolation inside one cell
    fn cell_score(&self, rt_bin: usize, mz_bin: usize, intensity: f64) -> f64 {
        let quantiles = &self.thresholds[rt_bin][mz_bin];
        let index = quantiles.partition_point(|&q| q < intensity);
        // above the highest quantile
        if index == quantiles.len() {
            return 1.0;
        }
        let bin_score = if index == 0 {
            0.05 * intensity / quantiles[0]
        } else {
            0.05 * (intensity - quantiles[index - 1]) / (quantiles[index] - quantiles[index - 1])
        };
        let score = bin_score + 0.05 * (index as f64 - 1.0);
        score.clamp(0.0, 1.0)
    }
}

/// Fill the `intensity_score` track of every spectrum
pub fn compute_intensity_scores(map: &mut PeakMap, scorer: &IntensityScorer) {
    let scores: Vec<Vec<f32>> = map
        .spectra()
        .par_iter()
        .map(|spectrum| {
            spectrum
                .peaks()
                .iter()
                .map(|peak| scorer.score(spectrum.rt, peak.mz, peak.intensity as f64) as f32)
                .collect()
        })
        .collect();
    for (spectrum, values) in map.spectra_mut().iter_mut().zip(scores) {
        spectrum.scores.intensity_score = values;
    }
}

/// Fill the `trace_score` and `local_max` tracks of every spectrum.
///
/// The first and last `min_spectra` spectra keep zero scores, since the
/// scans required to search for traces are missing there.
pub fn compute_trace_scores(map: &mut PeakMap, min_spectra: usize, trace_tolerance: f64) {
    let count = map.spectrum_count();
    let end = count - min_spectra.min(count);
    if end <= min_spectra {
        return;
    }

    let map_ref: &PeakMap = map;
    let results: Vec<(usize, Vec<f32>, Vec<f32>)> = (min_spectra..end)
        .into_par_iter()
        .map(|s| {
            let spectrum = map_ref.spectrum(s);
            let mut trace_scores = Vec::with_capacity(spectrum.len());
            let mut local_max = Vec::with_capacity(spectrum.len());
            for peak in spectrum.peaks() {
                let mut score_sum = 0.0;
                let mut is_max_peak = true;
                for direction in [1isize, -1] {
                    for i in 1..=min_spectra {
                        let neighbor_index = (s as isize + direction * i as isize) as usize;
                        let neighbor = map_ref.spectrum(neighbor_index);
                        match neighbor.find_nearest(peak.mz) {
                            Some(nearest) => {
                                let neighbor_peak = neighbor.peak(nearest);
                                let score =
                                    position_score(peak.mz, neighbor_peak.mz, trace_tolerance);
                                if score > 0.0 && neighbor_peak.intensity > peak.intensity {
                                    is_max_peak = false;
                                }
                                score_sum += score;
                            }
                            None => {} // empty neighboring spectrum scores 0
                        }
                    }
                }
                trace_scores.push((score_sum / (2 * min_spectra) as f64) as f32);
                local_max.push(if is_max_peak { 1.0 } else { 0.0 });
            }
            (s, trace_scores, local_max)
        })
        .collect();

    for (s, trace_scores, local_max) in results {
        let spectrum = map.spectrum_mut(s);
        spectrum.scores.trace_score = trace_scores;
        spectrum.scores.local_max = local_max;
    }
}

/// Rolling nearest-peak search: advance from `start` while the distance to
/// `pos` shrinks. Only valid for monotonically increasing search positions.
pub fn nearest_from(spectrum: &Spectrum, pos: f64, start: usize) -> usize {
    let mut index = start.min(spectrum.len() - 1);
    let mut distance = (pos - spectrum.peak(index).mz).abs();
    while index + 1 < spectrum.len() {
        let new_distance = (pos - spectrum.peak(index + 1).mz).abs();
        if new_distance >= distance {
            break;
        }
        distance = new_distance;
        index += 1;
    }
    index
}

/// Look up one isotopic peak at `pos`: in the given spectrum (rolling cursor
/// `peak_index`) and in the two adjacent spectra. Matches are averaged into
/// the pattern entry; the primary peak reference prefers the center spectrum.
pub fn find_isotope(
    map: &PeakMap,
    pos: f64,
    spectrum_index: usize,
    pattern: &mut ObservedPattern,
    pattern_index: usize,
    peak_index: &mut usize,
    pattern_tolerance: f64,
) {
    let mut intensity = 0.0;
    let mut pos_score = 0.0;
    let mut matches = 0u32;

    pattern.theoretical_mz[pattern_index] = pos;

    let spectrum = map.spectrum(spectrum_index);
    if !spectrum.is_empty() {
        *peak_index = nearest_from(spectrum, pos, *peak_index);
        let mz_score = position_score(pos, spectrum.peak(*peak_index).mz, pattern_tolerance);
        if mz_score != 0.0 {
            pattern.peak[pattern_index] = PeakRef::Found {
                spectrum: spectrum_index,
                peak: *peak_index,
            };
            intensity += spectrum.peak(*peak_index).intensity as f64;
            pos_score += mz_score;
            matches += 1;
        }
    }

    // previous spectrum
    if spectrum_index != 0 {
        let before = map.spectrum(spectrum_index - 1);
        if let Some(index) = before.find_nearest(pos) {
            let mz_score = position_score(pos, before.peak(index).mz, pattern_tolerance);
            if mz_score != 0.0 {
                intensity += before.peak(index).intensity as f64;
                pos_score += mz_score;
                matches += 1;
                if pattern.peak[pattern_index] == PeakRef::Missing {
                    pattern.peak[pattern_index] = PeakRef::Found {
                        spectrum: spectrum_index - 1,
                        peak: index,
                    };
                }
            }
        }
    }

    // next spectrum
    if spectrum_index + 1 < map.spectrum_count() {
        let after = map.spectrum(spectrum_index + 1);
        if let Some(index) = after.find_nearest(pos) {
            let mz_score = position_score(pos, after.peak(index).mz, pattern_tolerance);
            if mz_score != 0.0 {
                intensity += after.peak(index).intensity as f64;
                pos_score += mz_score;
                matches += 1;
                if pattern.peak[pattern_index] == PeakRef::Missing {
                    pattern.peak[pattern_index] = PeakRef::Found {
                        spectrum: spectrum_index + 1,
                        peak: index,
                    };
                }
            }
        }
    }

    if matches == 0 {
        pattern.peak[pattern_index] = PeakRef::Missing;
        pattern.mz_score[pattern_index] = 0.0;
        pattern.intensity[pattern_index] = 0.0;
    } else {
        pattern.mz_score[pattern_index] = pos_score / matches as f64;
        pattern.intensity[pattern_index] = intensity / matches as f64;
    }
}

/// Correlation between the theoretical and an observed isotope pattern.
///
/// Searches all sub-ranges allowed by the optional border peaks; a chosen
/// sub-range must improve the prior best by `optional_fit_improvement`.
/// Peaks outside the chosen range are marked as removed. Returns 0 when a
/// core (non-optional) peak is missing.
pub fn isotope_score(
    isotopes: &TheoreticalIsotopePattern,
    pattern: &mut ObservedPattern,
    consider_mz_distances: bool,
    min_isotope_fit: f64,
    optional_fit_improvement: f64,
) -> f64 {
    let size = isotopes.len();
    debug_assert_eq!(size, pattern.len());

    // a missing core peak voids the pattern
    for iso in isotopes.optional_begin..size - isotopes.optional_end {
        if pattern.peak[iso] == PeakRef::Missing {
            return 0.0;
        }
    }

    // skip optional border peaks that are missing anyway
    let mut best_begin = 0;
    for i in (1..=isotopes.optional_begin).rev() {
        if pattern.peak[i - 1] == PeakRef::Missing {
            best_begin = i;
            break;
        }
    }
    let mut best_end = 0;
    for i in (1..=isotopes.optional_end).rev() {
        if pattern.peak[size - i] == PeakRef::Missing {
            best_end = i;
            break;
        }
    }

    // try to leave out optional isotope peaks to improve the fit;
    // not 0 as this would break the percental improvement check
    let mut best_int_score = 0.01;
    let mut b = best_begin;
    while b <= isotopes.optional_begin {
        let mut e = best_end;
        while e <= isotopes.optional_end {
            // require more than 2 peaks (2 allowed only for the initial range)
            let range_len = size - b - e;
            if range_len > 2 || (b == best_begin && e == best_end && range_len > 1) {
                let mut int_score =
                    pearson(&isotopes.intensities[b..size - e], &pattern.intensity[b..size - e]);
                if !int_score.is_finite() {
                    int_score = 0.0;
                }
                if range_len == 2 && int_score > min_isotope_fit {
                    // a two-point correlation is trivially 1
                    int_score = min_isotope_fit;
                }
                if int_score / best_int_score >= 1.0 + optional_fit_improvement {
                    best_int_score = int_score;
                    best_begin = b;
                    best_end = e;
                }
            }
            e += 1;
        }
        b += 1;
    }

    if size - best_begin - best_end == 0 {
        return 0.0;
    }

    for i in 0..best_begin {
        pattern.remove(i);
    }
    for i in 0..best_end {
        pattern.remove(size - 1 - i);
    }

    if consider_mz_distances {
        let kept = &pattern.mz_score[best_begin..size - best_end];
        best_int_score *= kept.iter().sum::<f64>() / kept.len() as f64;
    }

    debug_assert!(best_int_score >= 0.0 && best_int_score <= 1.0 + 1e-9);
    best_int_score
}

/// Fill the per-charge pattern score track for one charge.
///
/// Sequential over spectra: a matched pattern may raise the score of peaks
/// in the two adjacent spectra.
pub fn compute_pattern_scores(
    map: &mut PeakMap,
    charge: i32,
    charge_index: usize,
    table: &IsotopePatternTable,
    config: &FeatureFinderConfig,
) {
    for s in 0..map.spectrum_count() {
        let mut updates: Vec<(usize, usize, f32)> = Vec::new();
        {
            let spectrum = map.spectrum(s);
            for p in 0..spectrum.len() {
                let mz = spectrum.peak(p).mz;
                let isotopes = table.for_mass(mz * charge as f64);
                if isotopes.is_empty() {
                    continue;
                }
                let max_isotope = crate::isotopes::most_abundant_index(&isotopes.intensities);

                let mut peak_index = spectrum
                    .find_nearest(mz - (isotopes.len() + 1) as f64 / charge as f64)
                    .unwrap_or(0);
                let mut pattern = ObservedPattern::new(isotopes.len());
                for i in 0..isotopes.len() {
                    let pos = mz + (i as f64 - max_isotope as f64) / charge as f64;
                    find_isotope(
                        map,
                        pos,
                        s,
                        &mut pattern,
                        i,
                        &mut peak_index,
                        config.pattern_tolerance,
                    );
                }

                let pattern_score = isotope_score(
                    isotopes,
                    &mut pattern,
                    true,
                    config.min_isotope_fit,
                    config.optional_fit_improvement,
                );
                if pattern_score > 0.0 {
                    for peak_ref in &pattern.peak {
                        if let Some((spectrum_index, peak)) = peak_ref.found() {
                            updates.push((spectrum_index, peak, pattern_score as f32));
                        }
                    }
                }
            }
        }
        for (spectrum_index, peak, score) in updates {
            let track = &mut map.spectrum_mut(spectrum_index).scores.pattern[charge_index];
            if score > track[peak] {
                track[peak] = score;
            }
        }
    }
}
