//! Scoring and filtering of candidate peak groups: per-charge and
//! per-isotope intensity profiles, charge distribution score, isotope
//! cosine and monoisotopic mass determination.

use crate::deconv::config::DeconvConfig;
use crate::deconv::types::PeakGroup;
use crate::isotopes::{most_abundant_index, DeconvAveragineTable, C13C12_MASS_DIFF};

/// Aggregate member intensities per charge and per isotope index
pub fn per_charge_isotope_intensities(
    group: &PeakGroup,
    config: &DeconvConfig,
    max_isotope_count: usize,
) -> (Vec<f64>, Vec<f64>) {
    let mut per_charge = vec![0.0; config.charge_range()];
    let mut per_isotope = vec![0.0; max_isotope_count];
    for peak in &group.peaks {
        let isotope_index = peak.isotope_index;
        if isotope_index < 0 || isotope_index as usize >= max_isotope_count {
            continue;
        }
        let charge_index = (peak.charge - config.min_charge) as usize;
        per_charge[charge_index] += peak.intensity as f64;
        per_isotope[isotope_index as usize] += peak.intensity as f64;
    }
    (per_charge, per_isotope)
}

/// Longest run of nonzero entries, starting the scan at `from`
fn longest_nonzero_run(values: &[f64], from: usize) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for &value in &values[from.min(values.len())..] {
        if value <= 0.0 {
            current = 0;
            continue;
        }
        current += 1;
        longest = longest.max(current);
    }
    longest
}

/// Both intensity profiles must show enough continuous support
pub fn intensities_qualified(
    per_charge: &[f64],
    per_isotope: &[f64],
    config: &DeconvConfig,
) -> bool {
    longest_nonzero_run(per_charge, 1) >= config.min_continuous_charge_peak_pairs
        && longest_nonzero_run(per_isotope, 0) >= config.min_continuous_isotopes
}

/// Walk outward from the most intense charge: +1 per monotone step, -1 per
/// anti-monotone step, -2 per zero
pub fn charge_distribution_score(per_charge: &[f64]) -> i32 {
    let max_index = most_abundant_index(per_charge);
    let mut score = 0;
    for k in 1..per_charge.len() {
        let (d1, d2): (isize, isize) = if k <= max_index { (0, -1) } else { (-1, 0) };
        let int1 = per_charge[(k as isize + d1) as usize];
        let int2 = per_charge[(k as isize + d2) as usize];
        if int1 == int2 {
            continue;
        }
        if int1 == 0.0 {
            score -= 2;
        } else if int1 > int2 {
            score += 1;
        } else {
            score -= 1;
        }
    }
    score
}

/// Cosine between an observed profile (shifted by `offset`) and a
/// theoretical distribution; 0 when either norm vanishes
pub fn cosine(observed: &[f64], theoretical: &[f64], offset: i32) -> f64 {
    let size = theoretical.len();
    let mut numerator = 0.0;
    let mut observed_norm = 0.0;
    let mut theoretical_norm = 0.0;
    for (i, &t) in theoretical.iter().enumerate().take(size) {
        theoretical_norm += t * t;
        let j = i as i32 + offset;
        if j < 0 || j as usize >= observed.len() {
            continue;
        }
        numerator += observed[j as usize] * t;
        observed_norm += observed[j as usize] * observed[j as usize];
    }
    let denominator = observed_norm * theoretical_norm;
    if denominator <= 0.0 {
        return 0.0;
    }
    numerator / denominator.sqrt()
}

/// Best isotope cosine over candidate offsets; shifts the group's isotope
/// indices accordingly and determines the monoisotopic mass from the most
/// intense remaining peak
pub fn isotope_cosine_and_mono_mass(
    group: &mut PeakGroup,
    per_isotope: &[f64],
    averagine: &DeconvAveragineTable,
) -> (f64, f64) {
    let distribution = averagine.get(group.peaks[0].mass());
    let iso_size = distribution.len() as i32;
    let most_abundant = most_abundant_index(distribution) as i32;

    let mut max_isotope_index = 0;
    let mut min_isotope_index = iso_size;
    for peak in &group.peaks {
        max_isotope_index = max_isotope_index.max(peak.isotope_index);
        min_isotope_index = min_isotope_index.min(peak.isotope_index);
    }

    let mut best_offset = 0;
    let mut max_cosine = -1.0;
    for offset in (-most_abundant + 1)..=3 {
        if min_isotope_index < offset {
            continue;
        }
        if max_isotope_index - offset > iso_size {
            continue;
        }
        let score = cosine(per_isotope, distribution, offset);
        if score > max_cosine {
            max_cosine = score;
            best_offset = offset;
        }
    }

    for peak in &mut group.peaks {
        peak.isotope_index -= best_offset;
    }

    let mut mono_mass = 0.0;
    let mut max_intensity = -1.0f64;
    for peak in &group.peaks {
        if peak.isotope_index > max_isotope_index - best_offset {
            continue;
        }
        let intensity = peak.intensity as f64;
        if max_intensity > intensity {
            continue;
        }
        max_intensity = intensity;
        mono_mass = peak.mass() - peak.isotope_index as f64 * C13C12_MASS_DIFF;
    }
    (max_cosine, mono_mass)
}

/// Score all candidate groups and keep the qualified ones.
///
/// With `max_mass_count` set, only the top-intensity groups of the spectrum
/// survive.
pub fn score_and_filter(
    groups: Vec<PeakGroup>,
    averagine: &DeconvAveragineTable,
    config: &DeconvConfig,
) -> Vec<PeakGroup> {
    let max_isotope_count = averagine.max_isotope_count();
    let mut filtered: Vec<PeakGroup> = Vec::with_capacity(groups.len());

    for mut group in groups {
        let (per_charge, per_isotope) =
            per_charge_isotope_intensities(&group, config, max_isotope_count);
        if !intensities_qualified(&per_charge, &per_isotope, config) {
            continue;
        }

        group.charge_distribution_score = charge_distribution_score(&per_charge);
        if group.charge_distribution_score < config.charge_distribution_score_threshold {
            continue;
        }

        let (cosine_score, mono_mass) =
            isotope_cosine_and_mono_mass(&mut group, &per_isotope, averagine);
        group.isotope_cosine_score = cosine_score;
        if group.isotope_cosine_score <= config.isotope_cosine_threshold {
            continue;
        }

        group.monoisotopic_mass = mono_mass;
        group.intensity = per_charge.iter().sum();
        filtered.push(group);
    }

    if let Some(max_mass_count) = config.max_mass_count {
        if filtered.len() > max_mass_count {
            filtered.sort_by(|a, b| b.intensity.total_cmp(&a.intensity));
            filtered.truncate(max_mass_count);
        }
    }
    filtered
}
