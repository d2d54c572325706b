//! # Isotope Model Module
//!
//! Averagine-based isotope distribution estimation and the precomputed
//! pattern tables used by the feature finder and the deconvolution engine.
//!
//! The averagine model predicts coarse (unit-resolution) isotope patterns as
//! a function of mass only, from the average amino-acid residue composition.
//! Each heavy-isotope channel is modeled as an independent binomial over the
//! atom count of its element and the channels are convolved, with strides of
//! 2 and 4 nucleons for the O-18 and S-34/S-36 channels.

use statrs::distribution::{Binomial, Discrete};

/// Mass of a proton in unified atomic mass units
pub const PROTON_MASS: f64 = 1.007276466879;

/// Mass difference between C-13 and C-12
pub const C13C12_MASS_DIFF: f64 = 1.0033548378;

/// Scale factor mapping an exact mass to its nominal (integer) mass
pub const NOMINAL_MASS_FACTOR: f64 = 0.999497;

/// Nominal mass of an exact mass: `round(mass * 0.999497)`
pub fn nominal_mass(mass: f64) -> i64 {
    (mass * NOMINAL_MASS_FACTOR + 0.5).floor() as i64
}

// Averagine: average amino-acid residue composition, atoms per residue mass
const AVERAGINE_RESIDUE_MASS: f64 = 111.1254;
const AVERAGINE_C: f64 = 4.9384;
const AVERAGINE_H: f64 = 7.7583;
const AVERAGINE_N: f64 = 1.3577;
const AVERAGINE_O: f64 = 1.4773;
const AVERAGINE_S: f64 = 0.0417;

// Natural heavy-isotope abundances of the modeled channels
const H2_ABUNDANCE: f64 = 0.000115;
const O17_ABUNDANCE: f64 = 0.00038;
const O18_ABUNDANCE: f64 = 0.00205;
const S33_ABUNDANCE: f64 = 0.0076;
const S34_ABUNDANCE: f64 = 0.0429;
const S36_ABUNDANCE: f64 = 0.0002;

/// Relative abundances of the light isotopes that can be re-configured
/// (labeling experiments shift them away from the natural values)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementAbundances {
    /// Fraction of C-12 among carbon (natural: 0.9893)
    pub carbon_12: f64,
    /// Fraction of N-14 among nitrogen (natural: 0.99632)
    pub nitrogen_14: f64,
}

impl Default for ElementAbundances {
    fn default() -> Self {
        Self {
            carbon_12: 0.9893,
            nitrogen_14: 0.99632,
        }
    }
}

impl ElementAbundances {
    /// True if either abundance differs from its natural value
    pub fn is_custom(&self) -> bool {
        *self != Self::default()
    }
}

/// Averagine isotope distribution estimator
#[derive(Debug, Clone)]
pub struct AveragineModel {
    max_isotopes: usize,
    abundances: ElementAbundances,
}

impl AveragineModel {
    /// Create a model truncating distributions to `max_isotopes` entries
    pub fn new(max_isotopes: usize, abundances: ElementAbundances) -> Self {
        Self {
            max_isotopes: max_isotopes.max(1),
            abundances,
        }
    }

    /// Model with natural abundances
    pub fn natural(max_isotopes: usize) -> Self {
        Self::new(max_isotopes, ElementAbundances::default())
    }

    /// Maximum number of isotopes kept per distribution
    pub fn max_isotopes(&self) -> usize {
        self.max_isotopes
    }

    /// Estimate the coarse isotope distribution of a peptide-like molecule
    /// of the given mass. The result is normalized to sum 1 and truncated to
    /// `max_isotopes` entries.
    pub fn distribution(&self, mass: f64) -> Vec<f64> {
        let residues = mass.max(0.0) / AVERAGINE_RESIDUE_MASS;
        let count = |atoms_per_residue: f64| (atoms_per_residue * residues).round() as u64;
        let c = count(AVERAGINE_C);
        let h = count(AVERAGINE_H);
        let n = count(AVERAGINE_N);
        let o = count(AVERAGINE_O);
        let s = count(AVERAGINE_S);

        let channels = [
            (c, 1.0 - self.abundances.carbon_12, 1usize),
            (h, H2_ABUNDANCE, 1),
            (n, 1.0 - self.abundances.nitrogen_14, 1),
            (o, O17_ABUNDANCE, 1),
            (o, O18_ABUNDANCE, 2),
            (s, S33_ABUNDANCE, 1),
            (s, S34_ABUNDANCE, 2),
            (s, S36_ABUNDANCE, 4),
        ];

        let mut distribution = vec![1.0];
        for &(atoms, p, stride) in &channels {
            let channel = binomial_channel(atoms, p, self.max_isotopes);
            distribution = convolve_with_stride(&distribution, &channel, stride, self.max_isotopes);
        }

        let total: f64 = distribution.iter().sum();
        if total > 0.0 {
            for value in &mut distribution {
                *value /= total;
            }
        }
        distribution
    }
}

/// Binomial pmf values of one heavy-isotope channel, truncated where the
/// remaining tail is negligible
fn binomial_channel(atoms: u64, p: f64, cap: usize) -> Vec<f64> {
    if atoms == 0 || p <= 0.0 {
        return vec![1.0];
    }
    let binomial = match Binomial::new(p, atoms) {
        Ok(b) => b,
        Err(_) => return vec![1.0],
    };
    let mean = atoms as f64 * p;
    let mut channel = Vec::new();
    let mut cumulative = 0.0;
    for k in 0..=atoms.min(cap as u64) {
        let pmf = binomial.pmf(k);
        channel.push(pmf);
        cumulative += pmf;
        if cumulative > 1.0 - 1e-12 && (k as f64) >= mean {
            break;
        }
    }
    channel
}

fn convolve_with_stride(a: &[f64], b: &[f64], stride: usize, cap: usize) -> Vec<f64> {
    if b.len() == 1 {
        return a.to_vec();
    }
    let len = (a.len() + (b.len() - 1) * stride).min(cap);
    let mut out = vec![0.0; len];
    for (j, &bv) in b.iter().enumerate() {
        if bv == 0.0 {
            continue;
        }
        let offset = j * stride;
        if offset >= len {
            break;
        }
        for (i, &av) in a.iter().enumerate() {
            let k = i + offset;
            if k >= len {
                break;
            }
            out[k] += av * bv;
        }
    }
    out
}

/// Index of the most abundant entry of a distribution
pub fn most_abundant_index(distribution: &[f64]) -> usize {
    let mut max_index = 0;
    let mut max_value = f64::NEG_INFINITY;
    for (index, &value) in distribution.iter().enumerate() {
        if value > max_value {
            max_value = value;
            max_index = index;
        }
    }
    max_index
}

/// A theoretical isotope pattern, trimmed and scaled for pattern matching
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TheoreticalIsotopePattern {
    /// Intensity contributions, scaled to a maximum of 1
    pub intensities: Vec<f64>,
    /// Number of optional peaks at the beginning of the pattern
    pub optional_begin: usize,
    /// Number of optional peaks at the end of the pattern
    pub optional_end: usize,
    /// The maximum intensity contribution before scaling to 1
    pub max_value: f64,
    /// Isotopes trimmed on the left; reconstructs the monoisotopic position
    pub trimmed_left: usize,
}

impl TheoreticalIsotopePattern {
    /// Number of isotopes in the pattern
    pub fn len(&self) -> usize {
        self.intensities.len()
    }

    /// True for an empty pattern
    pub fn is_empty(&self) -> bool {
        self.intensities.is_empty()
    }
}

/// Build one trimmed and scaled pattern from a raw distribution.
///
/// Both tails are trimmed where the contribution falls below
/// `optional_threshold`; `intensity_threshold` determines how many of the
/// remaining border peaks are optional for pattern matching.
fn build_pattern(
    mut distribution: Vec<f64>,
    intensity_threshold: f64,
    optional_threshold: f64,
) -> TheoreticalIsotopePattern {
    let original_len = distribution.len();
    let keep_from = distribution
        .iter()
        .position(|&v| v >= optional_threshold)
        .unwrap_or(original_len);
    distribution.drain(..keep_from);
    let keep_to = distribution
        .iter()
        .rposition(|&v| v >= optional_threshold)
        .map_or(0, |i| i + 1);
    distribution.truncate(keep_to);

    let mut optional_begin = 0;
    let mut optional_end = 0;
    let mut in_begin = true;
    let mut in_end = false;
    for &value in &distribution {
        if value < intensity_threshold {
            if !in_end && !in_begin {
                in_end = true;
            }
            if in_begin {
                optional_begin += 1;
            } else if in_end {
                optional_end += 1;
            }
        } else if in_begin {
            in_begin = false;
        }
    }

    let max_value = distribution.iter().copied().fold(0.0, f64::max);
    if max_value > 0.0 {
        for value in &mut distribution {
            *value /= max_value;
        }
    }

    TheoreticalIsotopePattern {
        trimmed_left: keep_from,
        intensities: distribution,
        optional_begin,
        optional_end,
        max_value,
    }
}

/// Table of theoretical isotope patterns binned by mass window
#[derive(Debug, Clone)]
pub struct IsotopePatternTable {
    patterns: Vec<TheoreticalIsotopePattern>,
    mass_window_width: f64,
}

impl IsotopePatternTable {
    /// Precompute patterns for all mass windows up to `max_mass`.
    ///
    /// `intensity_percentage` and `intensity_percentage_optional` are
    /// fractions of the total pattern intensity (0..1).
    pub fn build(
        model: &AveragineModel,
        max_mass: f64,
        mass_window_width: f64,
        intensity_percentage: f64,
        intensity_percentage_optional: f64,
    ) -> Self {
        let windows = (max_mass.max(0.0) / mass_window_width).ceil() as usize + 1;
        let patterns = (0..windows)
            .map(|index| {
                let mass = 0.5 * mass_window_width + index as f64 * mass_window_width;
                build_pattern(
                    model.distribution(mass),
                    intensity_percentage,
                    intensity_percentage_optional,
                )
            })
            .collect();
        Self {
            patterns,
            mass_window_width,
        }
    }

    /// Pattern for the window containing `mass`; masses beyond the
    /// precomputed range clamp to the last window.
    pub fn for_mass(&self, mass: f64) -> &TheoreticalIsotopePattern {
        let index = (mass.max(0.0) / self.mass_window_width).floor() as usize;
        debug_assert!(
            index < self.patterns.len(),
            "isotope pattern not precalculated for mass {mass}"
        );
        &self.patterns[index.min(self.patterns.len() - 1)]
    }

    /// Number of precomputed windows
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// True if the table holds no windows
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Precalculated averagine distributions for the deconvolution engine
#[derive(Debug, Clone)]
pub struct DeconvAveragineTable {
    distributions: Vec<Vec<f64>>,
    mass_interval: f64,
    min_mass: f64,
    max_isotope_count: usize,
}

impl DeconvAveragineTable {
    /// Build distributions from `min_mass` to `max_mass` in steps of
    /// `max(10, (max_mass - min_mass) / 100)` Da. `max_isotope_count` is
    /// clamped to the distribution size at `max_mass` minus one.
    pub fn build(min_mass: f64, max_mass: f64, max_isotope_count: usize) -> Self {
        let estimator = AveragineModel::natural(512);
        let at_max = trim_right_relative(estimator.distribution(max_mass), 0.01);
        let max_isotope_count = max_isotope_count.min(at_max.len().saturating_sub(1)).max(1);

        let model = AveragineModel::natural(max_isotope_count);
        let mass_interval = ((max_mass - min_mass) / 100.0).max(10.0);
        let mut distributions = Vec::new();
        let mut index = 0usize;
        loop {
            let mass = index as f64 * mass_interval;
            index += 1;
            if mass < min_mass {
                continue;
            }
            if mass > max_mass {
                break;
            }
            distributions.push(trim_right_relative(model.distribution(mass), 0.01));
        }
        if distributions.is_empty() {
            distributions.push(trim_right_relative(model.distribution(min_mass), 0.01));
        }
        Self {
            distributions,
            mass_interval,
            min_mass,
            max_isotope_count,
        }
    }

    /// Distribution for the given mass, clamped to the covered range
    pub fn get(&self, mass: f64) -> &[f64] {
        let index = ((mass - self.min_mass) / self.mass_interval).max(0.0) as usize;
        &self.distributions[index.min(self.distributions.len() - 1)]
    }

    /// Upper bound on isotope indices tracked by the engine
    pub fn max_isotope_count(&self) -> usize {
        self.max_isotope_count
    }
}

/// Drop trailing isotopes below `fraction` of the most abundant intensity
fn trim_right_relative(mut distribution: Vec<f64>, fraction: f64) -> Vec<f64> {
    let cutoff = distribution.iter().copied().fold(0.0, f64::max) * fraction;
    let keep = distribution
        .iter()
        .rposition(|&v| v >= cutoff)
        .map_or(0, |i| i + 1);
    distribution.truncate(keep);
    distribution
}
