//! Value types of the deconvolution engine.

use crate::isotopes::{C13C12_MASS_DIFF, PROTON_MASS};
use crate::map::Peak;

/// A peak lifted into logarithmic m/z space with a charge assignment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogMzPeak {
    /// Original m/z
    pub mz: f64,
    /// Original intensity
    pub intensity: f32,
    /// `ln(mz - proton mass)`
    pub log_mz: f64,
    /// Assigned charge (0 before assignment)
    pub charge: i32,
    /// Assigned isotope index relative to the monoisotopic peak
    pub isotope_index: i32,
}

/// `ln(mz - proton mass)`
pub fn log_mz(mz: f64) -> f64 {
    (mz - PROTON_MASS).ln()
}

impl LogMzPeak {
    /// Lift a raw peak without charge assignment
    pub fn new(peak: &Peak) -> Self {
        Self {
            mz: peak.mz,
            intensity: peak.intensity,
            log_mz: log_mz(peak.mz),
            charge: 0,
            isotope_index: 0,
        }
    }

    /// Lift a raw peak with a charge and isotope assignment
    pub fn with_assignment(peak: &Peak, charge: i32, isotope_index: i32) -> Self {
        Self {
            charge,
            isotope_index,
            ..Self::new(peak)
        }
    }

    /// Uncharged mass implied by the charge assignment
    pub fn mass(&self) -> f64 {
        self.log_mz.exp() * self.charge as f64
    }

    /// Mass shifted down to the monoisotopic isotopologue
    pub fn monoisotopic_mass(&self) -> f64 {
        self.mass() - self.isotope_index as f64 * C13C12_MASS_DIFF
    }
}

/// A deconvoluted mass candidate: all peaks of one monoisotopic mass in one
/// spectrum, across charges and isotopologues
#[derive(Debug, Clone, Default)]
pub struct PeakGroup {
    /// Member peaks with charge and isotope assignments
    pub peaks: Vec<LogMzPeak>,
    /// Deconvoluted monoisotopic mass
    pub monoisotopic_mass: f64,
    /// Aggregated intensity over all member peaks
    pub intensity: f64,
    /// Charge distribution score
    pub charge_distribution_score: i32,
    /// Isotope cosine score
    pub isotope_cosine_score: f64,
    /// Running mass index over the whole run (1-based)
    pub mass_index: usize,
    /// Running index of qualified spectra (1-based)
    pub spec_index: usize,
    /// Number of masses reported in the same spectrum
    pub mass_count_in_spec: usize,
    /// Index of the source spectrum in the map
    pub spectrum_index: usize,
    /// Retention time of the source spectrum
    pub spectrum_rt: f64,
    /// Native identifier of the source spectrum
    pub native_id: String,
}

impl PeakGroup {
    /// Smallest and largest member charge
    pub fn charge_span(&self) -> (i32, i32) {
        let mut min_charge = i32::MAX;
        let mut max_charge = i32::MIN;
        for peak in &self.peaks {
            min_charge = min_charge.min(peak.charge);
            max_charge = max_charge.max(peak.charge);
        }
        (min_charge, max_charge)
    }

    /// Sort member peaks by log m/z
    pub fn sort_peaks(&mut self) {
        self.peaks.sort_by(|a, b| a.log_mz.total_cmp(&b.log_mz));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_mz_round_trip() {
        let peak = Peak {
            mz: 1000.0,
            intensity: 1.0,
        };
        let log_peak = LogMzPeak::with_assignment(&peak, 10, 0);
        // exp(ln(mz - proton)) * charge
        assert!((log_peak.mass() - (1000.0 - PROTON_MASS) * 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_monoisotopic_mass_shift() {
        let peak = Peak {
            mz: 1000.0,
            intensity: 1.0,
        };
        let log_peak = LogMzPeak::with_assignment(&peak, 10, 3);
        let expected = log_peak.mass() - 3.0 * C13C12_MASS_DIFF;
        assert!((log_peak.monoisotopic_mass() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_charge_span() {
        let peak = Peak {
            mz: 1000.0,
            intensity: 1.0,
        };
        let mut group = PeakGroup::default();
        group.peaks.push(LogMzPeak::with_assignment(&peak, 5, 0));
        group.peaks.push(LogMzPeak::with_assignment(&peak, 9, 0));
        assert_eq!(group.charge_span(), (5, 9));
    }
}
