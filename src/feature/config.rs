//! Typed configuration of the feature finder, bound from the parameter
//! registry and cross-validated at construction.

use crate::feature::error::FeatureFinderError;
use crate::params::Params;

/// Elution profile model used for the RT fit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RtShape {
    /// Symmetric Gaussian profile
    #[default]
    Symmetric,
    /// Asymmetric exponential-Gaussian hybrid profile
    Asymmetric,
}

/// The m/z value reported for a feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportedMz {
    /// Average m/z of the theoretically most intense mass trace
    Maximum,
    /// Intensity-weighted mean over all contained peaks
    Average,
    /// Monoisotopic m/z derived from the fitted isotope model
    #[default]
    Monoisotopic,
}

/// Validated feature finder configuration.
///
/// Percentages from the registry are stored as fractions, and
/// `mass_trace:min_spectra` is halved into the working window
/// [`Self::min_spectra`] that all trace operations use.
#[derive(Debug, Clone)]
pub struct FeatureFinderConfig {
    /// Number of intensity grid bins per dimension (`intensity:bins`)
    pub intensity_bins: usize,
    /// m/z tolerance for isotope pattern matching (`mass_trace:mz_tolerance`)
    pub pattern_tolerance: f64,
    /// m/z tolerance for mass trace membership (`isotopic_pattern:mz_tolerance`)
    pub trace_tolerance: f64,
    /// Working spectra window: half of `mass_trace:min_spectra`
    pub min_spectra: usize,
    /// Tolerated consecutive missing trace peaks (`mass_trace:max_missing`)
    pub max_missing_trace_peaks: usize,
    /// Slope bound for trace extension (`mass_trace:slope_bound`)
    pub slope_bound: f64,
    /// Lowest charge searched (`isotopic_pattern:charge_low`)
    pub charge_low: i32,
    /// Highest charge searched (`isotopic_pattern:charge_high`)
    pub charge_high: i32,
    /// Mandatory-isotope threshold, fraction (`isotopic_pattern:intensity_percentage`)
    pub intensity_percentage: f64,
    /// Optional-isotope threshold, fraction (`isotopic_pattern:intensity_percentage_optional`)
    pub intensity_percentage_optional: f64,
    /// Required relative fit improvement to drop optional peaks, fraction
    pub optional_fit_improvement: f64,
    /// Width of the isotope pattern mass windows in Da
    pub mass_window_width: f64,
    /// Fraction of C-12 among carbon (`isotopic_pattern:abundance_12C`)
    pub abundance_12c: f64,
    /// Fraction of N-14 among nitrogen (`isotopic_pattern:abundance_14N`)
    pub abundance_14n: f64,
    /// Minimum overall score for automatic seeds (`seed:min_score`)
    pub seed_min_score: f64,
    /// Maximum Levenberg-Marquardt iterations (`fit:max_iterations`)
    pub max_iterations: usize,
    /// Absolute convergence epsilon of the fit (`fit:epsilon_abs`)
    pub epsilon_abs: f64,
    /// Relative convergence epsilon of the fit (`fit:epsilon_rel`)
    pub epsilon_rel: f64,
    /// Minimum final feature score (`feature:min_score`)
    pub min_feature_score: f64,
    /// Minimum isotope fit before model fitting (`feature:min_isotope_fit`)
    pub min_isotope_fit: f64,
    /// Minimum per-trace score after the fit (`feature:min_trace_score`)
    pub min_trace_score: f64,
    /// Minimum RT span fraction remaining after cropping (`feature:min_rt_span`)
    pub min_rt_span: f64,
    /// Maximum fitted RT span relative to the extended region (`feature:max_rt_span`)
    pub max_rt_span: f64,
    /// Elution profile model (`feature:rt_shape`)
    pub rt_shape: RtShape,
    /// Maximum allowed feature intersection (`feature:max_intersection`)
    pub max_feature_intersection: f64,
    /// Reported feature m/z (`feature:reported_mz`)
    pub reported_mz: ReportedMz,
    /// RT tolerance around user seeds (`user-seed:rt_tolerance`)
    pub user_rt_tolerance: f64,
    /// m/z tolerance around user seeds (`user-seed:mz_tolerance`)
    pub user_mz_tolerance: f64,
    /// Seed score cutoff in user-seed mode (`user-seed:min_score`)
    pub user_seed_min_score: f64,
}

impl Default for FeatureFinderConfig {
    fn default() -> Self {
        Self {
            intensity_bins: 10,
            pattern_tolerance: 0.03,
            trace_tolerance: 0.03,
            min_spectra: 5,
            max_missing_trace_peaks: 1,
            slope_bound: 0.1,
            charge_low: 1,
            charge_high: 4,
            intensity_percentage: 0.10,
            intensity_percentage_optional: 0.001,
            optional_fit_improvement: 0.02,
            mass_window_width: 25.0,
            abundance_12c: 0.9893,
            abundance_14n: 0.99632,
            seed_min_score: 0.8,
            max_iterations: 500,
            epsilon_abs: 0.0001,
            epsilon_rel: 0.0001,
            min_feature_score: 0.7,
            min_isotope_fit: 0.8,
            min_trace_score: 0.5,
            min_rt_span: 0.333,
            max_rt_span: 2.5,
            rt_shape: RtShape::Symmetric,
            max_feature_intersection: 0.35,
            reported_mz: ReportedMz::Monoisotopic,
            user_rt_tolerance: 5.0,
            user_mz_tolerance: 1.1,
            user_seed_min_score: 0.5,
        }
    }
}

impl FeatureFinderConfig {
    /// Bind and validate the configuration from a parameter registry
    pub fn from_params(params: &Params) -> Result<Self, FeatureFinderError> {
        let charge_low = params.get_int("isotopic_pattern:charge_low")? as i32;
        let charge_high = params.get_int("isotopic_pattern:charge_high")? as i32;

        let rt_shape = match params.get_str("feature:rt_shape")? {
            "asymmetric" => RtShape::Asymmetric,
            _ => RtShape::Symmetric,
        };
        let reported_mz = match params.get_str("feature:reported_mz")? {
            "maximum" => ReportedMz::Maximum,
            "average" => ReportedMz::Average,
            _ => ReportedMz::Monoisotopic,
        };

        let config = Self {
            intensity_bins: params.get_int("intensity:bins")? as usize,
            pattern_tolerance: params.get_float("mass_trace:mz_tolerance")?,
            trace_tolerance: params.get_float("isotopic_pattern:mz_tolerance")?,
            min_spectra: (params.get_int("mass_trace:min_spectra")? as f64 * 0.5).floor() as usize,
            max_missing_trace_peaks: params.get_int("mass_trace:max_missing")? as usize,
            slope_bound: params.get_float("mass_trace:slope_bound")?,
            charge_low,
            charge_high,
            intensity_percentage: params.get_float("isotopic_pattern:intensity_percentage")? / 100.0,
            intensity_percentage_optional: params
                .get_float("isotopic_pattern:intensity_percentage_optional")?
                / 100.0,
            optional_fit_improvement: params
                .get_float("isotopic_pattern:optional_fit_improvement")?
                / 100.0,
            mass_window_width: params.get_float("isotopic_pattern:mass_window_width")?,
            abundance_12c: params.get_float("isotopic_pattern:abundance_12C")? / 100.0,
            abundance_14n: params.get_float("isotopic_pattern:abundance_14N")? / 100.0,
            seed_min_score: params.get_float("seed:min_score")?,
            max_iterations: params.get_int("fit:max_iterations")? as usize,
            epsilon_abs: params.get_float("fit:epsilon_abs")?,
            epsilon_rel: params.get_float("fit:epsilon_rel")?,
            min_feature_score: params.get_float("feature:min_score")?,
            min_isotope_fit: params.get_float("feature:min_isotope_fit")?,
            min_trace_score: params.get_float("feature:min_trace_score")?,
            min_rt_span: params.get_float("feature:min_rt_span")?,
            max_rt_span: params.get_float("feature:max_rt_span")?,
            rt_shape,
            max_feature_intersection: params.get_float("feature:max_intersection")?,
            reported_mz,
            user_rt_tolerance: params.get_float("user-seed:rt_tolerance")?,
            user_mz_tolerance: params.get_float("user-seed:mz_tolerance")?,
            user_seed_min_score: params.get_float("user-seed:min_score")?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Cross-field validation
    pub fn validate(&self) -> Result<(), FeatureFinderError> {
        if self.charge_low > self.charge_high {
            return Err(FeatureFinderError::InvalidParameter(format!(
                "isotopic_pattern:charge_low ({}) must not exceed isotopic_pattern:charge_high ({}); the charge range is empty",
                self.charge_low, self.charge_high
            )));
        }
        if self.min_spectra == 0 {
            return Err(FeatureFinderError::InvalidParameter(
                "mass_trace:min_spectra must be at least 2 (the working window is half of it)"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// Number of charge states searched
    pub fn charge_count(&self) -> usize {
        (self.charge_high - self.charge_low + 1) as usize
    }

    /// Track index of a charge within the per-charge score arrays
    pub fn charge_index(&self, charge: i32) -> usize {
        (charge - self.charge_low) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::feature_finder_defaults;

    #[test]
    fn test_defaults_bind() {
        let config = FeatureFinderConfig::from_params(&feature_finder_defaults()).unwrap();
        assert_eq!(config.intensity_bins, 10);
        assert_eq!(config.min_spectra, 5);
        assert_eq!(config.charge_count(), 4);
        assert_eq!(config.intensity_percentage, 0.1);
        assert_eq!(config.intensity_percentage_optional, 0.001);
        assert_eq!(config.rt_shape, RtShape::Symmetric);
        assert_eq!(config.reported_mz, ReportedMz::Monoisotopic);
    }

    #[test]
    fn test_empty_charge_range_rejected() {
        let mut params = feature_finder_defaults();
        params.set_value("isotopic_pattern:charge_low", 4i64).unwrap();
        params.set_value("isotopic_pattern:charge_high", 1i64).unwrap();
        let err = FeatureFinderConfig::from_params(&params).unwrap_err();
        assert!(err.to_string().starts_with("InvalidParameter"));
    }

    #[test]
    fn test_min_spectra_halved() {
        let mut params = feature_finder_defaults();
        params.set_value("mass_trace:min_spectra", 7i64).unwrap();
        let config = FeatureFinderConfig::from_params(&params).unwrap();
        assert_eq!(config.min_spectra, 3);
    }
}
