//! Typed configuration of the deconvolution engine.

use crate::deconv::error::DeconvError;
use crate::params::Params;

/// Validated deconvolution parameters
#[derive(Debug, Clone)]
pub struct DeconvConfig {
    /// Minimum charge state (`minC`)
    pub min_charge: i32,
    /// Maximum charge state (`maxC`)
    pub max_charge: i32,
    /// Minimum mass in Da (`minM`)
    pub min_mass: f64,
    /// Maximum mass in Da (`maxM`)
    pub max_mass: f64,
    /// Tolerance in ppm (`tol`)
    pub tolerance_ppm: f64,
    /// Peaks at or below this intensity are ignored (`minInt`)
    pub min_intensity: f64,
    /// Minimum number of continuous charge peak pairs per mass (`minCC`)
    pub min_continuous_charge_peak_pairs: usize,
    /// Minimum continuous isotope count (`minIC`)
    pub min_continuous_isotopes: usize,
    /// Maximum tracked isotope count (`maxIC`)
    pub max_isotope_count: usize,
    /// Keep only the top-intensity masses per spectrum (`maxMC`)
    pub max_mass_count: Option<usize>,
    /// Minimum isotope cosine score (`minIsoScore`)
    pub isotope_cosine_threshold: f64,
    /// Minimum charge distribution score (`minCDScore`)
    pub charge_distribution_score_threshold: i32,
    /// Harmonic denominators checked during mass bin qualification
    pub harmonic_charges: Vec<u32>,
}

impl Default for DeconvConfig {
    fn default() -> Self {
        Self {
            min_charge: 2,
            max_charge: 60,
            min_mass: 1000.0,
            max_mass: 100_000.0,
            tolerance_ppm: 5.0,
            min_intensity: 0.0,
            min_continuous_charge_peak_pairs: 3,
            min_continuous_isotopes: 3,
            max_isotope_count: 100,
            max_mass_count: None,
            isotope_cosine_threshold: 0.5,
            charge_distribution_score_threshold: 1,
            harmonic_charges: vec![2, 3, 5, 7],
        }
    }
}

impl DeconvConfig {
    /// Bind and validate the configuration from a parameter registry
    pub fn from_params(params: &Params) -> Result<Self, DeconvError> {
        let max_mass_count = params.get_int("maxMC")?;
        let config = Self {
            min_charge: params.get_int("minC")? as i32,
            max_charge: params.get_int("maxC")? as i32,
            min_mass: params.get_float("minM")?,
            max_mass: params.get_float("maxM")?,
            tolerance_ppm: params.get_float("tol")?,
            min_intensity: params.get_float("minInt")?,
            min_continuous_charge_peak_pairs: params.get_int("minCC")? as usize,
            min_continuous_isotopes: params.get_int("minIC")? as usize,
            max_isotope_count: params.get_int("maxIC")? as usize,
            max_mass_count: (max_mass_count >= 0).then_some(max_mass_count as usize),
            isotope_cosine_threshold: params.get_float("minIsoScore")?,
            charge_distribution_score_threshold: params.get_int("minCDScore")? as i32,
            harmonic_charges: vec![2, 3, 5, 7],
        };
        config.validate()?;
        Ok(config)
    }

    /// Cross-field validation
    pub fn validate(&self) -> Result<(), DeconvError> {
        if self.min_charge < 1 {
            return Err(DeconvError::InvalidParameter(
                "minC must be at least 1".to_string(),
            ));
        }
        if self.min_charge > self.max_charge {
            return Err(DeconvError::InvalidParameter(format!(
                "minC ({}) must not exceed maxC ({}); the charge range is empty",
                self.min_charge, self.max_charge
            )));
        }
        if self.charge_range() <= self.min_continuous_charge_peak_pairs + 1 {
            return Err(DeconvError::InvalidParameter(format!(
                "the charge range ({}) must exceed minCC + 1 ({})",
                self.charge_range(),
                self.min_continuous_charge_peak_pairs + 1
            )));
        }
        if self.min_mass <= 0.0 || self.max_mass <= self.min_mass {
            return Err(DeconvError::InvalidParameter(format!(
                "the mass range [{}, {}] is empty",
                self.min_mass, self.max_mass
            )));
        }
        if self.tolerance_ppm <= 0.0 {
            return Err(DeconvError::InvalidParameter(
                "tol must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Tolerance as a fraction
    pub fn tolerance(&self) -> f64 {
        self.tolerance_ppm * 1e-6
    }

    /// Bin width of the logarithmic bin spaces
    pub fn bin_width(&self) -> f64 {
        2.0 / self.tolerance()
    }

    /// Number of charge states searched
    pub fn charge_range(&self) -> usize {
        (self.max_charge - self.min_charge + 1) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::deconvolution_defaults;

    #[test]
    fn test_defaults_bind() {
        let config = DeconvConfig::from_params(&deconvolution_defaults()).unwrap();
        assert_eq!(config.min_charge, 2);
        assert_eq!(config.charge_range(), 59);
        assert_eq!(config.max_mass_count, None);
        assert_eq!(config.tolerance(), 5e-6);
        assert_eq!(config.bin_width(), 2.0 / 5e-6);
    }

    #[test]
    fn test_max_mass_count_binding() {
        let mut params = deconvolution_defaults();
        params.set_value("maxMC", 50i64).unwrap();
        let config = DeconvConfig::from_params(&params).unwrap();
        assert_eq!(config.max_mass_count, Some(50));
    }

    #[test]
    fn test_empty_charge_range_rejected() {
        let mut params = deconvolution_defaults();
        params.set_value("minC", 10i64).unwrap();
        params.set_value("maxC", 5i64).unwrap();
        assert!(DeconvConfig::from_params(&params).is_err());
    }

    #[test]
    fn test_narrow_charge_range_rejected() {
        let mut config = DeconvConfig::default();
        config.min_charge = 2;
        config.max_charge = 5;
        config.min_continuous_charge_peak_pairs = 3;
        assert!(config.validate().is_err());
    }
}
