//! The feature finder driver: score precomputation, per-charge seed
//! selection, parallel seed extension and sequential resolution.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use rayon::prelude::*;

use crate::feature::config::FeatureFinderConfig;
use crate::feature::error::FeatureFinderError;
use crate::feature::extend::{extend_mass_traces, find_best_isotope_fit};
use crate::feature::fit::{FitOptions, ProfileFitter, TraceFitter};
use crate::feature::quality::{build_feature, check_feature_quality, crop_feature, QualityCheck};
use crate::feature::resolve::resolve_overlaps;
use crate::feature::scoring::{
    compute_intensity_scores, compute_pattern_scores, compute_trace_scores, IntensityScorer,
};
use crate::feature::types::{Feature, FeatureMap, Seed, SeedOutcome};
use crate::isotopes::{AveragineModel, ElementAbundances, IsotopePatternTable};
use crate::map::PeakMap;

/// Abort reason: no isotope pattern above the fit threshold
pub const ABORT_NO_PATTERN: &str = "Could not find good enough isotope pattern containing the seed";
/// Abort reason: the trace bundle around the seed was invalid
pub const ABORT_NO_EXTENSION: &str = "Could not extend seed";

/// A user-specified seed position
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UserSeed {
    /// Expected retention time
    pub rt: f64,
    /// Expected m/z
    pub mz: f64,
}

/// Counters reported after a run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Number of top-level features after overlap resolution
    pub features: usize,
    /// Seeds found per charge
    pub seeds_per_charge: Vec<(i32, usize)>,
    /// Abort counts per reason
    pub aborts: BTreeMap<String, usize>,
}

/// The picked feature finder
#[derive(Debug, Clone)]
pub struct FeatureFinder {
    config: FeatureFinderConfig,
    user_seeds: Vec<UserSeed>,
    cancel: Option<Arc<AtomicBool>>,
}

impl FeatureFinder {
    /// Create a finder; the configuration is validated at this point
    pub fn new(config: FeatureFinderConfig) -> Result<Self, FeatureFinderError> {
        config.validate()?;
        Ok(Self {
            config,
            user_seeds: Vec::new(),
            cancel: None,
        })
    }

    /// Restrict seeding to positions near the given user seeds
    pub fn with_user_seeds(mut self, mut seeds: Vec<UserSeed>) -> Self {
        seeds.sort_by(|a, b| a.mz.total_cmp(&b.mz));
        self.user_seeds = seeds;
        self
    }

    /// Install a cooperative cancellation flag, checked at spectrum and
    /// seed boundaries; on cancellation partial output is discarded
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// The active configuration
    pub fn config(&self) -> &FeatureFinderConfig {
        &self.config
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Run the pipeline on a map, appending accepted features to `features`
    pub fn run(
        &self,
        map: &mut PeakMap,
        features: &mut FeatureMap,
    ) -> Result<RunSummary, FeatureFinderError> {
        let config = &self.config;
        let mut summary = RunSummary::default();

        map.reset_scores(config.charge_count());

        // isotope model; long patterns are needed for non-natural abundances
        let abundances = ElementAbundances {
            carbon_12: config.abundance_12c,
            nitrogen_14: config.abundance_14n,
        };
        let max_isotopes = if abundances.is_custom() { 1020 } else { 20 };
        let model = AveragineModel::new(max_isotopes, abundances);
        let table = IsotopePatternTable::build(
            &model,
            map.max_mz() * config.charge_high as f64,
            config.mass_window_width,
            config.intensity_percentage,
            config.intensity_percentage_optional,
        );

        // Step 1: local intensity significance
        log::info!("Precalculating intensity scores");
        let scorer = IntensityScorer::new(map, config.intensity_bins);
        compute_intensity_scores(map, &scorer);
        if self.cancelled() {
            return Err(FeatureFinderError::Cancelled);
        }

        // Step 2: mass trace evidence
        log::info!("Precalculating mass trace scores");
        compute_trace_scores(map, config.min_spectra, config.trace_tolerance);
        if self.cancelled() {
            return Err(FeatureFinderError::Cancelled);
        }

        let fit_options = FitOptions {
            max_iterations: config.max_iterations,
            epsilon_abs: config.epsilon_abs,
            epsilon_rel: config.epsilon_rel,
        };

        let aborts: Mutex<HashMap<&'static str, usize>> = Mutex::new(HashMap::new());
        let mut label_counter: u64 = 0;

        // Step 3: per-charge seeding and extension
        for charge in config.charge_low..=config.charge_high {
            if self.cancelled() {
                return Err(FeatureFinderError::Cancelled);
            }
            let charge_index = config.charge_index(charge);

            log::info!("Calculating isotope pattern scores for charge {charge}");
            compute_pattern_scores(map, charge, charge_index, &table, config);

            let seeds = self.collect_seeds(map, charge_index);
            log::info!("Found {} seeds for charge {charge}.", seeds.len());
            summary.seeds_per_charge.push((charge, seeds.len()));

            // scores are read-only from here on; share the map across workers
            let map_ref: &PeakMap = map;

            // parallel extension; results keyed by seed rank for the
            // sequential containment resolution below
            let accepted: Mutex<BTreeMap<usize, Feature>> = Mutex::new(BTreeMap::new());
            let seeds_in_features: Mutex<HashMap<usize, Vec<usize>>> = Mutex::new(HashMap::new());

            seeds
                .par_iter()
                .enumerate()
                .try_for_each(|(rank, seed)| -> Result<(), FeatureFinderError> {
                    if self.cancelled() {
                        return Err(FeatureFinderError::Cancelled);
                    }
                    let outcome = self.process_seed(
                        map_ref,
                        seed,
                        charge,
                        charge_index,
                        &table,
                        &fit_options,
                    )?;
                    match outcome {
                        SeedOutcome::Aborted(reason) => {
                            log::debug!("Seed {rank} (charge {charge}) aborted: {reason}");
                            let mut aborts = aborts.lock().map_err(|_| {
                                FeatureFinderError::Precondition("abort counter lock poisoned")
                            })?;
                            *aborts.entry(reason).or_insert(0) += 1;
                        }
                        SeedOutcome::Accepted(feature) => {
                            // later (less intense) seeds inside this feature
                            // are redundant
                            let mut contained = Vec::new();
                            if let Some(bb) = feature.bounding_box() {
                                for (later_rank, later) in
                                    seeds.iter().enumerate().skip(rank + 1)
                                {
                                    let rt = map_ref.spectrum(later.spectrum).rt;
                                    let mz = map_ref.spectrum(later.spectrum).peak(later.peak).mz;
                                    if bb.encloses(rt, mz) && feature.encloses(rt, mz) {
                                        contained.push(later_rank);
                                    }
                                }
                            }
                            {
                                let mut map_guard = seeds_in_features.lock().map_err(|_| {
                                    FeatureFinderError::Precondition(
                                        "containment lock poisoned",
                                    )
                                })?;
                                map_guard.insert(rank, contained);
                            }
                            let mut accepted = accepted.lock().map_err(|_| {
                                FeatureFinderError::Precondition("feature lock poisoned")
                            })?;
                            accepted.insert(rank, *feature);
                        }
                    }
                    Ok(())
                })?;

            // sequential resolution: drop features whose seed lies inside a
            // feature of an earlier (more intense) seed, assign labels
            let accepted = accepted.into_inner().map_err(|_| {
                FeatureFinderError::Precondition("feature lock poisoned")
            })?;
            let seeds_in_features = seeds_in_features.into_inner().map_err(|_| {
                FeatureFinderError::Precondition("containment lock poisoned")
            })?;

            let mut contained_seeds: Vec<usize> = Vec::new();
            let mut candidates = 0usize;
            for (rank, mut feature) in accepted {
                if contained_seeds.contains(&rank) {
                    continue;
                }
                candidates += 1;
                feature.label = label_counter;
                label_counter += 1;
                features.push(feature);
                if let Some(contained) = seeds_in_features.get(&rank) {
                    contained_seeds.extend_from_slice(contained);
                }
            }
            log::info!("Found {candidates} feature candidates for charge {charge}.");
        }

        // Step 4: resolve contradicting and overlapping features
        resolve_overlaps(features, config.max_feature_intersection);
        log::info!("{} features left.", features.len());

        let aborts = aborts.into_inner().map_err(|_| {
            FeatureFinderError::Precondition("abort counter lock poisoned")
        })?;
        log::info!("Abort reasons during feature construction:");
        for (reason, count) in &aborts {
            log::info!("- {reason}: {count}");
        }
        summary.aborts = aborts
            .into_iter()
            .map(|(reason, count)| (reason.to_string(), count))
            .collect();
        summary.features = features.len();
        Ok(summary)
    }

    /// Collect seeds for one charge: local maxima whose overall score
    /// clears the threshold, optionally restricted to user seed positions.
    ///
    /// The first and last `min_spectra` spectra keep zero overall scores;
    /// trace extension treats those peaks as missing.
    fn collect_seeds(&self, map: &mut PeakMap, charge_index: usize) -> Vec<Seed> {
        let config = &self.config;
        let user_mode = !self.user_seeds.is_empty();
        let count = map.spectrum_count();
        let end = count - config.min_spectra.min(count);

        let mut seeds = Vec::new();
        for s in config.min_spectra..end {
            let rt = map.spectrum(s).rt;
            let spectrum = map.spectrum_mut(s);
            for p in 0..spectrum.len() {
                let overall = (spectrum.scores.trace_score[p] as f64
                    * spectrum.scores.intensity_score[p] as f64
                    * spectrum.scores.pattern[charge_index][p] as f64)
                    .cbrt();
                spectrum.scores.overall[charge_index][p] = overall as f32;

                if spectrum.scores.local_max[p] == 0.0 {
                    continue;
                }
                let mz = spectrum.peak(p).mz;
                let emit = if user_mode {
                    overall >= config.user_seed_min_score
                        && self.near_user_seed(rt, mz)
                } else {
                    overall >= config.seed_min_score
                };
                if emit {
                    seeds.push(Seed {
                        spectrum: s,
                        peak: p,
                        intensity: spectrum.peak(p).intensity,
                    });
                }
            }
        }
        seeds.sort_by(Seed::cmp_by_intensity_desc);
        seeds
    }

    /// True if a user seed lies within the configured tolerances
    fn near_user_seed(&self, rt: f64, mz: f64) -> bool {
        let start = self
            .user_seeds
            .partition_point(|seed| seed.mz < mz - self.config.user_mz_tolerance);
        self.user_seeds[start..]
            .iter()
            .take_while(|seed| seed.mz <= mz + self.config.user_mz_tolerance)
            .any(|seed| {
                (seed.mz - mz).abs() < self.config.user_mz_tolerance
                    && (seed.rt - rt).abs() < self.config.user_rt_tolerance
            })
    }

    /// Extend one seed into a feature candidate
    fn process_seed(
        &self,
        map: &PeakMap,
        seed: &Seed,
        charge: i32,
        charge_index: usize,
        table: &IsotopePatternTable,
        fit_options: &FitOptions,
    ) -> Result<SeedOutcome, FeatureFinderError> {
        let config = &self.config;
        let seed_mz = map.spectrum(seed.spectrum).peak(seed.peak).mz;

        // best fitting isotope pattern for this charge
        let fit = find_best_isotope_fit(map, seed, charge, table, config);
        if fit.score < config.min_isotope_fit {
            return Ok(SeedOutcome::Aborted(ABORT_NO_PATTERN));
        }

        // extend the pattern peaks into mass traces
        let mut traces = extend_mass_traces(map, &fit.pattern, charge_index, config);
        if !traces.is_valid(seed_mz, config.trace_tolerance) {
            return Ok(SeedOutcome::Aborted(ABORT_NO_EXTENSION));
        }

        // elution profile fit over the extended region
        traces.update_baseline();
        traces.baseline *= 0.75;
        let anchor = traces.max_trace;
        traces[anchor].update_maximum();

        let mut fitter = ProfileFitter::for_shape(config.rt_shape);
        fitter.fit(&traces, fit_options);

        // crop to the fitted RT window and run the acceptance checks
        let cropped = crop_feature(&fitter, &traces, config.min_trace_score);
        match check_feature_quality(&fitter, &cropped, seed_mz, config)? {
            QualityCheck::Failed(reason) => Ok(SeedOutcome::Aborted(reason)),
            QualityCheck::Ok(quality) => {
                let feature = build_feature(
                    &fitter,
                    &cropped,
                    &fit.pattern.theoretical,
                    charge,
                    quality,
                    config,
                    table,
                )?;
                Ok(SeedOutcome::Accepted(Box::new(feature)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_rejected_at_construction() {
        let mut config = FeatureFinderConfig::default();
        config.charge_low = 4;
        config.charge_high = 1;
        let err = FeatureFinder::new(config).unwrap_err();
        assert!(err.to_string().starts_with("InvalidParameter"));
    }

    #[test]
    fn test_empty_map_yields_no_features() {
        let finder = FeatureFinder::new(FeatureFinderConfig::default()).unwrap();
        let mut map = PeakMap::default();
        let mut features = FeatureMap::new();
        let summary = finder.run(&mut map, &mut features).unwrap();
        assert_eq!(summary.features, 0);
        assert!(features.is_empty());
    }

    #[test]
    fn test_cancellation_discards_output() {
        let flag = Arc::new(AtomicBool::new(true));
        let finder = FeatureFinder::new(FeatureFinderConfig::default())
            .unwrap()
            .with_cancel_flag(flag);
        let mut map = PeakMap::default();
        let mut features = FeatureMap::new();
        let err = finder.run(&mut map, &mut features).unwrap_err();
        assert!(matches!(err, FeatureFinderError::Cancelled));
    }

    #[test]
    fn test_user_seed_window() {
        let config = FeatureFinderConfig::default();
        let finder = FeatureFinder::new(config)
            .unwrap()
            .with_user_seeds(vec![UserSeed { rt: 100.0, mz: 500.0 }]);
        assert!(finder.near_user_seed(99.0, 500.5));
        assert!(!finder.near_user_seed(110.0, 500.5)); // RT too far
        assert!(!finder.near_user_seed(99.0, 502.0)); // m/z too far
    }
}
