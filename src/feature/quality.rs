//! Feature quality gate: cropping to the fitted RT window, pruning of badly
//! fitting traces, acceptance checks and feature construction.

use crate::feature::config::{FeatureFinderConfig, ReportedMz};
use crate::feature::error::FeatureFinderError;
use crate::feature::fit::{ProfileFitter, TraceFitter};
use crate::feature::traces::{MassTrace, MassTraces};
use crate::feature::types::{EghMeta, Feature};
use crate::feature::scoring::pearson;
use crate::isotopes::{IsotopePatternTable, TheoreticalIsotopePattern, PROTON_MASS};

/// Abort reason: model wider than allowed
pub const ABORT_MODEL_TOO_WIDE: &str = "Invalid fit: Fitted model is bigger than 'max_rt_span'";
/// Abort reason: bundle invalid after cropping
pub const ABORT_INVALID_AFTER_FIT: &str =
    "Invalid feature after fit - too few traces or peaks left";
/// Abort reason: fitted center outside the cropped envelope
pub const ABORT_CENTER_OUTSIDE: &str = "Invalid fit: Center outside of feature bounds";
/// Abort reason: cropped envelope narrower than allowed
pub const ABORT_TOO_NARROW: &str = "Invalid fit: Less than 'min_rt_span' left after fit";
/// Abort reason: final score below the feature threshold
pub const ABORT_LOW_QUALITY: &str = "Feature quality too low after fit";

/// Score components of an accepted feature
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureQuality {
    /// Deviation-based component: `max(0, 1 - mean relative deviation)`
    pub fit_score: f64,
    /// Model/observation correlation component
    pub correlation: f64,
    /// `sqrt(correlation * fit_score)`
    pub final_score: f64,
}

/// Outcome of the acceptance checks
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QualityCheck {
    /// All checks passed
    Ok(FeatureQuality),
    /// A check failed with the given reason
    Failed(&'static str),
}

/// Crop the traces to the fitted RT window and prune badly fitting traces.
///
/// Every surviving trace must keep at least 3 peaks and a per-trace score
/// of `sqrt(correlation * max(0, 1 - deviation/peaks))` of at least
/// `min_trace_score`. A pruned trace before the anchor discards all earlier
/// traces; pruning the anchor empties the bundle; a pruned trace after the
/// anchor stops the scan.
pub fn crop_feature(
    fitter: &ProfileFitter,
    traces: &MassTraces,
    min_trace_score: f64,
) -> MassTraces {
    let low_bound = fitter.lower_rt_bound();
    let high_bound = fitter.upper_rt_bound();

    let mut new_traces = MassTraces::new();
    for (t, trace) in traces.traces.iter().enumerate() {
        let mut new_trace = MassTrace::default();
        let mut deviation = 0.0;
        let mut v_theo = Vec::new();
        let mut v_real = Vec::new();
        for (k, peak) in trace.peaks.iter().enumerate() {
            if peak.rt >= low_bound && peak.rt <= high_bound {
                new_trace.peaks.push(*peak);
                let theo = traces.baseline + fitter.compute_theoretical(trace, k);
                v_theo.push(theo);
                let real = peak.intensity as f64;
                v_real.push(real);
                deviation += (real - theo).abs() / theo;
            }
        }

        let mut final_score = 0.0;
        if !new_trace.peaks.is_empty() {
            let fit_score = deviation / new_trace.peaks.len() as f64;
            // NaN from a constant vector maps to 0 via max
            let correlation = pearson(&v_theo, &v_real).max(0.0);
            final_score = (correlation * (1.0 - fit_score).max(0.0)).sqrt();
        }

        if !new_trace.is_valid() || final_score < min_trace_score {
            if t < traces.max_trace {
                // the monoisotopic side may be truncated but not gapped
                new_traces = MassTraces::new();
                continue;
            } else if t == traces.max_trace {
                new_traces = MassTraces::new();
                break;
            }
            break; // no more traces are possible
        }

        new_trace.theoretical_int = trace.theoretical_int;
        new_traces.push(new_trace);
        if t == traces.max_trace {
            new_traces.max_trace = new_traces.len() - 1;
        }
    }
    new_traces.baseline = traces.baseline;
    new_traces
}

/// Run the acceptance checks of the cropped bundle
pub fn check_feature_quality(
    fitter: &ProfileFitter,
    traces: &MassTraces,
    seed_mz: f64,
    config: &FeatureFinderConfig,
) -> Result<QualityCheck, FeatureFinderError> {
    // fitted model must not exceed 'max_rt_span' of the extended region
    if fitter.check_maximal_rt_span(config.max_rt_span) {
        return Ok(QualityCheck::Failed(ABORT_MODEL_TOO_WIDE));
    }

    if !traces.is_valid(seed_mz, config.trace_tolerance) {
        return Ok(QualityCheck::Failed(ABORT_INVALID_AFTER_FIT));
    }

    let rt_bounds = traces.rt_bounds()?;
    if fitter.center() < rt_bounds.0 || fitter.center() > rt_bounds.1 {
        return Ok(QualityCheck::Failed(ABORT_CENTER_OUTSIDE));
    }

    if fitter.check_minimal_rt_span(rt_bounds, config.min_rt_span) {
        return Ok(QualityCheck::Failed(ABORT_TOO_NARROW));
    }

    // whole-feature score over all peaks of all surviving traces
    let mut v_theo = Vec::new();
    let mut v_real = Vec::new();
    let mut deviation = 0.0;
    for trace in &traces.traces {
        for (k, peak) in trace.peaks.iter().enumerate() {
            let theo = traces.baseline + fitter.compute_theoretical(trace, k);
            v_theo.push(theo);
            let real = peak.intensity as f64;
            v_real.push(real);
            deviation += (real - theo).abs() / theo;
        }
    }
    let fit_score = (1.0 - deviation / traces.peak_count() as f64).max(0.0);
    let correlation = pearson(&v_theo, &v_real).max(0.0);
    let final_score = (correlation * fit_score).sqrt();

    if final_score < config.min_feature_score {
        return Ok(QualityCheck::Failed(ABORT_LOW_QUALITY));
    }

    Ok(QualityCheck::Ok(FeatureQuality {
        fit_score,
        correlation,
        final_score,
    }))
}

/// Build the feature record from an accepted bundle and fit
pub fn build_feature(
    fitter: &ProfileFitter,
    traces: &MassTraces,
    theoretical: &TheoreticalIsotopePattern,
    charge: i32,
    quality: FeatureQuality,
    config: &FeatureFinderConfig,
    table: &IsotopePatternTable,
) -> Result<Feature, FeatureFinderError> {
    let theoretical_max = traces.theoretical_max()?;

    let mz = match config.reported_mz {
        ReportedMz::Maximum => traces[theoretical_max].avg_mz(),
        ReportedMz::Average => {
            let mut total_intensity = 0.0;
            let mut average_mz = 0.0;
            for trace in &traces.traces {
                for peak in &trace.peaks {
                    average_mz += peak.mz * peak.intensity as f64;
                    total_intensity += peak.intensity as f64;
                }
            }
            average_mz / total_intensity
        }
        ReportedMz::Monoisotopic => {
            traces[theoretical_max].avg_mz()
                - (PROTON_MASS / charge as f64)
                    * (theoretical_max + theoretical.trimmed_left) as f64
        }
    };

    // the model excludes the baseline; the pattern maximum undoes the
    // scaling of the theoretical intensities
    let intensity = fitter.area() / table.for_mass(mz).max_value;

    let egh = if fitter.is_asymmetric() {
        Some(EghMeta {
            tau: fitter.tau(),
            height: fitter.height(),
            sigma: fitter.sigma(),
        })
    } else {
        None
    };

    let convex_hulls = traces
        .traces
        .iter()
        .filter_map(MassTrace::convex_hull)
        .collect();

    Ok(Feature {
        label: 0, // assigned in the sequential resolution step
        rt: fitter.center(),
        mz,
        intensity,
        charge,
        width: fitter.fwhm(),
        overall_quality: quality.final_score,
        fit_score: quality.fit_score,
        correlation: quality.correlation,
        egh,
        convex_hulls,
        subordinates: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::config::RtShape;
    use crate::feature::fit::FitOptions;
    use crate::feature::traces::TracePeak;
    use crate::isotopes::AveragineModel;

    /// Two-trace Gaussian bundle fitted with the symmetric model
    fn fitted_bundle() -> (ProfileFitter, MassTraces) {
        let mut traces = MassTraces::new();
        for &(scale, mz) in &[(1.0, 500.0), (0.55, 500.5)] {
            let mut trace = MassTrace::default();
            trace.theoretical_int = scale;
            for i in 0..30 {
                let rt = i as f64;
                let intensity = 5.0 + scale * 1000.0 * (-0.5 * ((rt - 15.0) / 2.0f64).powi(2)).exp();
                trace.peaks.push(TracePeak {
                    rt,
                    mz,
                    intensity: intensity as f32,
                });
            }
            traces.push(trace);
        }
        traces.max_trace = 0;
        traces.baseline = 5.0;

        let mut fitter = ProfileFitter::for_shape(RtShape::Symmetric);
        fitter.fit(&traces, &FitOptions::default());
        (fitter, traces)
    }

    #[test]
    fn test_crop_keeps_fitted_window() {
        let (fitter, traces) = fitted_bundle();
        let cropped = crop_feature(&fitter, &traces, 0.5);
        assert_eq!(cropped.len(), 2);
        let bounds = cropped.rt_bounds().unwrap();
        assert!(bounds.0 >= fitter.lower_rt_bound() - 1e-9);
        assert!(bounds.1 <= fitter.upper_rt_bound() + 1e-9);
        assert_eq!(cropped.baseline, traces.baseline);
    }

    #[test]
    fn test_crop_drops_bad_trailing_trace() {
        let (fitter, mut traces) = fitted_bundle();
        // append a noise trace after the anchor that cannot fit the model
        let mut noise = MassTrace::default();
        noise.theoretical_int = 0.2;
        for i in 0..30 {
            noise.peaks.push(TracePeak {
                rt: i as f64,
                mz: 501.0,
                intensity: if i % 2 == 0 { 2000.0 } else { 1.0 },
            });
        }
        traces.push(noise);
        let cropped = crop_feature(&fitter, &traces, 0.5);
        assert_eq!(cropped.len(), 2);
    }

    #[test]
    fn test_crop_aborts_when_anchor_fails() {
        let (fitter, mut traces) = fitted_bundle();
        // ruin the anchor trace
        for peak in &mut traces.traces[0].peaks {
            peak.intensity = if peak.rt as usize % 2 == 0 { 3000.0 } else { 1.0 };
        }
        let cropped = crop_feature(&fitter, &traces, 0.5);
        assert!(cropped.is_empty());
    }

    #[test]
    fn test_quality_check_accepts_good_feature() {
        let (fitter, traces) = fitted_bundle();
        let cropped = crop_feature(&fitter, &traces, 0.5);
        let config = FeatureFinderConfig::default();
        match check_feature_quality(&fitter, &cropped, 500.0, &config).unwrap() {
            QualityCheck::Ok(quality) => {
                assert!(quality.final_score >= config.min_feature_score);
                assert!(quality.correlation > 0.9);
            }
            QualityCheck::Failed(reason) => panic!("rejected: {reason}"),
        }
    }

    #[test]
    fn test_quality_check_rejects_missing_seed() {
        let (fitter, traces) = fitted_bundle();
        let cropped = crop_feature(&fitter, &traces, 0.5);
        let config = FeatureFinderConfig::default();
        // a seed m/z far from every trace invalidates the bundle
        match check_feature_quality(&fitter, &cropped, 777.0, &config).unwrap() {
            QualityCheck::Failed(reason) => assert_eq!(reason, ABORT_INVALID_AFTER_FIT),
            QualityCheck::Ok(_) => panic!("feature with missing seed accepted"),
        }
    }

    #[test]
    fn test_build_feature_reported_mz_variants() {
        let (fitter, traces) = fitted_bundle();
        let cropped = crop_feature(&fitter, &traces, 0.5);
        let model = AveragineModel::natural(20);
        let table = IsotopePatternTable::build(&model, 4000.0, 25.0, 0.1, 0.001);
        let theoretical = table.for_mass(1000.0).clone();
        let quality = FeatureQuality {
            fit_score: 0.9,
            correlation: 0.95,
            final_score: 0.92,
        };

        let mut config = FeatureFinderConfig::default();
        config.reported_mz = ReportedMz::Maximum;
        let f = build_feature(&fitter, &cropped, &theoretical, 2, quality, &config, &table).unwrap();
        assert!((f.mz - 500.0).abs() < 0.01);
        assert_eq!(f.charge, 2);
        assert_eq!(f.convex_hulls.len(), 2);
        assert!((f.rt - fitter.center()).abs() < 1e-12);
        assert!((f.width - fitter.fwhm()).abs() < 1e-12);

        config.reported_mz = ReportedMz::Monoisotopic;
        let f = build_feature(&fitter, &cropped, &theoretical, 2, quality, &config, &table).unwrap();
        let expected = 500.0 - (PROTON_MASS / 2.0) * theoretical.trimmed_left as f64;
        assert!((f.mz - expected).abs() < 0.01);

        config.reported_mz = ReportedMz::Average;
        let f = build_feature(&fitter, &cropped, &theoretical, 2, quality, &config, &table).unwrap();
        assert!(f.mz > 500.0 && f.mz < 500.5);
    }
}
