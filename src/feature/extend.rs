//! Seed extension: best isotope-fit search around a seed and bidirectional
//! mass-trace extension with slope-based termination.

use crate::feature::config::FeatureFinderConfig;
use crate::feature::scoring::{find_isotope, isotope_score, position_score};
use crate::feature::traces::{MassTrace, MassTraces, TracePeak};
use crate::feature::types::{ObservedPattern, Seed};
use crate::isotopes::IsotopePatternTable;
use crate::map::PeakMap;

/// Result of the isotope-fit search around a seed
#[derive(Debug, Clone)]
pub struct IsotopeFit {
    /// Quality of the best alignment (0 when none was found)
    pub score: f64,
    /// The observed pattern of the best alignment
    pub pattern: ObservedPattern,
}

/// Find the best-fitting isotope pattern containing the seed for one charge.
///
/// Candidate start peaks are scanned linearly inside a window of
/// `(pattern size + 1) / charge` m/z units around the seed; each candidate
/// start is matched against the theoretical pattern and scored with the
/// isotope cosine. The seed peak must be part of the pattern, both before
/// and after the optional-peak search (which may remove border peaks).
pub fn find_best_isotope_fit(
    map: &PeakMap,
    seed: &Seed,
    charge: i32,
    table: &IsotopePatternTable,
    config: &FeatureFinderConfig,
) -> IsotopeFit {
    let spectrum = map.spectrum(seed.spectrum);
    let seed_mz = spectrum.peak(seed.peak).mz;
    let isotopes = table.for_mass(seed_mz * charge as f64);

    // m/z boundaries of the search space (linear search, the seed is local)
    let mass_window = (isotopes.len() + 1) as f64 / charge as f64;
    let mut end = seed.peak;
    while end + 1 < spectrum.len() && spectrum.peak(end + 1).mz < seed_mz + mass_window {
        end += 1;
    }
    let mut begin = seed.peak;
    while begin > 0 && spectrum.peak(begin - 1).mz > seed_mz - mass_window {
        begin -= 1;
    }

    let mut best = IsotopeFit {
        score: 0.0,
        pattern: ObservedPattern::new(0),
    };
    for start in begin..=end {
        let mut peak_index = start;
        let mut pattern = ObservedPattern::new(isotopes.len());
        for iso in 0..isotopes.len() {
            let pos = spectrum.peak(start).mz + iso as f64 / charge as f64;
            find_isotope(
                map,
                pos,
                seed.spectrum,
                &mut pattern,
                iso,
                &mut peak_index,
                config.pattern_tolerance,
            );
        }

        if !pattern.contains(seed.spectrum, seed.peak) {
            continue;
        }

        let score = isotope_score(
            isotopes,
            &mut pattern,
            false,
            config.min_isotope_fit,
            config.optional_fit_improvement,
        );

        // the optional-peak search may have removed the seed
        if !pattern.contains(seed.spectrum, seed.peak) {
            continue;
        }

        if score > best.score {
            best.score = score;
            best.pattern = pattern;
        }
    }
    best.pattern.theoretical = isotopes.clone();
    best
}

/// Extend all isotopologues of an accepted pattern into mass traces.
///
/// The most intense matched isotopologue is extended first without RT
/// boundaries and defines the feature region; the other isotopologues are
/// extended inside that region. A failed trace before the anchor discards
/// all earlier traces; a failed trace after the anchor stops the extension.
pub fn extend_mass_traces(
    map: &PeakMap,
    pattern: &ObservedPattern,
    charge_index: usize,
    config: &FeatureFinderConfig,
) -> MassTraces {
    let mut traces = MassTraces::new();
    traces.reserve(pattern.len());

    // anchor: the matched isotopologue with the highest intensity
    let mut max_int = 0.0f32;
    let mut max_trace_index = 0usize;
    for (p, peak_ref) in pattern.peak.iter().enumerate() {
        if let Some((s, i)) = peak_ref.found() {
            let intensity = map.spectrum(s).peak(i).intensity;
            if intensity > max_int {
                max_int = intensity;
                max_trace_index = p;
            }
        }
    }
    let Some((start_spectrum, start_peak)) = pattern.peak[max_trace_index].found() else {
        return traces;
    };

    let start = map.spectrum(start_spectrum);
    let start_mz = start.peak(start_peak).mz;
    let mut max_trace = MassTrace::starting_at(TracePeak {
        rt: start.rt,
        mz: start_mz,
        intensity: start.peak(start_peak).intensity,
    });
    extend_mass_trace(map, &mut max_trace, start_spectrum, start_mz, false, charge_index, None, config);
    extend_mass_trace(map, &mut max_trace, start_spectrum, start_mz, true, charge_index, None, config);

    let rt_min = max_trace.peaks.first().map_or(0.0, |p| p.rt);
    let rt_max = max_trace.peaks.last().map_or(0.0, |p| p.rt);

    // abort if the anchor trace is too short
    let required = (2 * config.min_spectra).saturating_sub(config.max_missing_trace_peaks);
    if !max_trace.is_valid() || max_trace.peaks.len() < required {
        log::debug!("could not extend trace with maximum intensity");
        return traces;
    }

    for p in 0..pattern.len() {
        if p == max_trace_index {
            traces.push(max_trace.clone());
            let last = traces.len() - 1;
            traces[last].theoretical_int = pattern.theoretical.intensities[p];
            traces.max_trace = last;
            continue;
        }
        let Some((mut seed_spectrum, mut seed_peak)) = pattern.peak[p].found() else {
            continue; // missing or removed during the isotope fit
        };

        // move the start to a nearby local maximum; the extension assumes
        // it starts at the maximum of the trace
        let begin = seed_spectrum.saturating_sub(config.min_spectra);
        let end = (seed_spectrum + config.min_spectra).min(map.spectrum_count());
        let mz = map.spectrum(seed_spectrum).peak(seed_peak).mz;
        let mut inte = map.spectrum(seed_spectrum).peak(seed_peak).intensity;
        for spectrum_index in begin..end {
            let candidate = map.spectrum(spectrum_index);
            let Some(peak_index) = candidate.find_nearest(mz) else {
                continue;
            };
            if candidate.peak(peak_index).intensity <= inte
                || (mz - candidate.peak(peak_index).mz).abs() >= config.pattern_tolerance
            {
                continue;
            }
            seed_spectrum = spectrum_index;
            seed_peak = peak_index;
            inte = candidate.peak(peak_index).intensity;
        }

        let seed_spec = map.spectrum(seed_spectrum);
        let trace_mz = seed_spec.peak(seed_peak).mz;
        let mut trace = MassTrace::starting_at(TracePeak {
            rt: seed_spec.rt,
            mz: trace_mz,
            intensity: seed_spec.peak(seed_peak).intensity,
        });
        let bounds = Some((rt_min, rt_max));
        extend_mass_trace(map, &mut trace, seed_spectrum, trace_mz, false, charge_index, bounds, config);
        extend_mass_trace(map, &mut trace, seed_spectrum, trace_mz, true, charge_index, bounds, config);

        if !trace.is_valid() {
            if p < max_trace_index {
                // the monoisotopic side may be truncated but not gapped
                traces.clear();
                continue;
            }
            // no gaps after the anchor either
            break;
        }
        trace.theoretical_int = pattern.theoretical.intensities[p];
        traces.push(trace);
    }
    traces
}

/// Extend a mass trace in one RT direction.
///
/// The trace is aborted when too many consecutive peaks are missing, when
/// the mean of the last `min_spectra` relative intensity deltas exceeds the
/// slope bound (overlapping elution peaks), or when a hard RT boundary is
/// crossed. With boundaries set the slope bound is doubled.
#[allow(clippy::too_many_arguments)]
pub fn extend_mass_trace(
    map: &PeakMap,
    trace: &mut MassTrace,
    spectrum_index: usize,
    mz: f64,
    increase_rt: bool,
    charge_index: usize,
    bounds: Option<(f64, f64)>,
    config: &FeatureFinderConfig,
) {
    // reverse on the second pass to keep the peaks in chronological order
    let mut index = spectrum_index as isize;
    if increase_rt {
        index += 1;
        trace.peaks.reverse();
    } else {
        index -= 1;
    }

    let current_slope_bound =
        (1.0 + bounds.is_some() as u8 as f64) * config.slope_bound;

    let delta_count = config.min_spectra;
    let mut deltas: Vec<f64> = vec![0.0; delta_count.saturating_sub(1)];

    let mut last_observed_intensity = trace
        .peaks
        .last()
        .map_or(0.0, |p| p.intensity as f64);

    let mut missing_peaks: usize = 0;
    let peaks_before_extension = trace.peaks.len();

    while index >= 0 && (index as usize) < map.spectrum_count() {
        let spectrum = map.spectrum(index as usize);
        if let Some((min_rt, max_rt)) = bounds {
            if (!increase_rt && spectrum.rt < min_rt) || (increase_rt && spectrum.rt > max_rt) {
                break; // hit the boundary
            }
        }

        let peak_index = spectrum.find_nearest(mz);
        let missing = match peak_index {
            None => true,
            Some(p) => {
                spectrum.scores.overall[charge_index][p] < 0.01
                    || position_score(mz, spectrum.peak(p).mz, config.trace_tolerance) == 0.0
            }
        };

        if missing {
            missing_peaks += 1;
            if missing_peaks > config.max_missing_trace_peaks {
                break;
            }
        } else {
            missing_peaks = 0;
            let p = peak_index.unwrap_or(0);
            let intensity = spectrum.peak(p).intensity;
            trace.peaks.push(TracePeak {
                rt: spectrum.rt,
                mz: spectrum.peak(p).mz,
                intensity,
            });

            deltas.push((intensity as f64 - last_observed_intensity) / last_observed_intensity);
            last_observed_intensity = intensity as f64;

            // abort when the intensity rises again: overlapping elution peak
            let tail = &deltas[deltas.len() - delta_count..];
            let average_delta = tail.iter().sum::<f64>() / delta_count as f64;
            if average_delta > current_slope_bound {
                // remove the peaks of the rising flank
                let added = trace.peaks.len() - peaks_before_extension;
                let remove = added.min(delta_count.saturating_sub(1));
                trace.peaks.truncate(trace.peaks.len() - remove);
                break;
            }
        }

        if increase_rt {
            index += 1;
        } else {
            index -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::types::Seed;
    use crate::isotopes::AveragineModel;
    use crate::map::{Peak, PeakMap, Spectrum};

    fn gaussian_trace_map(apex: f64, sigma: f64, count: usize, mz: f64) -> PeakMap {
        let spectra: Vec<Spectrum> = (0..count)
            .map(|i| {
                let rt = i as f64;
                let intensity = 1000.0 * (-0.5 * ((rt - apex) / sigma).powi(2)).exp();
                let mut s = Spectrum::new(rt, format!("scan={i}"));
                if intensity > 1.0 {
                    s.set_peaks(vec![Peak {
                        mz,
                        intensity: intensity as f32,
                    }]);
                }
                s
            })
            .collect();
        PeakMap::new(spectra)
    }

    fn high_overall_scores(map: &mut PeakMap) {
        map.reset_scores(1);
        for spectrum in map.spectra_mut() {
            for value in &mut spectrum.scores.overall[0] {
                *value = 1.0;
            }
        }
    }

    #[test]
    fn test_extension_recovers_profile_in_rt_order() {
        let mut map = gaussian_trace_map(15.0, 3.0, 31, 500.0);
        high_overall_scores(&mut map);
        let config = FeatureFinderConfig::default();

        let apex_index = 15;
        let mut trace = MassTrace::starting_at(TracePeak {
            rt: 15.0,
            mz: 500.0,
            intensity: map.spectrum(apex_index).peak(0).intensity,
        });
        extend_mass_trace(&map, &mut trace, apex_index, 500.0, false, 0, None, &config);
        extend_mass_trace(&map, &mut trace, apex_index, 500.0, true, 0, None, &config);

        assert!(trace.peaks.len() > 10, "got {} peaks", trace.peaks.len());
        for pair in trace.peaks.windows(2) {
            assert!(pair[0].rt < pair[1].rt, "RT order violated");
        }
    }

    #[test]
    fn test_extension_stops_at_rising_slope() {
        // two touching elution peaks: extension from the first apex must not
        // climb into the second one
        let spectra: Vec<Spectrum> = (0..40)
            .map(|i| {
                let rt = i as f64;
                let first = 1000.0 * (-0.5 * ((rt - 10.0) / 2.5f64).powi(2)).exp();
                let second = 1000.0 * (-0.5 * ((rt - 22.0) / 2.5f64).powi(2)).exp();
                let intensity = (first + second).max(1.5);
                let mut s = Spectrum::new(rt, format!("scan={i}"));
                s.set_peaks(vec![Peak {
                    mz: 500.0,
                    intensity: intensity as f32,
                }]);
                s
            })
            .collect();
        let mut map = PeakMap::new(spectra);
        high_overall_scores(&mut map);
        let config = FeatureFinderConfig::default();

        let mut trace = MassTrace::starting_at(TracePeak {
            rt: 10.0,
            mz: 500.0,
            intensity: map.spectrum(10).peak(0).intensity,
        });
        extend_mass_trace(&map, &mut trace, 10, 500.0, true, 0, None, &config);
        let last_rt = trace.peaks.last().unwrap().rt;
        assert!(last_rt < 22.0, "extension ran into the second peak (rt {last_rt})");
    }

    #[test]
    fn test_extension_respects_boundaries() {
        let mut map = gaussian_trace_map(15.0, 5.0, 31, 500.0);
        high_overall_scores(&mut map);
        let config = FeatureFinderConfig::default();

        let mut trace = MassTrace::starting_at(TracePeak {
            rt: 15.0,
            mz: 500.0,
            intensity: map.spectrum(15).peak(0).intensity,
        });
        let bounds = Some((12.0, 18.0));
        extend_mass_trace(&map, &mut trace, 15, 500.0, false, 0, bounds, &config);
        extend_mass_trace(&map, &mut trace, 15, 500.0, true, 0, bounds, &config);
        for peak in &trace.peaks {
            assert!(peak.rt >= 12.0 && peak.rt <= 18.0);
        }
    }

    #[test]
    fn test_find_best_isotope_fit_locates_seed_pattern() {
        // charge-2 pattern with three isotopologues around m/z 500
        let model = AveragineModel::natural(20);
        let table = crate::isotopes::IsotopePatternTable::build(&model, 4000.0, 25.0, 0.1, 0.001);
        let theo = table.for_mass(1000.0);
        let ratios: Vec<f64> = theo.intensities.clone();

        let spectra: Vec<Spectrum> = (0..21)
            .map(|i| {
                let rt = i as f64;
                let height = 1000.0 * (-0.5 * ((rt - 10.0) / 3.0f64).powi(2)).exp();
                let mut s = Spectrum::new(rt, format!("scan={i}"));
                let mut peaks = Vec::new();
                for (iso, &ratio) in ratios.iter().enumerate() {
                    let intensity = height * ratio;
                    if intensity > 1.0 {
                        peaks.push(Peak {
                            mz: 500.0 + iso as f64 * 0.5017,
                            intensity: intensity as f32,
                        });
                    }
                }
                s.set_peaks(peaks);
                s
            })
            .collect();
        let map = PeakMap::new(spectra);
        let config = FeatureFinderConfig::default();

        let seed = Seed {
            spectrum: 10,
            peak: 0,
            intensity: map.spectrum(10).peak(0).intensity,
        };
        let fit = find_best_isotope_fit(&map, &seed, 2, &table, &config);
        assert!(fit.score > 0.8, "fit score was {}", fit.score);
        assert!(fit.pattern.contains(10, 0));
    }
}
