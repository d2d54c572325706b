//! End-to-end feature finding scenarios on synthetic centroided maps.

use mzfeature::feature::types::FeatureMap;
use mzfeature::feature::{FeatureFinder, FeatureFinderConfig, FeatureFinderError, UserSeed};
use mzfeature::isotopes::{AveragineModel, IsotopePatternTable, C13C12_MASS_DIFF};
use mzfeature::map::{Peak, PeakMap, Spectrum};
use mzfeature::params::feature_finder_defaults;

/// One isotopic species with a Gaussian elution profile
struct Species {
    mono_mz: f64,
    charge: i32,
    isotope_count: usize,
    apex_rt: f64,
    sigma: f64,
    height: f64,
}

impl Species {
    /// Normalized isotope weights from the same averagine table the finder
    /// uses
    fn weights(&self) -> Vec<f64> {
        let model = AveragineModel::natural(20);
        let mass = self.mono_mz * self.charge as f64;
        let table = IsotopePatternTable::build(&model, mass * 1.5, 25.0, 0.1, 0.001);
        table
            .for_mass(mass)
            .intensities
            .iter()
            .copied()
            .take(self.isotope_count)
            .collect()
    }
}

/// Build a 30-spectra map (1 s spacing) containing the given species
fn synthetic_map(species: &[Species]) -> PeakMap {
    let weights: Vec<Vec<f64>> = species.iter().map(Species::weights).collect();
    let spectra: Vec<Spectrum> = (0..30)
        .map(|index| {
            let rt = index as f64;
            let mut peaks = Vec::new();
            for (s, species_weights) in species.iter().zip(&weights) {
                let spacing = C13C12_MASS_DIFF / s.charge as f64;
                let height = s.height * (-0.5 * ((rt - s.apex_rt) / s.sigma).powi(2)).exp();
                for (iso, weight) in species_weights.iter().enumerate() {
                    let intensity = height * weight;
                    if intensity >= 1.0 {
                        peaks.push(Peak {
                            mz: s.mono_mz + iso as f64 * spacing,
                            intensity: intensity as f32,
                        });
                    }
                }
            }
            let mut spectrum = Spectrum::new(rt, format!("scan={index}"));
            spectrum.set_peaks(peaks);
            spectrum
        })
        .collect();
    PeakMap::new(spectra)
}

/// S1: a single charge-2 peptide with three isotopologues
#[test]
fn test_single_feature_charge_two() {
    let mut map = synthetic_map(&[Species {
        mono_mz: 800.4,
        charge: 2,
        isotope_count: 3,
        apex_rt: 15.0,
        sigma: 2.0,
        height: 10000.0,
    }]);

    let finder = FeatureFinder::new(FeatureFinderConfig::default()).unwrap();
    let mut features = FeatureMap::new();
    let summary = finder.run(&mut map, &mut features).unwrap();

    assert_eq!(features.len(), 1, "summary: {summary:?}");
    let feature = &features[0];
    assert_eq!(feature.charge, 2);
    assert!((feature.rt - 15.0).abs() < 0.1, "rt {}", feature.rt);
    assert!((feature.mz - 800.4).abs() < 0.01, "mz {}", feature.mz);
    assert_eq!(feature.convex_hulls.len(), 3);
    assert!(feature.overall_quality >= 0.7);
    assert!(feature.intensity > 0.0);
    // width is the FWHM of the fitted profile: 2.3548 * sigma
    assert!((feature.width - 2.3548 * 2.0).abs() < 0.5, "width {}", feature.width);
}

/// Invariant: all per-peak overall scores stay within [0, 1]
#[test]
fn test_overall_scores_bounded() {
    let mut map = synthetic_map(&[Species {
        mono_mz: 800.4,
        charge: 2,
        isotope_count: 3,
        apex_rt: 15.0,
        sigma: 2.0,
        height: 10000.0,
    }]);
    let finder = FeatureFinder::new(FeatureFinderConfig::default()).unwrap();
    let mut features = FeatureMap::new();
    finder.run(&mut map, &mut features).unwrap();

    for spectrum in map.spectra() {
        for track in &spectrum.scores.overall {
            for &score in track.iter() {
                assert!(
                    (0.0..=1.0 + 1e-4).contains(&(score as f64)),
                    "overall score {score} out of range"
                );
            }
        }
    }
}

/// Two co-eluting species on distinct isotope ladders stay separate: their
/// trace hulls never overlap in m/z, so the resolver must not merge them
#[test]
fn test_distinct_ladders_yield_separate_features() {
    let mut map = synthetic_map(&[
        Species {
            mono_mz: 800.4,
            charge: 2,
            isotope_count: 3,
            apex_rt: 15.0,
            sigma: 2.0,
            height: 20000.0,
        },
        Species {
            mono_mz: 800.65,
            charge: 2,
            isotope_count: 3,
            apex_rt: 15.5,
            sigma: 2.0,
            height: 2000.0,
        },
    ]);

    let finder = FeatureFinder::new(FeatureFinderConfig::default()).unwrap();
    let mut features = FeatureMap::new();
    finder.run(&mut map, &mut features).unwrap();

    assert_eq!(features.len(), 2, "expected two top-level features");
    // sorted by descending intensity
    assert!((features[0].mz - 800.4).abs() < 0.01);
    assert!((features[1].mz - 800.65).abs() < 0.01);
    let ratio = features[0].intensity / features[1].intensity;
    assert!(ratio > 3.0 && ratio < 30.0, "intensity ratio {ratio}");
}

/// S2: two same-charge features sharing their mass trace strips with ~90%
/// hull overlap resolve to the intense one, the dim one becomes a
/// subordinate and keeps its intensity
#[test]
fn test_overlapping_features_absorb_weaker() {
    use mzfeature::feature::resolve::resolve_overlaps;
    use mzfeature::feature::types::ConvexHull;

    let feature = |intensity: f64, rt_lo: f64, rt_hi: f64| {
        let hulls: Vec<ConvexHull> = (0..3)
            .map(|iso| {
                let mz = 800.4 + iso as f64 * 0.5017;
                ConvexHull::from_points(&[
                    (rt_lo, mz - 0.01),
                    (rt_hi, mz - 0.01),
                    (rt_hi, mz + 0.01),
                    (rt_lo, mz + 0.01),
                ])
                .unwrap()
            })
            .collect();
        mzfeature::feature::Feature {
            label: 0,
            rt: (rt_lo + rt_hi) / 2.0,
            mz: 800.4,
            intensity,
            charge: 2,
            width: rt_hi - rt_lo,
            overall_quality: 0.9,
            fit_score: 0.9,
            correlation: 0.9,
            egh: None,
            convex_hulls: hulls,
            subordinates: Vec::new(),
        }
    };

    let mut features = FeatureMap::new();
    features.push(feature(1000.0, 10.0, 20.0));
    features.push(feature(100.0, 11.0, 21.0)); // 90% overlap, 10x dimmer
    resolve_overlaps(&mut features, 0.35);

    assert_eq!(features.len(), 1);
    let top = &features[0];
    assert_eq!(top.intensity, 1000.0);
    assert_eq!(top.subordinates.len(), 1);
    // the subordinate record keeps the 10:1 intensity ratio
    assert_eq!(top.subordinates[0].intensity, 100.0);
}

/// S3: a charge-4 species and its half-charge phantom; divisible charges
/// resolve to the higher charge
#[test]
fn test_harmonic_charges_resolve_to_higher_charge() {
    let mut map = synthetic_map(&[Species {
        mono_mz: 400.4,
        charge: 4,
        isotope_count: 5,
        apex_rt: 15.0,
        sigma: 2.0,
        height: 20000.0,
    }]);

    let finder = FeatureFinder::new(FeatureFinderConfig::default()).unwrap();
    let mut features = FeatureMap::new();
    finder.run(&mut map, &mut features).unwrap();

    assert!(!features.is_empty());
    let top = &features[0];
    assert_eq!(top.charge, 4, "the higher charge must win");
    // the phantom interpretation is kept as a subordinate
    assert!(
        top.subordinates.iter().any(|f| f.charge < 4),
        "expected a lower-charge subordinate, got {:?}",
        top.subordinates.iter().map(|f| f.charge).collect::<Vec<_>>()
    );
}

/// S5: in user-seed mode, seeds far from every user position are dropped
#[test]
fn test_user_seed_far_away_suppresses_features() {
    let mut map = synthetic_map(&[Species {
        mono_mz: 800.4,
        charge: 2,
        isotope_count: 3,
        apex_rt: 15.0,
        sigma: 2.0,
        height: 10000.0,
    }]);

    let finder = FeatureFinder::new(FeatureFinderConfig::default())
        .unwrap()
        .with_user_seeds(vec![UserSeed {
            rt: 200.0,
            mz: 800.4,
        }]);
    let mut features = FeatureMap::new();
    let summary = finder.run(&mut map, &mut features).unwrap();
    assert_eq!(features.len(), 0, "summary: {summary:?}");
}

/// A user seed near the real feature keeps it, even below the automatic
/// seed threshold
#[test]
fn test_user_seed_near_feature_keeps_it() {
    let mut map = synthetic_map(&[Species {
        mono_mz: 800.4,
        charge: 2,
        isotope_count: 3,
        apex_rt: 15.0,
        sigma: 2.0,
        height: 10000.0,
    }]);

    let finder = FeatureFinder::new(FeatureFinderConfig::default())
        .unwrap()
        .with_user_seeds(vec![UserSeed {
            rt: 14.0,
            mz: 800.5,
        }]);
    let mut features = FeatureMap::new();
    finder.run(&mut map, &mut features).unwrap();
    assert_eq!(features.len(), 1);
    assert_eq!(features[0].charge, 2);
}

/// S6: an empty charge range is rejected at construction
#[test]
fn test_inverted_charge_range_is_invalid_parameter() {
    let mut params = feature_finder_defaults();
    params.set_value("isotopic_pattern:charge_low", 4i64).unwrap();
    params.set_value("isotopic_pattern:charge_high", 1i64).unwrap();

    let err = FeatureFinderConfig::from_params(&params).unwrap_err();
    match err {
        FeatureFinderError::InvalidParameter(message) => {
            assert!(message.contains("charge_low"));
        }
        other => panic!("expected InvalidParameter, got {other}"),
    }
}

/// Feature labels are unique and assigned in the sequential step
#[test]
fn test_labels_are_unique() {
    let mut map = synthetic_map(&[
        Species {
            mono_mz: 800.4,
            charge: 2,
            isotope_count: 3,
            apex_rt: 10.0,
            sigma: 2.0,
            height: 10000.0,
        },
        Species {
            mono_mz: 900.4,
            charge: 2,
            isotope_count: 3,
            apex_rt: 20.0,
            sigma: 2.0,
            height: 10000.0,
        },
    ]);

    let finder = FeatureFinder::new(FeatureFinderConfig::default()).unwrap();
    let mut features = FeatureMap::new();
    finder.run(&mut map, &mut features).unwrap();

    assert_eq!(features.len(), 2);
    let mut labels: Vec<u64> = features.iter().map(|f| f.label).collect();
    labels.sort_unstable();
    labels.dedup();
    assert_eq!(labels.len(), 2, "labels must be unique");
}
