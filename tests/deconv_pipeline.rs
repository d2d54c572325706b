//! End-to-end deconvolution scenarios on synthetic top-down spectra.

use mzfeature::deconv::{write_tsv, DeconvConfig, DeconvError, Deconvoluter};
use mzfeature::isotopes::{DeconvAveragineTable, C13C12_MASS_DIFF, PROTON_MASS};
use mzfeature::map::{Peak, PeakMap, Spectrum};
use mzfeature::params::deconvolution_defaults;

/// A spectrum containing one species spread over a charge range, with
/// averagine-shaped isotope envelopes per charge
fn species_spectrum(
    rt: f64,
    native_id: &str,
    mass: f64,
    charges: std::ops::RangeInclusive<i32>,
    height: f64,
) -> Spectrum {
    let averagine = DeconvAveragineTable::build(1000.0, mass * 2.0, 100);
    let distribution = averagine.get(mass).to_vec();
    let center = (*charges.start() + *charges.end()) as f64 / 2.0;

    let mut peaks = Vec::new();
    for charge in charges {
        let charge_weight = 1.0 / (1.0 + (charge as f64 - center).powi(2) / 12.0);
        for (iso, &weight) in distribution.iter().enumerate() {
            if weight < 1e-3 {
                continue;
            }
            let neutral = mass + iso as f64 * C13C12_MASS_DIFF;
            peaks.push(Peak {
                mz: neutral / charge as f64 + PROTON_MASS,
                intensity: (height * charge_weight * weight) as f32,
            });
        }
    }
    let mut spectrum = Spectrum::new(rt, native_id);
    spectrum.set_peaks(peaks);
    spectrum
}

fn config() -> DeconvConfig {
    DeconvConfig {
        max_charge: 30,
        max_mass: 50_000.0,
        tolerance_ppm: 10.0,
        ..DeconvConfig::default()
    }
}

/// S4: a 10 kDa species across charges 5..20 yields one confident mass
#[test]
fn test_ten_kda_species_recovered() {
    let engine = Deconvoluter::new(config()).unwrap();
    let map = PeakMap::new(vec![species_spectrum(
        100.0,
        "scan=1",
        10_000.0,
        5..=20,
        50_000.0,
    )]);

    let run = engine.run(&map).unwrap();
    assert_eq!(run.summary.spectra, 1);
    assert_eq!(run.summary.qualified_spectra, 1);
    assert!(!run.groups.is_empty());

    let best = run
        .groups
        .iter()
        .max_by(|a, b| a.intensity.total_cmp(&b.intensity))
        .unwrap();
    assert!(
        (best.monoisotopic_mass - 10_000.0).abs() < 1.0,
        "monoisotopic mass {}",
        best.monoisotopic_mass
    );
    assert!(best.isotope_cosine_score >= 0.9, "cosine {}", best.isotope_cosine_score);
    assert!(
        best.charge_distribution_score >= 10,
        "charge distribution score {}",
        best.charge_distribution_score
    );

    let (min_charge, max_charge) = best.charge_span();
    assert!(min_charge >= 5 && max_charge <= 20);
}

/// The carry-over union lets a mass seen in previous spectra reinforce the
/// current spectrum
#[test]
fn test_cross_spectrum_carry_over() {
    let engine = Deconvoluter::new(config()).unwrap().with_num_overlapped_scans(3);
    let spectra: Vec<Spectrum> = (0..6)
        .map(|i| {
            species_spectrum(
                10.0 + i as f64,
                &format!("scan={}", i + 1),
                12_000.0,
                6..=22,
                20_000.0,
            )
        })
        .collect();
    let map = PeakMap::new(spectra);

    let run = engine.run(&map).unwrap();
    assert_eq!(run.summary.spectra, 6);
    assert!(run.summary.qualified_spectra >= 5);
    for group in &run.groups {
        assert!((group.monoisotopic_mass - 12_000.0).abs() < 2.0);
    }
}

/// Two species in one spectrum come out as two masses
#[test]
fn test_two_species_in_one_spectrum() {
    let engine = Deconvoluter::new(config()).unwrap();
    let mut spectrum = species_spectrum(50.0, "scan=1", 10_000.0, 5..=20, 50_000.0);
    for peak in species_spectrum(50.0, "scan=1", 16_000.0, 8..=24, 30_000.0).peaks() {
        spectrum.add_peak(peak.mz, peak.intensity);
    }
    let map = PeakMap::new(vec![spectrum]);

    let run = engine.run(&map).unwrap();
    let mut found_low = false;
    let mut found_high = false;
    for group in &run.groups {
        if (group.monoisotopic_mass - 10_000.0).abs() < 2.0 {
            found_low = true;
        }
        if (group.monoisotopic_mass - 16_000.0).abs() < 2.0 {
            found_high = true;
        }
    }
    assert!(found_low, "10 kDa species missing");
    assert!(found_high, "16 kDa species missing");
}

/// Masses outside [minM, maxM] are not reported
#[test]
fn test_mass_range_is_enforced() {
    let mut cfg = config();
    cfg.min_mass = 20_000.0;
    cfg.max_mass = 50_000.0;
    let engine = Deconvoluter::new(cfg).unwrap();
    let map = PeakMap::new(vec![species_spectrum(
        100.0,
        "scan=1",
        10_000.0,
        5..=20,
        50_000.0,
    )]);

    let run = engine.run(&map).unwrap();
    for group in &run.groups {
        assert!(group.monoisotopic_mass >= 19_999.0);
    }
}

/// The TSV report carries one row per mass with the full column set
#[test]
fn test_tsv_report_round_trip() {
    let engine = Deconvoluter::new(config()).unwrap();
    let map = PeakMap::new(vec![species_spectrum(
        100.0,
        "scan=7",
        10_000.0,
        5..=20,
        50_000.0,
    )]);
    let run = engine.run(&map).unwrap();

    let mut buffer = Vec::new();
    write_tsv(&mut buffer, &run.groups, "sample.mzML").unwrap();
    let text = String::from_utf8(buffer).unwrap();
    let mut lines = text.lines();
    let header = lines.next().unwrap();
    assert_eq!(header.split('\t').count(), 20);

    let rows: Vec<&str> = lines.collect();
    assert_eq!(rows.len(), run.groups.len());
    let first: Vec<&str> = rows[0].split('\t').collect();
    assert_eq!(first[2], "sample.mzML");
    assert_eq!(first[3], "scan=7");
    // nominal mass column is consistent with the exact mass column
    let exact: f64 = first[5].parse().unwrap();
    let nominal: i64 = first[6].parse().unwrap();
    assert_eq!(nominal, (exact * 0.999497 + 0.5).floor() as i64);
}

/// Invalid parameter combinations are rejected at construction
#[test]
fn test_invalid_parameters_rejected() {
    let mut params = deconvolution_defaults();
    params.set_value("minC", 10i64).unwrap();
    params.set_value("maxC", 5i64).unwrap();
    let err = DeconvConfig::from_params(&params).unwrap_err();
    assert!(matches!(err, DeconvError::InvalidParameter(_)));

    let narrow = DeconvConfig {
        min_charge: 2,
        max_charge: 5,
        ..DeconvConfig::default()
    };
    assert!(Deconvoluter::new(narrow).is_err());
}
