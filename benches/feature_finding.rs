//! Feature finding benchmark on a synthetic centroided map.

use criterion::{criterion_group, criterion_main, Criterion};

use mzfeature::feature::types::FeatureMap;
use mzfeature::feature::{FeatureFinder, FeatureFinderConfig};
use mzfeature::isotopes::{AveragineModel, IsotopePatternTable, C13C12_MASS_DIFF};
use mzfeature::map::{Peak, PeakMap, Spectrum};

/// Map with `species` isotopic species spread over m/z and RT
fn synthetic_map(species: usize) -> PeakMap {
    let model = AveragineModel::natural(20);
    let table = IsotopePatternTable::build(&model, 4000.0, 25.0, 0.1, 0.001);

    let spectra: Vec<Spectrum> = (0..60)
        .map(|index| {
            let rt = index as f64;
            let mut peaks = Vec::new();
            for s in 0..species {
                let mono_mz = 600.0 + s as f64 * 7.0;
                let charge = 2 + (s % 2) as i32;
                let apex = 10.0 + (s as f64 * 37.0) % 40.0;
                let height = 20000.0 * (-0.5 * ((rt - apex) / 2.5f64).powi(2)).exp();
                let pattern = table.for_mass(mono_mz * charge as f64);
                for (iso, weight) in pattern.intensities.iter().take(4).enumerate() {
                    let intensity = height * weight;
                    if intensity >= 1.0 {
                        peaks.push(Peak {
                            mz: mono_mz + iso as f64 * C13C12_MASS_DIFF / charge as f64,
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

fn bench_feature_finding(c: &mut Criterion) {
    let map = synthetic_map(25);
    let finder = FeatureFinder::new(FeatureFinderConfig::default()).unwrap();

    c.bench_function("feature_finding_25_species", |b| {
        b.iter(|| {
            let mut map = map.clone();
            let mut features = FeatureMap::new();
            finder.run(&mut map, &mut features).unwrap();
            features.len()
        })
    });
}

criterion_group!(benches, bench_feature_finding);
criterion_main!(benches);
