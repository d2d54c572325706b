//! TSV report of deconvoluted masses and per-run counters.

use std::io::Write;

use crate::deconv::error::DeconvError;
use crate::deconv::types::PeakGroup;
use crate::isotopes::nominal_mass;

/// Counters of one deconvolution run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeconvSummary {
    /// MS1 spectra seen
    pub spectra: usize,
    /// Spectra with at least one qualified mass
    pub qualified_spectra: usize,
    /// Total qualified masses
    pub masses: usize,
}

const HEADER: [&str; 20] = [
    "MassIndex",
    "SpecIndex",
    "FileName",
    "SpecID",
    "MassCountInSpec",
    "ExactMass",
    "NominalMass",
    "PeakChargeRange",
    "PeakMinCharge",
    "PeakMaxCharge",
    "AggregatedIntensity",
    "RetentionTime",
    "PeakCount",
    "PeakMZs",
    "PeakCharges",
    "PeakMasses",
    "PeakIsotopeIndices",
    "PeakIntensities",
    "ChargeDistScore",
    "IsotopeCosineScore",
];

/// Write the peak group report as tab-separated values.
///
/// Per-peak columns are semicolon-joined lists over the member peaks,
/// sorted by log m/z.
pub fn write_tsv<W: Write>(
    writer: W,
    groups: &[PeakGroup],
    file_name: &str,
) -> Result<(), DeconvError> {
    let mut tsv = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(writer);
    tsv.write_record(HEADER)?;

    for group in groups {
        let mut group = group.clone();
        group.sort_peaks();
        let (min_charge, max_charge) = group.charge_span();

        let mzs = join_values(&group, |p| format!("{:.2}", p.mz));
        let charges = join_values(&group, |p| p.charge.to_string());
        let masses = join_values(&group, |p| format!("{:.2}", p.mass()));
        let isotope_indices = join_values(&group, |p| p.isotope_index.to_string());
        let intensities = join_values(&group, |p| format!("{:.1}", p.intensity));

        tsv.write_record([
            group.mass_index.to_string(),
            group.spec_index.to_string(),
            file_name.to_string(),
            group.native_id.clone(),
            group.mass_count_in_spec.to_string(),
            format!("{:.3}", group.monoisotopic_mass),
            nominal_mass(group.monoisotopic_mass).to_string(),
            (max_charge - min_charge + 1).to_string(),
            min_charge.to_string(),
            max_charge.to_string(),
            format!("{:.1}", group.intensity),
            group.spectrum_rt.to_string(),
            group.peaks.len().to_string(),
            mzs,
            charges,
            masses,
            isotope_indices,
            intensities,
            group.charge_distribution_score.to_string(),
            group.isotope_cosine_score.to_string(),
        ])?;
    }
    tsv.flush()?;
    Ok(())
}

fn join_values(group: &PeakGroup, mut value: impl FnMut(&crate::deconv::types::LogMzPeak) -> String) -> String {
    let mut out = String::new();
    for peak in &group.peaks {
        out.push_str(&value(peak));
        out.push(';');
    }
    out
}
