//! # Centroided Map Module
//!
//! In-memory data model for centroided LC-MS maps: peaks, spectra with
//! per-peak score tracks, and the map-level queries the pipelines rely on
//! (bounds, nearest-peak search, rectangular area iteration).
//!
//! Peak coordinates are immutable once a spectrum is built; the score tracks
//! are mutable and zero-initialized when scoring starts.

/// A single centroided peak
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Peak {
    /// Mass-to-charge ratio
    pub mz: f64,
    /// Signal intensity
    pub intensity: f32,
}

/// Precursor information of an MS2+ spectrum
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Precursor {
    /// Precursor m/z
    pub mz: f64,
    /// Precursor charge state
    pub charge: i16,
}

/// Parallel per-peak score tracks of a spectrum.
///
/// All tracks have length equal to the peak count of the owning spectrum.
/// `pattern` and `overall` hold one track per charge in the searched range.
#[derive(Debug, Clone, Default)]
pub struct ScoreArrays {
    /// Mass-trace evidence (mean position score across adjacent spectra)
    pub trace_score: Vec<f32>,
    /// Local intensity significance in `[0, 1]`
    pub intensity_score: Vec<f32>,
    /// 1.0 when the peak is a local maximum of its mass trace, else 0.0
    pub local_max: Vec<f32>,
    /// Per-charge isotope pattern scores
    pub pattern: Vec<Vec<f32>>,
    /// Per-charge overall scores (geometric mean of the three evidences)
    pub overall: Vec<Vec<f32>>,
}

impl ScoreArrays {
    /// Zero-initialize all tracks for `peak_count` peaks and `charge_count` charges
    pub fn reset(&mut self, peak_count: usize, charge_count: usize) {
        self.trace_score = vec![0.0; peak_count];
        self.intensity_score = vec![0.0; peak_count];
        self.local_max = vec![0.0; peak_count];
        self.pattern = vec![vec![0.0; peak_count]; charge_count];
        self.overall = vec![vec![0.0; peak_count]; charge_count];
    }
}

/// A centroided spectrum: peaks sorted by m/z plus acquisition metadata
#[derive(Debug, Clone)]
pub struct Spectrum {
    /// Retention time in seconds
    pub rt: f64,
    /// MS level (1, 2, ...)
    pub ms_level: u8,
    /// Native spectrum identifier
    pub native_id: String,
    /// Precursor of MS2+ spectra
    pub precursor: Option<Precursor>,
    peaks: Vec<Peak>,
    /// Mutable per-peak score tracks
    pub scores: ScoreArrays,
}

impl Spectrum {
    /// Create an empty MS1 spectrum at the given retention time
    pub fn new(rt: f64, native_id: impl Into<String>) -> Self {
        Self {
            rt,
            ms_level: 1,
            native_id: native_id.into(),
            precursor: None,
            peaks: Vec::new(),
            scores: ScoreArrays::default(),
        }
    }

    /// Replace the peak list; peaks are sorted by m/z
    pub fn set_peaks(&mut self, mut peaks: Vec<Peak>) {
        peaks.sort_unstable_by(|a, b| a.mz.total_cmp(&b.mz));
        self.peaks = peaks;
    }

    /// Insert a single peak, keeping the m/z order
    pub fn add_peak(&mut self, mz: f64, intensity: f32) {
        let index = self.peaks.partition_point(|p| p.mz < mz);
        self.peaks.insert(index, Peak { mz, intensity });
    }

    /// Number of peaks
    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    /// True if the spectrum holds no peaks
    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    /// Peak at the given index
    pub fn peak(&self, index: usize) -> &Peak {
        &self.peaks[index]
    }

    /// All peaks, sorted by m/z
    pub fn peaks(&self) -> &[Peak] {
        &self.peaks
    }

    /// Index of the peak nearest to `mz`, or `None` for an empty spectrum
    pub fn find_nearest(&self, mz: f64) -> Option<usize> {
        if self.peaks.is_empty() {
            return None;
        }
        let index = self.peaks.partition_point(|p| p.mz < mz);
        if index == 0 {
            return Some(0);
        }
        if index == self.peaks.len() {
            return Some(self.peaks.len() - 1);
        }
        let below = mz - self.peaks[index - 1].mz;
        let above = self.peaks[index].mz - mz;
        if below <= above {
            Some(index - 1)
        } else {
            Some(index)
        }
    }

    /// Slice of peak indices with m/z in `[mz_lo, mz_hi]`
    pub fn mz_range(&self, mz_lo: f64, mz_hi: f64) -> std::ops::Range<usize> {
        let lo = self.peaks.partition_point(|p| p.mz < mz_lo);
        let hi = self.peaks.partition_point(|p| p.mz <= mz_hi);
        lo..hi
    }
}

/// An ordered collection of spectra forming one LC-MS map
#[derive(Debug, Clone, Default)]
pub struct PeakMap {
    spectra: Vec<Spectrum>,
}

impl PeakMap {
    /// Build a map from spectra; spectra are sorted by retention time
    pub fn new(mut spectra: Vec<Spectrum>) -> Self {
        spectra.sort_by(|a, b| a.rt.total_cmp(&b.rt));
        Self { spectra }
    }

    /// Number of spectra
    pub fn spectrum_count(&self) -> usize {
        self.spectra.len()
    }

    /// Spectrum at the given index
    pub fn spectrum(&self, index: usize) -> &Spectrum {
        &self.spectra[index]
    }

    /// Mutable spectrum at the given index
    pub fn spectrum_mut(&mut self, index: usize) -> &mut Spectrum {
        &mut self.spectra[index]
    }

    /// All spectra in RT order
    pub fn spectra(&self) -> &[Spectrum] {
        &self.spectra
    }

    /// All spectra, mutable
    pub fn spectra_mut(&mut self) -> &mut [Spectrum] {
        &mut self.spectra
    }

    /// Lowest retention time (0.0 for an empty map)
    pub fn min_rt(&self) -> f64 {
        self.spectra.first().map_or(0.0, |s| s.rt)
    }

    /// Highest retention time (0.0 for an empty map)
    pub fn max_rt(&self) -> f64 {
        self.spectra.last().map_or(0.0, |s| s.rt)
    }

    /// Lowest m/z over all spectra (0.0 for an empty map)
    pub fn min_mz(&self) -> f64 {
        finite_or_zero(
            self.spectra
                .iter()
                .filter_map(|s| s.peaks.first())
                .map(|p| p.mz)
                .fold(f64::INFINITY, f64::min),
        )
    }

    /// Highest m/z over all spectra (0.0 for an empty map)
    pub fn max_mz(&self) -> f64 {
        finite_or_zero(
            self.spectra
                .iter()
                .filter_map(|s| s.peaks.last())
                .map(|p| p.mz)
                .fold(f64::NEG_INFINITY, f64::max),
        )
    }

    /// Zero-initialize all score tracks for `charge_count` charges
    pub fn reset_scores(&mut self, charge_count: usize) {
        for spectrum in &mut self.spectra {
            let peak_count = spectrum.peaks.len();
            spectrum.scores.reset(peak_count, charge_count);
        }
    }

    /// Iterate over peaks whose `(rt, mz)` lie inside a rectangle
    pub fn area_iter(&self, rt_lo: f64, rt_hi: f64, mz_lo: f64, mz_hi: f64) -> AreaIter<'_> {
        let start = self.spectra.partition_point(|s| s.rt < rt_lo);
        let end = self.spectra.partition_point(|s| s.rt <= rt_hi);
        AreaIter {
            map: self,
            spectrum: start,
            spectrum_end: end,
            mz_lo,
            mz_hi,
            range: 0..0,
            primed: false,
        }
    }
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

/// Iterator over peaks inside an RT x m/z rectangle
pub struct AreaIter<'a> {
    map: &'a PeakMap,
    spectrum: usize,
    spectrum_end: usize,
    mz_lo: f64,
    mz_hi: f64,
    range: std::ops::Range<usize>,
    primed: bool,
}

impl<'a> Iterator for AreaIter<'a> {
    type Item = &'a Peak;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.primed {
                if let Some(index) = self.range.next() {
                    return Some(self.map.spectra[self.spectrum].peak(index));
                }
                self.spectrum += 1;
                self.primed = false;
            }
            if self.spectrum >= self.spectrum_end {
                return None;
            }
            self.range = self.map.spectra[self.spectrum].mz_range(self.mz_lo, self.mz_hi);
            self.primed = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spectrum(rt: f64, peaks: &[(f64, f32)]) -> Spectrum {
        let mut s = Spectrum::new(rt, format!("scan={rt}"));
        s.set_peaks(
            peaks
                .iter()
                .map(|&(mz, intensity)| Peak { mz, intensity })
                .collect(),
        );
        s
    }

    #[test]
    fn test_peaks_sorted_on_ingest() {
        let s = spectrum(1.0, &[(500.0, 1.0), (400.0, 2.0), (450.0, 3.0)]);
        let mzs: Vec<f64> = s.peaks().iter().map(|p| p.mz).collect();
        assert_eq!(mzs, vec![400.0, 450.0, 500.0]);
    }

    #[test]
    fn test_add_peak_keeps_order() {
        let mut s = spectrum(1.0, &[(400.0, 1.0), (500.0, 1.0)]);
        s.add_peak(450.0, 2.0);
        let mzs: Vec<f64> = s.peaks().iter().map(|p| p.mz).collect();
        assert_eq!(mzs, vec![400.0, 450.0, 500.0]);
    }

    #[test]
    fn test_find_nearest() {
        let s = spectrum(1.0, &[(400.0, 1.0), (450.0, 1.0), (500.0, 1.0)]);
        assert_eq!(s.find_nearest(399.0), Some(0));
        assert_eq!(s.find_nearest(424.0), Some(0));
        assert_eq!(s.find_nearest(426.0), Some(1));
        assert_eq!(s.find_nearest(1000.0), Some(2));
        assert_eq!(Spectrum::new(1.0, "empty").find_nearest(400.0), None);
    }

    #[test]
    fn test_map_bounds() {
        let map = PeakMap::new(vec![
            spectrum(2.0, &[(410.0, 1.0)]),
            spectrum(1.0, &[(400.0, 1.0), (500.0, 1.0)]),
        ]);
        assert_eq!(map.min_rt(), 1.0);
        assert_eq!(map.max_rt(), 2.0);
        assert_eq!(map.min_mz(), 400.0);
        assert_eq!(map.max_mz(), 500.0);
        // sorted by RT on construction
        assert_eq!(map.spectrum(0).rt, 1.0);
    }

    #[test]
    fn test_area_iter() {
        let map = PeakMap::new(vec![
            spectrum(1.0, &[(400.0, 1.0), (450.0, 2.0), (500.0, 3.0)]),
            spectrum(2.0, &[(450.0, 4.0)]),
            spectrum(3.0, &[(449.0, 5.0)]),
        ]);
        let intensities: Vec<f32> = map
            .area_iter(1.0, 2.5, 440.0, 460.0)
            .map(|p| p.intensity)
            .collect();
        assert_eq!(intensities, vec![2.0, 4.0]);
    }

    #[test]
    fn test_reset_scores_shapes() {
        let mut map = PeakMap::new(vec![spectrum(1.0, &[(400.0, 1.0), (500.0, 1.0)])]);
        map.reset_scores(4);
        let scores = &map.spectrum(0).scores;
        assert_eq!(scores.trace_score.len(), 2);
        assert_eq!(scores.pattern.len(), 4);
        assert_eq!(scores.overall.len(), 4);
        assert!(scores.pattern.iter().all(|track| track.len() == 2));
    }
}
