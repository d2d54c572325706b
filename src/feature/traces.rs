//! Mass traces: the elution profile of one isotopologue, and the bundle of
//! traces that backs a feature candidate.

use crate::feature::error::FeatureFinderError;
use crate::feature::types::ConvexHull;

/// One peak of a mass trace, stored by value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TracePeak {
    /// Retention time of the owning spectrum
    pub rt: f64,
    /// Peak m/z
    pub mz: f64,
    /// Peak intensity
    pub intensity: f32,
}

/// A mass trace: peaks of one isotopologue across consecutive spectra
#[derive(Debug, Clone, Default)]
pub struct MassTrace {
    /// Contained peaks in RT order
    pub peaks: Vec<TracePeak>,
    /// Theoretical intensity of this isotopologue, scaled to [0, 1]
    pub theoretical_int: f64,
    max_index: usize,
}

impl MassTrace {
    /// Trace seeded with a single peak
    pub fn starting_at(peak: TracePeak) -> Self {
        Self {
            peaks: vec![peak],
            theoretical_int: 0.0,
            max_index: 0,
        }
    }

    /// Recompute the index of the highest contained peak
    pub fn update_maximum(&mut self) {
        self.max_index = 0;
        for (index, peak) in self.peaks.iter().enumerate() {
            if peak.intensity > self.peaks[self.max_index].intensity {
                self.max_index = index;
            }
        }
    }

    /// RT of the highest contained peak (after `update_maximum`)
    pub fn max_rt(&self) -> f64 {
        self.peaks[self.max_index].rt
    }

    /// Intensity of the highest contained peak (after `update_maximum`)
    pub fn max_intensity(&self) -> f32 {
        self.peaks[self.max_index].intensity
    }

    /// Intensity-weighted average m/z of all contained peaks
    pub fn avg_mz(&self) -> f64 {
        let mut sum = 0.0;
        let mut intensities = 0.0;
        for peak in &self.peaks {
            sum += peak.mz * peak.intensity as f64;
            intensities += peak.intensity as f64;
        }
        sum / intensities
    }

    /// Convex hull of the trace in (RT, m/z) space
    pub fn convex_hull(&self) -> Option<ConvexHull> {
        let points: Vec<(f64, f64)> = self.peaks.iter().map(|p| (p.rt, p.mz)).collect();
        ConvexHull::from_points(&points)
    }

    /// A trace is valid with at least 3 peaks
    pub fn is_valid(&self) -> bool {
        self.peaks.len() >= 3
    }
}

/// The trace bundle of one feature candidate
#[derive(Debug, Clone, Default)]
pub struct MassTraces {
    /// Traces in isotopologue order
    pub traces: Vec<MassTrace>,
    /// Index of the trace with the highest theoretical intensity
    pub max_trace: usize,
    /// Estimated baseline intensity in the feature region
    pub baseline: f64,
}

impl MassTraces {
    /// Empty bundle
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve space for `n` traces
    pub fn reserve(&mut self, n: usize) {
        self.traces.reserve(n);
    }

    /// Number of traces
    pub fn len(&self) -> usize {
        self.traces.len()
    }

    /// True without traces
    pub fn is_empty(&self) -> bool {
        self.traces.is_empty()
    }

    /// Append a trace
    pub fn push(&mut self, trace: MassTrace) {
        self.traces.push(trace);
    }

    /// Remove all traces
    pub fn clear(&mut self) {
        self.traces.clear();
    }

    /// Total number of peaks over all traces
    pub fn peak_count(&self) -> usize {
        self.traces.iter().map(|t| t.peaks.len()).sum()
    }

    /// A bundle is valid with at least two traces, one of which contains the
    /// seed m/z within the trace tolerance of its average m/z
    pub fn is_valid(&self, seed_mz: f64, trace_tolerance: f64) -> bool {
        if self.traces.len() < 2 {
            return false;
        }
        self.traces
            .iter()
            .any(|t| (seed_mz - t.avg_mz()).abs() <= trace_tolerance)
    }

    /// Index of the trace with the highest theoretical intensity
    pub fn theoretical_max(&self) -> Result<usize, FeatureFinderError> {
        if self.traces.is_empty() {
            return Err(FeatureFinderError::Precondition(
                "there must be at least one trace to determine the theoretical maximum trace",
            ));
        }
        let mut max = 0;
        let mut max_int = self.traces[0].theoretical_int;
        for (index, trace) in self.traces.iter().enumerate().skip(1) {
            if trace.theoretical_int > max_int {
                max_int = trace.theoretical_int;
                max = index;
            }
        }
        Ok(max)
    }

    /// Set the baseline to the lowest intensity over all contained peaks
    pub fn update_baseline(&mut self) {
        let mut baseline = f64::INFINITY;
        for trace in &self.traces {
            for peak in &trace.peaks {
                baseline = baseline.min(peak.intensity as f64);
            }
        }
        self.baseline = if baseline.is_finite() { baseline } else { 0.0 };
    }

    /// RT boundaries over all contained peaks
    pub fn rt_bounds(&self) -> Result<(f64, f64), FeatureFinderError> {
        if self.traces.is_empty() {
            return Err(FeatureFinderError::Precondition(
                "there must be at least one trace to determine the RT boundaries",
            ));
        }
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for trace in &self.traces {
            for peak in &trace.peaks {
                min = min.min(peak.rt);
                max = max.max(peak.rt);
            }
        }
        Ok((min, max))
    }
}

impl std::ops::Index<usize> for MassTraces {
    type Output = MassTrace;

    fn index(&self, index: usize) -> &Self::Output {
        &self.traces[index]
    }
}

impl std::ops::IndexMut<usize> for MassTraces {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.traces[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace(points: &[(f64, f64, f32)]) -> MassTrace {
        let mut t = MassTrace::default();
        t.peaks = points
            .iter()
            .map(|&(rt, mz, intensity)| TracePeak { rt, mz, intensity })
            .collect();
        t
    }

    #[test]
    fn test_avg_mz_weighted() {
        let t = trace(&[(1.0, 400.0, 1.0), (2.0, 401.0, 3.0)]);
        assert!((t.avg_mz() - 400.75).abs() < 1e-12);
    }

    #[test]
    fn test_update_maximum() {
        let mut t = trace(&[(1.0, 400.0, 1.0), (2.0, 400.01, 5.0), (3.0, 400.0, 2.0)]);
        t.update_maximum();
        assert_eq!(t.max_rt(), 2.0);
        assert_eq!(t.max_intensity(), 5.0);
    }

    #[test]
    fn test_trace_validity() {
        assert!(!trace(&[(1.0, 400.0, 1.0), (2.0, 400.0, 1.0)]).is_valid());
        assert!(trace(&[(1.0, 400.0, 1.0), (2.0, 400.0, 1.0), (3.0, 400.0, 1.0)]).is_valid());
    }

    #[test]
    fn test_bundle_validity_requires_seed() {
        let mut bundle = MassTraces::new();
        bundle.push(trace(&[(1.0, 400.0, 1.0), (2.0, 400.0, 1.0), (3.0, 400.0, 1.0)]));
        bundle.push(trace(&[(1.0, 400.5, 1.0), (2.0, 400.5, 1.0), (3.0, 400.5, 1.0)]));
        assert!(bundle.is_valid(400.01, 0.03));
        assert!(!bundle.is_valid(400.25, 0.03));

        let mut single = MassTraces::new();
        single.push(trace(&[(1.0, 400.0, 1.0), (2.0, 400.0, 1.0), (3.0, 400.0, 1.0)]));
        assert!(!single.is_valid(400.0, 0.03));
    }

    #[test]
    fn test_baseline_and_bounds() {
        let mut bundle = MassTraces::new();
        bundle.push(trace(&[(1.0, 400.0, 4.0), (2.0, 400.0, 2.0)]));
        bundle.push(trace(&[(0.5, 400.5, 8.0), (3.0, 400.5, 6.0)]));
        bundle.update_baseline();
        assert_eq!(bundle.baseline, 2.0);
        assert_eq!(bundle.rt_bounds().unwrap(), (0.5, 3.0));
    }

    #[test]
    fn test_empty_bundle_preconditions() {
        let bundle = MassTraces::new();
        assert!(bundle.theoretical_max().is_err());
        assert!(bundle.rt_bounds().is_err());
    }

    #[test]
    fn test_theoretical_max() {
        let mut bundle = MassTraces::new();
        let mut a = trace(&[(1.0, 400.0, 1.0)]);
        a.theoretical_int = 0.4;
        let mut b = trace(&[(1.0, 400.5, 1.0)]);
        b.theoretical_int = 1.0;
        bundle.push(a);
        bundle.push(b);
        assert_eq!(bundle.theoretical_max().unwrap(), 1);
    }
}
