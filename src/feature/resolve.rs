//! Cross-feature, cross-charge overlap arbitration.
//!
//! Candidate features whose trace hulls overlap beyond the configured
//! fraction are resolved pairwise: the losing feature becomes a subordinate
//! of the winner and is removed from the top level. Charge-divisible pairs
//! are treated as harmonic artifacts and resolve to the higher charge.

use crate::feature::types::{BoundingBox, Feature, FeatureMap};

/// Fraction of the smaller feature covered by the overlap of the trace
/// hulls of two features (RT dimension)
pub fn intersection(f1: &Feature, f2: &Feature) -> f64 {
    let s1: f64 = f1
        .convex_hulls
        .iter()
        .map(|hull| hull.bounding_box().width())
        .sum();
    let s2: f64 = f2
        .convex_hulls
        .iter()
        .map(|hull| hull.bounding_box().width())
        .sum();

    let mut overlap = 0.0;
    for hull1 in &f1.convex_hulls {
        let bb1 = hull1.bounding_box();
        for hull2 in &f2.convex_hulls {
            let bb2 = hull2.bounding_box();
            if !bb1.intersects(bb2) {
                continue;
            }
            if bb1.min_rt <= bb2.min_rt && bb1.max_rt >= bb2.max_rt {
                overlap += bb2.width();
            } else if bb2.min_rt <= bb1.min_rt && bb2.max_rt >= bb1.max_rt {
                overlap += bb1.width();
            } else if bb1.min_rt <= bb2.min_rt && bb1.max_rt <= bb2.max_rt {
                overlap += bb1.max_rt - bb2.min_rt;
            } else if bb2.min_rt <= bb1.min_rt && bb2.max_rt <= bb1.max_rt {
                overlap += bb2.max_rt - bb1.min_rt;
            }
        }
    }

    overlap / s1.min(s2)
}

/// Resolve contradicting and overlapping features.
///
/// Features are compared in m/z order with an early-out on the maximum m/z
/// span; losers are absorbed as subordinates and dropped, and the surviving
/// features are sorted by descending intensity.
pub fn resolve_overlaps(features: &mut FeatureMap, max_feature_intersection: f64) {
    features.sort_by_mz();

    let bbs: Vec<Option<BoundingBox>> = features.iter().map(Feature::bounding_box).collect();
    let max_mz_span = bbs
        .iter()
        .flatten()
        .map(BoundingBox::height)
        .fold(0.0, f64::max);

    let mut removed = 0usize;
    let count = features.len();
    for i in 0..count {
        for j in (i + 1)..count {
            // features further apart than twice the span cannot overlap
            if features[j].mz - features[i].mz > 2.0 * max_mz_span {
                break;
            }
            if features[i].intensity == 0.0 || features[j].intensity == 0.0 {
                continue;
            }
            let (Some(bb1), Some(bb2)) = (&bbs[i], &bbs[j]) else {
                continue;
            };
            if !bb1.intersects(bb2) {
                continue;
            }

            let overlap = intersection(&features[i], &features[j]);
            if overlap < max_feature_intersection {
                continue;
            }
            removed += 1;

            let (left, right) = features.features_mut().split_at_mut(j);
            let f1 = &mut left[i];
            let f2 = &mut right[0];
            let keep_first = if f1.charge == f2.charge {
                // same charge: duplicates, keep the stronger evidence
                f1.intensity * f1.overall_quality > f2.intensity * f2.overall_quality
            } else if f2.charge % f1.charge == 0 {
                // harmonic artifact: keep the higher charge
                false
            } else if f1.charge % f2.charge == 0 {
                true
            } else {
                f1.overall_quality > f2.overall_quality
            };

            if keep_first {
                log::debug!(
                    "overlap {overlap:.3}: feature at m/z {:.4} absorbs m/z {:.4}",
                    f1.mz,
                    f2.mz
                );
                f1.subordinates.push(f2.clone());
                f2.intensity = 0.0;
            } else {
                log::debug!(
                    "overlap {overlap:.3}: feature at m/z {:.4} absorbs m/z {:.4}",
                    f2.mz,
                    f1.mz
                );
                f2.subordinates.push(f1.clone());
                f1.intensity = 0.0;
            }
        }
    }
    log::info!("Removed {removed} overlapping features.");

    features.retain(|f| f.intensity != 0.0);
    features.sort_by_intensity_desc();
}
