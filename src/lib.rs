//! # mzFeature - Feature Finding and Deconvolution for Centroided LC-MS Data
//!
//! `mzfeature` reduces a large, noisy, three-dimensional peak cloud
//! (retention time x m/z x intensity) into a small set of high-confidence
//! molecular signals: LC-MS features with charge and elution model, or
//! deconvoluted monoisotopic masses for top-down data.
//!
//! ## Key Components
//!
//! - **Picked feature finder**: a multi-stage seed-and-extend pipeline
//!   combining quantile-binned local intensity scoring, bidirectional
//!   mass-trace extension with slope-based termination, averagine-based
//!   isotope pattern fitting, nonlinear RT profile fitting (Gaussian or
//!   EGH) and cross-charge overlap resolution.
//!
//! - **Deconvolution engine**: per-spectrum charge deconvolution using a
//!   logarithmic m/z binning trick - charge hypotheses become constant
//!   integer offsets in a log-mass bin space, so deconvolution reduces to
//!   shifted-bitset intersections, with harmonic-artifact suppression and
//!   cross-spectrum bin carry-over.
//!
//! - **Parameter registry**: a typed configuration tree that validates,
//!   documents and self-serializes every configurable value.
//!
//! ## Quick Start - Feature Finding
//!
//! ```rust,no_run
//! use mzfeature::feature::{FeatureFinder, FeatureFinderConfig};
//! use mzfeature::feature::types::FeatureMap;
//! use mzfeature::map::{PeakMap, Spectrum};
//!
//! // spectra come from an external reader
//! let mut map = PeakMap::new(vec![Spectrum::new(0.0, "scan=1")]);
//!
//! let finder = FeatureFinder::new(FeatureFinderConfig::default())?;
//! let mut features = FeatureMap::new();
//! let summary = finder.run(&mut map, &mut features)?;
//! println!("found {} features", summary.features);
//! # Ok::<(), mzfeature::feature::FeatureFinderError>(())
//! ```
//!
//! ## Quick Start - Deconvolution
//!
//! ```rust,no_run
//! use mzfeature::deconv::{write_tsv, DeconvConfig, Deconvoluter};
//! use mzfeature::map::PeakMap;
//!
//! let map = PeakMap::default();
//! let engine = Deconvoluter::new(DeconvConfig::default())?;
//! let run = engine.run(&map)?;
//! write_tsv(std::io::stdout(), &run.groups, "sample.mzML")?;
//! # Ok::<(), mzfeature::deconv::DeconvError>(())
//! ```
//!
//! ## Architecture
//!
//! The library is organized into the following modules:
//!
//! - [`params`]: typed, validated parameter registry
//! - [`map`]: centroided map data model with per-peak score tracks
//! - [`isotopes`]: averagine isotope model and pattern tables
//! - [`feature`]: the picked feature finder pipeline
//! - [`deconv`]: the per-spectrum deconvolution engine
//!
//! File parsing and writing (mzML, featureXML) is out of scope: the map is
//! supplied by an external collaborator and features are sunk through
//! [`feature::types::FeatureMap`].

// Documentation lints - enforce complete documentation for publication
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]
// Allow some patterns common in scientific code
#![allow(clippy::too_many_arguments)]

pub mod deconv;
pub mod feature;
pub mod isotopes;
pub mod map;
pub mod params;

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::deconv::{
        write_tsv, DeconvConfig, DeconvError, DeconvRun, DeconvSummary, Deconvoluter, LogMzPeak,
        PeakGroup,
    };
    pub use crate::feature::{
        Feature, FeatureFinder, FeatureFinderConfig, FeatureFinderError, FeatureMap, ReportedMz,
        RtShape, RunSummary, Seed, UserSeed,
    };
    pub use crate::isotopes::{
        nominal_mass, AveragineModel, DeconvAveragineTable, ElementAbundances,
        IsotopePatternTable, TheoreticalIsotopePattern, C13C12_MASS_DIFF, PROTON_MASS,
    };
    pub use crate::map::{Peak, PeakMap, Precursor, ScoreArrays, Spectrum};
    pub use crate::params::{
        deconvolution_defaults, feature_finder_defaults, ParamEntry, ParamError, Params, Tags,
        Value,
    };
}
