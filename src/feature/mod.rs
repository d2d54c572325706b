//! # Picked Feature Finder Module
//!
//! Multi-stage seed-and-extend pipeline that reduces a centroided LC-MS map
//! to isotope-pattern-consistent, elution-profile-consistent features:
//!
//! 1. quantile-binned local intensity scoring,
//! 2. mass-trace evidence across adjacent spectra,
//! 3. per-charge isotope pattern evidence,
//! 4. seed selection from the combined per-peak scores,
//! 5. per-seed isotope fitting, bidirectional trace extension and nonlinear
//!    elution-profile fitting (Gauss or EGH),
//! 6. quality gating and cross-charge overlap resolution.
//!
//! The entry point is [`finder::FeatureFinder`].

pub mod config;
pub mod error;
pub mod extend;
pub mod finder;
pub mod fit;
pub mod quality;
pub mod resolve;
pub mod scoring;
pub mod traces;
pub mod types;

pub use config::{FeatureFinderConfig, ReportedMz, RtShape};
pub use error::FeatureFinderError;
pub use finder::{FeatureFinder, RunSummary, UserSeed};
pub use fit::{FitOptions, ProfileFitter, TraceFitter};
pub use types::{Feature, FeatureMap, Seed};
