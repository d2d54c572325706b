//! # Deconvolution Module
//!
//! Per-spectrum charge deconvolution for top-down MS data.
//!
//! Peaks are mapped to logarithmic m/z space where a charge hypothesis
//! becomes a constant integer offset in a log-mass bin space, so charge
//! deconvolution reduces to shifted-bitset intersections. The engine
//! suppresses harmonic artifacts, carries mass bins over from neighboring
//! spectra, and scores candidate peak groups by isotope cosine and charge
//! distribution before emitting deconvoluted monoisotopic masses.
//!
//! The entry point is [`engine::Deconvoluter`].

pub mod bins;
pub mod config;
pub mod engine;
pub mod error;
pub mod report;
pub mod score;
pub mod types;

pub use config::DeconvConfig;
pub use engine::{DeconvRun, Deconvoluter};
pub use error::DeconvError;
pub use report::{write_tsv, DeconvSummary};
pub use types::{LogMzPeak, PeakGroup};
