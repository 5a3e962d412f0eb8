//! Spectral analysis for analyser-style render nodes.
//!
//! The pipeline mirrors what an analyser node exposes to script: take the
//! most recent `fft_size` time-domain frames, apply a Blackman window, run
//! an unnormalised forward FFT, smooth each bin magnitude against the
//! previous block, and convert to decibels.
//!
//! [`FrequencyAnalyzer`] owns the reusable scratch (FFT plan, window,
//! complex work buffer); the smoothing state lives with the caller so that
//! the "over time" smoothing keeps its memory across calls.

pub mod frequency;

pub use frequency::{
    AnalysisError, FrequencyAnalyzer, MAX_FFT_SIZE, MIN_FFT_SIZE, bytes_from_db,
};
