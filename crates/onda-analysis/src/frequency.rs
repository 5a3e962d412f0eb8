//! Windowing, FFT, smoothing, and dB conversion.

use std::f32::consts::PI;
use std::sync::Arc;

use rustfft::{Fft, FftPlanner, num_complex::Complex};

/// Smallest supported FFT size.
pub const MIN_FFT_SIZE: usize = 32;

/// Largest supported FFT size.
pub const MAX_FFT_SIZE: usize = 32768;

/// Errors from the frequency-analysis entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AnalysisError {
    /// The FFT size must be a power of two in `MIN_FFT_SIZE..=MAX_FFT_SIZE`.
    #[error("fft size {0} is not a power of two in 32..=32768")]
    InvalidFftSize(usize),
    /// The caller-owned smoothing state must have one slot per bin.
    #[error("smoothing state has {actual} bins, expected {expected}")]
    SmoothingSizeMismatch {
        /// Expected bin count (`fft_size / 2`).
        expected: usize,
        /// Bin count of the supplied smoothing state.
        actual: usize,
    },
}

/// Reusable spectral-analysis scratch.
///
/// Holds the cached FFT plan, the cached Blackman window, and the complex
/// work buffer, all sized for the FFT size of the most recent call. Reusing
/// one analyzer across calls avoids re-planning and re-windowing when the
/// size is stable, and never allocates when it is.
pub struct FrequencyAnalyzer {
    planner: FftPlanner<f32>,
    fft: Option<Arc<dyn Fft<f32>>>,
    size: usize,
    window: Vec<f32>,
    scratch: Vec<Complex<f32>>,
}

impl Default for FrequencyAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrequencyAnalyzer {
    /// Creates an analyzer with no cached plan.
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
            fft: None,
            size: 0,
            window: Vec::new(),
            scratch: Vec::new(),
        }
    }

    /// Returns the FFT size of the cached plan (0 before the first call).
    pub fn size(&self) -> usize {
        self.size
    }

    fn ensure_size(&mut self, fft_size: usize) {
        if self.size == fft_size {
            return;
        }
        self.fft = Some(self.planner.plan_fft_forward(fft_size));
        self.window.clear();
        self.window.extend((0..fft_size).map(|n| blackman(n, fft_size)));
        self.scratch.resize(fft_size, Complex::new(0.0, 0.0));
        self.size = fft_size;
    }

    /// Computes smoothed frequency-domain data in decibels.
    ///
    /// `time_domain.len()` is the FFT size and must be a power of two in
    /// `32..=32768`. `previous_block` is the caller-owned smoothing state,
    /// one slot per bin (`fft_size / 2`); it is updated in place with the
    /// smoothed magnitudes. `output_db` receives up to `fft_size / 2` dB
    /// values (excess output capacity is left untouched, excess bins are
    /// dropped).
    ///
    /// Per bin: magnitude `|X[k]| / fft_size`, exponential smoothing
    /// `s = tau * previous + (1 - tau) * magnitude` (a NaN magnitude counts
    /// as 0), then `20 * log10(s)`, with negative infinity for non-positive
    /// smoothed values.
    pub fn frequency_data_db(
        &mut self,
        time_domain: &[f32],
        smoothing: f32,
        previous_block: &mut [f32],
        output_db: &mut [f32],
    ) -> Result<(), AnalysisError> {
        let fft_size = time_domain.len();
        if !fft_size.is_power_of_two() || !(MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&fft_size) {
            return Err(AnalysisError::InvalidFftSize(fft_size));
        }
        let bins = fft_size / 2;
        if previous_block.len() != bins {
            return Err(AnalysisError::SmoothingSizeMismatch {
                expected: bins,
                actual: previous_block.len(),
            });
        }

        self.ensure_size(fft_size);

        for (slot, (&sample, &w)) in self
            .scratch
            .iter_mut()
            .zip(time_domain.iter().zip(self.window.iter()))
        {
            *slot = Complex::new(sample * w, 0.0);
        }

        let fft = self.fft.as_ref().expect("plan cached by ensure_size");
        fft.process(&mut self.scratch);

        let norm = 1.0 / fft_size as f32;
        let tau = smoothing.clamp(0.0, 1.0);
        let written = output_db.len().min(bins);
        for k in 0..bins {
            let mut magnitude = self.scratch[k].norm() * norm;
            if magnitude.is_nan() {
                magnitude = 0.0;
            }
            let smoothed = tau * previous_block[k] + (1.0 - tau) * magnitude;
            previous_block[k] = smoothed;
            if k < written {
                output_db[k] = db_from_magnitude(smoothed);
            }
        }

        Ok(())
    }
}

/// Blackman window coefficient (a = 0.16).
#[inline]
fn blackman(n: usize, size: usize) -> f32 {
    const A: f32 = 0.16;
    const A0: f32 = 0.5 * (1.0 - A);
    const A1: f32 = 0.5;
    const A2: f32 = A * 0.5;
    let x = 2.0 * PI * n as f32 / size as f32;
    A0 - A1 * x.cos() + A2 * (2.0 * x).cos()
}

/// `20 * log10(v)`, with negative infinity for non-positive or NaN input.
#[inline]
fn db_from_magnitude(value: f32) -> f32 {
    if value > 0.0 {
        20.0 * value.log10()
    } else {
        f32::NEG_INFINITY
    }
}

/// Clips dB values to `[min_db, max_db]` and scales them to unsigned bytes,
/// with `min_db` mapping to 0 and `max_db` to 255.
///
/// Writes `min(db.len(), output.len())` bytes. A `min_db >= max_db` range
/// degenerates to all zeros.
pub fn bytes_from_db(db: &[f32], min_db: f32, max_db: f32, output: &mut [u8]) {
    let delta = max_db - min_db;
    if delta <= 0.0 {
        let count = db.len().min(output.len());
        output[..count].fill(0);
        return;
    }
    for (out, &value) in output.iter_mut().zip(db.iter()) {
        let clipped = value.clamp(min_db, max_db);
        *out = (255.0 * (clipped - min_db) / delta) as u8;
    }
}
