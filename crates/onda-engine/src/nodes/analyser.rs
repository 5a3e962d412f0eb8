//! Passthrough analysis tap.

use std::any::Any;

use onda_analysis::{FrequencyAnalyzer, MAX_FFT_SIZE, MIN_FFT_SIZE, bytes_from_db};
use onda_core::AudioBus;

use crate::context::RenderContext;
use crate::description::GraphNodeDescription;
use crate::node::RenderNode;

/// Passes audio through unchanged while keeping a mono downmix of the most
/// recent [`MAX_FFT_SIZE`] frames for analysis.
///
/// The accessors run on the render thread between quanta (the original
/// engine copies analyser data out right after the graph traversal); the
/// smoothing state for the "over time" averaging lives on the node and
/// persists across calls.
pub struct AnalyserRenderNode {
    fft_size: usize,
    smoothing: f32,
    min_decibels: f32,
    max_decibels: f32,
    ring: Vec<f32>,
    write_pos: usize,
    previous_block: Vec<f32>,
    analyzer: FrequencyAnalyzer,
    time_scratch: Vec<f32>,
    db_scratch: Vec<f32>,
}

impl AnalyserRenderNode {
    /// Creates an analyser. The FFT size is sanitized to a power of two in
    /// the supported range; smoothing is clamped to 0..=1.
    pub fn new(fft_size: usize, smoothing: f32, min_decibels: f32, max_decibels: f32) -> Self {
        let fft_size = sanitize_fft_size(fft_size);
        Self {
            fft_size,
            smoothing: smoothing.clamp(0.0, 1.0),
            min_decibels,
            max_decibels,
            ring: vec![0.0; MAX_FFT_SIZE],
            write_pos: 0,
            previous_block: vec![0.0; fft_size / 2],
            analyzer: FrequencyAnalyzer::new(),
            time_scratch: vec![0.0; fft_size],
            db_scratch: vec![0.0; fft_size / 2],
        }
    }

    /// The effective FFT size.
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Bins produced by the frequency accessors (`fft_size / 2`).
    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Copies the most recent `fft_size` frames (oldest first) into
    /// `output`; excess output capacity is left untouched.
    pub fn time_domain_data(&mut self, output: &mut [f32]) {
        self.fill_time_scratch();
        let count = output.len().min(self.fft_size);
        output[..count].copy_from_slice(&self.time_scratch[..count]);
    }

    /// Computes smoothed frequency data in dB over the most recent
    /// `fft_size` frames. Returns false if the analysis failed.
    pub fn frequency_data_db(&mut self, output: &mut [f32]) -> bool {
        self.fill_time_scratch();
        self.analyzer
            .frequency_data_db(
                &self.time_scratch,
                self.smoothing,
                &mut self.previous_block,
                output,
            )
            .is_ok()
    }

    /// Computes frequency data scaled to bytes between the configured
    /// min/max decibel range. Returns false if the analysis failed.
    pub fn byte_frequency_data(&mut self, output: &mut [u8]) -> bool {
        self.fill_time_scratch();
        let bins = self.frequency_bin_count();
        let ok = self
            .analyzer
            .frequency_data_db(
                &self.time_scratch,
                self.smoothing,
                &mut self.previous_block,
                &mut self.db_scratch,
            )
            .is_ok();
        if ok {
            let count = bins.min(output.len());
            bytes_from_db(
                &self.db_scratch[..count],
                self.min_decibels,
                self.max_decibels,
                output,
            );
        }
        ok
    }

    /// Unrolls the ring into `time_scratch`, oldest frame first.
    fn fill_time_scratch(&mut self) {
        let n = self.fft_size;
        let start = (self.write_pos + MAX_FFT_SIZE - n) % MAX_FFT_SIZE;
        for (i, slot) in self.time_scratch.iter_mut().enumerate() {
            *slot = self.ring[(start + i) % MAX_FFT_SIZE];
        }
    }

    fn push_frame(&mut self, sample: f32) {
        self.ring[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % MAX_FFT_SIZE;
    }
}

fn sanitize_fft_size(fft_size: usize) -> usize {
    if fft_size.is_power_of_two() && (MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&fft_size) {
        fft_size
    } else {
        2048
    }
}

impl RenderNode for AnalyserRenderNode {
    fn process(
        &mut self,
        context: &RenderContext<'_>,
        input: Option<&AudioBus>,
        output: &mut AudioBus,
    ) {
        match input {
            Some(input) if input.channel_count() > 0 => {
                output.copy_from(input);
                // Mono downmix of this quantum into the ring: average of
                // the active channels.
                let channels = input.channel_count();
                let scale = 1.0 / channels as f32;
                for frame in 0..context.quantum_size {
                    let mut sum = 0.0;
                    for ch in 0..channels {
                        sum += input.channel(ch)[frame];
                    }
                    self.push_frame(sum * scale);
                }
            }
            _ => {
                output.set_channel_count(1.min(output.channel_capacity()));
                output.zero();
                // Disconnected analysers still advance their window.
                for _ in 0..context.quantum_size {
                    self.push_frame(0.0);
                }
            }
        }
    }

    fn apply_description(&mut self, description: &GraphNodeDescription) {
        if let GraphNodeDescription::Analyser {
            fft_size,
            smoothing_time_constant,
            min_decibels,
            max_decibels,
        } = description
        {
            let fft_size = sanitize_fft_size(*fft_size);
            if fft_size != self.fft_size {
                self.fft_size = fft_size;
                self.previous_block = vec![0.0; fft_size / 2];
                self.time_scratch = vec![0.0; fft_size];
                self.db_scratch = vec![0.0; fft_size / 2];
            }
            self.smoothing = smoothing_time_constant.clamp(0.0, 1.0);
            self.min_decibels = *min_decibels;
            self.max_decibels = *max_decibels;
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
