//! Oversampled nonlinear waveshaper.

use std::any::Any;

use onda_core::{AudioBus, OversampleFactor, Oversampler, ShaperCurve};

use crate::context::RenderContext;
use crate::description::GraphNodeDescription;
use crate::node::RenderNode;

/// Applies a transfer curve to its input, optionally at 2x or 4x the
/// quantum rate to keep the generated harmonics below Nyquist.
///
/// Per quantum: a silent input short-circuits; at factor 1 the curve is
/// applied directly; at higher factors each channel is upsampled into a
/// scratch buffer of `quantum_size x factor` samples, shaped there, and
/// downsampled back. Resampler state and scratch storage are resized only
/// when the channel count or factor changes.
pub struct WaveShaperRenderNode {
    curve: ShaperCurve,
    factor: OversampleFactor,
    oversampler: Oversampler,
    scratch: Vec<f32>,
}

impl WaveShaperRenderNode {
    /// Creates a waveshaper. A missing curve behaves as the identity.
    pub fn new(curve: Option<Vec<f32>>, factor: OversampleFactor) -> Self {
        Self {
            curve: ShaperCurve::new(curve.unwrap_or_default()),
            factor,
            oversampler: Oversampler::new(),
            scratch: Vec::new(),
        }
    }
}

impl RenderNode for WaveShaperRenderNode {
    fn process(
        &mut self,
        context: &RenderContext<'_>,
        input: Option<&AudioBus>,
        output: &mut AudioBus,
    ) {
        let Some(input) = input else {
            output.set_channel_count(1.min(output.channel_capacity()));
            output.zero();
            return;
        };

        let channels = input.channel_count().min(output.channel_capacity()).max(1);
        output.set_channel_count(channels);

        if input.channel_count() == 0 || input.is_silent() {
            output.zero();
            return;
        }

        // No-op when nothing changed; resets filters when something did.
        self.oversampler.configure(channels, self.factor);
        let oversampled_len = context.quantum_size * self.factor.ratio();
        if self.scratch.len() != oversampled_len {
            self.scratch.resize(oversampled_len, 0.0);
        }

        for ch in 0..channels {
            let source = input.channel(ch);
            let dest = output.channel_mut(ch);
            match self.factor {
                OversampleFactor::None => self.curve.shape_block(source, dest),
                _ => {
                    self.oversampler.upsample_channel(ch, source, &mut self.scratch);
                    self.curve.shape_in_place(&mut self.scratch);
                    self.oversampler.downsample_channel(ch, &self.scratch, dest);
                }
            }
        }
    }

    fn apply_description(&mut self, description: &GraphNodeDescription) {
        if let GraphNodeDescription::WaveShaper { curve, oversample } = description {
            self.curve = ShaperCurve::new(curve.clone().unwrap_or_default());
            // A factor change reconfigures the resampler on the next quantum.
            self.factor = *oversample;
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(quantum: usize) -> RenderContext<'static> {
        RenderContext {
            sample_rate: 48000.0,
            quantum_size: quantum,
            current_frame: 0,
            script_host: None,
        }
    }

    fn half_gain_curve() -> Option<Vec<f32>> {
        Some(vec![-0.5, 0.0, 0.5])
    }

    #[test]
    fn factor_one_applies_curve_directly() {
        let mut node = WaveShaperRenderNode::new(half_gain_curve(), OversampleFactor::None);
        let mut input = AudioBus::new(1, 4);
        input.channel_mut(0).copy_from_slice(&[-1.0, -0.5, 0.5, 1.0]);
        let mut output = AudioBus::new(1, 4);
        node.process(&context(4), Some(&input), &mut output);
        assert_eq!(output.channel(0), &[-0.5, -0.25, 0.25, 0.5]);
    }

    #[test]
    fn missing_curve_is_identity_at_factor_one() {
        let mut node = WaveShaperRenderNode::new(None, OversampleFactor::None);
        let mut input = AudioBus::new(2, 4);
        input.channel_mut(0).copy_from_slice(&[0.1, 0.2, 0.3, 0.4]);
        input.channel_mut(1).copy_from_slice(&[-0.1, -0.2, -0.3, -0.4]);
        let mut output = AudioBus::new(2, 4);
        node.process(&context(4), Some(&input), &mut output);
        assert_eq!(output.channel(0), input.channel(0));
        assert_eq!(output.channel(1), input.channel(1));
    }

    #[test]
    fn silent_input_short_circuits() {
        let mut node = WaveShaperRenderNode::new(half_gain_curve(), OversampleFactor::X4);
        let input = AudioBus::new(2, 8);
        let mut output = AudioBus::new(2, 8);
        output.channel_mut(0).fill(5.0);
        node.process(&context(8), Some(&input), &mut output);
        assert!(output.is_silent());
    }

    #[test]
    fn unconnected_input_is_silence() {
        let mut node = WaveShaperRenderNode::new(half_gain_curve(), OversampleFactor::X2);
        let mut output = AudioBus::new(2, 8);
        node.process(&context(8), None, &mut output);
        assert_eq!(output.channel_count(), 1);
        assert!(output.is_silent());
    }

    #[test]
    fn description_swaps_curve_and_factor() {
        let mut node = WaveShaperRenderNode::new(None, OversampleFactor::None);
        node.apply_description(&GraphNodeDescription::WaveShaper {
            curve: Some(vec![0.0, 0.0, 0.0]),
            oversample: OversampleFactor::None,
        });
        let mut input = AudioBus::new(1, 4);
        input.channel_mut(0).fill(0.8);
        let mut output = AudioBus::new(1, 4);
        node.process(&context(4), Some(&input), &mut output);
        assert!(output.is_silent());
    }
}
