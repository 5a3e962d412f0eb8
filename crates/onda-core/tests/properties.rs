//! Property-based tests for onda-core primitives.
//!
//! Uses proptest to check curve lookup bounds, resampler stability, and bus
//! mixing invariants over randomized inputs.

use onda_core::{AudioBus, OversampleFactor, Oversampler, ShaperCurve, mix_into};
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Curve output is always a convex combination of table entries, so it
    /// never leaves the table's value range, for any finite input.
    #[test]
    fn shaper_output_stays_within_table_range(
        table in prop::collection::vec(-2.0f32..=2.0, 2..64),
        input in prop::array::uniform32(-4.0f32..=4.0),
    ) {
        let lo = table.iter().copied().fold(f32::INFINITY, f32::min);
        let hi = table.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let curve = ShaperCurve::new(table);
        for &x in &input {
            let y = curve.shape(x);
            prop_assert!(y >= lo - 1e-6 && y <= hi + 1e-6,
                "shape({x}) = {y} outside [{lo}, {hi}]");
        }
    }

    /// Curves too short to define a segment behave as the identity.
    #[test]
    fn short_curves_pass_through(
        table in prop::collection::vec(-2.0f32..=2.0, 0..2),
        x in -4.0f32..=4.0,
    ) {
        let curve = ShaperCurve::new(table);
        prop_assert_eq!(curve.shape(x), x);
    }

    /// The up/down round trip stays finite and bounded for bounded input at
    /// every supported factor.
    #[test]
    fn oversampler_round_trip_is_bounded(
        input in prop::collection::vec(-1.0f32..=1.0, 128),
        factor_index in 0usize..3,
    ) {
        let factor = match factor_index {
            0 => OversampleFactor::None,
            1 => OversampleFactor::X2,
            _ => OversampleFactor::X4,
        };
        let mut oversampler = Oversampler::new();
        oversampler.configure(1, factor);

        let mut scratch = vec![0.0; input.len() * factor.ratio()];
        let mut output = vec![0.0; input.len()];
        oversampler.upsample_channel(0, &input, &mut scratch);
        oversampler.downsample_channel(0, &scratch, &mut output);

        for &y in &output {
            prop_assert!(y.is_finite());
            // Windowed-sinc ringing can overshoot, but only slightly.
            prop_assert!(y.abs() <= 1.5, "round trip produced {y}");
        }
    }

    /// Summing a source into a zeroed destination of the same shape
    /// reproduces the source exactly.
    #[test]
    fn mixing_single_source_is_identity(
        samples in prop::collection::vec(-1.0f32..=1.0, 64),
        channels in 1usize..=4,
    ) {
        let frames = samples.len() / channels;
        let mut source = AudioBus::new(channels, frames);
        for ch in 0..channels {
            source
                .channel_mut(ch)
                .copy_from_slice(&samples[ch * frames..(ch + 1) * frames]);
        }

        let mut dest = AudioBus::new(channels, frames);
        dest.zero();
        mix_into(&mut dest, &[&source]);

        if channels == 1 {
            prop_assert_eq!(dest.channel(0), source.channel(0));
        } else {
            for ch in 0..channels {
                prop_assert_eq!(dest.channel(ch), source.channel(ch));
            }
        }
    }
}
