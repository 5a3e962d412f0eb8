//! Channel up/down-mixing between buses.
//!
//! When several connections feed one node input, the graph driver sums them
//! into that node's mix bus before calling `process()`. The summing applies
//! speakers-style up/down-mixing for the mono/stereo cases and discrete
//! copy/truncate rules everywhere else.

use crate::bus::AudioBus;

/// Returns the largest active channel count among the sources.
///
/// Sources with zero active channels are ignored; returns 0 when nothing
/// carries signal.
pub fn max_channel_count(sources: &[&AudioBus]) -> usize {
    sources.iter().map(|bus| bus.channel_count()).max().unwrap_or(0)
}

/// Sums all sources into `dest` with speakers-style channel interpretation.
///
/// `dest` must already be zeroed and have its active channel count set by
/// the caller. Mixing rules per source:
///
/// - matching channel counts: channel-wise sum
/// - mono source into a multi-channel destination: the mono signal is added
///   to the first two channels (or the single channel of a mono destination)
/// - stereo source into a mono destination: `0.5 * (L + R)`
/// - anything else: discrete channel-wise sum over the common channels
pub fn mix_into(dest: &mut AudioBus, sources: &[&AudioBus]) {
    for source in sources {
        add_speakers(dest, source);
    }
}

/// Sums all sources into `dest` with discrete channel interpretation:
/// channel-wise over the common channel count, no up/down-mix matrix.
pub fn mix_into_discrete(dest: &mut AudioBus, sources: &[&AudioBus]) {
    for source in sources {
        add_discrete(dest, source);
    }
}

fn add_speakers(dest: &mut AudioBus, source: &AudioBus) {
    let src_channels = source.channel_count();
    let dst_channels = dest.channel_count();
    if src_channels == 0 || dst_channels == 0 {
        return;
    }

    if src_channels == 1 && dst_channels >= 2 {
        // Mono up-mix: both front channels carry the signal.
        let mono = source.channel(0);
        for ch in 0..2 {
            for (d, &s) in dest.channel_mut(ch).iter_mut().zip(mono.iter()) {
                *d += s;
            }
        }
        return;
    }

    if src_channels == 2 && dst_channels == 1 {
        // Stereo down-mix: average of left and right.
        let out = dest.channel_mut(0);
        let left = source.channel(0);
        let right = source.channel(1);
        for i in 0..out.len() {
            out[i] += 0.5 * (left[i] + right[i]);
        }
        return;
    }

    add_discrete(dest, source);
}

fn add_discrete(dest: &mut AudioBus, source: &AudioBus) {
    let channels = source.channel_count().min(dest.channel_count());
    for ch in 0..channels {
        let src = source.channel(ch);
        for (d, &s) in dest.channel_mut(ch).iter_mut().zip(src.iter()) {
            *d += s;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bus_with(channels: &[&[f32]]) -> AudioBus {
        let frames = channels[0].len();
        let mut bus = AudioBus::new(channels.len(), frames);
        for (ch, data) in channels.iter().enumerate() {
            bus.channel_mut(ch).copy_from_slice(data);
        }
        bus
    }

    #[test]
    fn matching_counts_sum_channel_wise() {
        let a = bus_with(&[&[1.0, 2.0], &[3.0, 4.0]]);
        let b = bus_with(&[&[0.5, 0.5], &[0.25, 0.25]]);
        let mut dest = AudioBus::new(2, 2);
        mix_into(&mut dest, &[&a, &b]);
        assert_eq!(dest.channel(0), &[1.5, 2.5]);
        assert_eq!(dest.channel(1), &[3.25, 4.25]);
    }

    #[test]
    fn mono_up_mixes_to_both_front_channels() {
        let mono = bus_with(&[&[1.0, -1.0]]);
        let mut dest = AudioBus::new(2, 2);
        mix_into(&mut dest, &[&mono]);
        assert_eq!(dest.channel(0), &[1.0, -1.0]);
        assert_eq!(dest.channel(1), &[1.0, -1.0]);
    }

    #[test]
    fn stereo_down_mixes_to_average() {
        let stereo = bus_with(&[&[1.0, 0.0], &[0.0, 1.0]]);
        let mut dest = AudioBus::new(1, 2);
        mix_into(&mut dest, &[&stereo]);
        assert_eq!(dest.channel(0), &[0.5, 0.5]);
    }

    #[test]
    fn discrete_ignores_extra_source_channels() {
        let quad = bus_with(&[&[1.0], &[2.0], &[3.0], &[4.0]]);
        let mut dest = AudioBus::new(2, 1);
        mix_into_discrete(&mut dest, &[&quad]);
        assert_eq!(dest.channel(0), &[1.0]);
        assert_eq!(dest.channel(1), &[2.0]);
    }

    #[test]
    fn max_channel_count_over_sources() {
        let mono = AudioBus::new(1, 4);
        let stereo = AudioBus::new(2, 4);
        assert_eq!(max_channel_count(&[&mono, &stereo]), 2);
        assert_eq!(max_channel_count(&[]), 0);
    }
}
