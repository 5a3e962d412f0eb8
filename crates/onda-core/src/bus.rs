//! Multi-channel quantum sample buffer.
//!
//! [`AudioBus`] is the unit of signal flow between render nodes. Each bus
//! owns planar storage for a fixed *channel capacity* and a fixed *frame
//! count* (the render quantum size), plus a mutable *active channel count*
//! that nodes adjust per quantum without touching storage.
//!
//! Buses are allocated once when the graph is built and reused every
//! quantum; none of the methods here allocate.

#[cfg(not(feature = "std"))]
use alloc::vec;
#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

/// A planar multi-channel sample buffer of quantum length.
///
/// The channel capacity is an upper bound fixed at construction; the active
/// channel count may change every quantum via
/// [`set_channel_count()`](Self::set_channel_count) but never exceeds the
/// capacity. Every channel span has exactly
/// [`frame_count()`](Self::frame_count) samples.
pub struct AudioBus {
    /// Planar storage: channel `c` occupies
    /// `samples[c * frame_count .. (c + 1) * frame_count]`.
    samples: Vec<f32>,
    channel_capacity: usize,
    channel_count: usize,
    frame_count: usize,
}

impl AudioBus {
    /// Creates a zeroed bus with the given channel capacity and frame count.
    ///
    /// The active channel count starts at the full capacity.
    pub fn new(channel_capacity: usize, frame_count: usize) -> Self {
        Self {
            samples: vec![0.0; channel_capacity * frame_count],
            channel_capacity,
            channel_count: channel_capacity,
            frame_count,
        }
    }

    /// Returns the number of frames per channel (the quantum size).
    #[inline]
    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Returns the active channel count.
    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    /// Returns the fixed channel capacity.
    #[inline]
    pub fn channel_capacity(&self) -> usize {
        self.channel_capacity
    }

    /// Sets the active channel count without touching storage.
    ///
    /// # Panics
    ///
    /// Panics if `count > channel_capacity()`. Channel topology is a
    /// graph-build-time invariant, so exceeding the capacity is a
    /// programming error, not a recoverable condition.
    #[inline]
    pub fn set_channel_count(&mut self, count: usize) {
        assert!(
            count <= self.channel_capacity,
            "active channel count {count} exceeds capacity {}",
            self.channel_capacity
        );
        self.channel_count = count;
    }

    /// Returns the samples of one active channel.
    ///
    /// # Panics
    ///
    /// Panics if `index >= channel_count()`.
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        assert!(
            index < self.channel_count,
            "channel index {index} out of range (active channels: {})",
            self.channel_count
        );
        &self.samples[index * self.frame_count..(index + 1) * self.frame_count]
    }

    /// Returns the samples of one active channel, mutably.
    ///
    /// # Panics
    ///
    /// Panics if `index >= channel_count()`.
    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        assert!(
            index < self.channel_count,
            "channel index {index} out of range (active channels: {})",
            self.channel_count
        );
        &mut self.samples[index * self.frame_count..(index + 1) * self.frame_count]
    }

    /// Clears the active channels to silence. Inactive capacity is left as-is.
    pub fn zero(&mut self) {
        self.samples[..self.channel_count * self.frame_count].fill(0.0);
    }

    /// Returns true if every sample of every active channel is exactly zero.
    ///
    /// Used by nonlinear nodes to short-circuit silent quanta.
    pub fn is_silent(&self) -> bool {
        self.samples[..self.channel_count * self.frame_count]
            .iter()
            .all(|&s| s == 0.0)
    }

    /// Copies another bus's active channels into this one.
    ///
    /// Adopts the source's active channel count, clamped to this bus's
    /// capacity; extra source channels are dropped.
    pub fn copy_from(&mut self, source: &AudioBus) {
        debug_assert_eq!(self.frame_count, source.frame_count);
        let count = source.channel_count.min(self.channel_capacity);
        self.channel_count = count;
        for ch in 0..count {
            self.channel_mut(ch).copy_from_slice(source.channel(ch));
        }
    }
}
