//! Onda Core - primitives for the realtime audio render engine
//!
//! This crate provides the allocation-free building blocks that the render
//! graph executes every quantum:
//!
//! - [`AudioBus`] - a multi-channel, quantum-length sample buffer with a
//!   fixed channel capacity and a variable active channel count
//! - [`mix_into`] / [`mix_into_discrete`] - channel up/down-mixing and
//!   fan-in summing between buses
//! - [`ShaperCurve`] - piecewise-linear waveshaping transfer curve lookup
//! - [`Oversampler`] - block up/down resampling for anti-aliased nonlinear
//!   processing at 2x or 4x the quantum rate
//! - Math utilities: [`db_to_linear`], [`linear_to_db`]
//!
//! # Realtime contract
//!
//! Everything here is designed for the render thread: buses and resampler
//! state are allocated once at graph-build time and reused every quantum.
//! No function in the processing path allocates, blocks, or returns a
//! recoverable error - misuse of build-time invariants (an out-of-range
//! channel index, a mismatched span length) is a programming-error panic,
//! not a runtime condition.
//!
//! # no_std Support
//!
//! This crate is `no_std` compatible. Disable the default `std` feature:
//!
//! ```toml
//! [dependencies]
//! onda-core = { version = "0.1", default-features = false }
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

pub mod bus;
pub mod math;
pub mod mixing;
pub mod oversample;
pub mod shaper;

pub use bus::AudioBus;
pub use math::{db_to_linear, linear_to_db};
pub use mixing::{max_channel_count, mix_into, mix_into_discrete};
pub use oversample::{OversampleFactor, Oversampler};
pub use shaper::ShaperCurve;
